//! Recording listeners and observers.

use std::sync::Arc;

use cascade_core::{CascadeError, ChangeEvent, ChangeKind, Result, ViewListener};
use cascade_view::{ObserverId, ViewItem, ViewNode, ViewObserver};
use parking_lot::Mutex;

/// One call received by a [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerCall<T> {
    /// `begin_update`
    Begin,
    /// `end_update`
    End,
    /// `reset`
    Reset,
    /// `add(item)`
    Add(T),
    /// `change(item)`
    Change(T),
    /// `remove(item)`
    Remove(T),
}

/// Listener that logs every call in order.
#[derive(Debug)]
pub struct RecordingListener<T> {
    calls: Mutex<Vec<ListenerCall<T>>>,
}

impl<T: Clone> RecordingListener<T> {
    /// Listener with an empty log.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls recorded so far.
    pub fn calls(&self) -> Vec<ListenerCall<T>> {
        self.calls.lock().clone()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<ListenerCall<T>> {
        std::mem::take(&mut *self.calls.lock())
    }

    fn record(&self, call: ListenerCall<T>) {
        self.calls.lock().push(call);
    }
}

impl<T: Clone> Default for RecordingListener<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> ViewListener<T> for RecordingListener<T> {
    fn begin_update(&self) {
        self.record(ListenerCall::Begin);
    }

    fn end_update(&self) {
        self.record(ListenerCall::End);
    }

    fn reset(&self) {
        self.record(ListenerCall::Reset);
    }

    fn add(&self, item: &T) {
        self.record(ListenerCall::Add(item.clone()));
    }

    fn change(&self, item: &T) {
        self.record(ListenerCall::Change(item.clone()));
    }

    fn remove(&self, item: &T) {
        self.record(ListenerCall::Remove(item.clone()));
    }
}

/// One notification received by a [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedCall<T> {
    /// `begin_update`
    Begin,
    /// `on_change(event)`
    Change(ChangeEvent<T>),
    /// `end_update`
    End,
}

/// Observer that logs every notification and can reject chosen kinds.
#[derive(Debug)]
pub struct RecordingObserver<T> {
    calls: Mutex<Vec<ObservedCall<T>>>,
    reject: Mutex<Option<ChangeKind>>,
}

impl<T: ViewItem> RecordingObserver<T> {
    /// Unattached observer with an empty log.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reject: Mutex::new(None),
        }
    }

    /// Create an observer and subscribe it to `view`.
    ///
    /// The subscription is weak: keep the returned `Arc` alive.
    pub fn attach(view: &ViewNode<T>) -> (Arc<Self>, ObserverId) {
        let observer = Arc::new(Self::new());
        let weak: std::sync::Weak<Self> = Arc::downgrade(&observer);
        let id = view.subscribe(weak);
        (observer, id)
    }

    /// Fail every subsequent change of `kind`.
    pub fn reject(&self, kind: ChangeKind) {
        *self.reject.lock() = Some(kind);
    }

    /// Every notification so far.
    pub fn calls(&self) -> Vec<ObservedCall<T>> {
        self.calls.lock().clone()
    }

    /// Only the change events, without begin/end markers.
    pub fn events(&self) -> Vec<ChangeEvent<T>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ObservedCall::Change(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<ObservedCall<T>> {
        std::mem::take(&mut *self.calls.lock())
    }
}

impl<T: ViewItem> Default for RecordingObserver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ViewItem> ViewObserver<T> for RecordingObserver<T> {
    fn begin_update(&self) {
        self.calls.lock().push(ObservedCall::Begin);
    }

    fn on_change(&self, event: &ChangeEvent<T>) -> Result<()> {
        self.calls.lock().push(ObservedCall::Change(event.clone()));
        if *self.reject.lock() == Some(event.kind()) {
            return Err(CascadeError::internal(format!("rejected {}", event.kind())));
        }
        Ok(())
    }

    fn end_update(&self) {
        self.calls.lock().push(ObservedCall::End);
    }
}
