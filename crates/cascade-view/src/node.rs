//! ViewNode<T> - a node in a tree of incrementally maintained views
//!
//! A view node owns an ordered sequence, a filter, a listener list and its
//! observer channels. Root nodes are mutated directly (the inbound mirror and
//! the public projection are roots). Derived nodes subscribe to an upstream
//! node and map every upstream [`ChangeEvent`] onto themselves, their
//! listeners and their own observers.
//!
//! # Ordering
//!
//! Items accepted from upstream are appended in arrival order. A derived
//! view does not reinsert at the upstream's positional index.
//!
//! # Locking
//!
//! No internal lock is held while observers, listeners, filters or the
//! upstream node are called. Listener and observer lists are snapshotted
//! before each notification pass, so callbacks may (un)register themselves or
//! others freely.
//!
//! # Item identity
//!
//! Deletes and in-place changes locate items with `PartialEq`. Items that
//! change in place should compare by identity (e.g. an `Arc`-backed handle
//! compared by key), otherwise a changed item is no longer found.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use cascade_core::{CascadeError, ChangeEvent, Result, ViewListener};
use parking_lot::{Mutex, RwLock};

use crate::filter::{accept_all, DeriveMode, Filter};
use crate::observer::{ListenerId, ObserverId, ViewId, ViewObserver};

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

fn next_view_id() -> ViewId {
    ViewId(NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed))
}

/// Bounds every item stored in a view must satisfy.
pub trait ViewItem: Clone + PartialEq + Send + Sync + 'static {}

impl<T> ViewItem for T where T: Clone + PartialEq + Send + Sync + 'static {}

/// How a node came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Mutated directly; no upstream.
    Root,
    /// Subscribed to an upstream node.
    Live,
    /// One-time filtered copy of an upstream node.
    Snapshot,
}

struct ObserverSlot<T> {
    id: ObserverId,
    observer: Weak<dyn ViewObserver<T>>,
}

struct ListenerSlot<T> {
    id: ListenerId,
    listener: Arc<dyn ViewListener<T>>,
}

struct UpstreamLink<T> {
    node: Weak<ViewInner<T>>,
    observer: ObserverId,
}

struct ViewInner<T> {
    id: ViewId,
    label: String,
    kind: NodeKind,
    items: RwLock<Vec<T>>,
    filter: RwLock<Filter<T>>,
    listeners: RwLock<Vec<ListenerSlot<T>>>,
    observers: RwLock<Vec<ObserverSlot<T>>>,
    upstream: Mutex<Option<UpstreamLink<T>>>,
    /// Own change notifications are dropped while non-zero.
    suspended: AtomicUsize,
    update_depth: AtomicUsize,
    next_handle: AtomicU64,
}

/// Shared handle to a view node. Cloning shares the node.
///
/// # Example
///
/// ```rust
/// use cascade_view::{filter_fn, DeriveMode, ViewNode};
///
/// let root = ViewNode::root("orders");
/// let large = root.derive(filter_fn(|n: &u32| *n >= 100), DeriveMode::Live);
///
/// root.push(20).unwrap();
/// root.push(250).unwrap();
/// assert_eq!(large.snapshot(), vec![250]);
///
/// root.remove_item(&250).unwrap();
/// assert!(large.is_empty());
/// ```
pub struct ViewNode<T> {
    inner: Arc<ViewInner<T>>,
}

/// Non-owning handle to a view node.
pub struct WeakViewNode<T> {
    inner: Weak<ViewInner<T>>,
}

impl<T> Clone for ViewNode<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Clone for WeakViewNode<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ViewItem> WeakViewNode<T> {
    /// Upgrade to a strong handle if the node is still alive.
    pub fn upgrade(&self) -> Option<ViewNode<T>> {
        self.inner.upgrade().map(|inner| ViewNode { inner })
    }
}

// =============================================================================
// Construction and queries
// =============================================================================

impl<T: ViewItem> ViewNode<T> {
    /// Create an empty root node.
    pub fn root(label: impl Into<String>) -> Self {
        Self::with_parts(label.into(), NodeKind::Root, accept_all())
    }

    fn with_parts(label: String, kind: NodeKind, filter: Filter<T>) -> Self {
        Self::with_id(next_view_id(), label, kind, filter)
    }

    fn with_id(id: ViewId, label: String, kind: NodeKind, filter: Filter<T>) -> Self {
        Self {
            inner: Arc::new(ViewInner {
                id,
                label,
                kind,
                items: RwLock::new(Vec::new()),
                filter: RwLock::new(filter),
                listeners: RwLock::new(Vec::new()),
                observers: RwLock::new(Vec::new()),
                upstream: Mutex::new(None),
                suspended: AtomicUsize::new(0),
                update_depth: AtomicUsize::new(0),
                next_handle: AtomicU64::new(1),
            }),
        }
    }

    /// Derive a filtered view over this node.
    ///
    /// A [`DeriveMode::Live`] view subscribes before copying, so no change
    /// slips between the copy and the subscription.
    pub fn derive(&self, filter: Filter<T>, mode: DeriveMode) -> ViewNode<T> {
        let id = next_view_id();
        let label = format!("{}/{}", self.inner.label, id.value());
        self.derive_with_id(id, label, filter, mode)
    }

    /// Derive a filtered view with an explicit label.
    pub fn derive_named(
        &self,
        label: impl Into<String>,
        filter: Filter<T>,
        mode: DeriveMode,
    ) -> ViewNode<T> {
        self.derive_with_id(next_view_id(), label.into(), filter, mode)
    }

    fn derive_with_id(
        &self,
        id: ViewId,
        label: String,
        filter: Filter<T>,
        mode: DeriveMode,
    ) -> ViewNode<T> {
        let kind = match mode {
            DeriveMode::Live => NodeKind::Live,
            DeriveMode::Snapshot => NodeKind::Snapshot,
        };
        let child = Self::with_id(id, label, kind, filter);

        if mode == DeriveMode::Live {
            let weak_child: Weak<ViewInner<T>> = Arc::downgrade(&child.inner);
            let observer: Weak<dyn ViewObserver<T>> = weak_child;
            let id = self.subscribe(observer);
            *child.inner.upstream.lock() = Some(UpstreamLink {
                node: Arc::downgrade(&self.inner),
                observer: id,
            });
        }

        if let Err(err) = child.inner.resync(self.snapshot()) {
            tracing::warn!(view = %child.inner.label, error = %err, "initial population failed");
        }
        child
    }

    /// Process-unique identifier.
    pub fn id(&self) -> ViewId {
        self.inner.id
    }

    /// Human-readable label used in logs.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// How this node was created.
    pub fn kind(&self) -> NodeKind {
        self.inner.kind
    }

    /// Non-owning handle to this node.
    pub fn downgrade(&self) -> WeakViewNode<T> {
        WeakViewNode {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same node.
    pub fn ptr_eq(&self, other: &ViewNode<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The upstream node, if subscribed and still alive.
    pub fn upstream(&self) -> Option<ViewNode<T>> {
        self.inner.upstream_node()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    /// Whether the view holds no items.
    pub fn is_empty(&self) -> bool {
        self.inner.items.read().is_empty()
    }

    /// Clone of the item at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.items.read().get(index).cloned()
    }

    /// Clone of the whole sequence.
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.snapshot()
    }

    /// Whether `item` is present.
    pub fn contains(&self, item: &T) -> bool {
        self.inner.items.read().contains(item)
    }

    /// Position of `item`, if present.
    pub fn position(&self, item: &T) -> Option<usize> {
        self.inner.position(item)
    }

    /// The current filter.
    pub fn filter(&self) -> Filter<T> {
        self.inner.filter.read().clone()
    }

    /// Current update-scope nesting depth.
    pub fn update_depth(&self) -> usize {
        self.inner.update_depth.load(Ordering::Acquire)
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .read()
            .iter()
            .filter(|slot| slot.observer.strong_count() > 0)
            .count()
    }
}

// =============================================================================
// Filter, listeners and observers
// =============================================================================

impl<T: ViewItem> ViewNode<T> {
    /// Replace the filter. Equivalent to an upstream reset.
    ///
    /// Snapshot views without an upstream re-filter their own items.
    ///
    /// # Errors
    ///
    /// Root nodes are authoritative and reject filters with
    /// [`CascadeError::Unsupported`].
    pub fn set_filter(&self, filter: Filter<T>) -> Result<()> {
        if self.inner.kind == NodeKind::Root {
            return Err(CascadeError::unsupported(format!(
                "set_filter on root view {}",
                self.inner.label
            )));
        }
        *self.inner.filter.write() = filter;
        self.inner.resync_from_upstream()
    }

    /// Attach a listener.
    ///
    /// The listener immediately receives `begin, reset, add(..)*, end` for the
    /// current contents, and nothing is sent to other listeners.
    ///
    /// Registration must happen on the node's owning context: the replay
    /// runs before the listener is added to the list, so a mutation made
    /// concurrently from another thread would be missed by it.
    pub fn add_listener(&self, listener: Arc<dyn ViewListener<T>>) -> ListenerId {
        let id = ListenerId(self.inner.next_handle());
        let items = self.snapshot();

        listener.begin_update();
        listener.reset();
        for item in &items {
            listener.add(item);
        }
        listener.end_update();

        self.inner
            .listeners
            .write()
            .push(ListenerSlot { id, listener });
        id
    }

    /// Detach a listener. Returns `false` if it was not attached.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|slot| slot.id != id);
        listeners.len() != before
    }

    /// Subscribe to this node's begin/changed/end channels.
    pub fn subscribe(&self, observer: Weak<dyn ViewObserver<T>>) -> ObserverId {
        let id = ObserverId(self.inner.next_handle());
        self.inner
            .observers
            .write()
            .push(ObserverSlot { id, observer });
        id
    }

    /// Remove a subscription. Returns `false` if it was not present.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.inner.unsubscribe(id)
    }

    /// Open an update scope on this node's observers.
    pub fn begin_update(&self) {
        self.inner.open_scope();
    }

    /// Close an update scope opened by [`begin_update`](Self::begin_update).
    pub fn end_update(&self) {
        self.inner.close_scope();
    }

    /// RAII update scope: begin now, end on drop.
    #[must_use = "the scope ends when the guard is dropped"]
    pub fn update_scope(&self) -> UpdateScope<T> {
        self.begin_update();
        UpdateScope { node: self.clone() }
    }

    /// Unsubscribe from upstream and drop filter, listeners, observers and items.
    ///
    /// Using the node afterwards is a caller contract violation: it keeps
    /// working as an empty, detached view.
    pub fn dispose(&self) {
        self.inner.detach_upstream();
        *self.inner.filter.write() = accept_all();
        self.inner.listeners.write().clear();
        self.inner.observers.write().clear();
        self.inner.items.write().clear();
        tracing::trace!(view = %self.inner.label, "view disposed");
    }
}

// =============================================================================
// Direct mutation
// =============================================================================

impl<T: ViewItem> ViewNode<T> {
    /// Append an item.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by an observer; the item stays appended.
    pub fn push(&self, item: T) -> Result<()> {
        self.inner.accept_add(item)
    }

    /// Insert an item at `index`, reporting that index to observers.
    ///
    /// # Errors
    ///
    /// [`CascadeError::IndexOutOfRange`] if `index > len`, otherwise the
    /// first observer error.
    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        let len = self.len();
        if index > len {
            return Err(CascadeError::index_out_of_range(index, len, "insert"));
        }
        self.inner.notify_listeners(|l| l.add(&item));
        {
            let mut items = self.inner.items.write();
            let at = index.min(items.len());
            items.insert(at, item.clone());
        }
        self.inner.emit(ChangeEvent::Added { item, index })
    }

    /// Remove `item`. Returns `false` if it was not present.
    ///
    /// # Errors
    ///
    /// Returns the first observer error.
    pub fn remove_item(&self, item: &T) -> Result<bool> {
        self.inner.accept_remove(item)
    }

    /// Remove and return the item at `index`.
    ///
    /// # Errors
    ///
    /// [`CascadeError::IndexOutOfRange`] for a stale index, otherwise the
    /// first observer error.
    pub fn remove_at(&self, index: usize) -> Result<T> {
        let item = self.get(index).ok_or_else(|| {
            CascadeError::index_out_of_range(index, self.len(), "remove_at")
        })?;
        self.inner.accept_remove(&item)?;
        Ok(item)
    }

    /// Replace the item at `index`.
    ///
    /// Observers see the old item deleted and the new one added, so derived
    /// views re-evaluate membership for both.
    ///
    /// # Errors
    ///
    /// [`CascadeError::IndexOutOfRange`] for a stale index, otherwise the
    /// first observer error.
    pub fn set(&self, index: usize, item: T) -> Result<T> {
        let old = {
            let mut items = self.inner.items.write();
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or_else(|| CascadeError::index_out_of_range(index, len, "set"))?;
            std::mem::replace(slot, item.clone())
        };
        self.inner.notify_listeners(|l| {
            l.remove(&old);
            l.add(&item);
        });
        let deleted = self.inner.emit(ChangeEvent::Deleted { item: old.clone() });
        let added = self.inner.emit(ChangeEvent::Added { item, index });
        deleted.and(added)?;
        Ok(old)
    }

    /// Announce that the item at `index` changed in place.
    ///
    /// # Errors
    ///
    /// [`CascadeError::IndexOutOfRange`] for a stale index, otherwise the
    /// first observer error.
    pub fn notify_changed(&self, index: usize) -> Result<()> {
        self.inner.accept_change_at(index)
    }

    /// Replace the whole sequence and announce a reset.
    ///
    /// Items are filtered through this node's filter. Own notifications are
    /// suspended while the sequence is rebuilt and re-enabled before the
    /// reset is announced.
    ///
    /// # Errors
    ///
    /// Returns the first observer error raised by the reset.
    pub fn replace_all(&self, items: Vec<T>) -> Result<()> {
        self.inner.resync(items)
    }

    /// Remove every item and announce a reset.
    ///
    /// # Errors
    ///
    /// Returns the first observer error raised by the reset.
    pub fn clear(&self) -> Result<()> {
        self.inner.resync(Vec::new())
    }

    /// Announce that the item shape changed; everything downstream re-reads.
    ///
    /// # Errors
    ///
    /// Returns the first observer error.
    pub fn notify_schema_changed(&self) -> Result<()> {
        let items = self.snapshot();
        let listeners = self.inner.listeners();
        for listener in &listeners {
            listener.begin_update();
            listener.reset();
            for item in &items {
                listener.add(item);
            }
            listener.end_update();
        }
        self.inner.emit(ChangeEvent::SchemaChanged)
    }

    /// Reordering is unsupported; always fails without mutating.
    ///
    /// # Errors
    ///
    /// Always [`CascadeError::Unsupported`].
    pub fn move_item(&self, old_index: usize, new_index: usize) -> Result<()> {
        ChangeEvent::<T>::Moved {
            old_index,
            new_index,
        }
        .ensure_supported()
    }

    /// Map one change onto this view as if its upstream had published it.
    ///
    /// Nodes without an upstream resolve positional changes against their
    /// own sequence.
    ///
    /// # Errors
    ///
    /// [`CascadeError::Unsupported`] for moves, [`CascadeError::IndexOutOfRange`]
    /// for stale change indices, otherwise the first observer error.
    pub fn receive(&self, event: &ChangeEvent<T>) -> Result<()> {
        self.inner.map_upstream(event)
    }
}

impl<T> fmt::Debug for ViewNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewNode")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("kind", &self.inner.kind)
            .field("len", &self.inner.items.read().len())
            .finish()
    }
}

/// RAII guard returned by [`ViewNode::update_scope`].
#[must_use = "the scope ends when the guard is dropped"]
pub struct UpdateScope<T: ViewItem> {
    node: ViewNode<T>,
}

impl<T: ViewItem> Drop for UpdateScope<T> {
    fn drop(&mut self) {
        self.node.end_update();
    }
}

// =============================================================================
// Inner mechanics
// =============================================================================

impl<T: ViewItem> ViewInner<T> {
    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn snapshot(&self) -> Vec<T> {
        self.items.read().clone()
    }

    fn position(&self, item: &T) -> Option<usize> {
        self.items.read().iter().position(|existing| existing == item)
    }

    fn current_filter(&self) -> Filter<T> {
        self.filter.read().clone()
    }

    fn upstream_node(&self) -> Option<ViewNode<T>> {
        self.upstream
            .lock()
            .as_ref()
            .and_then(|link| link.node.upgrade())
            .map(|inner| ViewNode { inner })
    }

    fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|slot| slot.id != id);
        observers.len() != before
    }

    fn detach_upstream(&self) {
        let link = self.upstream.lock().take();
        if let Some(link) = link {
            if let Some(upstream) = link.node.upgrade() {
                upstream.unsubscribe(link.observer);
            }
        }
    }

    fn listeners(&self) -> Vec<Arc<dyn ViewListener<T>>> {
        self.listeners
            .read()
            .iter()
            .map(|slot| slot.listener.clone())
            .collect()
    }

    fn live_observers(&self) -> Vec<Arc<dyn ViewObserver<T>>> {
        let mut pruned = false;
        let live: Vec<_> = self
            .observers
            .read()
            .iter()
            .filter_map(|slot| {
                let observer = slot.observer.upgrade();
                pruned |= observer.is_none();
                observer
            })
            .collect();
        if pruned {
            self.observers
                .write()
                .retain(|slot| slot.observer.strong_count() > 0);
        }
        live
    }

    /// Run one `begin, op, end` cycle per listener.
    fn notify_listeners(&self, op: impl Fn(&dyn ViewListener<T>)) {
        for listener in self.listeners() {
            listener.begin_update();
            op(listener.as_ref());
            listener.end_update();
        }
    }

    fn emit(&self, event: ChangeEvent<T>) -> Result<()> {
        if self.suspended.load(Ordering::Acquire) > 0 {
            return Ok(());
        }
        let mut first_error = None;
        for observer in self.live_observers() {
            if let Err(err) = observer.on_change(&event) {
                tracing::warn!(
                    view = %self.label,
                    kind = %event.kind(),
                    error = %err,
                    "observer rejected change"
                );
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn open_scope(&self) {
        self.update_depth.fetch_add(1, Ordering::AcqRel);
        for observer in self.live_observers() {
            observer.begin_update();
        }
    }

    fn close_scope(&self) {
        let balanced = self
            .update_depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                depth.checked_sub(1)
            })
            .is_ok();
        debug_assert!(balanced, "end_update without matching begin_update");
        if !balanced {
            return;
        }
        for observer in self.live_observers() {
            observer.end_update();
        }
    }

    fn accept_add(&self, item: T) -> Result<()> {
        self.notify_listeners(|l| l.add(&item));
        let index = {
            let mut items = self.items.write();
            items.push(item.clone());
            items.len() - 1
        };
        self.emit(ChangeEvent::Added { item, index })
    }

    fn accept_remove(&self, item: &T) -> Result<bool> {
        if self.position(item).is_none() {
            return Ok(false);
        }
        self.notify_listeners(|l| l.remove(item));
        let removed = {
            let mut items = self.items.write();
            match items.iter().position(|existing| existing == item) {
                Some(index) => {
                    items.remove(index);
                    true
                }
                None => false,
            }
        };
        if !removed {
            return Ok(false);
        }
        self.emit(ChangeEvent::Deleted { item: item.clone() })?;
        Ok(true)
    }

    fn accept_change_at(&self, index: usize) -> Result<()> {
        let item = {
            let items = self.items.read();
            items
                .get(index)
                .cloned()
                .ok_or_else(|| CascadeError::index_out_of_range(index, items.len(), "changed"))?
        };
        self.notify_listeners(|l| l.change(&item));
        self.emit(ChangeEvent::Changed { index })
    }

    /// Rebuild the sequence from `source` through the filter.
    fn resync(&self, source: Vec<T>) -> Result<()> {
        let filter = self.current_filter();
        let listeners = self.listeners();

        self.suspended.fetch_add(1, Ordering::AcqRel);
        for listener in &listeners {
            listener.begin_update();
            listener.reset();
        }
        self.items.write().clear();
        for item in source {
            if filter(&item) {
                for listener in &listeners {
                    listener.add(&item);
                }
                self.items.write().push(item);
            }
        }
        for listener in &listeners {
            listener.end_update();
        }
        // Observers must be reachable again before the reset is announced.
        self.suspended.fetch_sub(1, Ordering::AcqRel);

        tracing::trace!(view = %self.label, len = self.items.read().len(), "view resynchronized");
        self.emit(ChangeEvent::Reset)
    }

    fn resync_from_upstream(&self) -> Result<()> {
        let source = match self.upstream_node() {
            Some(upstream) => upstream.snapshot(),
            None => self.snapshot(),
        };
        self.resync(source)
    }

    fn map_upstream(&self, event: &ChangeEvent<T>) -> Result<()> {
        match event {
            ChangeEvent::Reset | ChangeEvent::SchemaChanged => self.resync_from_upstream(),
            ChangeEvent::Added { item, .. } => {
                if (self.current_filter())(item) {
                    self.accept_add(item.clone())
                } else {
                    Ok(())
                }
            }
            ChangeEvent::Changed { index } => self.map_upstream_change(*index),
            ChangeEvent::Deleted { item } => self.accept_remove(item).map(|_| ()),
            ChangeEvent::Removed { index } => {
                tracing::trace!(view = %self.label, index, "ignoring positional-only removal");
                Ok(())
            }
            ChangeEvent::Moved { .. } => event.ensure_supported(),
        }
    }

    fn map_upstream_change(&self, index: usize) -> Result<()> {
        let item = match self.upstream_node() {
            Some(upstream) => upstream.get(index).ok_or_else(|| {
                CascadeError::index_out_of_range(index, upstream.len(), "changed")
            })?,
            None => {
                let items = self.items.read();
                items.get(index).cloned().ok_or_else(|| {
                    CascadeError::index_out_of_range(index, items.len(), "changed")
                })?
            }
        };

        let included = (self.current_filter())(&item);
        match (self.position(&item), included) {
            (None, true) => self.accept_add(item),
            (Some(_), false) => self.accept_remove(&item).map(|_| ()),
            (Some(own_index), true) => self.accept_change_at(own_index),
            (None, false) => Ok(()),
        }
    }
}

impl<T: ViewItem> ViewObserver<T> for ViewInner<T> {
    fn begin_update(&self) {
        self.open_scope();
    }

    fn on_change(&self, event: &ChangeEvent<T>) -> Result<()> {
        self.map_upstream(event)
    }

    fn end_update(&self) {
        self.close_scope();
    }
}

impl<T> Drop for ViewInner<T> {
    fn drop(&mut self) {
        if let Some(link) = self.upstream.get_mut().take() {
            if let Some(upstream) = link.node.upgrade() {
                upstream
                    .observers
                    .write()
                    .retain(|slot| slot.id != link.observer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::filter_fn;

    #[derive(Default)]
    struct CallLog {
        calls: Mutex<Vec<String>>,
    }

    impl CallLog {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.calls.lock())
        }
    }

    impl ViewListener<i32> for CallLog {
        fn begin_update(&self) {
            self.calls.lock().push("begin".into());
        }
        fn end_update(&self) {
            self.calls.lock().push("end".into());
        }
        fn reset(&self) {
            self.calls.lock().push("reset".into());
        }
        fn add(&self, item: &i32) {
            self.calls.lock().push(format!("add({item})"));
        }
        fn change(&self, item: &i32) {
            self.calls.lock().push(format!("change({item})"));
        }
        fn remove(&self, item: &i32) {
            self.calls.lock().push(format!("remove({item})"));
        }
    }

    #[derive(Default)]
    struct EventLog {
        events: Mutex<Vec<ChangeEvent<i32>>>,
    }

    impl ViewObserver<i32> for EventLog {
        fn on_change(&self, event: &ChangeEvent<i32>) -> Result<()> {
            self.events.lock().push(event.clone());
            Ok(())
        }
    }

    fn even() -> Filter<i32> {
        filter_fn(|n: &i32| n % 2 == 0)
    }

    #[test]
    fn test_root_push_and_remove() {
        let root = ViewNode::root("root");
        root.push(1).unwrap();
        root.push(2).unwrap();
        assert_eq!(root.snapshot(), vec![1, 2]);

        assert!(root.remove_item(&1).unwrap());
        assert!(!root.remove_item(&1).unwrap());
        assert_eq!(root.snapshot(), vec![2]);
    }

    #[test]
    fn test_live_view_tracks_adds_and_deletes() {
        let root = ViewNode::root("root");
        let evens = root.derive(even(), DeriveMode::Live);

        for n in 1..=6 {
            root.push(n).unwrap();
        }
        assert_eq!(evens.snapshot(), vec![2, 4, 6]);

        root.remove_item(&4).unwrap();
        assert_eq!(evens.snapshot(), vec![2, 6]);
    }

    #[test]
    fn test_insert_is_appended_downstream() {
        let root = ViewNode::root("root");
        let all = root.derive(accept_all(), DeriveMode::Live);
        root.push(1).unwrap();
        root.push(2).unwrap();
        root.insert(0, 0).unwrap();

        assert_eq!(root.snapshot(), vec![0, 1, 2]);
        assert_eq!(all.snapshot(), vec![1, 2, 0]);
    }

    #[test]
    fn test_snapshot_view_is_detached() {
        let root = ViewNode::root("root");
        root.push(2).unwrap();
        let copy = root.derive(even(), DeriveMode::Snapshot);
        root.push(4).unwrap();

        assert_eq!(copy.snapshot(), vec![2]);
        assert!(copy.upstream().is_none());
        assert_eq!(root.observer_count(), 0);
    }

    #[test]
    fn test_listener_registration_replays_contents() {
        let root = ViewNode::root("root");
        for n in [1, 2, 3] {
            root.push(n).unwrap();
        }
        let log = Arc::new(CallLog::default());
        root.add_listener(log.clone());

        assert_eq!(
            log.take(),
            vec!["begin", "reset", "add(1)", "add(2)", "add(3)", "end"]
        );
    }

    #[test]
    fn test_listener_registration_does_not_touch_other_listeners() {
        let root = ViewNode::root("root");
        root.push(1).unwrap();
        let first = Arc::new(CallLog::default());
        root.add_listener(first.clone());
        first.take();

        root.add_listener(Arc::new(CallLog::default()));
        assert!(first.take().is_empty());
    }

    #[test]
    fn test_listener_cycle_per_add() {
        let root = ViewNode::root("root");
        let log = Arc::new(CallLog::default());
        root.add_listener(log.clone());
        log.take();

        root.push(7).unwrap();
        assert_eq!(log.take(), vec!["begin", "add(7)", "end"]);
    }

    #[test]
    fn test_remove_listener() {
        let root = ViewNode::root("root");
        let log = Arc::new(CallLog::default());
        let id = root.add_listener(log.clone());
        log.take();

        assert!(root.remove_listener(id));
        assert!(!root.remove_listener(id));
        root.push(1).unwrap();
        assert!(log.take().is_empty());
    }

    #[test]
    fn test_set_filter_resyncs() {
        let root = ViewNode::root("root");
        let view = root.derive(even(), DeriveMode::Live);
        for n in 1..=4 {
            root.push(n).unwrap();
        }
        view.set_filter(filter_fn(|n: &i32| *n > 2)).unwrap();
        assert_eq!(view.snapshot(), vec![3, 4]);
    }

    #[test]
    fn test_set_filter_on_root_is_rejected() {
        let root: ViewNode<i32> = ViewNode::root("root");
        let err = root.set_filter(even()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_reset_reenables_notifications_before_signal() {
        let root = ViewNode::root("root");
        let view = root.derive(accept_all(), DeriveMode::Live);
        let log = Arc::new(EventLog::default());
        let observer: Arc<dyn ViewObserver<i32>> = log.clone();
        view.subscribe(Arc::downgrade(&observer));

        root.replace_all(vec![1, 2, 3]).unwrap();

        // Appends during the rebuild are silent; only the reset is seen.
        assert_eq!(*log.events.lock(), vec![ChangeEvent::Reset]);
        assert_eq!(view.snapshot(), vec![1, 2, 3]);
    }

    #[test]
    fn test_removed_notice_is_ignored() {
        let root = ViewNode::root("root");
        let view = root.derive(accept_all(), DeriveMode::Live);
        root.push(1).unwrap();

        view.receive(&ChangeEvent::Removed { index: 0 }).unwrap();
        assert_eq!(view.snapshot(), vec![1]);
    }

    #[test]
    fn test_moved_fails_without_mutation() {
        let root = ViewNode::root("root");
        let view = root.derive(accept_all(), DeriveMode::Live);
        root.push(1).unwrap();
        root.push(2).unwrap();

        assert!(root.move_item(0, 1).is_err());
        assert!(view
            .receive(&ChangeEvent::Moved {
                old_index: 0,
                new_index: 1
            })
            .is_err());
        assert_eq!(root.snapshot(), vec![1, 2]);
        assert_eq!(view.snapshot(), vec![1, 2]);
    }

    #[test]
    fn test_dropped_child_is_pruned() {
        let root = ViewNode::root("root");
        let view = root.derive(accept_all(), DeriveMode::Live);
        assert_eq!(root.observer_count(), 1);

        drop(view);
        assert_eq!(root.observer_count(), 0);
        root.push(1).unwrap();
    }

    #[test]
    fn test_dispose_unsubscribes() {
        let root = ViewNode::root("root");
        let view = root.derive(accept_all(), DeriveMode::Live);
        root.push(1).unwrap();

        view.dispose();
        assert_eq!(root.observer_count(), 0);
        assert!(view.is_empty());
        root.push(2).unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn test_update_scope_forwards_to_children() {
        let root: ViewNode<i32> = ViewNode::root("root");
        let child = root.derive(accept_all(), DeriveMode::Live);
        {
            let _scope = root.update_scope();
            assert_eq!(root.update_depth(), 1);
            assert_eq!(child.update_depth(), 1);
        }
        assert_eq!(root.update_depth(), 0);
        assert_eq!(child.update_depth(), 0);
    }

    #[test]
    fn test_derived_label_matches_id_under_concurrency() {
        let root: ViewNode<i32> = ViewNode::root("root");
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let root = root.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| root.derive(accept_all(), DeriveMode::Snapshot))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for worker in workers {
            for view in worker.join().unwrap() {
                assert_eq!(view.label(), format!("root/{}", view.id().value()));
            }
        }
    }
}
