//! Pairwise buffering between two views
//!
//! A [`BufferedLink`] subscribes to a source view, batches its events with the
//! pairwise threshold and applies them to a target view on the target's
//! execution context. Batches are flushed at the end of the source's
//! outermost update scope; events raised outside any scope flush at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use cascade_core::{ChangeEvent, ExecutionContext, Result, SyncConfig};
use cascade_view::{ObserverId, ViewItem, ViewNode, ViewObserver, WeakViewNode};
use parking_lot::Mutex;

use crate::apply::ApplyStep;
use crate::batch::PendingBatch;

struct LinkInner<T> {
    batch: Mutex<PendingBatch<T>>,
    depth: AtomicUsize,
    apply: ApplyStep<T>,
}

impl<T: ViewItem> LinkInner<T> {
    fn flush(&self) {
        let snapshot = self.batch.lock().take(Vec::new());
        if snapshot.is_empty() {
            return;
        }
        let target = self.apply.target().label().to_string();
        self.apply.dispatch(snapshot, move |report| {
            if report.is_none() {
                tracing::error!(target_view = %target, "link apply step panicked");
            }
        });
    }
}

impl<T: ViewItem> ViewObserver<T> for LinkInner<T> {
    fn begin_update(&self) {
        self.depth.fetch_add(1, Ordering::AcqRel);
    }

    fn on_change(&self, event: &ChangeEvent<T>) -> Result<()> {
        self.batch.lock().accept(event)?;
        if self.depth.load(Ordering::Acquire) == 0 {
            self.flush();
        }
        Ok(())
    }

    fn end_update(&self) {
        let outermost = self
            .depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                depth.checked_sub(1)
            })
            .map(|previous| previous == 1)
            .unwrap_or(false);
        if outermost {
            self.flush();
        }
    }
}

/// Buffered one-way link from a source view to a target view.
///
/// Dropping the link unsubscribes it from the source.
pub struct BufferedLink<T: ViewItem> {
    inner: Arc<LinkInner<T>>,
    source: WeakViewNode<T>,
    subscription: ObserverId,
}

impl<T: ViewItem> BufferedLink<T> {
    /// Link `source` to `target`, applying on `context`.
    ///
    /// The target is first reset to the source's current contents.
    pub fn new(
        source: &ViewNode<T>,
        target: ViewNode<T>,
        context: Arc<dyn ExecutionContext>,
        config: &SyncConfig,
    ) -> Self {
        let threshold = config.link_reset_event_threshold;
        let inner = Arc::new(LinkInner {
            batch: Mutex::new(PendingBatch::new(threshold)),
            depth: AtomicUsize::new(0),
            apply: ApplyStep::new(source.clone(), target, context, threshold),
        });

        let weak_inner: Weak<LinkInner<T>> = Arc::downgrade(&inner);
        let observer: Weak<dyn ViewObserver<T>> = weak_inner;
        let subscription = source.subscribe(observer);

        inner.batch.lock().accept(&ChangeEvent::Reset).ok();
        inner.flush();

        Self {
            inner,
            source: source.downgrade(),
            subscription,
        }
    }

    /// Apply whatever is buffered now.
    pub fn flush(&self) {
        self.inner.flush();
    }

    /// Number of buffered events.
    pub fn pending(&self) -> usize {
        self.inner.batch.lock().len()
    }

    /// The view batches are applied to.
    pub fn target(&self) -> &ViewNode<T> {
        self.inner.apply.target()
    }
}

impl<T: ViewItem> Drop for BufferedLink<T> {
    fn drop(&mut self) {
        if let Some(source) = self.source.upgrade() {
            source.unsubscribe(self.subscription);
        }
    }
}

impl<T: ViewItem> std::fmt::Debug for BufferedLink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedLink")
            .field("apply", &self.inner.apply)
            .field("subscription", &self.subscription)
            .finish()
    }
}
