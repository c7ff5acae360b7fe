//! The apply step
//!
//! Applies a [`BatchSnapshot`] to a target view exactly once, on the
//! execution context that owns the target. The batch is either replayed
//! event by event or collapsed to a full reset that re-reads the mirror.
//!
//! ## Failure tolerance
//!
//! A failing event during replay is logged and skipped; the remaining events
//! still apply. The target may then miss one change until the next full
//! reset.
//!
//! ## Finalization order
//!
//! A dispatched step reports completion before the target's update scope
//! closes, so observers of the closing `end_update` already see the pass as
//! finished.

use std::cell::RefCell;
use std::sync::Arc;

use cascade_core::{CascadeError, ChangeEvent, ExecutionContext, Result};
use cascade_view::{ViewId, ViewItem, ViewNode};

use crate::batch::BatchSnapshot;

/// How a batch was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyMode {
    /// Events were applied one by one.
    Replay,
    /// The target was rebuilt from the mirror.
    FullReset,
}

/// Outcome of one apply step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    /// Whether the batch was replayed or reset
    pub mode: ApplyMode,
    /// Events (or the reset) applied successfully
    pub applied: usize,
    /// Events skipped because they failed
    pub failed: usize,
    /// Deferred collaborators that failed to commit
    pub deferred_failures: usize,
}

impl ApplyReport {
    fn new(mode: ApplyMode) -> Self {
        Self {
            mode,
            applied: 0,
            failed: 0,
            deferred_failures: 0,
        }
    }
}

/// Binds a mirror, a target and the target's owning context.
#[derive(Clone)]
pub struct ApplyStep<T> {
    mirror: ViewNode<T>,
    target: ViewNode<T>,
    context: Arc<dyn ExecutionContext>,
    threshold: usize,
}

impl<T: ViewItem> ApplyStep<T> {
    /// Create an apply step resetting at `threshold` counted changes.
    pub fn new(
        mirror: ViewNode<T>,
        target: ViewNode<T>,
        context: Arc<dyn ExecutionContext>,
        threshold: usize,
    ) -> Self {
        Self {
            mirror,
            target,
            context,
            threshold,
        }
    }

    /// The view a full reset re-reads.
    pub fn mirror(&self) -> &ViewNode<T> {
        &self.mirror
    }

    /// The view batches are applied to.
    pub fn target(&self) -> &ViewNode<T> {
        &self.target
    }

    /// The execution context owning the target.
    pub fn context(&self) -> &Arc<dyn ExecutionContext> {
        &self.context
    }

    /// Whether an apply step for this target is running on the calling
    /// thread, i.e. the caller is one of the target's observers or listeners.
    pub fn is_applying_here(&self) -> bool {
        let target = self.target.id();
        APPLYING.with(|applying| applying.borrow().contains(&target))
    }

    /// Apply `batch` on the calling thread.
    ///
    /// The caller must already be on the owning context. The target's
    /// observers see one enclosing update scope.
    pub fn run(&self, batch: BatchSnapshot<T>) -> ApplyReport {
        let _scope = self.target.update_scope();
        let _mark = ApplyingMark::enter(self.target.id());
        self.apply(batch)
    }

    fn apply(&self, batch: BatchSnapshot<T>) -> ApplyReport {
        let report = if batch.should_reset(self.threshold) {
            self.full_reset(batch)
        } else {
            self.replay(batch)
        };
        tracing::debug!(
            target_view = %self.target.label(),
            mode = ?report.mode,
            applied = report.applied,
            failed = report.failed,
            "batch applied"
        );
        report
    }

    /// Run the step on the owning context: inline when already there,
    /// otherwise queued without blocking.
    ///
    /// `on_complete` runs exactly once after the step, on the owning context,
    /// and before the target's closing `end_update`. It receives `None` if
    /// the step panicked.
    pub fn dispatch<F>(&self, batch: BatchSnapshot<T>, on_complete: F)
    where
        F: FnOnce(Option<ApplyReport>) + Send + 'static,
    {
        let step = self.clone();
        self.context.run_or_post(Box::new(move || {
            // Dropped in reverse: completion, mark, then the scope.
            let _scope = step.target.update_scope();
            let _mark = ApplyingMark::enter(step.target.id());
            let mut completion = Completion::new(on_complete);
            completion.report = Some(step.apply(batch));
        }));
    }

    fn full_reset(&self, batch: BatchSnapshot<T>) -> ApplyReport {
        let mut report = ApplyReport::new(ApplyMode::FullReset);
        // Deferred edits are picked up implicitly by re-reading the mirror.
        for deferred in &batch.deferred {
            deferred.clear();
        }
        match self.target.replace_all(self.mirror.snapshot()) {
            Ok(()) => report.applied = 1,
            Err(err) => {
                tracing::warn!(
                    target_view = %self.target.label(),
                    error = %err,
                    "observer failed during full reset"
                );
                report.failed = 1;
            }
        }
        report
    }

    fn replay(&self, batch: BatchSnapshot<T>) -> ApplyReport {
        let mut report = ApplyReport::new(ApplyMode::Replay);
        for event in &batch.events {
            tracing::trace!(target_view = %self.target.label(), kind = %event.kind(), "replaying event");
            match self.replay_one(event) {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    tracing::warn!(
                        target_view = %self.target.label(),
                        kind = %event.kind(),
                        error = %err,
                        "skipping failed event"
                    );
                    report.failed += 1;
                }
            }
        }
        for deferred in &batch.deferred {
            if let Err(err) = deferred.commit_changes(self.context.as_ref()) {
                tracing::warn!(error = %err, "deferred commit failed");
                report.deferred_failures += 1;
            }
        }
        report
    }

    fn replay_one(&self, event: &ChangeEvent<T>) -> Result<()> {
        match event {
            ChangeEvent::Added { item, .. } => self.target.push(item.clone()),
            ChangeEvent::Changed { index } => {
                // The index is a mirror position; resolve it now.
                let item = self.mirror.get(*index).ok_or_else(|| {
                    CascadeError::index_out_of_range(*index, self.mirror.len(), "replay changed")
                })?;
                let own = self.target.position(&item).ok_or_else(|| {
                    CascadeError::index_out_of_range(*index, self.target.len(), "replay changed")
                })?;
                self.target.notify_changed(own)
            }
            ChangeEvent::Deleted { item } => self.target.remove_item(item).map(|_| ()),
            ChangeEvent::Removed { .. } => Ok(()),
            ChangeEvent::Reset | ChangeEvent::SchemaChanged | ChangeEvent::Moved { .. } => {
                event.ensure_supported()?;
                Err(CascadeError::internal(format!(
                    "{} event queued for replay",
                    event.kind()
                )))
            }
        }
    }
}

impl<T> std::fmt::Debug for ApplyStep<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplyStep")
            .field("mirror", &self.mirror)
            .field("target", &self.target)
            .field("threshold", &self.threshold)
            .finish()
    }
}

thread_local! {
    /// Targets with an apply step running on this thread, innermost last.
    static APPLYING: RefCell<Vec<ViewId>> = const { RefCell::new(Vec::new()) };
}

/// Marks a target as being applied on the current thread until dropped.
struct ApplyingMark {
    target: ViewId,
}

impl ApplyingMark {
    fn enter(target: ViewId) -> Self {
        APPLYING.with(|applying| applying.borrow_mut().push(target));
        Self { target }
    }
}

impl Drop for ApplyingMark {
    fn drop(&mut self) {
        APPLYING.with(|applying| {
            let mut applying = applying.borrow_mut();
            if let Some(pos) = applying.iter().rposition(|t| *t == self.target) {
                applying.remove(pos);
            }
        });
    }
}

/// Calls the completion callback on drop, including during unwinding.
struct Completion<F: FnOnce(Option<ApplyReport>)> {
    callback: Option<F>,
    report: Option<ApplyReport>,
}

impl<F: FnOnce(Option<ApplyReport>)> Completion<F> {
    fn new(callback: F) -> Self {
        Self {
            callback: Some(callback),
            report: None,
        }
    }
}

impl<F: FnOnce(Option<ApplyReport>)> Drop for Completion<F> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(self.report.take());
        }
    }
}
