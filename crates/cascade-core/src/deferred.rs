//! Deferred-commit collaborators
//!
//! Some source objects prefer to finalize their pending edits when a batch is
//! applied instead of being queued as discrete events. A refresh pass collects
//! them and the apply step decides their fate: replay commits them, a full
//! reset clears them (the reset re-reads their effects from the mirror).

use crate::context::ExecutionContext;
use crate::errors::Result;

/// External object holding edits that are finalized at apply time.
pub trait DeferredCommit: Send + Sync {
    /// Whether anything is pending.
    fn has_deferred_changes(&self) -> bool;

    /// Finalize pending edits. Runs on the owning execution context.
    ///
    /// # Errors
    ///
    /// Failures are logged by the apply step and never abort a batch.
    fn commit_changes(&self, context: &dyn ExecutionContext) -> Result<()>;

    /// Discard pending edits without committing them.
    fn clear(&self);
}
