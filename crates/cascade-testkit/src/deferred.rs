//! Mock deferred-commit collaborator.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use cascade_core::{CascadeError, DeferredCommit, ExecutionContext, Result};

/// Counts commits and clears.
#[derive(Debug)]
pub struct MockDeferred {
    has_changes: AtomicBool,
    fail_commit: AtomicBool,
    commits: AtomicUsize,
    clears: AtomicUsize,
    committed_on_owner: AtomicUsize,
}

impl MockDeferred {
    /// A collaborator reporting pending edits.
    pub fn new() -> Self {
        Self::with_changes(true)
    }

    /// A collaborator whose `has_deferred_changes` returns `has_changes`.
    pub fn with_changes(has_changes: bool) -> Self {
        Self {
            has_changes: AtomicBool::new(has_changes),
            fail_commit: AtomicBool::new(false),
            commits: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
            committed_on_owner: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent commit fail.
    pub fn fail_commits(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    /// Successful commits so far.
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Clears so far.
    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Commits that ran while the given context reported itself current.
    pub fn commits_on_owner(&self) -> usize {
        self.committed_on_owner.load(Ordering::SeqCst)
    }
}

impl Default for MockDeferred {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredCommit for MockDeferred {
    fn has_deferred_changes(&self) -> bool {
        self.has_changes.load(Ordering::SeqCst)
    }

    fn commit_changes(&self, context: &dyn ExecutionContext) -> Result<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(CascadeError::source_failure("mock commit failure"));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        if context.is_current() {
            self.committed_on_owner.fetch_add(1, Ordering::SeqCst);
        }
        self.has_changes.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.has_changes.store(false, Ordering::SeqCst);
    }
}
