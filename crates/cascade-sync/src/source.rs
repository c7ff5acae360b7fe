//! The external data source boundary.

use std::sync::Arc;

use cascade_core::{DeferredCommit, Result};
use cascade_view::ViewNode;

/// Produces authoritative records by mutating the inbound mirror.
///
/// `synchronize` is called with no coordinator lock held and may be slow.
/// Every change must be made on `mirror` synchronously during the call so the
/// batch recorder sees it. Collaborators that prefer to finalize their edits
/// at apply time are returned instead of being mutated directly.
pub trait DataSource<T>: Send + Sync {
    /// Bring `mirror` up to date.
    ///
    /// # Errors
    ///
    /// Any error marks the coordinator dirty again; see
    /// [`RefreshCoordinator::refresh`](crate::RefreshCoordinator::refresh).
    fn synchronize(&self, mirror: &ViewNode<T>) -> Result<Vec<Arc<dyn DeferredCommit>>>;
}

impl<T, F> DataSource<T> for F
where
    F: Fn(&ViewNode<T>) -> Result<Vec<Arc<dyn DeferredCommit>>> + Send + Sync,
{
    fn synchronize(&self, mirror: &ViewNode<T>) -> Result<Vec<Arc<dyn DeferredCommit>>> {
        self(mirror)
    }
}
