//! Filters and derived-view factories.
//!
//! Applications that specialize derived views supply a [`ViewFactory`]; the
//! engine never constructs view subclasses by reflection.

use std::sync::Arc;

use crate::node::{ViewItem, ViewNode};

/// Membership predicate of a derived view.
pub type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// The default filter: every item passes.
pub fn accept_all<T>() -> Filter<T> {
    Arc::new(|_| true)
}

/// Build a [`Filter`] from a closure.
pub fn filter_fn<T, F>(predicate: F) -> Filter<T>
where
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    Arc::new(predicate)
}

/// Whether a derived view stays subscribed to its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeriveMode {
    /// Subscribe to the upstream and stay synchronized.
    Live,
    /// One-time filtered copy with no subscription.
    Snapshot,
}

/// Creates derived views on behalf of the engine.
///
/// # Example
///
/// ```rust
/// use cascade_view::{filter_fn, DefaultViewFactory, DeriveMode, ViewFactory, ViewNode};
///
/// let root = ViewNode::root("numbers");
/// root.push(1).unwrap();
/// root.push(2).unwrap();
///
/// let even = DefaultViewFactory.create(&root, filter_fn(|n: &i32| n % 2 == 0), DeriveMode::Live);
/// assert_eq!(even.snapshot(), vec![2]);
/// ```
pub trait ViewFactory<T: ViewItem>: Send + Sync {
    /// Create a view over `upstream` filtered by `filter`.
    fn create(&self, upstream: &ViewNode<T>, filter: Filter<T>, mode: DeriveMode) -> ViewNode<T>;
}

/// Factory producing plain [`ViewNode`]s via [`ViewNode::derive`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultViewFactory;

impl<T: ViewItem> ViewFactory<T> for DefaultViewFactory {
    fn create(&self, upstream: &ViewNode<T>, filter: Filter<T>, mode: DeriveMode) -> ViewNode<T> {
        upstream.derive(filter, mode)
    }
}
