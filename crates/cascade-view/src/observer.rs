//! Observer channels of a view node
//!
//! A view node publishes on three channels: begin, changed, end. Derived
//! views, pairwise buffers and batch recorders subscribe to them. Subscribers
//! are held weakly; a dropped subscriber is pruned on the next notification.

use std::fmt;

use cascade_core::{ChangeEvent, Result};

/// Subscriber to a view node's begin/changed/end channels.
pub trait ViewObserver<T>: Send + Sync {
    /// The upstream view entered an update scope.
    fn begin_update(&self) {}

    /// The upstream view changed.
    ///
    /// # Errors
    ///
    /// Errors are collected by the publishing view; remaining observers are
    /// still notified and the first error is returned to the mutator.
    fn on_change(&self, event: &ChangeEvent<T>) -> Result<()>;

    /// The upstream view left an update scope.
    fn end_update(&self) {}
}

macro_rules! handle_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u64);

        impl $name {
            /// Raw numeric value.
            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

handle_id!(
    /// Process-unique identifier of a view node.
    ViewId,
    "view"
);
handle_id!(
    /// Handle returned by [`crate::ViewNode::subscribe`].
    ObserverId,
    "observer"
);
handle_id!(
    /// Handle returned by [`crate::ViewNode::add_listener`].
    ListenerId,
    "listener"
);
