//! ChangeEvent<T> - the change vocabulary of a view tree
//!
//! Every mutation of a source collection is described by one `ChangeEvent`.
//! Events flow from the inbound mirror into the batching buffer, from the
//! public projection into derived views, and from derived views into their
//! own observers.

use std::fmt;

use crate::errors::{CascadeError, Result};

/// A single change to an ordered collection.
///
/// # Delete semantics
///
/// `Deleted` always carries the removed item: by the time a delete is
/// delivered, any index it referenced may already identify a different item.
/// `Removed` models a positional-only removal notice from foreign producers;
/// it is never actionable and every consumer drops it.
///
/// # Example
///
/// ```rust
/// use cascade_core::{ChangeEvent, ChangeKind};
///
/// let event = ChangeEvent::Added { item: "a", index: 0 };
/// assert_eq!(event.kind(), ChangeKind::Added);
/// assert!(event.ensure_supported().is_ok());
///
/// let moved: ChangeEvent<&str> = ChangeEvent::Moved { old_index: 0, new_index: 1 };
/// assert!(moved.ensure_supported().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent<T> {
    /// An item was added at the given source index.
    Added {
        /// The added item, captured when the event was raised
        item: T,
        /// Index reported by the source at the time of the add
        index: usize,
    },

    /// The item at the given index changed in place.
    ///
    /// The index is resolved lazily by the consumer.
    Changed {
        /// Index of the changed item
        index: usize,
    },

    /// An item was removed.
    Deleted {
        /// The removed item
        item: T,
    },

    /// Positional-only removal notice. Dropped by every consumer.
    Removed {
        /// Index the removed item used to occupy
        index: usize,
    },

    /// The collection must be re-read from scratch.
    Reset,

    /// The shape of the items changed; consumers re-read from scratch.
    SchemaChanged,

    /// An item moved. Unsupported everywhere in the pipeline.
    Moved {
        /// Previous index
        old_index: usize,
        /// New index
        new_index: usize,
    },
}

/// Discriminant of a [`ChangeEvent`], used for counters and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// [`ChangeEvent::Added`]
    Added,
    /// [`ChangeEvent::Changed`]
    Changed,
    /// [`ChangeEvent::Deleted`]
    Deleted,
    /// [`ChangeEvent::Removed`]
    Removed,
    /// [`ChangeEvent::Reset`]
    Reset,
    /// [`ChangeEvent::SchemaChanged`]
    SchemaChanged,
    /// [`ChangeEvent::Moved`]
    Moved,
}

impl ChangeKind {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Deleted => "deleted",
            Self::Removed => "removed",
            Self::Reset => "reset",
            Self::SchemaChanged => "schema_changed",
            Self::Moved => "moved",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl<T> ChangeEvent<T> {
    /// Get the discriminant of this event.
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Added { .. } => ChangeKind::Added,
            Self::Changed { .. } => ChangeKind::Changed,
            Self::Deleted { .. } => ChangeKind::Deleted,
            Self::Removed { .. } => ChangeKind::Removed,
            Self::Reset => ChangeKind::Reset,
            Self::SchemaChanged => ChangeKind::SchemaChanged,
            Self::Moved { .. } => ChangeKind::Moved,
        }
    }

    /// `Reset` and `SchemaChanged` both demand a full re-read.
    pub fn requires_full_reset(&self) -> bool {
        matches!(self, Self::Reset | Self::SchemaChanged)
    }

    /// Reject events the pipeline cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`CascadeError::Unsupported`] for [`ChangeEvent::Moved`].
    pub fn ensure_supported(&self) -> Result<()> {
        match self {
            Self::Moved {
                old_index,
                new_index,
            } => Err(CascadeError::unsupported(format!(
                "move {old_index} -> {new_index}"
            ))),
            _ => Ok(()),
        }
    }

    /// The item carried by this event, if any.
    pub fn item(&self) -> Option<&T> {
        match self {
            Self::Added { item, .. } | Self::Deleted { item } => Some(item),
            _ => None,
        }
    }
}
