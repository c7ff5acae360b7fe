//! Item fixtures.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

struct RowInner {
    id: u64,
    category: Option<String>,
    value: AtomicI64,
}

/// A shared record compared by id.
///
/// `value` can change in place, which is what `Changed` events describe;
/// `category` is fixed for the row's lifetime.
#[derive(Clone)]
pub struct Row {
    inner: Arc<RowInner>,
}

impl Row {
    /// Row without a category.
    pub fn new(id: u64, value: i64) -> Self {
        Self::build(id, value, None)
    }

    /// Row with a category.
    pub fn with_category(id: u64, value: i64, category: impl Into<String>) -> Self {
        Self::build(id, value, Some(category.into()))
    }

    fn build(id: u64, value: i64, category: Option<String>) -> Self {
        Self {
            inner: Arc::new(RowInner {
                id,
                category,
                value: AtomicI64::new(value),
            }),
        }
    }

    /// Identity used for equality.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current value.
    pub fn value(&self) -> i64 {
        self.inner.value.load(Ordering::SeqCst)
    }

    /// Mutate in place. Every clone observes the new value.
    pub fn set_value(&self, value: i64) {
        self.inner.value.store(value, Ordering::SeqCst);
    }

    /// Fixed category, if any.
    pub fn category(&self) -> Option<&str> {
        self.inner.category.as_deref()
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Row {}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row#{}({})", self.id(), self.value())
    }
}
