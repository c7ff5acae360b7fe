//! Listener protocol for aggregation consumers
//!
//! Listeners attach to a view and observe it item-by-item. Every structural
//! change arrives bracketed by `begin_update`/`end_update`, so a listener can
//! defer expensive reconciliation to `end_update`.

/// Item-level observer of a view.
///
/// Methods take `&self`; implementations keep their state behind interior
/// mutability so a single listener can be shared between views.
///
/// # Call sequence
///
/// Attaching to a populated view with items `[a, b]` yields exactly
/// `begin_update, reset, add(a), add(b), end_update`. Afterwards every change
/// is delivered as its own `begin_update, <op>, end_update` cycle.
pub trait ViewListener<T>: Send + Sync {
    /// A batch of notifications begins.
    fn begin_update(&self);

    /// A batch of notifications ended.
    fn end_update(&self);

    /// Drop all state; the view is about to replay its contents via `add`.
    fn reset(&self);

    /// An item entered the view.
    fn add(&self, item: &T);

    /// An item already in the view changed in place.
    fn change(&self, item: &T);

    /// An item left the view.
    fn remove(&self, item: &T);
}
