#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
//! # Cascade View - Layer 2: Derived View Trees
//!
//! Incrementally maintained projections over a mutable collection:
//!
//! - [`ViewNode`]: root mirrors plus live and snapshot filtered views that map
//!   every upstream [`ChangeEvent`](cascade_core::ChangeEvent) onto themselves,
//!   their listeners and their own observers
//! - [`ViewObserver`]: the begin/changed/end channels derived views subscribe to
//! - [`ViewFactory`]: explicit construction of specialized derived views
//! - [`DistinctValues`]: a reference-counting listener publishing a sorted
//!   list of distinct projected values
//! - [`merge_diff`]: the ordered two-pointer reconciliation it uses
//!
//! ## Design Principles
//!
//! - **Weak subscriptions**: a child never keeps its upstream alive, and a
//!   dropped child is pruned from its upstream automatically
//! - **No locks across callbacks**: listener and observer lists are snapshotted
//!   before each notification pass
//! - **Arrival order**: derived views append in acceptance order

pub mod diff;
pub mod distinct;
pub mod filter;
pub mod node;
pub mod observer;

pub use diff::{apply_diff, merge_diff, DiffOp};
pub use distinct::{
    DistinctChoice, DistinctEntry, DistinctKey, DistinctOptions, DistinctSink, DistinctValues,
};
pub use filter::{accept_all, filter_fn, DefaultViewFactory, DeriveMode, Filter, ViewFactory};
pub use node::{NodeKind, UpdateScope, ViewItem, ViewNode, WeakViewNode};
pub use observer::{ListenerId, ObserverId, ViewId, ViewObserver};
