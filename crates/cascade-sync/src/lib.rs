#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
//! # Cascade Sync - Layer 3: Refresh Coordination
//!
//! Keeps a public projection synchronized with an external data source:
//!
//! - [`RefreshCoordinator`]: at most one refresh pass in flight, synchronous
//!   and background refresh, dirty tracking
//! - [`PendingBatch`]: raw change events recorded on the inbound mirror, with
//!   the replay-or-reset decision
//! - [`ApplyStep`]: applies one batch on the execution context that owns the
//!   target view
//! - [`BufferedLink`]: the same batching between two views directly
//! - [`DataSource`]: the external collaborator boundary
//!
//! ## Design Principles
//!
//! - **No lock across the source call**: the data source may be arbitrarily slow
//! - **Separate lock domains**: producers recording events never contend with
//!   callers polling refresh status
//! - **Bounded batches**: beyond the threshold a full reset replaces replay

pub mod apply;
pub mod batch;
pub mod coordinator;
pub mod link;
pub mod source;

pub use apply::{ApplyMode, ApplyReport, ApplyStep};
pub use batch::{BatchCounts, BatchSnapshot, PendingBatch};
pub use coordinator::{
    RefreshCoordinator, RefreshCoordinatorBuilder, RefreshMode, RefreshOutcome, RefreshStats,
};
pub use link::BufferedLink;
pub use source::DataSource;
