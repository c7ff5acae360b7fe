#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
//! # Cascade Core - Layer 1: Change Vocabulary
//!
//! Foundation types shared by every layer of the view-synchronization engine:
//!
//! - [`ChangeEvent`]: the tagged change vocabulary flowing from a source
//!   collection through a tree of derived views
//! - [`ViewListener`]: the begin/end/reset/add/change/remove protocol consumed
//!   by aggregation and summarization listeners
//! - [`ExecutionContext`]: the opaque "runs on the owning thread" capability the
//!   dispatch step depends on, with [`InlineContext`] and [`ThreadContext`]
//! - [`DeferredCommit`]: collaborators that finalize pending edits at apply time
//! - [`CascadeError`] and [`SyncConfig`]
//!
//! ## Design Principles
//!
//! - **No UI framework coupling**: thread affinity is a capability, not a toolkit
//! - **Structurally safe deletes**: a `Deleted` event always carries its item
//! - **Fail fast on moves**: reordering is never approximated

pub mod config;
pub mod context;
pub mod deferred;
pub mod errors;
pub mod event;
pub mod listener;

pub use config::SyncConfig;
pub use context::{ExecutionContext, InlineContext, Job, ThreadContext};
pub use deferred::DeferredCommit;
pub use errors::{CascadeError, Result};
pub use event::{ChangeEvent, ChangeKind};
pub use listener::ViewListener;
