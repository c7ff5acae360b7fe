//! Cascade Testing Infrastructure
//!
//! Fixtures shared by the cascade test suites: an identity-compared [`Row`]
//! item, recording listeners and observers, a scripted data source, a mock
//! deferred-commit collaborator, a concurrency probe for the apply step and
//! proptest strategies.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! cascade-testkit = { path = "../cascade-testkit" }
//! ```
//!
//! ```rust
//! use std::sync::Arc;
//! use cascade_testkit::{ListenerCall, RecordingListener};
//! use cascade_view::ViewNode;
//!
//! let view = ViewNode::root("fixture");
//! view.push(1).unwrap();
//! let listener = Arc::new(RecordingListener::<i32>::new());
//! view.add_listener(listener.clone());
//! assert_eq!(listener.take()[2], ListenerCall::Add(1));
//! ```

pub mod deferred;
pub mod fixtures;
pub mod logging;
pub mod probe;
pub mod recording;
pub mod source;
pub mod strategies;

pub use deferred::MockDeferred;
pub use fixtures::Row;
pub use logging::init_test_tracing;
pub use probe::{ApplyProbe, Gate};
pub use recording::{ListenerCall, ObservedCall, RecordingListener, RecordingObserver};
pub use source::ScriptedSource;
pub use strategies::{apply_op, arb_mirror_ops, MirrorOp};
