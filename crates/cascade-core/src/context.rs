//! Execution-context affinity
//!
//! A public projection is owned by exactly one execution context. The dispatch
//! step only needs two things from that context: "am I already on it?" and
//! "run this on it later". [`ExecutionContext`] is that capability and nothing
//! more, so no UI toolkit leaks into the engine.
//!
//! Two implementations ship here:
//! - [`InlineContext`]: every thread counts as the owner; jobs run immediately
//! - [`ThreadContext`]: a dedicated named thread that drains a job queue

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{JoinHandle, ThreadId};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::errors::{CascadeError, Result};

/// A unit of work posted to an execution context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Opaque capability for running work on an owning execution context.
pub trait ExecutionContext: Send + Sync {
    /// Whether the calling thread is the owning context.
    fn is_current(&self) -> bool;

    /// Queue a job to run on the owning context. Never blocks.
    fn post(&self, job: Job);

    /// Whether posted jobs run on the posting thread.
    ///
    /// Blocking the current thread can never starve such a context.
    fn runs_inline(&self) -> bool {
        false
    }

    /// Run inline when already on the owning context, otherwise post.
    fn run_or_post(&self, job: Job) {
        if self.is_current() {
            job();
        } else {
            self.post(job);
        }
    }
}

/// Context for single-threaded hosts and tests: every caller is the owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineContext;

impl ExecutionContext for InlineContext {
    fn is_current(&self) -> bool {
        true
    }

    fn post(&self, job: Job) {
        job();
    }

    fn runs_inline(&self) -> bool {
        true
    }
}

/// A dedicated owner thread draining a FIFO job queue.
///
/// Jobs run in posting order. A panicking job is logged and the thread keeps
/// serving the queue. Dropping the context (or calling [`shutdown`]) closes
/// the queue; jobs already queued still run before the thread exits.
///
/// [`shutdown`]: ThreadContext::shutdown
pub struct ThreadContext {
    name: String,
    thread_id: ThreadId,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadContext {
    /// Spawn a new owner thread with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`CascadeError::Internal`] if the OS refuses to spawn the thread.
    pub fn spawn(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let thread_name = name.clone();

        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                tracing::debug!(context = %thread_name, "execution context started");
                while let Some(job) = receiver.blocking_recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::error!(context = %thread_name, "posted job panicked");
                    }
                }
                tracing::debug!(context = %thread_name, "execution context stopped");
            })
            .map_err(|e| CascadeError::internal(format!("failed to spawn {name}: {e}")))?;

        Ok(Self {
            name,
            thread_id: handle.thread().id(),
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Name of the owner thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Close the queue and wait for queued jobs to drain.
    ///
    /// Called from the owner thread itself, this only closes the queue.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        if self.is_current() {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!(context = %self.name, "execution context thread panicked");
            }
        }
    }
}

impl ExecutionContext for ThreadContext {
    fn is_current(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    fn post(&self, job: Job) {
        let guard = self.sender.lock();
        match guard.as_ref() {
            Some(sender) => {
                if sender.send(job).is_err() {
                    tracing::warn!(context = %self.name, "execution context gone; job dropped");
                }
            }
            None => {
                tracing::warn!(context = %self.name, "execution context shut down; job dropped");
            }
        }
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadContext")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .finish()
    }
}
