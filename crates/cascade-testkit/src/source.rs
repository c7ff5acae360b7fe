//! Scripted data source.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cascade_core::{CascadeError, DeferredCommit, Result};
use cascade_sync::DataSource;
use cascade_view::{ViewItem, ViewNode};
use parking_lot::Mutex;

use crate::probe::Gate;

type Step<T> = Box<dyn FnOnce(&ViewNode<T>) -> Result<Vec<Arc<dyn DeferredCommit>>> + Send>;

/// A data source that replays one scripted step per `synchronize` call.
///
/// Once the script is exhausted, calls succeed without touching the mirror.
/// Calls are counted and the highest number of overlapping calls is tracked.
pub struct ScriptedSource<T> {
    steps: Mutex<VecDeque<Step<T>>>,
    gate: Option<Arc<Gate>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl<T: ViewItem> ScriptedSource<T> {
    /// Source with an empty script.
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            gate: None,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Block every call on `gate` before running its step.
    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Sleep for `delay` in every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an arbitrary step.
    pub fn then<F>(&self, step: F) -> &Self
    where
        F: FnOnce(&ViewNode<T>) -> Result<Vec<Arc<dyn DeferredCommit>>> + Send + 'static,
    {
        self.steps.lock().push_back(Box::new(step));
        self
    }

    /// Queue a step appending `items` to the mirror.
    pub fn then_push(&self, items: Vec<T>) -> &Self {
        self.then(move |mirror| {
            for item in items {
                mirror.push(item)?;
            }
            Ok(Vec::new())
        })
    }

    /// Queue a step removing `items` from the mirror.
    pub fn then_remove(&self, items: Vec<T>) -> &Self {
        self.then(move |mirror| {
            for item in &items {
                mirror.remove_item(item)?;
            }
            Ok(Vec::new())
        })
    }

    /// Queue a failing step.
    pub fn then_fail(&self, message: impl Into<String>) -> &Self {
        let message = message.into();
        self.then(move |_| Err(CascadeError::source_failure(message)))
    }

    /// Queue a step returning `deferred` without touching the mirror.
    pub fn then_defer(&self, deferred: Arc<dyn DeferredCommit>) -> &Self {
        self.then(move |_| Ok(vec![deferred]))
    }

    /// Number of `synchronize` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `synchronize` calls.
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps.lock().len()
    }
}

impl<T: ViewItem> Default for ScriptedSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ViewItem> DataSource<T> for ScriptedSource<T> {
    fn synchronize(&self, mirror: &ViewNode<T>) -> Result<Vec<Arc<dyn DeferredCommit>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.pass();
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let step = self.steps.lock().pop_front();
        let result = match step {
            Some(step) => step(mirror),
            None => Ok(Vec::new()),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
