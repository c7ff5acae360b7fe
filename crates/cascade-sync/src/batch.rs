//! Change batching
//!
//! [`PendingBatch`] accumulates the raw change events recorded on an inbound
//! mirror between two apply steps and decides between replaying them and
//! collapsing to a full reset.
//!
//! Once the reset flag is set, further events are not queued: the apply step
//! will re-read the whole mirror anyway. The queue length is therefore bounded
//! by the configured threshold.

use std::sync::Arc;

use cascade_core::{ChangeEvent, DeferredCommit, Result};

/// Per-kind counters of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    /// Queued `Added` events
    pub added: usize,
    /// Queued `Changed` events
    pub changed: usize,
    /// Queued `Deleted` events
    pub deleted: usize,
}

impl BatchCounts {
    /// Sum over all kinds.
    pub fn total(&self) -> usize {
        self.added + self.changed + self.deleted
    }
}

/// Queue of change events awaiting an apply step.
#[derive(Debug, Clone)]
pub struct PendingBatch<T> {
    queue: Vec<ChangeEvent<T>>,
    counts: BatchCounts,
    needs_reset: bool,
    threshold: usize,
}

impl<T: Clone> PendingBatch<T> {
    /// Create an empty batch collapsing to a reset beyond `threshold` events.
    pub fn new(threshold: usize) -> Self {
        Self {
            queue: Vec::new(),
            counts: BatchCounts::default(),
            needs_reset: false,
            threshold: threshold.max(1),
        }
    }

    /// Record one event.
    ///
    /// # Errors
    ///
    /// [`CascadeError::Unsupported`](cascade_core::CascadeError::Unsupported)
    /// for moves; nothing is recorded.
    pub fn accept(&mut self, event: &ChangeEvent<T>) -> Result<()> {
        event.ensure_supported()?;

        match event {
            ChangeEvent::Reset | ChangeEvent::SchemaChanged => {
                self.needs_reset = true;
                self.queue.clear();
                return Ok(());
            }
            ChangeEvent::Removed { index } => {
                tracing::trace!(index, "dropping positional-only removal");
                return Ok(());
            }
            _ if self.needs_reset => return Ok(()),
            ChangeEvent::Added { .. } => self.counts.added += 1,
            ChangeEvent::Changed { .. } => self.counts.changed += 1,
            ChangeEvent::Deleted { .. } => self.counts.deleted += 1,
            ChangeEvent::Moved { .. } => return Ok(()),
        }
        self.queue.push(event.clone());

        if self.queue.len() > self.threshold {
            tracing::debug!(
                queued = self.queue.len(),
                threshold = self.threshold,
                "batch threshold exceeded; collapsing to reset"
            );
            self.needs_reset = true;
            self.queue.clear();
        }
        Ok(())
    }

    /// Zero the per-kind counters. Queued events are kept.
    pub fn reset_counters(&mut self) {
        self.counts = BatchCounts::default();
    }

    /// Move the accumulated state into a snapshot and start over.
    pub fn take(&mut self, deferred: Vec<Arc<dyn DeferredCommit>>) -> BatchSnapshot<T> {
        let snapshot = BatchSnapshot {
            events: std::mem::take(&mut self.queue),
            counts: self.counts,
            needs_reset: self.needs_reset,
            deferred,
        };
        self.counts = BatchCounts::default();
        self.needs_reset = false;
        snapshot
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no events are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether the batch has collapsed to a full reset.
    pub fn needs_reset(&self) -> bool {
        self.needs_reset
    }

    /// Current per-kind counters.
    pub fn counts(&self) -> BatchCounts {
        self.counts
    }

    /// Queue length beyond which the batch collapses.
    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

/// A batch detached from its buffer, ready for the apply step.
pub struct BatchSnapshot<T> {
    /// Queued events in arrival order; empty after a collapse
    pub events: Vec<ChangeEvent<T>>,
    /// Counters at the time of the take
    pub counts: BatchCounts,
    /// The batch collapsed to a full reset
    pub needs_reset: bool,
    /// Collaborators returned by the data source
    pub deferred: Vec<Arc<dyn DeferredCommit>>,
}

impl<T> BatchSnapshot<T> {
    /// Nothing to apply: no reset, no events, no deferred collaborators.
    pub fn is_empty(&self) -> bool {
        !self.needs_reset && self.events.is_empty() && self.deferred.is_empty()
    }

    /// Number of queued events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Deferred collaborators that actually hold pending edits.
    pub fn deferred_count(&self) -> usize {
        self.deferred
            .iter()
            .filter(|d| d.has_deferred_changes())
            .count()
    }

    /// Whether applying this batch should re-read the whole mirror.
    pub fn should_reset(&self, threshold: usize) -> bool {
        self.needs_reset || self.counts.total() + self.deferred_count() >= threshold
    }
}

impl<T> std::fmt::Debug for BatchSnapshot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSnapshot")
            .field("events", &self.events.len())
            .field("counts", &self.counts)
            .field("needs_reset", &self.needs_reset)
            .field("deferred", &self.deferred.len())
            .finish()
    }
}
