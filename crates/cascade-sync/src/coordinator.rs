//! Refresh Coordinator
//!
//! Pulls from a [`DataSource`] into an inbound mirror, records the mirror's
//! change events into a [`PendingBatch`] and hands each finished batch to the
//! [`ApplyStep`] that updates the public projection on its owning context.
//!
//! # Architecture
//!
//! ```text
//! DataSource ──synchronize──▶ mirror ──events──▶ BatchRecorder ──▶ PendingBatch
//!                                                                     │ take
//!                                         public ◀── ApplyStep ◀──────┘
//!                                           │          (owning context)
//!                                           ▼
//!                                   derived views, listeners
//! ```
//!
//! # Lock domains
//!
//! - **status** (`refreshing`, `needs_refresh`, last start) with a condition
//!   variable for blocking callers
//! - **batch** (the pending queue and counters), touched by the recorder
//!
//! The two are never held together, and neither is held while the data
//! source runs.
//!
//! # At most one pass in flight
//!
//! `refreshing` is set under the status lock by the caller that starts a
//! pass and cleared only when that pass has finished applying (or failed).
//! Every other caller either merges its intent into `needs_refresh` or waits
//! for the in-flight pass in bounded ticks.

use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use cascade_core::{CascadeError, ChangeEvent, ExecutionContext, InlineContext, Result, SyncConfig};
use cascade_view::{
    DefaultViewFactory, DeriveMode, Filter, ObserverId, ViewFactory, ViewItem, ViewNode,
    ViewObserver,
};
use parking_lot::{Condvar, Mutex};
use tokio::runtime::Handle;

use crate::apply::{ApplyMode, ApplyReport, ApplyStep};
use crate::batch::PendingBatch;
use crate::source::DataSource;

/// Whether `refresh` runs the pass on the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshMode {
    /// Run inline; join an in-flight pass by waiting for it.
    Blocking,
    /// Hand the pass to the blocking pool; never wait.
    Background,
}

/// What a `refresh` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshOutcome {
    /// This call started a new pass.
    Started,
    /// A pass was in flight and this call waited for it to finish.
    Joined,
    /// A pass was in flight; the request was merged into it without waiting.
    Pending,
    /// Nothing was dirty and no refresh was forced.
    Skipped,
}

/// Counters accumulated over the coordinator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Passes that reached the data source
    pub passes_started: u64,
    /// Passes whose batch was applied to the public view
    pub passes_applied: u64,
    /// Applied passes that rebuilt the public view from the mirror
    pub full_resets: u64,
    /// Applied passes that replayed events one by one
    pub replays: u64,
    /// Replayed events skipped because they failed
    pub failed_events: u64,
    /// Passes aborted by a data source error
    pub source_failures: u64,
}

#[derive(Debug)]
struct RefreshStatus {
    needs_refresh: bool,
    refreshing: bool,
    last_refresh_start: Option<Instant>,
    /// Thread inside `DataSource::synchronize` for the current pass.
    source_thread: Option<ThreadId>,
}

/// Records mirror events into the shared batch.
struct BatchRecorder<T> {
    batch: Arc<Mutex<PendingBatch<T>>>,
}

impl<T: ViewItem> ViewObserver<T> for BatchRecorder<T> {
    fn on_change(&self, event: &ChangeEvent<T>) -> Result<()> {
        self.batch.lock().accept(event)
    }
}

/// Coordinates refresh passes for one mirror/public pair.
pub struct RefreshCoordinator<T: ViewItem> {
    label: String,
    config: SyncConfig,
    source: Arc<dyn DataSource<T>>,
    factory: Arc<dyn ViewFactory<T>>,
    apply: ApplyStep<T>,
    runtime: Option<Handle>,

    status: Mutex<RefreshStatus>,
    idle: Condvar,

    batch: Arc<Mutex<PendingBatch<T>>>,
    // Keeps the mirror subscription alive.
    _recorder: Arc<BatchRecorder<T>>,
    recorder_id: ObserverId,

    stats: Mutex<RefreshStats>,
}

/// Builder for [`RefreshCoordinator`].
pub struct RefreshCoordinatorBuilder<T: ViewItem> {
    label: String,
    source: Arc<dyn DataSource<T>>,
    config: SyncConfig,
    context: Arc<dyn ExecutionContext>,
    factory: Arc<dyn ViewFactory<T>>,
    runtime: Option<Handle>,
}

impl<T: ViewItem> RefreshCoordinatorBuilder<T> {
    /// Label used for the mirror, the public view and log fields.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Thresholds and waiter tick.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// The context owning the public projection. Defaults to [`InlineContext`].
    pub fn context(mut self, context: Arc<dyn ExecutionContext>) -> Self {
        self.context = context;
        self
    }

    /// Factory used by [`RefreshCoordinator::derive_view`].
    pub fn factory(mut self, factory: Arc<dyn ViewFactory<T>>) -> Self {
        self.factory = factory;
        self
    }

    /// Runtime whose blocking pool runs background passes.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Validate the configuration and wire the mirror to the batch.
    ///
    /// # Errors
    ///
    /// [`CascadeError::InvalidConfig`] if the configuration is invalid.
    pub fn build(self) -> Result<Arc<RefreshCoordinator<T>>> {
        self.config.validate()?;

        let mirror = ViewNode::root(format!("{}/mirror", self.label));
        let public = ViewNode::root(format!("{}/public", self.label));
        let batch = Arc::new(Mutex::new(PendingBatch::new(
            self.config.reset_event_threshold,
        )));

        let recorder = Arc::new(BatchRecorder {
            batch: batch.clone(),
        });
        let weak_recorder: Weak<BatchRecorder<T>> = Arc::downgrade(&recorder);
        let observer: Weak<dyn ViewObserver<T>> = weak_recorder;
        let recorder_id = mirror.subscribe(observer);

        let apply = ApplyStep::new(
            mirror,
            public,
            self.context,
            self.config.reset_event_threshold,
        );

        tracing::debug!(coordinator = %self.label, "refresh coordinator created");

        Ok(Arc::new(RefreshCoordinator {
            label: self.label,
            config: self.config,
            source: self.source,
            factory: self.factory,
            apply,
            runtime: self.runtime,
            status: Mutex::new(RefreshStatus {
                needs_refresh: true,
                refreshing: false,
                last_refresh_start: None,
                source_thread: None,
            }),
            idle: Condvar::new(),
            batch,
            _recorder: recorder,
            recorder_id,
            stats: Mutex::new(RefreshStats::default()),
        }))
    }
}

// =============================================================================
// Construction and accessors
// =============================================================================

impl<T: ViewItem> RefreshCoordinator<T> {
    /// Start building a coordinator around `source`.
    pub fn builder(source: Arc<dyn DataSource<T>>) -> RefreshCoordinatorBuilder<T> {
        RefreshCoordinatorBuilder {
            label: "cascade".to_string(),
            source,
            config: SyncConfig::default(),
            context: Arc::new(InlineContext),
            factory: Arc::new(DefaultViewFactory),
            runtime: None,
        }
    }

    /// Label used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The active configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The inbound mirror the data source writes to.
    pub fn mirror(&self) -> &ViewNode<T> {
        self.apply.mirror()
    }

    /// The public projection, mutated only on the owning context.
    pub fn public_view(&self) -> &ViewNode<T> {
        self.apply.target()
    }

    /// The context owning the public projection.
    pub fn context(&self) -> &Arc<dyn ExecutionContext> {
        self.apply.context()
    }

    /// Derive a view over the public projection through the configured factory.
    pub fn derive_view(&self, filter: Filter<T>, mode: DeriveMode) -> ViewNode<T> {
        self.factory.create(self.public_view(), filter, mode)
    }

    /// Whether a pass is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.status.lock().refreshing
    }

    /// Whether the next non-forced refresh will run a pass.
    pub fn needs_refresh(&self) -> bool {
        self.status.lock().needs_refresh
    }

    /// Mark the mirror stale so the next refresh runs a pass.
    pub fn mark_dirty(&self) {
        self.status.lock().needs_refresh = true;
    }

    /// When the latest pass started.
    pub fn last_refresh_start(&self) -> Option<Instant> {
        self.status.lock().last_refresh_start
    }

    /// Lifetime counters.
    pub fn stats(&self) -> RefreshStats {
        *self.stats.lock()
    }

    /// Number of events currently queued for the next apply step.
    pub fn pending_events(&self) -> usize {
        self.batch.lock().len()
    }

    /// Wait until no pass is in flight.
    ///
    /// Returns `false` if `timeout` elapsed first. Must not be called on the
    /// owning context while a pass is waiting to apply there.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut status = self.status.lock();
        while status.refreshing {
            if self.idle.wait_until(&mut status, deadline).timed_out() {
                return !status.refreshing;
            }
        }
        true
    }
}

// =============================================================================
// Refresh passes
// =============================================================================

impl<T: ViewItem> RefreshCoordinator<T> {
    /// Request a refresh.
    ///
    /// - If a pass is in flight, `force` is merged into the dirty flag. A
    ///   blocking caller then waits for that pass, re-checking every
    ///   `wait_tick`, and returns [`RefreshOutcome::Joined`]. It returns
    ///   [`RefreshOutcome::Pending`] instead when waiting would block the
    ///   pass itself: on a queued owning context, from inside the apply step
    ///   (an observer or listener of the public view), or from inside the
    ///   data source.
    /// - Otherwise, if dirty or forced, a new pass starts inline or on the
    ///   blocking pool.
    ///
    /// # Errors
    ///
    /// Blocking passes re-raise data source failures after marking the
    /// coordinator dirty again. Background requests fail with
    /// [`CascadeError::NoRuntime`] when no runtime is available; background
    /// pass failures are logged, never propagated.
    pub fn refresh(self: &Arc<Self>, mode: RefreshMode, force: bool) -> Result<RefreshOutcome> {
        {
            let mut status = self.status.lock();
            if status.refreshing {
                status.needs_refresh |= force;
                if mode == RefreshMode::Background || self.would_block_pass(&status) {
                    return Ok(RefreshOutcome::Pending);
                }
                let tick = self.config.wait_tick();
                while status.refreshing {
                    if self.idle.wait_for(&mut status, tick).timed_out() {
                        tracing::trace!(coordinator = %self.label, "still waiting for in-flight pass");
                    }
                }
                return Ok(RefreshOutcome::Joined);
            }
            if !(force || status.needs_refresh) {
                return Ok(RefreshOutcome::Skipped);
            }
            status.refreshing = true;
        }

        match mode {
            RefreshMode::Blocking => {
                self.process_refresh()?;
                Ok(RefreshOutcome::Started)
            }
            RefreshMode::Background => {
                let Some(handle) = self
                    .runtime
                    .clone()
                    .or_else(|| Handle::try_current().ok())
                else {
                    self.finish_pass();
                    return Err(CascadeError::NoRuntime);
                };
                let this = Arc::clone(self);
                drop(handle.spawn_blocking(move || {
                    if let Err(err) = this.process_refresh() {
                        tracing::warn!(
                            coordinator = %this.label,
                            error = %err,
                            "background refresh failed"
                        );
                    }
                }));
                Ok(RefreshOutcome::Started)
            }
        }
    }

    /// Whether the in-flight pass needs the calling thread to finish.
    fn would_block_pass(&self, status: &RefreshStatus) -> bool {
        let context = self.context();
        (context.is_current() && !context.runs_inline())
            || self.apply.is_applying_here()
            || status.source_thread == Some(thread::current().id())
    }

    /// Run one pass. `refreshing` must already be set by the caller.
    fn process_refresh(self: &Arc<Self>) -> Result<()> {
        let mut guard = PassGuard {
            coordinator: self.as_ref(),
            armed: true,
        };

        {
            let mut status = self.status.lock();
            status.last_refresh_start = Some(Instant::now());
            status.needs_refresh = false;
            status.source_thread = Some(thread::current().id());
        }
        self.batch.lock().reset_counters();
        self.stats.lock().passes_started += 1;
        tracing::debug!(coordinator = %self.label, "refresh pass started");

        let synced = self.source.synchronize(self.mirror());
        self.status.lock().source_thread = None;
        let deferred = match synced {
            Ok(deferred) => deferred,
            Err(err) => {
                tracing::error!(coordinator = %self.label, error = %err, "data source failed");
                self.status.lock().needs_refresh = true;
                self.stats.lock().source_failures += 1;
                return Err(err);
            }
        };

        let snapshot = self.batch.lock().take(deferred);
        if snapshot.is_empty() {
            tracing::debug!(coordinator = %self.label, "refresh pass found no changes");
            return Ok(());
        }

        let events = snapshot.event_count();
        guard.armed = false;
        let this = Arc::clone(self);
        self.apply.dispatch(snapshot, move |report| this.complete_pass(report));
        tracing::debug!(coordinator = %self.label, events, "refresh pass dispatched");
        Ok(())
    }

    fn complete_pass(&self, report: Option<ApplyReport>) {
        match report {
            Some(report) => {
                let mut stats = self.stats.lock();
                stats.passes_applied += 1;
                stats.failed_events += report.failed as u64;
                match report.mode {
                    ApplyMode::FullReset => stats.full_resets += 1,
                    ApplyMode::Replay => stats.replays += 1,
                }
            }
            None => {
                tracing::error!(coordinator = %self.label, "apply step panicked");
                self.status.lock().needs_refresh = true;
            }
        }
        self.finish_pass();
    }

    /// Clear counters and the in-flight flag, waking blocked callers.
    fn finish_pass(&self) {
        self.batch.lock().reset_counters();
        let mut status = self.status.lock();
        status.refreshing = false;
        status.source_thread = None;
        self.idle.notify_all();
    }
}

impl<T: ViewItem> Drop for RefreshCoordinator<T> {
    fn drop(&mut self) {
        self.apply.mirror().unsubscribe(self.recorder_id);
    }
}

impl<T: ViewItem> std::fmt::Debug for RefreshCoordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("label", &self.label)
            .field("config", &self.config)
            .field("status", &*self.status.lock())
            .finish()
    }
}

/// Ends the pass unless it was handed to the apply step.
struct PassGuard<'a, T: ViewItem> {
    coordinator: &'a RefreshCoordinator<T>,
    armed: bool,
}

impl<T: ViewItem> Drop for PassGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.coordinator.finish_pass();
        }
    }
}
