//! Concurrency instrumentation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use cascade_core::{ChangeEvent, Result};
use cascade_view::{ViewItem, ViewNode, ViewObserver};
use parking_lot::{Condvar, Mutex};

/// Gauges how many apply steps run concurrently on a target view.
///
/// Every apply step wraps its work in one update scope on the target. The
/// probe counts scopes, and gauges concurrency over change delivery: a pass
/// reports completion before its scope closes, so the closing `end_update`
/// of one pass may legitimately overlap the next pass's `begin_update`.
/// Optionally each change is held for `hold` to widen race windows.
#[derive(Debug, Default)]
pub struct ApplyProbe {
    active: AtomicUsize,
    max_active: AtomicUsize,
    scopes: AtomicUsize,
    hold: Mutex<Option<Duration>>,
}

impl ApplyProbe {
    /// Subscribe a new probe to `target`. Keep the returned `Arc` alive.
    pub fn attach<T: ViewItem>(target: &ViewNode<T>) -> Arc<Self> {
        let probe = Arc::new(Self::default());
        let weak: Weak<ApplyProbe> = Arc::downgrade(&probe);
        let observer: Weak<dyn ViewObserver<T>> = weak;
        target.subscribe(observer);
        probe
    }

    /// Hold every delivered change for `hold` before it proceeds.
    pub fn hold_changes_for(&self, hold: Duration) {
        *self.hold.lock() = Some(hold);
    }

    /// Highest number of changes seen in delivery at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Number of scopes opened so far.
    pub fn scopes(&self) -> usize {
        self.scopes.load(Ordering::SeqCst)
    }
}

impl<T: ViewItem> ViewObserver<T> for ApplyProbe {
    fn begin_update(&self) {
        self.scopes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_change(&self, _event: &ChangeEvent<T>) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let hold = *self.hold.lock();
        if let Some(hold) = hold {
            std::thread::sleep(hold);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    waiting: usize,
}

/// A latch that blocks callers of [`Gate::pass`] until [`Gate::open`].
#[derive(Debug, Default)]
pub struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl Gate {
    /// A closed gate.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Block until the gate is open.
    pub fn pass(&self) {
        let mut state = self.state.lock();
        state.waiting += 1;
        self.changed.notify_all();
        while !state.open {
            self.changed.wait(&mut state);
        }
        state.waiting -= 1;
    }

    /// Release every current and future caller.
    pub fn open(&self) {
        self.state.lock().open = true;
        self.changed.notify_all();
    }

    /// Wait until at least `count` callers are blocked in [`pass`](Self::pass).
    ///
    /// Returns `false` on timeout.
    pub fn wait_for_waiters(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.waiting < count && !state.open {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.waiting >= count;
            }
        }
        true
    }
}
