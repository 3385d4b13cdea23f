//! Operator signal word and the two wait monitors.
//!
//! Operator commands never block: they CAS the signal word and poke the
//! matching condvar, then return. Only the control thread waits. Every wait
//! loop re-checks its predicate after waking, because a notify can race
//! with a timeout expiring.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

pub const SIG_NULL: i32 = 0;
pub const SIG_START_PROFILING: i32 = 1;
pub const SIG_STOP_PROFILING: i32 = 2;

/// How a wait on one of the monitors ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The awaited signal or predicate arrived
    Signalled,
    /// Teardown was requested while waiting
    Shutdown,
}

pub struct ControlSignals {
    signal: AtomicI32,
    abort: AtomicBool,
    shutdown: AtomicBool,
    interval_secs: AtomicU64,
    control_lock: Mutex<()>,
    control_cond: Condvar,
    sample_lock: Mutex<()>,
    sample_cond: Condvar,
}

impl ControlSignals {
    #[must_use]
    pub fn new(interval_secs: u64) -> Self {
        Self {
            signal: AtomicI32::new(SIG_NULL),
            abort: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            interval_secs: AtomicU64::new(interval_secs),
            control_lock: Mutex::new(()),
            control_cond: Condvar::new(),
            sample_lock: Mutex::new(()),
            sample_cond: Condvar::new(),
        }
    }

    #[must_use]
    pub fn signal(&self) -> i32 {
        self.signal.load(Ordering::Acquire)
    }

    pub fn clear_signal(&self) {
        self.signal.store(SIG_NULL, Ordering::Release);
    }

    /// Consume a pending stop signal. Returns `false` if none was pending.
    pub fn consume_stop(&self) -> bool {
        self.signal
            .compare_exchange(
                SIG_STOP_PROFILING,
                SIG_NULL,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Consume the abort flag (at most one cycle sees it).
    pub fn take_abort(&self) -> bool {
        self.abort.swap(false, Ordering::AcqRel)
    }

    #[must_use]
    pub fn sample_interval_secs(&self) -> u64 {
        self.interval_secs.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Post a stop/abort toward a running sampling window.
    ///
    /// Returns `false` (busy) if another signal is already pending.
    pub fn notify_sample_wait(&self, abort: bool) -> bool {
        if self
            .signal
            .compare_exchange(
                SIG_NULL,
                SIG_STOP_PROFILING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }
        let _guard = self.sample_lock.lock();
        self.abort.store(abort, Ordering::Release);
        self.sample_cond.notify_all();
        true
    }

    /// Post a start signal toward the parked control thread, updating the
    /// window length for the cycle it is about to run.
    ///
    /// Returns `false` (busy) if another signal is already pending.
    pub fn notify_control_wait(&self, interval_secs: u64) -> bool {
        if self
            .signal
            .compare_exchange(
                SIG_NULL,
                SIG_START_PROFILING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }
        let _guard = self.control_lock.lock();
        self.interval_secs.store(interval_secs, Ordering::Release);
        self.control_cond.notify_all();
        true
    }

    /// Wake the control thread so it re-checks an external predicate (used
    /// when the reorderable-method threshold is crossed in load mode).
    pub fn notify_control_recheck(&self) {
        let _guard = self.control_lock.lock();
        self.control_cond.notify_all();
    }

    /// Request teardown and wake every waiter.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        {
            let _guard = self.control_lock.lock();
            self.control_cond.notify_all();
        }
        let _guard = self.sample_lock.lock();
        self.sample_cond.notify_all();
    }

    /// Park until the start signal arrives, re-waking every 60 s.
    pub fn wait_for_start(&self) -> WaitOutcome {
        let mut guard = self.control_lock.lock();
        loop {
            if self.is_shutdown() {
                return WaitOutcome::Shutdown;
            }
            if self.signal() == SIG_START_PROFILING {
                return WaitOutcome::Signalled;
            }
            self.control_cond
                .wait_for(&mut guard, Duration::from_secs(60));
        }
    }

    /// Park until `ready()` holds, re-waking every 60 s.
    pub fn wait_until<F: Fn() -> bool>(&self, ready: F) -> WaitOutcome {
        let mut guard = self.control_lock.lock();
        loop {
            if self.is_shutdown() {
                return WaitOutcome::Shutdown;
            }
            if ready() {
                return WaitOutcome::Signalled;
            }
            self.control_cond
                .wait_for(&mut guard, Duration::from_secs(60));
        }
    }

    /// Sleep out a sampling window: returns at the deadline, on a stop
    /// signal, or on shutdown, whichever comes first.
    pub fn sample_window(&self, window: Duration) {
        let deadline = Instant::now() + window;
        let mut guard = self.sample_lock.lock();
        loop {
            if self.is_shutdown() || self.signal() == SIG_STOP_PROFILING {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            self.sample_cond.wait_for(&mut guard, deadline - now);
        }
    }
}
