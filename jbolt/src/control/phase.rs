//! The reorder-phase state machine.
//!
//! One atomic integer, mutated only by compare-and-swap, holds the phase of
//! the whole subsystem. Readers use acquire loads, writers publish with the
//! CAS, so a thread that observes `Profiling` also observes everything the
//! control thread set up before entering it.
//!
//! ```text
//! Available ─► Collecting ─► Reordering ─► End                  (manual load)
//! Available ─► Profiling ─► Waiting ─► Reordering ─► Available  (auto)
//!                 │                         │
//!                 └─► Available (abort)     └─► Available (via Waiting on abort)
//! ```
//!
//! Manual dump mode uses only the front of the sampling flow: Available →
//! Profiling at startup, Profiling → Waiting at exit.
//!
//! Transition methods return `false` when the CAS lost; callers that assumed
//! exclusive ownership treat that as a programming error.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::config::Mode;

/// Reorder phases. The discriminants are part of the log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Phase {
    /// Sampling done, waiting for the order to be computed and applied
    Waiting = -1,
    /// Not working, or done; a new cycle may start
    Available = 0,
    /// Collecting hot-listed compilations (manual load mode only)
    Collecting = 1,
    /// The sampler is running (auto and manual dump modes)
    Profiling = 2,
    /// Recompiling and re-laying methods
    Reordering = 3,
    /// Terminal: the subsystem will not run again (manual load mode)
    End = 4,
}

impl Phase {
    fn from_i32(v: i32) -> Phase {
        match v {
            -1 => Phase::Waiting,
            0 => Phase::Available,
            1 => Phase::Collecting,
            2 => Phase::Profiling,
            3 => Phase::Reordering,
            4 => Phase::End,
            _ => unreachable!("invalid phase value {v}"),
        }
    }
}

/// Atomic phase holder. The mode is only consulted by debug assertions that
/// guard mode-specific transitions.
#[derive(Debug)]
pub struct PhaseState {
    phase: AtomicI32,
    mode: Mode,
}

impl PhaseState {
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            phase: AtomicI32::new(Phase::Available as i32),
            mode,
        }
    }

    #[must_use]
    pub fn current(&self) -> Phase {
        Phase::from_i32(self.phase.load(Ordering::Acquire))
    }

    fn transit(&self, from: Phase, to: Phase) -> bool {
        self.phase
            .compare_exchange(from as i32, to as i32, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    // Manual-load transitions

    pub fn available_to_collecting(&self) -> bool {
        debug_assert!(self.mode == Mode::Load, "two-phase only");
        self.transit(Phase::Available, Phase::Collecting)
    }

    pub fn collecting_to_reordering(&self) -> bool {
        debug_assert!(self.mode == Mode::Load, "two-phase only");
        self.transit(Phase::Collecting, Phase::Reordering)
    }

    pub fn reordering_to_end(&self) -> bool {
        self.transit(Phase::Reordering, Phase::End)
    }

    // Sampling-mode transitions (auto and manual dump)

    pub fn available_to_profiling(&self) -> bool {
        debug_assert!(self.mode != Mode::Load, "sampling modes only");
        self.transit(Phase::Available, Phase::Profiling)
    }

    pub fn profiling_to_waiting(&self) -> bool {
        debug_assert!(self.mode != Mode::Load, "sampling modes only");
        self.transit(Phase::Profiling, Phase::Waiting)
    }

    // Auto-mode transitions

    pub fn profiling_to_available(&self) -> bool {
        debug_assert!(self.mode == Mode::Auto, "one-phase only");
        self.transit(Phase::Profiling, Phase::Available)
    }

    pub fn waiting_to_reordering(&self) -> bool {
        debug_assert!(self.mode == Mode::Auto, "one-phase only");
        self.transit(Phase::Waiting, Phase::Reordering)
    }

    pub fn waiting_to_available(&self) -> bool {
        debug_assert!(self.mode == Mode::Auto, "one-phase only");
        self.transit(Phase::Waiting, Phase::Available)
    }

    pub fn reordering_to_available(&self) -> bool {
        debug_assert!(self.mode == Mode::Auto, "one-phase only");
        self.transit(Phase::Reordering, Phase::Available)
    }

    // Predicates

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.current() == Phase::Available
    }

    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.current() == Phase::Collecting
    }

    #[must_use]
    pub fn is_profiling(&self) -> bool {
        self.current() == Phase::Profiling
    }

    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.current() == Phase::Waiting
    }

    #[must_use]
    pub fn is_reordering(&self) -> bool {
        self.current() == Phase::Reordering
    }

    /// Sampling ingestion is permitted only in these phases.
    #[must_use]
    pub fn is_profiling_or_waiting(&self) -> bool {
        matches!(self.current(), Phase::Profiling | Phase::Waiting)
    }

    /// Placement routing is active only in these phases.
    #[must_use]
    pub fn is_collecting_or_reordering(&self) -> bool {
        matches!(self.current(), Phase::Collecting | Phase::Reordering)
    }
}
