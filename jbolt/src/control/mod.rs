//! Cycle control
//!
//! - [`phase`] - the atomic reorder-phase state machine
//! - [`signal`] - operator signal word plus the two wait monitors
//! - [`thread`] - the long-lived control thread driving full cycles

pub mod phase;
pub mod signal;
pub mod thread;

pub use phase::{Phase, PhaseState};
pub use signal::{ControlSignals, WaitOutcome, SIG_NULL, SIG_START_PROFILING, SIG_STOP_PROFILING};
pub use thread::spawn_control_thread;
