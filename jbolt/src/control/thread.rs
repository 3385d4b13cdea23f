//! The control thread.
//!
//! A single long-lived worker owns every phase transition that advances a
//! cycle. In auto mode it loops: pre-clear, sample window, order, reorder,
//! post-clear, park until the next start signal. In manual load mode it
//! parks until enough hot methods have been observed compiling, reorders
//! once, and ends.

use std::sync::Arc;
use std::thread::JoinHandle;

use log::info;

use crate::config::Mode;
use crate::control::signal::WaitOutcome;
use crate::manager::{CycleEnd, JBolt};

/// Spawn the control thread for an initialized context.
pub fn spawn_control_thread(jbolt: Arc<JBolt>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("jbolt-control".to_string())
        .spawn(move || match jbolt.mode() {
            Mode::Auto => run_auto(&jbolt),
            Mode::Load => run_manual_load(&jbolt),
            Mode::Dump => unreachable!("dump mode has no control thread"),
        })
}

fn run_auto(jbolt: &JBolt) {
    let mut first_cycle = true;
    loop {
        jbolt.signals().clear_signal();
        if !first_cycle {
            jbolt.pre_cycle();
        }
        assert!(
            jbolt.phase().available_to_profiling(),
            "control thread owns this transition"
        );

        match jbolt.run_cycle(first_cycle) {
            CycleEnd::Completed => {
                assert!(
                    jbolt.phase().reordering_to_available(),
                    "control thread owns this transition"
                );
                if !first_cycle {
                    jbolt.post_cycle();
                }
            }
            CycleEnd::Aborted => {
                assert!(
                    jbolt.phase().waiting_to_available(),
                    "control thread owns this transition"
                );
                assert!(jbolt.signals().consume_stop(), "abort implies a stop signal");
            }
            CycleEnd::Shutdown => {
                let _ = jbolt.phase().waiting_to_available();
                break;
            }
        }

        first_cycle = false;
        if jbolt.signals().wait_for_start() == WaitOutcome::Shutdown {
            break;
        }
        jbolt.clear_cycle_structures();
    }
    info!("control thread exiting");
}

fn run_manual_load(jbolt: &JBolt) {
    if jbolt.signals().wait_until(|| jbolt.can_reorder_now()) == WaitOutcome::Shutdown {
        return;
    }
    assert!(jbolt.can_reorder_now(), "woken before threshold");
    assert!(
        jbolt.phase().collecting_to_reordering(),
        "control thread owns this transition"
    );
    jbolt.reorder_all_methods();
    jbolt.clear_cycle_structures();
    assert!(
        jbolt.phase().reordering_to_end(),
        "control thread owns this transition"
    );
    info!("control thread exiting");
}
