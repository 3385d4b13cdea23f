//! Operator commands.
//!
//! Thin wrappers the host's diagnostic-command dispatcher calls into. Each
//! command validates mode and phase, posts a signal, and returns a reply
//! string; rejections come back as [`CommandError`] and are formatted to the
//! command's output stream by the dispatcher. Nothing here blocks.

use std::path::Path;

use crate::config::Mode;
use crate::domain::CommandError;
use crate::manager::JBolt;

/// `start [duration=<seconds>]` — kick off a new sampling cycle.
pub fn start(jbolt: &JBolt, duration_secs: Option<u64>) -> Result<String, CommandError> {
    if jbolt.mode() != Mode::Auto {
        return Err(CommandError::NotAutoMode);
    }
    if !jbolt.phase().is_available() {
        return Err(CommandError::NotAvailable);
    }

    let interval = duration_secs.unwrap_or(jbolt.options().sample_interval_secs);
    if interval > i32::MAX as u64 {
        return Err(CommandError::DurationOutOfRange(interval));
    }

    if jbolt.signals().notify_control_wait(interval) {
        Ok(format!("OK. Start a new schedule, duration={interval}s."))
    } else {
        Err(CommandError::Busy)
    }
}

/// `stop` — end the sampling window early and proceed to reorder.
pub fn stop(jbolt: &JBolt) -> Result<String, CommandError> {
    if jbolt.mode() != Mode::Auto {
        return Err(CommandError::NotAutoMode);
    }
    if !jbolt.phase().is_profiling() {
        return Err(CommandError::NotProfiling("stop"));
    }

    if jbolt.signals().notify_sample_wait(false) {
        Ok("OK. Sampling would be stopped and turn to reorder.".to_string())
    } else {
        Err(CommandError::Busy)
    }
}

/// `abort` — end the sampling window and skip reordering.
pub fn abort(jbolt: &JBolt) -> Result<String, CommandError> {
    if jbolt.mode() != Mode::Auto {
        return Err(CommandError::NotAutoMode);
    }
    if !jbolt.phase().is_profiling() {
        return Err(CommandError::NotProfiling("abort"));
    }

    if jbolt.signals().notify_sample_wait(true) {
        Ok("OK. Sampling would be aborted.".to_string())
    } else {
        Err(CommandError::Busy)
    }
}

/// `dump filename=<path>` — write the last computed order.
pub fn dump(jbolt: &JBolt, path: &Path) -> Result<String, CommandError> {
    if jbolt.mode() != Mode::Auto {
        return Err(CommandError::NotAutoMode);
    }

    let written = jbolt.dump_order(path)?;
    Ok(format!("Successful: Dump to {}", written.display()))
}
