//! Startup configuration
//!
//! Raw process flags come in as [`JBoltFlags`]; [`validate`] turns them into
//! the immutable [`JBoltOptions`] the subsystem runs with, or refuses to
//! start. All checks here are fatal on failure: a half-configured layout
//! subsystem quietly corrupting code placement is worse than not starting.

// sysconf() is an unsafe extern call
#![allow(unsafe_code)]

use std::path::PathBuf;

use log::warn;

use crate::domain::ConfigError;
use crate::graph::{ClusterSort, HfsortPolicy};
use crate::host::HostCapabilities;

/// Default sampling window, seconds.
pub const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 600;

/// Default size of EACH hot segment.
pub const DEFAULT_CODE_HEAP_SIZE: u64 = 8 * 1024 * 1024;

/// Fraction of the hot-method list that must be observed compiling before
/// load mode starts reordering.
pub const REORDER_THRESHOLD: f64 = 0.8;

/// Operating mode, derived from the two mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Sample, order and reorder in one process, cycle after cycle
    Auto,
    /// First run: sample until exit, then dump the order file
    Dump,
    /// Second run: load the order file and reorder once
    Load,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Auto => "auto",
            Mode::Dump => "dump",
            Mode::Load => "load",
        }
    }
}

/// Raw flags, exactly as the host's flag parser hands them over. `None`
/// means "not set on the command line".
#[derive(Debug, Clone, Default)]
pub struct JBoltFlags {
    /// Master enable
    pub enable: bool,
    pub dump_mode: bool,
    pub load_mode: bool,
    pub order_file: Option<PathBuf>,
    pub sample_interval_secs: Option<u64>,
    pub code_heap_size: Option<u64>,
    /// Sort final clusters by density instead of total heat
    pub density_sort: bool,
    /// Stop merging clusters that crossed the page size
    pub merge_frozen: bool,
}

/// Validated, immutable run options.
#[derive(Debug, Clone)]
pub struct JBoltOptions {
    pub mode: Mode,
    pub order_file: Option<PathBuf>,
    pub sample_interval_secs: u64,
    /// `None` means "auto-size from the order file" (load mode only)
    pub code_heap_size: Option<u64>,
    pub policy: HfsortPolicy,
}

/// Host page size, used as the default cluster freeze threshold.
#[must_use]
pub fn default_page_size() -> usize {
    let ps = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(ps).unwrap_or(4096)
}

fn check_flags_not_set(flags: &JBoltFlags) -> Result<(), ConfigError> {
    let set: [(&str, bool); 5] = [
        ("DumpMode", flags.dump_mode),
        ("LoadMode", flags.load_mode),
        ("OrderFile", flags.order_file.is_some()),
        ("SampleInterval", flags.sample_interval_secs.is_some()),
        ("CodeHeapSize", flags.code_heap_size.is_some()),
    ];
    for (name, is_set) in set {
        if is_set {
            return Err(ConfigError::FlagRequiresEnable(name));
        }
    }
    Ok(())
}

fn check_mode(flags: &JBoltFlags) -> Result<Mode, ConfigError> {
    if flags.dump_mode && flags.load_mode {
        return Err(ConfigError::ConflictingModes);
    }
    let mode = match (flags.dump_mode, flags.load_mode) {
        (true, _) => Mode::Dump,
        (_, true) => Mode::Load,
        _ => Mode::Auto,
    };
    if mode != Mode::Auto && flags.sample_interval_secs.is_some() {
        warn!("SampleInterval is ignored because it is not in auto mode.");
    }
    Ok(mode)
}

fn check_order_file(flags: &JBoltFlags, mode: Mode) -> Result<Option<PathBuf>, ConfigError> {
    if mode == Mode::Auto {
        if flags.order_file.is_some() {
            warn!("OrderFile is ignored because it is in auto mode.");
        }
        return Ok(None);
    }

    let Some(path) = flags.order_file.clone() else {
        return Err(ConfigError::OrderFileRequired(mode.as_str()));
    };

    if path.exists() {
        if mode == Mode::Dump {
            warn!(
                "order file to dump already exists and will be overwritten: file={}",
                path.display()
            );
            std::fs::remove_file(&path)
                .map_err(|e| ConfigError::OrderFile(crate::domain::OrderFileError::Io(e)))?;
        }
    } else if mode == Mode::Load {
        return Err(ConfigError::OrderFile(
            crate::domain::OrderFileError::Missing(path),
        ));
    }

    Ok(Some(path))
}

fn check_dependency(caps: &HostCapabilities) -> Result<(), ConfigError> {
    if !caps.top_tier_jit {
        return Err(ConfigError::JitTierUnavailable);
    }
    if !caps.segmented_code_cache {
        return Err(ConfigError::SegmentedCacheUnavailable);
    }
    Ok(())
}

/// Validate flags against the host.
///
/// Returns `Ok(None)` when the subsystem is simply disabled (and no other
/// flag was set), `Ok(Some(options))` when it should start.
pub fn validate(
    flags: &JBoltFlags,
    caps: &HostCapabilities,
) -> Result<Option<JBoltOptions>, ConfigError> {
    if !flags.enable {
        check_flags_not_set(flags)?;
        return Ok(None);
    }

    let mode = check_mode(flags)?;
    check_dependency(caps)?;
    let order_file = check_order_file(flags, mode)?;

    let sample_interval_secs = flags
        .sample_interval_secs
        .unwrap_or(DEFAULT_SAMPLE_INTERVAL_SECS);
    if sample_interval_secs > i32::MAX as u64 {
        return Err(ConfigError::IntervalOutOfRange(sample_interval_secs));
    }

    let code_heap_size = match (flags.code_heap_size, mode) {
        // load mode sizes the segment from the order file when defaulted
        (None, Mode::Load) => None,
        (explicit, _) => Some(explicit.unwrap_or(DEFAULT_CODE_HEAP_SIZE)),
    };

    let policy = HfsortPolicy {
        sort_by: if flags.density_sort {
            ClusterSort::Density
        } else {
            ClusterSort::Heat
        },
        respect_freeze: flags.merge_frozen,
        page_size: caps.page_size,
    };

    Ok(Some(JBoltOptions {
        mode,
        order_file,
        sample_interval_secs,
        code_heap_size,
        policy,
    }))
}
