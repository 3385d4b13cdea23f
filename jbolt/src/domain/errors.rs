//! Structured error types for jbolt
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;

use thiserror::Error;

use super::types::{CodeSegment, MethodKey, TraceId};

/// Errors from call-graph mutation.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error(
        "non-monotonic count for re-observed {trace_id}: stored {stored}, submitted {submitted}"
    )]
    NonMonotonicCount {
        trace_id: TraceId,
        stored: u32,
        submitted: u32,
    },
}

/// Errors from reading or writing an order file. Parse errors are fatal at
/// startup in load mode.
#[derive(Error, Debug)]
pub enum OrderFileError {
    #[error("order file does not exist or cannot be accessed: {0}")]
    Missing(PathBuf),

    #[error("order line {line_no} exceeds {limit} bytes")]
    LineTooLong { line_no: usize, limit: usize },

    #[error("wrong format of order line {line_no}: {line:?}")]
    Malformed { line_no: usize, line: String },

    #[error("duplicated method: {{{0}}}")]
    DuplicateMethod(MethodKey),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Startup configuration errors. All of these are fatal: the subsystem
/// refuses to initialize rather than run half-configured.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("do not set both DumpMode and LoadMode")]
    ConflictingModes,

    #[error("OrderFile is not set but {0:?} mode requires one")]
    OrderFileRequired(&'static str),

    #[error("{0} is set without the master enable")]
    FlagRequiresEnable(&'static str),

    #[error("sample interval {0}s is above range, should be in [0, {max}]", max = i32::MAX)]
    IntervalOutOfRange(u64),

    #[error("code layout requires a top-tier JIT compiler")]
    JitTierUnavailable,

    #[error("code layout requires a segmented code cache")]
    SegmentedCacheUnavailable,

    #[error("CodeHeapSize {size} B should be {alignment} B aligned, please adjust")]
    MisalignedHeapSize { size: u64, alignment: u64 },

    #[error(
        "not enough space in non-profiled code heap to split out hot heaps: \
         {available} B <= {requested} B"
    )]
    HotHeapsDoNotFit { available: u64, requested: u64 },

    #[error("order file: {0}")]
    OrderFile(#[from] OrderFileError),

    #[error("failed to start control thread: {0}")]
    ControlThreadSpawn(std::io::Error),
}

/// Errors surfaced by the runtime host at the interop boundary.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("sampler unavailable: {0}")]
    SamplerUnavailable(String),

    #[error("compile queue closed")]
    QueueClosed,

    #[error("host error: {0}")]
    Other(String),
}

/// Recoverable per-method errors during a reorder pass. The control thread
/// logs these and moves on to the next method.
#[derive(Error, Debug)]
pub enum ReorderError {
    #[error("method has been unloaded, skip reordering for it: {0}")]
    Unloaded(MethodKey),

    #[error("recompilation task init failed because of null nmethod: {0}")]
    NoCompiledCode(MethodKey),

    #[error("compile task dropped before completion: {0}")]
    TaskDropped(MethodKey),

    #[error("compilation failed: method={method}: {reason}")]
    CompileFailed { method: MethodKey, reason: String },

    #[error("nmethod is not in heap [{expected}]: it's in [{actual}]: {method}")]
    WrongSegment {
        method: MethodKey,
        expected: CodeSegment,
        actual: CodeSegment,
    },

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Errors reported back to the operator-command dispatcher. These are
/// formatted to the command output stream, never fatal.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("It's busy now. Please try again later...")]
    Busy,

    #[error("Unable to execute because the command is only available in auto mode.")]
    NotAutoMode,

    #[error("Unable to start because it's working now. Stop it first.")]
    NotAvailable,

    #[error("Unable to {0} because it's not sampling now.")]
    NotProfiling(&'static str),

    #[error("duration is set to {0} which is above range, should be in [0, {max}]", max = i32::MAX)]
    DurationOutOfRange(u64),

    #[error("Failed: No order applied now.")]
    OrderNull,

    #[error("Failed: File open error or NULL: {0}")]
    OpenFileError(PathBuf),
}
