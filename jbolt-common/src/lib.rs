// Shared data structures between the stack sampler and the jbolt core.
//
// The sampler runs inside the host runtime and has no business depending on
// the clustering machinery, so the trace types it produces live here.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Minimum number of frames a trace must keep (after peeling leading native
/// frames) to be worth ingesting.
pub const MIN_STACK_DEPTH: usize = 2;

/// Maximum number of frames the sampler captures per trace.
pub const MAX_STACK_DEPTH: usize = 127;

/// How a sampled frame was executing when it was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrameKind {
    /// Bytecode running in the interpreter
    Interpreter,
    /// A JIT-compiled frame
    Jit,
    /// A frame inlined into its JIT-compiled caller
    Inline,
    /// A native (non-managed) frame
    Native,
}

impl FrameKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Interpreter => "Interpreted",
            FrameKind::Jit => "JIT compiled",
            FrameKind::Inline => "Inlined",
            FrameKind::Native => "Native",
        }
    }
}

/// One frame of a sampled stack trace.
///
/// Method identity is symbolic (class in slash form, name, signature) because
/// the sampler resolves it at capture time; live-method lookup happens later
/// through the runtime host.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampledFrame {
    /// Holder class in internal slash form, e.g. `java/lang/String`
    pub class: String,
    /// Method name
    pub name: String,
    /// Method signature, e.g. `(Ljava/lang/Object;)Z`
    pub signature: String,
    /// Execution kind of this frame
    pub kind: FrameKind,
    /// Size of the compiled body at capture time, in bytes.
    ///
    /// Live consumers re-resolve the method and use the current size; the
    /// recorded value is for offline replay, where no runtime is around to
    /// ask.
    pub code_size: u32,
}

/// A sampled stack trace, top (innermost) frame first.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampledTrace {
    /// Unique id the sampler assigned to this trace.
    ///
    /// The same logical trace may be re-submitted with a grown `hot_count`;
    /// consumers use the id to tell re-observation apart from a fresh trace
    /// that happens to share frames.
    pub trace_id: u64,
    /// Frame-content hash, as computed by the sampler's dedup table
    pub hash: u64,
    /// Cumulative number of times the sampler has seen this exact trace
    pub hot_count: u32,
    /// Frames, innermost first
    pub frames: Vec<SampledFrame>,
}

impl SampledTrace {
    /// Number of captured frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
