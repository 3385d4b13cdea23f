//! Runtime host interface
//!
//! Everything the layout subsystem needs from its surroundings is behind
//! these traits: resolving sampled frames to live methods, enqueueing
//! compile tasks, walking a code-heap segment, and driving the external
//! stack sampler. The host runtime implements them against its own GC and
//! compiler broker; tests implement them against an in-process simulation.

use std::ops::Deref;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use jbolt_common::SampledFrame;

use crate::domain::{CodeSegment, CompLevel, CompileReason, HostError, MethodKey, SymbolTable};

/// What the host knows about a method's current compiled body.
#[derive(Debug, Clone, Copy)]
pub struct CompiledCodeInfo {
    /// Native-code size in bytes
    pub size: u32,
    /// Tier the body was compiled at
    pub level: CompLevel,
    /// Segment the body currently lives in
    pub segment: CodeSegment,
    /// True for on-stack-replacement compilations
    pub is_osr: bool,
}

/// A handle to a managed method.
///
/// Handles obtained from [`MethodLookup::lookup`] are weak: they do not keep
/// the method's holder alive, and `is_alive` turns false once it is
/// unloaded. [`MethodRef::promote`] upgrades to a strong handle after
/// confirming liveness; [`MethodRef::demote`] goes the other way.
pub trait MethodRef: Send + Sync {
    /// Symbolic identity; the only part that survives unloading.
    fn key(&self) -> MethodKey;

    /// Whether the method's holder is still loaded.
    fn is_alive(&self) -> bool;

    /// Upgrade to a strong handle, or `None` if the holder was unloaded.
    fn promote(&self) -> Option<StrongMethod>;

    /// Downgrade to a weak handle suitable for long-term storage.
    fn demote(&self) -> Arc<dyn MethodRef>;

    /// Current compiled body, if any.
    fn code(&self) -> Option<CompiledCodeInfo>;
}

/// A strong method handle: keeps the holder alive while held.
#[derive(Clone)]
pub struct StrongMethod(pub Arc<dyn MethodRef>);

impl Deref for StrongMethod {
    type Target = dyn MethodRef;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

/// Frame-to-method resolution, the only host service sampling needs.
pub trait MethodLookup: Send + Sync {
    /// Resolve a sampled frame to a (weak) method handle, interning the
    /// frame's symbols through the caller's table so repeated names share
    /// storage. `None` when the holder is unloaded or the frame cannot be
    /// matched to a live method.
    fn lookup(
        &self,
        frame: &SampledFrame,
        symbols: &mut SymbolTable,
    ) -> Option<Arc<dyn MethodRef>>;
}

/// A blocking recompilation request handed to the host's compile broker.
pub struct CompileRequest {
    pub method: StrongMethod,
    pub level: CompLevel,
    pub reason: CompileReason,
}

/// Completion notice for an enqueued compile task.
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    Completed,
    Failed(String),
}

/// The full host surface.
pub trait RuntimeHost: MethodLookup {
    /// Enqueue a compile task; the returned channel fires once the task
    /// completes (or fails). The broker routes the produced code through the
    /// subsystem's placement hook like any other compilation.
    fn enqueue_compile(&self, request: CompileRequest)
        -> Result<Receiver<CompileOutcome>, HostError>;

    /// Strong handles to every live compiled method currently placed in
    /// `segment`. Holders stay alive at least as long as the handles.
    fn methods_in_segment(&self, segment: CodeSegment) -> Vec<StrongMethod>;

    /// Ask the code cache to sweep reclaimable code.
    fn sweep_code_cache(&self);

    /// Start (or restart) the external stack sampler.
    fn start_sampler(&self) -> Result<(), HostError>;

    /// Stop the sampler; no traces arrive afterwards.
    fn stop_sampler(&self);

    /// Drop the sampler's dedup tables so a new window starts clean.
    fn clear_sampler(&self);

    fn capabilities(&self) -> HostCapabilities;
}

/// Static facts about the host, checked once at startup.
#[derive(Debug, Clone, Copy)]
pub struct HostCapabilities {
    /// A top-tier JIT compiler is available
    pub top_tier_jit: bool,
    /// The code cache is split into per-kind segments
    pub segmented_code_cache: bool,
    /// VM page size in bytes
    pub page_size: usize,
    /// Code-cache allocation grain in bytes
    pub code_segment_grain: u64,
    /// Bytes available in the non-profiled region (hot segments are carved
    /// from it)
    pub non_profiled_capacity: u64,
    /// Required alignment for code-heap sizes
    pub heap_alignment: u64,
}
