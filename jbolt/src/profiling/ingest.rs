//! Sample ingestion: one stack trace in, graph updates out.
//!
//! Traces arrive innermost frame first. Leading native frames are peeled
//! (the sampler often catches a thread inside a runtime stub), then each
//! remaining frame is resolved to a live compiled method from the top down.
//! The first frame that fails to resolve truncates the traversal; the
//! frames already resolved keep their nodes and edges, because partial
//! traces still say something true about the lower part of the stack.

use jbolt_common::{FrameKind, SampledFrame, SampledTrace, MIN_STACK_DEPTH};
use log::{trace, warn};

use crate::domain::{FuncId, MethodKey, SymbolTable, TraceId};
use crate::graph::CallGraph;
use crate::host::MethodLookup;
use crate::profiling::sampled::SampledMethods;

/// What happened to a submitted trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Fewer than the minimum frames (before or after peeling)
    TooShort,
    /// Nodes and edges were recorded; counts are per this trace
    Ingested { funcs: u32, calls: u32 },
}

/// Borrowing ingestor: all state is owned by the caller, which also holds
/// whatever locks protect it.
pub struct SampleIngestor<'a> {
    graph: &'a mut CallGraph,
    sampled: &'a mut SampledMethods,
    symbols: &'a mut SymbolTable,
    lookup: &'a dyn MethodLookup,
}

impl<'a> SampleIngestor<'a> {
    pub fn new(
        graph: &'a mut CallGraph,
        sampled: &'a mut SampledMethods,
        symbols: &'a mut SymbolTable,
        lookup: &'a dyn MethodLookup,
    ) -> Self {
        Self {
            graph,
            sampled,
            symbols,
            lookup,
        }
    }

    /// Ingest one trace.
    pub fn ingest(&mut self, trace: &SampledTrace) -> IngestOutcome {
        if trace.frames.len() < MIN_STACK_DEPTH {
            return IngestOutcome::TooShort;
        }

        // Native frame subsidence
        let top = trace
            .frames
            .iter()
            .position(|f| f.kind != FrameKind::Native)
            .unwrap_or(trace.frames.len());
        if trace.frames.len() - top < MIN_STACK_DEPTH {
            return IngestOutcome::TooShort;
        }

        let mut funcs = 0u32;
        let mut calls = 0u32;
        // The previously resolved frame, i.e. the callee of the current one
        let mut inner: Option<FuncId> = None;

        for frame in &trace.frames[top..] {
            let Some((key, size)) = self.resolve(frame) else {
                break;
            };

            let id = self.graph.find_or_add_func(key, size);
            funcs += 1;

            if let Some(callee) = inner {
                match self
                    .graph
                    .add_call(id, callee, trace.hot_count, TraceId(trace.trace_id))
                {
                    Ok(()) => calls += 1,
                    Err(e) => warn!("call edge dropped: {e}"),
                }
            }
            inner = Some(id);
        }

        trace!(
            "trace ingested: hash={:#x} hotcount={} funcs={funcs} calls={calls}",
            trace.hash,
            trace.hot_count
        );
        IngestOutcome::Ingested { funcs, calls }
    }

    /// Resolve a frame to (key, compiled size), caching the weak method
    /// handle on first sight. `None` ends the traversal: lookup miss,
    /// unloaded holder, or no compiled body.
    fn resolve(&mut self, frame: &SampledFrame) -> Option<(MethodKey, u32)> {
        let key = MethodKey::intern(self.symbols, &frame.class, &frame.name, &frame.signature);

        let handle = match self.sampled.get(&key) {
            Some(handle) => handle.clone(),
            None => {
                let handle = self.lookup.lookup(frame, self.symbols)?;
                self.sampled.insert_if_absent(key.clone(), handle.clone());
                handle
            }
        };

        if !handle.is_alive() {
            trace!("method holder unloaded, trace truncated: {key}");
            return None;
        }
        let code = handle.code()?;
        trace!(
            "frame resolved: {key} type={} size={}B",
            frame.kind.as_str(),
            code.size
        );
        Some((key, code.size))
    }
}
