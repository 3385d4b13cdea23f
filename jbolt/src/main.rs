//! Offline order generator.
//!
//! Replays a recorded sample stream (one JSON trace per line, as produced by
//! the sampler's export) through ingestion and the sorter, then writes the
//! order file a later load-mode run will consume. No live runtime is
//! involved: frames resolve to stand-in methods built from the recorded
//! identity and code size.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jbolt_common::{SampledFrame, SampledTrace};
use log::info;

use jbolt::cli::Args;
use jbolt::config;
use jbolt::domain::{CodeSegment, CompLevel, MethodKey, OrderEntry, SymbolTable};
use jbolt::graph::{hfsort, CallGraph, ClusterSort, HfsortPolicy};
use jbolt::host::{CompiledCodeInfo, MethodLookup, MethodRef, StrongMethod};
use jbolt::order::write_order_file;
use jbolt::profiling::{SampleIngestor, SampledMethods};

/// Stand-in for a live method during replay: always loaded, always compiled
/// at the recorded size.
struct ReplayMethodState {
    key: MethodKey,
    size: u32,
}

#[derive(Clone)]
struct ReplayMethod {
    state: Arc<ReplayMethodState>,
}

impl MethodRef for ReplayMethod {
    fn key(&self) -> MethodKey {
        self.state.key.clone()
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn promote(&self) -> Option<StrongMethod> {
        Some(StrongMethod(Arc::new(self.clone())))
    }

    fn demote(&self) -> Arc<dyn MethodRef> {
        Arc::new(self.clone())
    }

    fn code(&self) -> Option<CompiledCodeInfo> {
        Some(CompiledCodeInfo {
            size: self.state.size,
            level: CompLevel::FullOptimization,
            segment: CodeSegment::NonProfiled,
            is_osr: false,
        })
    }
}

struct ReplayLookup;

impl MethodLookup for ReplayLookup {
    fn lookup(
        &self,
        frame: &SampledFrame,
        symbols: &mut SymbolTable,
    ) -> Option<Arc<dyn MethodRef>> {
        Some(Arc::new(ReplayMethod {
            state: Arc::new(ReplayMethodState {
                key: MethodKey::intern(symbols, &frame.class, &frame.name, &frame.signature),
                size: frame.code_size,
            }),
        }))
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let page_size = args.page_size.unwrap_or_else(config::default_page_size);

    let file = File::open(&args.input)
        .with_context(|| format!("failed to open input: {}", args.input.display()))?;

    let mut graph = CallGraph::new(page_size);
    let mut sampled = SampledMethods::new();
    let mut symbols = SymbolTable::new();
    let lookup = ReplayLookup;

    let mut trace_count = 0usize;
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let trace: SampledTrace = serde_json::from_str(&line)
            .with_context(|| format!("malformed trace on line {}", i + 1))?;
        let mut ingestor = SampleIngestor::new(&mut graph, &mut sampled, &mut symbols, &lookup);
        ingestor.ingest(&trace);
        trace_count += 1;
    }
    info!(
        "ingested {trace_count} traces: funcs={}, calls={}",
        graph.funcs().len(),
        graph.calls().len()
    );

    let policy = HfsortPolicy {
        sort_by: if args.density_sort {
            ClusterSort::Density
        } else {
            ClusterSort::Heat
        },
        respect_freeze: args.merge_frozen,
        page_size,
    };
    let order = hfsort(&graph, &policy);

    write_order_file(&args.order_file, &order)
        .with_context(|| format!("failed to write order file: {}", args.order_file.display()))?;

    if !args.quiet {
        let methods = order
            .iter()
            .filter(|e| matches!(e, OrderEntry::Method(_)))
            .count();
        let clusters = order.len() - methods - 1;
        println!(
            "✓ Order written to {}: {methods} methods in {clusters} clusters ({trace_count} traces)",
            args.order_file.display()
        );
    }

    Ok(())
}
