//! Byte-level determinism of the whole pipeline: identical sample streams
//! must produce byte-identical order files.

mod common;

use common::{sim_trace, SimRuntime};
use jbolt::domain::SymbolTable;
use jbolt::graph::{hfsort, CallGraph, HfsortPolicy};
use jbolt::order::write_order;
use jbolt::profiling::{SampleIngestor, SampledMethods};

fn order_bytes(runtime: &SimRuntime, traces: &[jbolt_common::SampledTrace]) -> Vec<u8> {
    let mut graph = CallGraph::new(4096);
    let mut sampled = SampledMethods::new();
    let mut symbols = SymbolTable::new();
    for trace in traces {
        let mut ingestor = SampleIngestor::new(&mut graph, &mut sampled, &mut symbols, runtime);
        ingestor.ingest(trace);
    }
    let order = hfsort(&graph.snapshot(), &HfsortPolicy::default());
    let mut buf = Vec::new();
    write_order(&order, &mut buf).unwrap();
    buf
}

#[test]
fn test_identical_streams_give_identical_order_files() {
    let runtime = SimRuntime::new();
    for (name, size) in [
        ("handle_request", 1800),
        ("parse_header", 420),
        ("route", 620),
        ("encode_body", 940),
        ("flush", 130),
    ] {
        runtime.add_method(name, size);
    }

    let traces = vec![
        sim_trace(&runtime, 1, 3, &["parse_header", "handle_request"]),
        sim_trace(&runtime, 2, 7, &["route", "handle_request"]),
        sim_trace(&runtime, 3, 2, &["encode_body", "route", "handle_request"]),
        sim_trace(&runtime, 1, 5, &["parse_header", "handle_request"]),
        sim_trace(&runtime, 4, 2, &["flush", "encode_body"]),
    ];

    let first = order_bytes(&runtime, &traces);
    let second = order_bytes(&runtime, &traces);
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn test_equal_heat_ties_follow_insertion_order() {
    let runtime = SimRuntime::new();
    for name in ["a", "b", "c", "d"] {
        runtime.add_method(name, 100);
    }

    // two disconnected pairs with identical heats
    let traces = vec![
        sim_trace(&runtime, 1, 5, &["a", "b"]),
        sim_trace(&runtime, 2, 5, &["c", "d"]),
    ];

    let bytes = order_bytes(&runtime, &traces);
    let text = String::from_utf8(bytes).unwrap();
    let names: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with("M "))
        .map(|l| l.split(' ').nth(3).unwrap())
        .collect();
    // first-inserted pair wins the tie
    assert_eq!(names, ["b", "a", "d", "c"]);
}
