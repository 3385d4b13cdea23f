//! Call-graph accumulation and clustering
//!
//! This module contains the pure data side of the layout pipeline, separated
//! from sampling and recompilation:
//!
//! - [`callgraph`] - arena-backed store of funcs, call edges and clusters
//! - [`hfsort`] - density-driven bottom-up cluster merging over a snapshot

pub mod callgraph;
pub mod hfsort;

pub use callgraph::{Call, CallGraph, Cluster, Func};
pub use hfsort::{hfsort, ClusterSort, HfsortPolicy};
