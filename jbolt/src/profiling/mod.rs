//! Sampling-side modules
//!
//! - [`ingest`] - turns sampled stack traces into call-graph updates
//! - [`sampled`] - weak-handle cache for every method seen in a sample

pub mod ingest;
pub mod sampled;

pub use ingest::{IngestOutcome, SampleIngestor};
pub use sampled::SampledMethods;
