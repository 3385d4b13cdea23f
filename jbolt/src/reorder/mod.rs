//! Reordering machinery
//!
//! - [`segments`] - the double-buffered hot-segment selectors and sizing
//! - [`recompile`] - compile-task bookkeeping for the recompile driver

pub mod recompile;
pub mod segments;

pub use recompile::{CompileTaskInfo, HotMethods};
pub use segments::{plan_hot_segments, segment_size_with_padding, SegmentPlan, SegmentSelectors};
