//! Hot-segment selection and sizing.
//!
//! Two equally sized segments are carved out of the non-profiled code-heap
//! region. At any moment one is primary (the target of the current reorder)
//! and one is secondary (the previous target, being evacuated). The pair is
//! swapped between cycles, never resized.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::domain::{CodeSegment, ConfigError};
use crate::host::HostCapabilities;

/// The primary/secondary selectors. Stored as atomics because the
/// compiler's placement hook reads them from compiler threads while the
/// control thread swaps them.
#[derive(Debug)]
pub struct SegmentSelectors {
    primary: AtomicU8,
    secondary: AtomicU8,
}

impl Default for SegmentSelectors {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentSelectors {
    #[must_use]
    pub fn new() -> Self {
        Self {
            primary: AtomicU8::new(CodeSegment::HotA as u8),
            secondary: AtomicU8::new(CodeSegment::HotB as u8),
        }
    }

    #[must_use]
    pub fn primary(&self) -> CodeSegment {
        CodeSegment::from_u8(self.primary.load(Ordering::Acquire))
            .expect("selector holds a valid segment")
    }

    #[must_use]
    pub fn secondary(&self) -> CodeSegment {
        CodeSegment::from_u8(self.secondary.load(Ordering::Acquire))
            .expect("selector holds a valid segment")
    }

    /// Swap primary and secondary as a pair.
    ///
    /// Done only by the control thread while the phase is Waiting, so no
    /// placement decision can observe a half-swapped pair.
    pub fn swap(&self) {
        let tmp = self
            .secondary
            .swap(self.primary.load(Ordering::Acquire), Ordering::AcqRel);
        self.primary.swap(tmp, Ordering::AcqRel);
    }
}

/// Sizing result for the two hot segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    pub hot_size: u64,
    pub tmp_size: u64,
    /// What is left of the non-profiled region after the carve-out
    pub non_profiled_remaining: u64,
}

fn align_down(v: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return v;
    }
    v - (v % alignment)
}

/// Check alignment and fit, and compute the carve-out.
///
/// `code_heap_size` is the size of EACH hot segment.
pub fn plan_hot_segments(
    code_heap_size: u64,
    caps: &HostCapabilities,
) -> Result<SegmentPlan, ConfigError> {
    if caps.heap_alignment != 0 && code_heap_size % caps.heap_alignment != 0 {
        return Err(ConfigError::MisalignedHeapSize {
            size: code_heap_size,
            alignment: caps.heap_alignment,
        });
    }

    let total = code_heap_size * 2;
    if caps.non_profiled_capacity <= total {
        return Err(ConfigError::HotHeapsDoNotFit {
            available: caps.non_profiled_capacity,
            requested: total,
        });
    }

    Ok(SegmentPlan {
        hot_size: code_heap_size,
        tmp_size: code_heap_size,
        non_profiled_remaining: align_down(caps.non_profiled_capacity - total, caps.heap_alignment),
    })
}

/// Round a requested segment size to whole pages, with a one-page floor.
#[must_use]
pub fn segment_size_with_padding(size: u64, page_size: u64) -> u64 {
    if size < page_size {
        return page_size;
    }
    align_down(size, page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> HostCapabilities {
        HostCapabilities {
            top_tier_jit: true,
            segmented_code_cache: true,
            page_size: 4096,
            code_segment_grain: 128,
            non_profiled_capacity: 64 * 1024 * 1024,
            heap_alignment: 4096,
        }
    }

    #[test]
    fn test_selectors_start_with_hot_a_primary() {
        let selectors = SegmentSelectors::new();
        assert_eq!(selectors.primary(), CodeSegment::HotA);
        assert_eq!(selectors.secondary(), CodeSegment::HotB);
    }

    #[test]
    fn test_swap_exchanges_the_pair() {
        let selectors = SegmentSelectors::new();
        selectors.swap();
        assert_eq!(selectors.primary(), CodeSegment::HotB);
        assert_eq!(selectors.secondary(), CodeSegment::HotA);
        selectors.swap();
        assert_eq!(selectors.primary(), CodeSegment::HotA);
        assert_eq!(selectors.secondary(), CodeSegment::HotB);
    }

    #[test]
    fn test_plan_rejects_misaligned_size() {
        let err = plan_hot_segments(4096 + 17, &caps()).unwrap_err();
        assert!(matches!(err, ConfigError::MisalignedHeapSize { .. }));
    }

    #[test]
    fn test_plan_rejects_oversized_carveout() {
        let err = plan_hot_segments(32 * 1024 * 1024, &caps()).unwrap_err();
        assert!(matches!(err, ConfigError::HotHeapsDoNotFit { .. }));
    }

    #[test]
    fn test_plan_computes_remaining_capacity() {
        let plan = plan_hot_segments(8 * 1024 * 1024, &caps()).unwrap();
        assert_eq!(plan.hot_size, 8 * 1024 * 1024);
        assert_eq!(plan.tmp_size, 8 * 1024 * 1024);
        assert_eq!(plan.non_profiled_remaining, 48 * 1024 * 1024);
    }

    #[test]
    fn test_segment_padding_has_page_floor() {
        assert_eq!(segment_size_with_padding(100, 4096), 4096);
        assert_eq!(segment_size_with_padding(10000, 4096), 8192);
        assert_eq!(segment_size_with_padding(8192, 4096), 8192);
    }
}
