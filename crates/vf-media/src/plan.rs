//! Segment plan derivation.

use vf_core::{Error, Result};

/// One planned segment: its index in the timeline and its duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedSegment {
    pub index: u32,
    pub duration: f64,
}

/// The ordered list of segments covering a source timeline.
///
/// Every segment has the configured chunk duration except the last, which
/// covers whatever remainder is left.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPlan {
    chunk_duration: u32,
    segments: Vec<PlannedSegment>,
}

// Remainders below this are float noise, not a real trailing segment.
const MIN_TAIL: f64 = 1e-9;

impl SegmentPlan {
    /// Derive the plan for a source of `duration` seconds sliced into chunks
    /// of `chunk_duration` seconds.
    pub fn build(duration: f64, chunk_duration: u32) -> Result<Self> {
        if !(duration > 0.0) {
            return Err(Error::Validation(format!(
                "source duration must be positive, got {duration}"
            )));
        }
        if chunk_duration == 0 {
            return Err(Error::Validation("chunk duration is 0".into()));
        }

        let chunk = f64::from(chunk_duration);
        let mut segments = Vec::new();
        let mut remaining = duration;
        let mut index = 0u32;

        while remaining > MIN_TAIL {
            let size = remaining.min(chunk);
            segments.push(PlannedSegment {
                index,
                duration: size,
            });
            index += 1;
            remaining -= size;
        }

        Ok(Self {
            chunk_duration,
            segments,
        })
    }

    /// Target chunk duration in seconds.
    pub fn chunk_duration(&self) -> u32 {
        self.chunk_duration
    }

    /// Number of segments in the plan.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Highest valid segment index.
    pub fn last_index(&self) -> u32 {
        (self.segments.len() as u32).saturating_sub(1)
    }

    /// Whether `index` names a segment inside the plan.
    pub fn contains(&self, index: u32) -> bool {
        (index as usize) < self.segments.len()
    }

    /// Duration of the segment at `index`, if it exists.
    pub fn duration_of(&self, index: u32) -> Option<f64> {
        self.segments.get(index as usize).map(|s| s.duration)
    }

    pub fn segments(&self) -> &[PlannedSegment] {
        &self.segments
    }
}
