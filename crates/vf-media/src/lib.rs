//! vf-media: pure media math and playlist text.
//!
//! Segment planning derives the chunk timeline from a probed duration;
//! playlist rendering turns a plan (or a set of variant streams) into HLS
//! M3U8 text. Both are deterministic and routing-agnostic: URL generation is
//! always delegated to the caller.

pub mod plan;
pub mod playlist;

pub use plan::{PlannedSegment, SegmentPlan};
pub use playlist::{render_master_playlist, render_media_playlist, VariantStream};
