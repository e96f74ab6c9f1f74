//! vf-av: everything that touches the external ffmpeg/ffprobe pair.
//!
//! Tool discovery and verification, media probing, hardware-acceleration
//! detection, transcoder argv construction, long-lived transcoder process
//! control (including cooperative suspend/resume), and the stderr contract
//! that reports finished segments.

pub mod args;
pub mod hwaccel;
pub mod probe;
pub mod segment_log;
pub mod tools;
pub mod transcoder;

pub use args::{build_args, TranscodeRequest};
pub use hwaccel::HwProfile;
pub use segment_log::{parse_line, LineEvent, SegmentEvent};
pub use tools::{ToolInfo, ToolRegistry};
pub use transcoder::TranscoderProcess;
