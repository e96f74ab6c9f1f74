//! Parsing the transcoder's segment-completion stderr contract.
//!
//! At debug loglevel the segment muxer prints one line per finished segment:
//!
//! ```text
//! [segment @ 0x15b004080] segment:'0.ts' count:0 ended
//! [segment @ 0x146e05e50] segment:'/tmp/ctx/12.ts' count:12 ended
//! ```
//!
//! The segment id is the file stem; the path may be relative or absolute.

use std::path::PathBuf;

/// A finished segment reported on stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentEvent {
    pub id: u32,
    pub path: PathBuf,
}

/// Classification of one stderr line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Not a segment-completion line; the transcoder logs plenty else.
    Ignored,
    /// A segment finished.
    Segment(SegmentEvent),
    /// The line carried the completion markers but no parseable segment id.
    /// Non-fatal: log and skip.
    Malformed,
}

/// Classify one stderr line.
pub fn parse_line(line: &str) -> LineEvent {
    if !line.contains(".ts") || !line.contains("ended") {
        return LineEvent::Ignored;
    }

    let Some(start) = line.find("segment:'") else {
        return LineEvent::Malformed;
    };
    let rest = &line[start + "segment:'".len()..];
    let Some(end) = rest.find('\'') else {
        return LineEvent::Malformed;
    };

    let path = PathBuf::from(&rest[..end]);
    let id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.parse::<u32>().ok());

    match id {
        Some(id) => LineEvent::Segment(SegmentEvent { id, path }),
        None => LineEvent::Malformed,
    }
}
