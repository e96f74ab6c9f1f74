//! HLS playlist rendering.
//!
//! The media playlist lists every planned segment of one variant; the master
//! playlist lists the variant streams of a multi-spec context. Segment and
//! variant URLs are produced by caller-supplied closures so the renderers
//! know nothing about routing.

use std::fmt::Write;

use crate::plan::SegmentPlan;

/// Codec string advertised for transcoded variants (H.264 baseline + AAC-LC).
const VARIANT_CODECS: &str = "avc1.42e00a,mp4a.40.2";

/// One variant stream advertised in the master playlist.
#[derive(Debug, Clone)]
pub struct VariantStream {
    /// Spec name, available to the URL template.
    pub name: String,
    /// Peak bandwidth in bits per second.
    pub bandwidth: u64,
    pub width: u32,
    pub height: u32,
}

/// Render the media playlist for one variant.
///
/// `segment_url` maps a segment index to the URL the player should fetch.
pub fn render_media_playlist<F>(plan: &SegmentPlan, segment_url: F) -> String
where
    F: Fn(u32) -> String,
{
    let mut out = String::new();

    writeln!(out, "#EXTM3U").unwrap();
    writeln!(out, "#EXT-X-VERSION:4").unwrap();
    writeln!(out, "#EXT-X-MEDIA-SEQUENCE:0").unwrap();
    writeln!(out, "#EXT-X-PLAYLIST-TYPE:VOD").unwrap();
    writeln!(out, "#EXT-X-TARGETDURATION:{}", plan.chunk_duration()).unwrap();

    for segment in plan.segments() {
        writeln!(out, "#EXTINF:{:.3},", segment.duration).unwrap();
        writeln!(out, "{}", segment_url(segment.index)).unwrap();
    }

    writeln!(out, "#EXT-X-ENDLIST").unwrap();

    out
}

/// Render the master playlist for a multi-spec context.
///
/// `variant_url` maps a variant to its media playlist URL.
pub fn render_master_playlist<F>(variants: &[VariantStream], variant_url: F) -> String
where
    F: Fn(&VariantStream) -> String,
{
    let mut out = String::new();

    writeln!(out, "#EXTM3U").unwrap();

    for variant in variants {
        writeln!(
            out,
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{},CODECS=\"{}\"",
            variant.bandwidth, variant.width, variant.height, VARIANT_CODECS
        )
        .unwrap();
        writeln!(out, "{}", variant_url(variant)).unwrap();
    }

    writeln!(out, "#EXT-X-ENDLIST").unwrap();

    out
}
