//! Media-domain types: output formats, stream specs, and probe results.
//!
//! A [`StreamSpec`] is a declarative target profile (resolution, bitrate,
//! scale). Multiple specs per source yield a master playlist with variant
//! streams. [`adjust_spec`] resolves a spec against the probed source,
//! preserving aspect ratio and rescaling bitrate by pixel count.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported output container formats at the gateway boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// HTTP Live Streaming with MPEG-TS segments.
    #[default]
    Hls,
    /// Progressive fragmented MP4 over a single pipe.
    Mp4,
    /// Raw MPEG-TS.
    Ts,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Hls => "hls",
            Format::Mp4 => "mp4",
            Format::Ts => "ts",
        }
    }

    /// MIME type served for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Hls => "application/x-mpegURL",
            Format::Mp4 => "video/mp4",
            Format::Ts => "video/MP2T",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hls" => Ok(Format::Hls),
            "mp4" => Ok(Format::Mp4),
            "ts" => Ok(Format::Ts),
            other => Err(crate::Error::Validation(format!(
                "unsupported format: {other}"
            ))),
        }
    }
}

/// Hardware acceleration selection.
///
/// `Auto` probes the platform at service startup; everything else requires an
/// ffmpeg built with the matching codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HwAccel {
    None,
    #[default]
    Auto,
    Nvenc,
    Qsv,
    Vaapi,
    /// VAAPI in low-power mode (Intel only).
    VaapiLp,
    /// VideoToolbox (macOS only).
    Vtb,
    Amf,
}

impl fmt::Display for HwAccel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HwAccel::None => "none",
            HwAccel::Auto => "auto",
            HwAccel::Nvenc => "nvenc",
            HwAccel::Qsv => "qsv",
            HwAccel::Vaapi => "vaapi",
            HwAccel::VaapiLp => "vaapi-lp",
            HwAccel::Vtb => "videotoolbox",
            HwAccel::Amf => "amf",
        };
        f.write_str(name)
    }
}

/// A declarative target profile for one output variant.
///
/// Width and height are the target resolution; both zero means keep the
/// original. `force` transcodes even when the source is already smaller than
/// the target. When `scale` is set, width and height are derived from it.
/// Aspect ratio is always preserved; if the requested dimensions do not fit
/// it, the height is adjusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSpec {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub force: bool,
    /// Target video bitrate in bits per second; 0 derives it from the source.
    pub bitrate: u64,
    /// Uniform scale factor; takes precedence over width/height when set.
    pub scale: f64,
}

impl Default for StreamSpec {
    fn default() -> Self {
        StreamSpec::origin()
    }
}

impl StreamSpec {
    fn named(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            force: false,
            bitrate: 0,
            scale: 0.0,
        }
    }

    /// Original resolution, codec conversion only when required.
    pub fn origin() -> Self {
        Self::named("Origin", 0, 0)
    }

    /// Original resolution, always transcoded to the supported codecs.
    pub fn compatible() -> Self {
        Self {
            force: true,
            ..Self::named("Compatible", 0, 0)
        }
    }

    pub fn resolution_2160p() -> Self {
        Self::named("2160P", 3840, 2160)
    }

    pub fn resolution_1080p() -> Self {
        Self::named("1080P", 1920, 1080)
    }

    pub fn resolution_1080p_10m() -> Self {
        Self {
            bitrate: 10_000_000,
            ..Self::named("1080P10M", 1920, 1080)
        }
    }

    pub fn resolution_1080p_5m() -> Self {
        Self {
            bitrate: 5_000_000,
            ..Self::named("1080P5M", 1920, 1080)
        }
    }

    pub fn resolution_720p() -> Self {
        Self::named("720P", 1280, 720)
    }

    pub fn resolution_480p() -> Self {
        Self::named("480P", 854, 480)
    }

    pub fn scale_75() -> Self {
        Self {
            scale: 0.75,
            ..Self::named("Scale75", 0, 0)
        }
    }

    pub fn scale_50() -> Self {
        Self {
            scale: 0.5,
            ..Self::named("Scale50", 0, 0)
        }
    }

    pub fn scale_25() -> Self {
        Self {
            scale: 0.25,
            ..Self::named("Scale25", 0, 0)
        }
    }
}

/// An audio track discovered by probing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub index: u32,
    pub codec: String,
}

/// Probed source media information, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProbeInfo {
    /// Total duration in seconds.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub video_codec: String,
    pub audio_codec: String,
    /// Container format name as reported by the probe.
    pub format: String,
    /// Overall bitrate in bits per second.
    pub bitrate: u64,
    /// Video stream bitrate in bits per second; 0 when not reported.
    pub video_bitrate: u64,
    pub frame_rate: f64,
    pub has_b_frames: bool,
    pub audio_tracks: Vec<AudioTrack>,
}

/// Whether a spec is applicable to a probed source.
///
/// A spec applies iff it is forced, keeps the original resolution, or
/// actually downscales the source.
pub fn spec_applies(spec: &StreamSpec, info: &ProbeInfo) -> bool {
    if spec.force {
        return true;
    }
    if spec.width == 0 && spec.height == 0 {
        return true;
    }
    spec.width < info.width
}

/// Resolve a spec against the probed source.
///
/// Aspect ratio is always preserved: a set `scale` wins, then `width`, then
/// `height`; the other dimension is derived. Odd dimensions are rounded up to
/// the next even integer (encoders reject odd sizes). The bitrate is rescaled
/// by the pixel-count ratio, doubled first when the source is not H.264 to
/// absorb the reconversion overhead.
///
/// Idempotent for equal `ProbeInfo`.
pub fn adjust_spec(spec: &StreamSpec, info: &ProbeInfo) -> StreamSpec {
    let mut spec = spec.clone();

    if spec.force && spec.bitrate > 0 {
        // Explicit forced bitrate: the caller knows what they are doing.
        return spec;
    }

    let mut base_bitrate = info.video_bitrate;
    if info.video_codec != "h264" {
        base_bitrate *= 2;
    }

    // Keep the original resolution.
    if spec.width == 0 && spec.height == 0 && spec.scale == 0.0 {
        return spec;
    }

    if spec.scale != 0.0 {
        spec.width = (f64::from(info.width) * spec.scale) as u32;
        spec.height = (f64::from(info.height) * spec.scale) as u32;
    } else if spec.width != 0 {
        spec.scale = f64::from(spec.width) / f64::from(info.width);
        spec.height = (f64::from(info.height) * spec.scale) as u32;
    } else if spec.height != 0 {
        spec.scale = f64::from(spec.height) / f64::from(info.height);
        spec.width = (f64::from(info.width) * spec.scale) as u32;
    }

    if spec.height % 2 != 0 {
        spec.height += 1;
    }
    if spec.width % 2 != 0 {
        spec.width += 1;
    }

    let pixel_ratio = f64::from(spec.width * spec.height) / f64::from(info.width * info.height);
    spec.bitrate = (pixel_ratio * base_bitrate as f64) as u64;

    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_1080p() -> ProbeInfo {
        ProbeInfo {
            duration: 600.0,
            width: 1920,
            height: 1080,
            video_codec: "h264".into(),
            audio_codec: "aac".into(),
            format: "mp4".into(),
            bitrate: 6_000_000,
            video_bitrate: 5_000_000,
            frame_rate: 24.0,
            ..ProbeInfo::default()
        }
    }

    #[test]
    fn format_mime_types() {
        assert_eq!(Format::Hls.mime_type(), "application/x-mpegURL");
        assert_eq!(Format::Mp4.mime_type(), "video/mp4");
        assert_eq!(Format::Ts.mime_type(), "video/MP2T");
    }

    #[test]
    fn format_parse_round_trip() {
        for f in [Format::Hls, Format::Mp4, Format::Ts] {
            assert_eq!(f.as_str().parse::<Format>().unwrap(), f);
        }
        assert!("flv".parse::<Format>().is_err());
    }

    #[test]
    fn spec_applies_forced_and_origin() {
        let info = probe_1080p();
        assert!(spec_applies(&StreamSpec::compatible(), &info));
        assert!(spec_applies(&StreamSpec::origin(), &info));
    }

    #[test]
    fn spec_applies_only_downscale() {
        let info = probe_1080p();
        assert!(spec_applies(&StreamSpec::resolution_720p(), &info));
        assert!(!spec_applies(&StreamSpec::resolution_2160p(), &info));
        // Same width as the source is not a downscale.
        assert!(!spec_applies(&StreamSpec::resolution_1080p(), &info));
    }

    #[test]
    fn adjust_width_derives_height_and_scale() {
        let info = probe_1080p();
        let spec = StreamSpec {
            width: 960,
            ..StreamSpec::named("Half", 960, 0)
        };
        let adjusted = adjust_spec(&spec, &info);
        assert_eq!(adjusted.width, 960);
        assert_eq!(adjusted.height, 540);
        assert!((adjusted.scale - 0.5).abs() < 1e-9);
    }

    #[test]
    fn adjust_rounds_odd_dimensions_up() {
        let info = probe_1080p();
        let spec = StreamSpec::named("Odd", 961, 541);
        let adjusted = adjust_spec(&spec, &info);
        assert_eq!(adjusted.width, 962);
        assert_eq!(adjusted.height, 540);
    }

    #[test]
    fn adjust_keeps_origin_untouched() {
        let info = probe_1080p();
        let adjusted = adjust_spec(&StreamSpec::origin(), &info);
        assert_eq!(adjusted, StreamSpec::origin());
    }

    #[test]
    fn adjust_scales_bitrate_by_pixel_ratio() {
        let info = probe_1080p();
        let adjusted = adjust_spec(&StreamSpec::scale_50(), &info);
        assert_eq!(adjusted.width, 960);
        assert_eq!(adjusted.height, 540);
        // Quarter of the pixels, quarter of the bitrate.
        assert_eq!(adjusted.bitrate, 1_250_000);
    }

    #[test]
    fn adjust_doubles_base_bitrate_for_non_h264() {
        let mut info = probe_1080p();
        info.video_codec = "hevc".into();
        let adjusted = adjust_spec(&StreamSpec::scale_50(), &info);
        assert_eq!(adjusted.bitrate, 2_500_000);
    }

    #[test]
    fn adjust_respects_forced_explicit_bitrate() {
        let info = probe_1080p();
        let spec = StreamSpec {
            force: true,
            bitrate: 123,
            ..StreamSpec::resolution_720p()
        };
        let adjusted = adjust_spec(&spec, &info);
        assert_eq!(adjusted.bitrate, 123);
        assert_eq!(adjusted.height, 720);
    }

    #[test]
    fn adjust_is_idempotent() {
        let info = probe_1080p();
        let once = adjust_spec(&StreamSpec::scale_50(), &info);
        let twice = adjust_spec(&once, &info);
        assert_eq!(once, twice);
    }
}
