//! FFprobe-based media probing.
//!
//! Runs `ffprobe -show_entries format:stream -of json` against the source
//! and distills the output into [`ProbeInfo`]. When a file carries multiple
//! video streams (some containers embed a thumbnail as a second stream) only
//! the first one counts.

use std::path::Path;

use serde::Deserialize;

use vf_core::{AudioTrack, Error, ProbeInfo, Result};

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: String,
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    bit_rate: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    has_b_frames: u32,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a media file with ffprobe.
///
/// # Errors
///
/// - [`Error::Probe`] when the source does not exist, carries no video
///   stream, or reports no duration.
/// - [`Error::Tool`] when ffprobe cannot be executed or exits non-zero.
pub async fn probe(ffprobe: &Path, source: &Path) -> Result<ProbeInfo> {
    if tokio::fs::metadata(source).await.is_err() {
        return Err(Error::Probe(format!(
            "source not readable: {}",
            source.display()
        )));
    }

    let output = tokio::process::Command::new(ffprobe)
        .args(["-v", "error", "-show_entries", "format:stream", "-of", "json"])
        .arg(source)
        .output()
        .await
        .map_err(|e| Error::tool("ffprobe", format!("failed to execute: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool(
            "ffprobe",
            format!("exited with {}: {}", output.status, stderr.trim()),
        ));
    }

    let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| Error::Probe(format!("unparseable ffprobe output: {e}")))?;

    resolve_output(parsed)
}

fn resolve_output(output: FfprobeOutput) -> Result<ProbeInfo> {
    let mut info = ProbeInfo::default();
    let mut video_count = 0u32;
    let mut audio_index = 0u32;

    for stream in &output.streams {
        match stream.codec_type.as_str() {
            "video" => {
                video_count += 1;
                if video_count > 1 {
                    continue;
                }
                info.video_codec = stream.codec_name.clone().unwrap_or_default();
                info.width = stream.width.unwrap_or(0);
                info.height = stream.height.unwrap_or(0);
                info.has_b_frames = stream.has_b_frames > 0;
                if let Some(bitrate) = parse_u64(stream.bit_rate.as_deref()) {
                    info.video_bitrate = bitrate;
                }
                info.frame_rate = stream
                    .r_frame_rate
                    .as_deref()
                    .and_then(parse_frame_rate)
                    .or_else(|| stream.avg_frame_rate.as_deref().and_then(parse_frame_rate))
                    .unwrap_or(0.0);
            }
            "audio" => {
                let codec = stream.codec_name.clone().unwrap_or_default();
                if info.audio_codec.is_empty() {
                    info.audio_codec = codec.clone();
                }
                info.audio_tracks.push(AudioTrack {
                    index: audio_index,
                    codec,
                });
                audio_index += 1;
            }
            _ => {}
        }
    }

    if video_count == 0 {
        return Err(Error::Probe("no video stream found".into()));
    }

    info.format = output.format.format_name;
    info.bitrate = parse_u64(output.format.bit_rate.as_deref()).unwrap_or_else(|| {
        tracing::warn!("ffprobe reported no parseable container bitrate");
        0
    });
    info.duration = output
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| Error::Probe("source reports no duration".into()))?;

    Ok(info)
}

fn parse_u64(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.parse().ok()).filter(|v| *v > 0)
}

/// Parse an ffprobe rational frame rate like `24000/1001`.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 || num == 0.0 {
        return None;
    }
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "bit_rate": "4800000",
                    "width": 1920,
                    "height": 1080,
                    "has_b_frames": 2,
                    "r_frame_rate": "24000/1001",
                    "avg_frame_rate": "24000/1001"
                },
                {
                    "codec_type": "audio",
                    "codec_name": "aac",
                    "r_frame_rate": "0/0",
                    "avg_frame_rate": "0/0"
                }
            ],
            "format": {
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                "duration": "120.5",
                "bit_rate": "5200000"
            }
        }"#
    }

    #[test]
    fn resolves_sample_output() {
        let parsed: FfprobeOutput = serde_json::from_str(sample_json()).unwrap();
        let info = resolve_output(parsed).unwrap();
        assert_eq!(info.video_codec, "h264");
        assert_eq!(info.audio_codec, "aac");
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert_eq!(info.duration, 120.5);
        assert_eq!(info.video_bitrate, 4_800_000);
        assert_eq!(info.bitrate, 5_200_000);
        assert!(info.has_b_frames);
        assert!((info.frame_rate - 23.976).abs() < 0.001);
        assert_eq!(info.audio_tracks.len(), 1);
    }

    #[test]
    fn first_video_stream_wins() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "r_frame_rate": "30/1"},
                {"codec_type": "video", "codec_name": "mjpeg", "width": 320, "height": 180,
                 "r_frame_rate": "90000/1"}
            ],
            "format": {"format_name": "matroska", "duration": "10.0", "bit_rate": "1000"}
        }"#;
        let parsed: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = resolve_output(parsed).unwrap();
        assert_eq!(info.video_codec, "h264");
        assert_eq!(info.width, 1920);
    }

    #[test]
    fn no_video_stream_is_probe_error() {
        let json = r#"{
            "streams": [{"codec_type": "audio", "codec_name": "mp3"}],
            "format": {"format_name": "mp3", "duration": "10.0", "bit_rate": "1000"}
        }"#;
        let parsed: FfprobeOutput = serde_json::from_str(json).unwrap();
        assert!(matches!(resolve_output(parsed), Err(Error::Probe(_))));
    }

    #[test]
    fn missing_duration_is_probe_error() {
        let json = r#"{
            "streams": [{"codec_type": "video", "codec_name": "h264", "r_frame_rate": "30/1"}],
            "format": {"format_name": "mp4"}
        }"#;
        let parsed: FfprobeOutput = serde_json::from_str(json).unwrap();
        assert!(matches!(resolve_output(parsed), Err(Error::Probe(_))));
    }

    #[test]
    fn frame_rate_fallback_to_avg() {
        let json = r#"{
            "streams": [{"codec_type": "video", "codec_name": "h264",
                         "r_frame_rate": "0/0", "avg_frame_rate": "25/1"}],
            "format": {"format_name": "mp4", "duration": "1.0"}
        }"#;
        let parsed: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = resolve_output(parsed).unwrap();
        assert_eq!(info.frame_rate, 25.0);
    }

    #[test]
    fn parse_frame_rate_rationals() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }

    #[tokio::test]
    async fn probe_missing_file_is_probe_error() {
        let err = probe(Path::new("ffprobe"), Path::new("/definitely/not/here.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Probe(_)));
    }
}
