//! Transcoder argv construction.
//!
//! The segment engine's contract with ffmpeg: argv must produce mpegts
//! segments written as `<tmp>/<n>.ts` with a playlist sink at
//! `<tmp>/index.m3u8`, numbered from the seek start, at a loglevel high
//! enough that every finished segment prints a `segment:'<path>' ... ended`
//! line on stderr.

use std::path::Path;

use vf_core::{Format, HwAccel, StreamSpec};

use crate::hwaccel::HwProfile;

/// Everything needed to build one transcoder invocation.
#[derive(Debug)]
pub struct TranscodeRequest<'a> {
    pub source: &'a Path,
    /// Adjusted spec for this variant.
    pub spec: &'a StreamSpec,
    pub format: Format,
    /// Whether re-encoding is required; `false` copies streams.
    pub transcode: bool,
    /// HLS chunk duration in seconds.
    pub chunk_duration: u32,
    /// Per-context scratch directory receiving segment files.
    pub tmp_dir: &'a Path,
    pub hw_accel: HwAccel,
}

/// Build the ffmpeg argv for `request`, seeking to chunk `start_index`.
///
/// `pipe` routes output to stdout instead of the segment sink (progressive
/// MP4).
pub fn build_args(request: &TranscodeRequest<'_>, start_index: u32, pipe: bool) -> Vec<String> {
    let hw = HwProfile::for_accel(request.hw_accel);

    // Segment-ended lines only print at debug loglevel.
    let mut args: Vec<String> = vec![
        "-loglevel".into(),
        "debug".into(),
        "-noaccurate_seek".into(),
        "-noautorotate".into(),
    ];

    if start_index > 0 {
        let mut seek = f64::from(start_index);
        if request.format == Format::Hls {
            seek *= f64::from(request.chunk_duration);
        }
        args.push("-ss".into());
        args.push(format!("{seek:.6}"));
    }

    if !hw.decoder_args.is_empty() && request.transcode {
        args.push("-hwaccel".into());
        args.extend(hw.decoder_args.iter().map(|a| a.to_string()));
    }

    args.push("-i".into());
    args.push(request.source.to_string_lossy().into_owned());
    args.extend(["-y", "-copyts", "-fflags", "+genpts"].map(String::from));

    if request.format == Format::Hls {
        args.extend(["-f", "mpegts"].map(String::from));
    }

    if !request.transcode {
        args.extend(["-c", "copy"].map(String::from));
    } else {
        args.push("-c:v".into());
        args.extend(hw.encoder_args.iter().map(|a| a.to_string()));

        if request.spec.bitrate > 0 {
            args.push("-b:v".into());
            args.push(((request.spec.bitrate as f64 * hw.encode_factor) as u64).to_string());
        }

        args.extend(["-c:a", "aac"].map(String::from));

        if request.spec.width > 0 {
            // A nonzero width implies the height was derived alongside it.
            args.extend(hw.scale_args(request.spec.width, request.spec.height));
        }
    }

    match request.format {
        Format::Mp4 => {
            args.extend(["-movflags", "frag_keyframe+empty_moov", "-f", "mp4"].map(String::from));
        }
        Format::Hls => {
            args.extend(segment_sink_args(request, start_index));
        }
        Format::Ts => {}
    }

    if pipe {
        args.push("pipe:1".into());
    }

    args
}

fn segment_sink_args(request: &TranscodeRequest<'_>, start_index: u32) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-max_delay".into(),
        "5000000".into(),
        "-avoid_negative_ts".into(),
        "disabled".into(),
        "-f".into(),
        "segment".into(),
        "-segment_format".into(),
        "mpegts".into(),
        "-segment_list".into(),
        request.tmp_dir.join("index.m3u8").to_string_lossy().into_owned(),
        "-segment_list_type".into(),
        "m3u8".into(),
        "-segment_time".into(),
        format_time(request.chunk_duration),
        "-segment_start_number".into(),
        start_index.to_string(),
        "-break_non_keyframes".into(),
        "1".into(),
        "-individual_header_trailer".into(),
        "0".into(),
        "-write_header_trailer".into(),
        "0".into(),
        request.tmp_dir.join("%d.ts").to_string_lossy().into_owned(),
    ];

    if request.transcode {
        args.push("-force_key_frames".into());
        args.push("expr:gte(t,n_forced*3)".into());
    }

    args
}

/// Format whole seconds as `HH:MM:SS.000`.
fn format_time(seconds: u32) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    format!("{h:02}:{m:02}:{s:02}.000")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request<'a>(
        source: &'a Path,
        spec: &'a StreamSpec,
        tmp: &'a Path,
        format: Format,
        transcode: bool,
    ) -> TranscodeRequest<'a> {
        TranscodeRequest {
            source,
            spec,
            format,
            transcode,
            chunk_duration: 6,
            tmp_dir: tmp,
            hw_accel: HwAccel::None,
        }
    }

    fn contains_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn hls_copy_argv() {
        let source = PathBuf::from("/media/movie.mkv");
        let tmp = PathBuf::from("/tmp/vodforge/ctx");
        let spec = StreamSpec::origin();
        let args = build_args(&request(&source, &spec, &tmp, Format::Hls, false), 0, false);

        assert!(contains_pair(&args, "-loglevel", "debug"));
        assert!(!args.contains(&"-ss".to_string()));
        assert!(contains_pair(&args, "-c", "copy"));
        assert!(contains_pair(&args, "-f", "segment"));
        assert!(contains_pair(&args, "-segment_time", "00:00:06.000"));
        assert!(contains_pair(&args, "-segment_start_number", "0"));
        assert!(contains_pair(&args, "-break_non_keyframes", "1"));
        assert!(contains_pair(&args, "-individual_header_trailer", "0"));
        assert!(contains_pair(&args, "-write_header_trailer", "0"));
        assert_eq!(args.last().unwrap(), "/tmp/vodforge/ctx/%d.ts");
        assert!(args.iter().any(|a| a == "/tmp/vodforge/ctx/index.m3u8"));
        // Copy mode never forces keyframes.
        assert!(!args.iter().any(|a| a == "-force_key_frames"));
    }

    #[test]
    fn hls_seek_multiplies_chunk_duration() {
        let source = PathBuf::from("/media/movie.mkv");
        let tmp = PathBuf::from("/tmp/ctx");
        let spec = StreamSpec::origin();
        let args = build_args(&request(&source, &spec, &tmp, Format::Hls, false), 7, false);

        assert!(contains_pair(&args, "-ss", "42.000000"));
        assert!(contains_pair(&args, "-segment_start_number", "7"));
    }

    #[test]
    fn transcode_argv_scales_and_sets_bitrate() {
        let source = PathBuf::from("/media/movie.mkv");
        let tmp = PathBuf::from("/tmp/ctx");
        let spec = StreamSpec {
            width: 1280,
            height: 720,
            bitrate: 2_000_000,
            ..StreamSpec::origin()
        };
        let args = build_args(&request(&source, &spec, &tmp, Format::Hls, true), 0, false);

        assert!(contains_pair(&args, "-c:v", "libx264"));
        assert!(contains_pair(&args, "-b:v", "2000000"));
        assert!(contains_pair(&args, "-c:a", "aac"));
        assert!(args.iter().any(|a| a.contains("w=1280:h=720")));
        assert!(contains_pair(
            &args,
            "-force_key_frames",
            "expr:gte(t,n_forced*3)"
        ));
    }

    #[test]
    fn mp4_pipe_argv() {
        let source = PathBuf::from("/media/movie.mp4");
        let tmp = PathBuf::from("/tmp/ctx");
        let spec = StreamSpec::origin();
        let args = build_args(&request(&source, &spec, &tmp, Format::Mp4, false), 0, true);

        assert!(contains_pair(&args, "-movflags", "frag_keyframe+empty_moov"));
        assert!(contains_pair(&args, "-f", "mp4"));
        assert_eq!(args.last().unwrap(), "pipe:1");
        assert!(!args.iter().any(|a| a == "-segment_time"));
    }

    #[test]
    fn format_time_rendering() {
        assert_eq!(format_time(6), "00:00:06.000");
        assert_eq!(format_time(61), "00:01:01.000");
        assert_eq!(format_time(3661), "01:01:01.000");
    }
}
