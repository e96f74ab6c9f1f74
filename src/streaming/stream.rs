//! One stream variant bound to one source.
//!
//! A [`Stream`] pairs an adjusted spec with the probed source and, for HLS,
//! owns the segment engine. It decides whether the variant needs transcoding
//! at all, renders its media playlist, and serves chunk and progressive
//! content requests.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::ChildStdout;

use vf_av::args::{build_args, TranscodeRequest};
use vf_av::TranscoderProcess;
use vf_core::config::CodecSupport;
use vf_core::{Error, Format, HwAccel, ProbeInfo, Result, StreamSpec};
use vf_media::{SegmentPlan, VariantStream};

use super::chunk::ChunkReader;
use super::engine::{ChunkEngine, ChunkProducer, EngineConfig, EngineStatus};

/// What a progressive content request resolves to.
pub enum Content {
    /// The source file served as-is.
    File(tokio::fs::File),
    /// A live transcoder's stdout (progressive MP4).
    Pipe(ChildStdout),
}

/// One variant of one source.
pub struct Stream {
    spec: StreamSpec,
    probe: Arc<ProbeInfo>,
    format: Format,
    source: PathBuf,
    codecs: CodecSupport,
    ffmpeg: PathBuf,
    hw_accel: HwAccel,
    chunk_duration: u32,
    tmp_dir: PathBuf,
    engine: Option<ChunkEngine>,
}

impl Stream {
    /// Build one variant. HLS variants get a segment plan and an engine;
    /// other formats serve a single pipe and need neither.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spec: StreamSpec,
        probe: Arc<ProbeInfo>,
        format: Format,
        source: PathBuf,
        codecs: CodecSupport,
        ffmpeg: PathBuf,
        hw_accel: HwAccel,
        engine_config: EngineConfig,
        tmp_dir: PathBuf,
    ) -> Result<Self> {
        let chunk_duration = engine_config.chunk_duration;
        let mut stream = Self {
            spec,
            probe,
            format,
            source,
            codecs,
            ffmpeg,
            hw_accel,
            chunk_duration,
            tmp_dir,
            engine: None,
        };

        if format == Format::Hls {
            let plan = SegmentPlan::build(stream.probe.duration, chunk_duration)?;
            let producer = Arc::new(FfmpegProducer {
                ffmpeg: stream.ffmpeg.clone(),
                source: stream.source.clone(),
                spec: stream.spec.clone(),
                transcode: stream.need_transcode(),
                chunk_duration,
                tmp_dir: stream.tmp_dir.clone(),
                hw_accel: stream.hw_accel,
            });
            stream.engine = Some(ChunkEngine::new(engine_config, plan, producer)?);
        }

        Ok(stream)
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &StreamSpec {
        &self.spec
    }

    /// Whether this variant requires re-encoding rather than stream copy.
    pub fn need_transcode(&self) -> bool {
        if self.spec.force {
            return true;
        }
        if !self.codecs.supports_video(&self.probe.video_codec)
            || !self.codecs.supports_audio(&self.probe.audio_codec)
        {
            return true;
        }
        if self.spec.width > 0 && self.spec.width != self.probe.width {
            return true;
        }
        if self.spec.height > 0 && self.spec.height != self.probe.height {
            return true;
        }
        if self.spec.bitrate > 0 && self.spec.bitrate != self.probe.video_bitrate {
            return true;
        }
        self.spec.scale > 0.0
    }

    /// Variant descriptor for the master playlist.
    pub fn variant(&self) -> VariantStream {
        let (width, height) = if self.spec.width > 0 {
            (self.spec.width, self.spec.height)
        } else {
            (self.probe.width, self.probe.height)
        };
        let bandwidth = if self.spec.bitrate > 0 {
            self.spec.bitrate
        } else {
            self.probe.bitrate
        };
        VariantStream {
            name: self.spec.name.clone(),
            bandwidth,
            width,
            height,
        }
    }

    /// Render this variant's media playlist.
    pub fn media_playlist<F>(&self, segment_url: F) -> Result<String>
    where
        F: Fn(u32) -> String,
    {
        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| Error::Validation("playlists exist only for HLS streams".into()))?;
        Ok(vf_media::render_media_playlist(engine.plan(), segment_url))
    }

    /// Serve one HLS chunk.
    pub async fn chunk(&self, index: u32) -> Result<ChunkReader> {
        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| Error::Validation("chunks exist only for HLS streams".into()))?;
        engine.serve_chunk(index).await
    }

    /// Serve the whole stream as one body (MP4/TS progressive).
    ///
    /// When no transcoding is needed and the source container already matches
    /// the requested format, the original file is streamed directly.
    pub async fn content(&self) -> Result<Content> {
        match self.format {
            Format::Hls => Err(Error::Validation(
                "HLS content is served via playlists and chunks".into(),
            )),
            Format::Mp4 | Format::Ts => {
                if !self.need_transcode() && self.container_matches() {
                    let file = tokio::fs::File::open(&self.source).await?;
                    return Ok(Content::File(file));
                }
                self.piped_content().map(Content::Pipe)
            }
        }
    }

    /// ffprobe reports compound names like `mov,mp4,m4a,3gp,3g2,mj2`.
    fn container_matches(&self) -> bool {
        self.probe
            .format
            .split(',')
            .any(|name| name == self.format.as_str())
    }

    fn piped_content(&self) -> Result<ChildStdout> {
        let request = TranscodeRequest {
            source: &self.source,
            spec: &self.spec,
            format: self.format,
            transcode: self.need_transcode(),
            chunk_duration: self.chunk_duration,
            tmp_dir: &self.tmp_dir,
            hw_accel: self.hw_accel,
        };
        let args = build_args(&request, 0, true);
        tracing::debug!(ffmpeg = %self.ffmpeg.display(), ?args, "starting progressive transcode");

        let mut child = tokio::process::Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool("ffmpeg", format!("failed to spawn: {e}")))?;

        child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("transcoder stdout was not captured".into()))
    }

    pub fn engine_status(&self) -> Option<EngineStatus> {
        self.engine.as_ref().map(|e| e.status())
    }

    /// Stop the engine; segment files are destroyed here, the tmp directory
    /// itself belongs to the context.
    pub async fn close(&self) {
        if let Some(engine) = &self.engine {
            engine.close().await;
        }
    }
}

/// Production [`ChunkProducer`]: builds the segment argv for this variant
/// and spawns ffmpeg.
struct FfmpegProducer {
    ffmpeg: PathBuf,
    source: PathBuf,
    spec: StreamSpec,
    transcode: bool,
    chunk_duration: u32,
    tmp_dir: PathBuf,
    hw_accel: HwAccel,
}

impl ChunkProducer for FfmpegProducer {
    fn launch(&self, start: u32) -> Result<(TranscoderProcess, tokio::process::ChildStderr)> {
        let request = TranscodeRequest {
            source: &self.source,
            spec: &self.spec,
            format: Format::Hls,
            transcode: self.transcode,
            chunk_duration: self.chunk_duration,
            tmp_dir: &self.tmp_dir,
            hw_accel: self.hw_accel,
        };
        let args = build_args(&request, start, false);
        tracing::debug!(start, ffmpeg = %self.ffmpeg.display(), ?args, "starting segment transcode");
        TranscoderProcess::spawn(Path::new(&self.ffmpeg), &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vf_core::config::StreamingConfig;

    fn probe_1080p() -> Arc<ProbeInfo> {
        Arc::new(ProbeInfo {
            duration: 60.0,
            width: 1920,
            height: 1080,
            video_codec: "h264".into(),
            audio_codec: "aac".into(),
            format: "mov,mp4,m4a,3gp,3g2,mj2".into(),
            bitrate: 6_000_000,
            video_bitrate: 5_000_000,
            frame_rate: 24.0,
            ..ProbeInfo::default()
        })
    }

    fn codecs() -> CodecSupport {
        CodecSupport {
            video: vec!["h264".into()],
            audio: vec!["aac".into()],
        }
    }

    fn stream_with(spec: StreamSpec, probe: Arc<ProbeInfo>, format: Format) -> Stream {
        let mut streaming = StreamingConfig::default();
        streaming.chunk_duration = 6;
        streaming.min_buffer = 3;
        streaming.max_buffer = 10;
        streaming.near_window = 3;
        Stream::new(
            spec,
            probe,
            format,
            PathBuf::from("/media/movie.mp4"),
            codecs(),
            PathBuf::from("ffmpeg"),
            HwAccel::None,
            EngineConfig::from(&streaming),
            PathBuf::from("/tmp/vodforge/test"),
        )
        .unwrap()
    }

    #[test]
    fn origin_spec_with_supported_codecs_copies() {
        let stream = stream_with(StreamSpec::origin(), probe_1080p(), Format::Hls);
        assert!(!stream.need_transcode());
    }

    #[test]
    fn force_always_transcodes() {
        let stream = stream_with(StreamSpec::compatible(), probe_1080p(), Format::Hls);
        assert!(stream.need_transcode());
    }

    #[test]
    fn unsupported_video_codec_transcodes() {
        let mut probe = (*probe_1080p()).clone();
        probe.video_codec = "hevc".into();
        let stream = stream_with(StreamSpec::origin(), Arc::new(probe), Format::Hls);
        assert!(stream.need_transcode());
    }

    #[test]
    fn unsupported_audio_codec_transcodes() {
        let mut probe = (*probe_1080p()).clone();
        probe.audio_codec = "dts".into();
        let stream = stream_with(StreamSpec::origin(), Arc::new(probe), Format::Hls);
        assert!(stream.need_transcode());
    }

    #[test]
    fn differing_width_transcodes() {
        let probe = probe_1080p();
        let spec = vf_core::adjust_spec(&StreamSpec::resolution_720p(), &probe);
        let stream = stream_with(spec, probe, Format::Hls);
        assert!(stream.need_transcode());
    }

    #[test]
    fn matching_dimensions_do_not_transcode() {
        let spec = StreamSpec {
            width: 1920,
            height: 1080,
            ..StreamSpec::origin()
        };
        let stream = stream_with(spec, probe_1080p(), Format::Hls);
        assert!(!stream.need_transcode());
    }

    #[test]
    fn scale_spec_transcodes() {
        let mut spec = StreamSpec::origin();
        spec.scale = 0.5;
        let stream = stream_with(spec, probe_1080p(), Format::Hls);
        assert!(stream.need_transcode());
    }

    #[test]
    fn media_playlist_lists_all_segments() {
        let stream = stream_with(StreamSpec::origin(), probe_1080p(), Format::Hls);
        let playlist = stream
            .media_playlist(|i| format!("/video/x/Origin/{i}.ts"))
            .unwrap();
        // 60s at 6s chunks.
        assert_eq!(
            playlist.lines().filter(|l| l.starts_with("#EXTINF")).count(),
            10
        );
        assert!(playlist.contains("/video/x/Origin/9.ts"));
    }

    #[test]
    fn mp4_stream_has_no_engine() {
        let stream = stream_with(StreamSpec::origin(), probe_1080p(), Format::Mp4);
        assert!(stream.engine_status().is_none());
        assert!(stream.media_playlist(|_| String::new()).is_err());
    }

    #[test]
    fn variant_prefers_spec_dimensions() {
        let probe = probe_1080p();
        let spec = vf_core::adjust_spec(&StreamSpec::resolution_720p(), &probe);
        let stream = stream_with(spec, probe, Format::Hls);
        let variant = stream.variant();
        assert_eq!(variant.width, 1280);
        assert_eq!(variant.height, 720);
        assert!(variant.bandwidth > 0);
    }

    #[test]
    fn container_match_uses_compound_names() {
        let stream = stream_with(StreamSpec::origin(), probe_1080p(), Format::Mp4);
        assert!(stream.container_matches());

        let mut probe = (*probe_1080p()).clone();
        probe.format = "matroska,webm".into();
        let stream = stream_with(StreamSpec::origin(), Arc::new(probe), Format::Mp4);
        assert!(!stream.container_matches());
    }
}
