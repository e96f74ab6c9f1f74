//! Gateway configuration types.
//!
//! The top-level [`GatewayConfig`] is deserialized from JSON and carries all
//! sub-configs for the HTTP server, streaming engine, codec support, and
//! external tools. Every section defaults sensibly so an empty `{}` file is
//! valid. Per-context [`ContextOptions`] are merged over the service
//! defaults when a context is created.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::media::{Format, HwAccel, StreamSpec};
use crate::Error;

/// Default HLS chunk duration in seconds.
pub const DEFAULT_CHUNK_DURATION: u32 = 6;
/// Default sliding-window width in chunks.
pub const DEFAULT_MAX_BUFFER: u32 = 10;
/// Default low-watermark trigger in chunks.
pub const DEFAULT_MIN_BUFFER: u32 = 3;
/// Default near-miss window in chunks.
pub const DEFAULT_NEAR_WINDOW: u32 = 3;

/// Root gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub streaming: StreamingConfig,
    /// Variant profiles offered per source; empty means `Origin` only.
    pub specs: Vec<StreamSpec>,
    pub codecs: CodecSupport,
    pub tools: ToolsConfig,
}

impl GatewayConfig {
    /// Deserialize a config from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Fill unset fields with their defaults. Called once at service startup.
    pub fn apply_defaults(&mut self) {
        self.streaming.apply_defaults();
        if self.specs.is_empty() {
            self.specs.push(StreamSpec::origin());
        }
        if self.codecs.video.is_empty() {
            self.codecs.video.push("h264".to_string());
        }
        if self.codecs.audio.is_empty() {
            self.codecs.audio.push("aac".to_string());
        }
        if self.streaming.tmp_path.as_os_str().is_empty() {
            self.streaming.tmp_path = std::env::temp_dir().join("vodforge");
        }
    }

    /// Validate the configuration after defaults were applied.
    pub fn validate(&self) -> Result<()> {
        self.streaming.validate()?;
        if self.specs.is_empty() {
            return Err(Error::Validation("stream spec list is empty".into()));
        }
        Ok(())
    }
}

/// HTTP server binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 18081,
        }
    }
}

/// Streaming engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StreamingConfig {
    pub format: Format,
    /// Target duration of one HLS chunk in seconds.
    pub chunk_duration: u32,
    /// Sliding-window width: how many chunks past the requested index are
    /// produced before the transcoder is suspended.
    pub max_buffer: u32,
    /// Low watermark: when a request comes within this many chunks of the
    /// goal, the goal is advanced.
    pub min_buffer: u32,
    /// How far behind the producer a requested index may lag and still be
    /// served by waiting instead of a seek restart.
    pub near_window: u32,
    /// Seconds without access before a context is reaped; 0 disables.
    pub idle_timeout: u64,
    /// Root directory for per-context segment scratch space. Cleared on
    /// service startup; empty selects a directory under the system tmp.
    pub tmp_path: PathBuf,
}

impl StreamingConfig {
    fn apply_defaults(&mut self) {
        if self.chunk_duration == 0 {
            self.chunk_duration = DEFAULT_CHUNK_DURATION;
        }
        if self.max_buffer == 0 {
            self.max_buffer = DEFAULT_MAX_BUFFER;
        }
        if self.min_buffer == 0 {
            self.min_buffer = DEFAULT_MIN_BUFFER;
        }
        if self.near_window == 0 {
            self.near_window = DEFAULT_NEAR_WINDOW;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_duration == 0 {
            return Err(Error::Validation("chunk duration is 0".into()));
        }
        if self.min_buffer == 0 {
            return Err(Error::Validation("min buffer is 0".into()));
        }
        if self.min_buffer > self.max_buffer {
            return Err(Error::Validation(format!(
                "min buffer {} exceeds max buffer {}",
                self.min_buffer, self.max_buffer
            )));
        }
        if self.format == Format::Hls && self.tmp_path.as_os_str().is_empty() {
            return Err(Error::Validation("tmp path is empty".into()));
        }
        Ok(())
    }
}

/// Codecs the downstream player is assumed to support; sources already in a
/// supported codec pair are not transcoded unless a spec forces it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CodecSupport {
    pub video: Vec<String>,
    pub audio: Vec<String>,
}

impl CodecSupport {
    pub fn supports_video(&self, codec: &str) -> bool {
        self.video.iter().any(|c| c == codec)
    }

    pub fn supports_audio(&self, codec: &str) -> bool {
        self.audio.iter().any(|c| c == codec)
    }
}

/// External tool locations and hardware acceleration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ToolsConfig {
    /// Explicit ffmpeg path; `FFMPEG_PATH` and then `PATH` are consulted when
    /// unset.
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit ffprobe path; `FFPROBE_PATH` and then `PATH` are consulted
    /// when unset.
    pub ffprobe_path: Option<PathBuf>,
    pub hw_accel: HwAccel,
}

/// Per-context overrides, merged over the service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContextOptions {
    pub format: Option<Format>,
    pub specs: Option<Vec<StreamSpec>>,
    pub hw_accel: Option<HwAccel>,
}

impl ContextOptions {
    /// Produce the effective config for one context.
    pub fn merge_into(&self, base: &GatewayConfig) -> GatewayConfig {
        let mut config = base.clone();
        if let Some(format) = self.format {
            config.streaming.format = format;
        }
        if let Some(ref specs) = self.specs {
            if !specs.is_empty() {
                config.specs = specs.clone();
            }
        }
        if let Some(hw) = self.hw_accel {
            config.tools.hw_accel = hw;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaulted() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.apply_defaults();
        config
    }

    #[test]
    fn empty_json_is_valid() {
        let mut config = GatewayConfig::from_json("{}").unwrap();
        config.apply_defaults();
        assert!(config.validate().is_ok());
        assert_eq!(config.streaming.chunk_duration, DEFAULT_CHUNK_DURATION);
        assert_eq!(config.streaming.max_buffer, DEFAULT_MAX_BUFFER);
        assert_eq!(config.streaming.min_buffer, DEFAULT_MIN_BUFFER);
    }

    #[test]
    fn defaults_fill_specs_and_codecs() {
        let config = defaulted();
        assert_eq!(config.specs.len(), 1);
        assert_eq!(config.specs[0].name, "Origin");
        assert!(config.codecs.supports_video("h264"));
        assert!(config.codecs.supports_audio("aac"));
        assert!(!config.codecs.supports_video("hevc"));
    }

    #[test]
    fn invalid_buffer_ordering_rejected() {
        let mut config = defaulted();
        config.streaming.min_buffer = 20;
        config.streaming.max_buffer = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_error_reported() {
        assert!(GatewayConfig::from_json("not json").is_err());
    }

    #[test]
    fn options_merge_overrides() {
        let base = defaulted();
        let options = ContextOptions {
            format: Some(Format::Mp4),
            specs: Some(vec![StreamSpec::resolution_720p()]),
            hw_accel: Some(HwAccel::None),
        };
        let merged = options.merge_into(&base);
        assert_eq!(merged.streaming.format, Format::Mp4);
        assert_eq!(merged.specs[0].name, "720P");
        assert_eq!(merged.tools.hw_accel, HwAccel::None);
        // Base untouched.
        assert_eq!(base.streaming.format, Format::Hls);
    }

    #[test]
    fn empty_options_keep_base() {
        let base = defaulted();
        let merged = ContextOptions::default().merge_into(&base);
        assert_eq!(merged.streaming.format, base.streaming.format);
        assert_eq!(merged.specs.len(), base.specs.len());
    }
}
