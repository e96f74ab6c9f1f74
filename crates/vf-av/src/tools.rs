//! External tool detection and management.
//!
//! The [`ToolRegistry`] resolves the ffmpeg and ffprobe executables from
//! (in order) an explicit config path, the `FFMPEG_PATH`/`FFPROBE_PATH`
//! environment overrides, and finally `PATH`, then verifies each responds to
//! `-version`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use vf_core::config::ToolsConfig;
use vf_core::{Error, Result};

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

const FFMPEG_PATH_ENV: &str = "FFMPEG_PATH";
const FFPROBE_PATH_ENV: &str = "FFPROBE_PATH";

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found and answered `-version`.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Resolved locations of the ffmpeg/ffprobe pair.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl ToolRegistry {
    /// Resolve and verify both tools.
    ///
    /// Resolution order per tool: explicit config path, the environment
    /// override, `PATH`. Both tools must answer `-version` or this fails
    /// with [`Error::Tool`].
    pub fn discover(config: &ToolsConfig) -> Result<Self> {
        let ffmpeg = resolve(FFMPEG, FFMPEG_PATH_ENV, config.ffmpeg_path.as_deref())?;
        let ffprobe = resolve(FFPROBE, FFPROBE_PATH_ENV, config.ffprobe_path.as_deref())?;

        verify_version(FFMPEG, &ffmpeg)?;
        verify_version(FFPROBE, &ffprobe)?;

        Ok(Self { ffmpeg, ffprobe })
    }

    pub fn ffmpeg(&self) -> &PathBuf {
        &self.ffmpeg
    }

    pub fn ffprobe(&self) -> &PathBuf {
        &self.ffprobe
    }

    /// Check both tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        [(FFMPEG, &self.ffmpeg), (FFPROBE, &self.ffprobe)]
            .into_iter()
            .map(|(name, path)| {
                let version = detect_version(path);
                ToolInfo {
                    name: name.to_string(),
                    available: version.is_some(),
                    version,
                    path: Some(path.clone()),
                }
            })
            .collect()
    }
}

fn resolve(name: &str, env_var: &str, configured: Option<&std::path::Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(
            tool = name,
            path = %path.display(),
            "configured tool path does not exist; falling back"
        );
    }

    if let Ok(value) = std::env::var(env_var) {
        if !value.is_empty() {
            let path = PathBuf::from(value);
            if path.exists() {
                return Ok(path);
            }
            tracing::warn!(
                tool = name,
                env = env_var,
                "environment override does not exist; falling back to PATH"
            );
        }
    }

    which::which(name).map_err(|_| {
        Error::tool(name, format!("{name} not found; is it installed and in PATH?"))
    })
}

fn verify_version(name: &str, path: &std::path::Path) -> Result<()> {
    detect_version(path)
        .map(|_| ())
        .ok_or_else(|| Error::tool(name, format!("{} did not answer -version", path.display())))
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &std::path::Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_missing_tool_returns_error() {
        let result = resolve("nonexistent_tool_xyz_12345", "NONEXISTENT_TOOL_PATH", None);
        assert!(result.is_err());
    }

    #[test]
    fn resolve_prefers_existing_configured_path() {
        // Any existing file will do; the version check happens later.
        let file = tempfile::NamedTempFile::new().unwrap();
        let resolved = resolve("nonexistent_tool_xyz_12345", "NONEXISTENT_TOOL_PATH", Some(file.path()));
        assert_eq!(resolved.unwrap(), file.path());
    }

    #[test]
    fn resolve_honors_environment_override() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::env::set_var("VF_TOOLS_TEST_OVERRIDE", file.path());

        let resolved = resolve(
            "nonexistent_tool_xyz_12345",
            "VF_TOOLS_TEST_OVERRIDE",
            None,
        );
        assert_eq!(resolved.unwrap(), file.path());

        std::env::remove_var("VF_TOOLS_TEST_OVERRIDE");
    }

    #[test]
    fn detect_version_on_non_tool() {
        // A path that exists but is not executable yields None, not a panic.
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(detect_version(file.path()).is_none());
    }
}
