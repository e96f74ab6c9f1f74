//! The gateway service: configuration, tool resolution, and the registry of
//! open playback contexts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use vf_av::hwaccel;
use vf_av::{probe, ToolInfo, ToolRegistry};
use vf_core::config::{ContextOptions, GatewayConfig};
use vf_core::error::CloseReason;
use vf_core::{adjust_spec, spec_applies, Error, Format, HwAccel, ProbeInfo, Result};

use crate::context::{spawn_idle_reaper, Context};
use crate::streaming::{EngineConfig, Stream};

/// Owns the service-level configuration and every open context.
pub struct Service {
    config: GatewayConfig,
    tools: ToolRegistry,
    hw_accel: HwAccel,
    contexts: Arc<DashMap<String, Arc<Context>>>,
}

impl Service {
    /// Validate the configuration, resolve the toolchain, detect hardware
    /// acceleration, and reset the scratch root.
    ///
    /// The scratch root is cleared on startup, so concurrent services must
    /// use distinct tmp paths.
    pub async fn new(mut config: GatewayConfig) -> Result<Arc<Self>> {
        config.apply_defaults();
        config.validate()?;

        let tools = ToolRegistry::discover(&config.tools)?;

        let requested = config.tools.hw_accel;
        let hw_accel = hwaccel::detect(tools.ffmpeg(), requested).await;
        if hw_accel != requested {
            if requested == HwAccel::Auto {
                tracing::info!(accel = %hw_accel, "auto detected hardware acceleration");
            } else {
                tracing::info!(
                    requested = %requested,
                    effective = %hw_accel,
                    "hardware acceleration changed"
                );
            }
        }

        let tmp_root = &config.streaming.tmp_path;
        let _ = tokio::fs::remove_dir_all(tmp_root).await;
        tokio::fs::create_dir_all(tmp_root).await?;

        Ok(Arc::new(Self {
            config,
            tools,
            hw_accel,
            contexts: Arc::new(DashMap::new()),
        }))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn hw_accel(&self) -> HwAccel {
        self.hw_accel
    }

    /// Availability information for the resolved toolchain.
    pub fn check_tools(&self) -> Vec<ToolInfo> {
        self.tools.check_all()
    }

    /// Probe a source file.
    pub async fn probe(&self, source: &Path) -> Result<ProbeInfo> {
        probe::probe(self.tools.ffprobe(), source).await
    }

    /// Open a playback context for `source` under `id`.
    ///
    /// Probes the source, resets the per-context scratch directory, builds
    /// one stream per applicable spec, and arms the idle reaper. A context
    /// is created per request even when the path repeats.
    pub async fn create_context(
        self: &Arc<Self>,
        id: String,
        source: PathBuf,
        options: ContextOptions,
    ) -> Result<Arc<Context>> {
        let config = options.merge_into(&self.config);
        config.validate()?;

        let probe = Arc::new(self.probe(&source).await?);
        let format = config.streaming.format;

        let tmp_dir = config.streaming.tmp_path.join(&id);
        let _ = tokio::fs::remove_dir_all(&tmp_dir).await;
        if format == Format::Hls {
            tokio::fs::create_dir_all(&tmp_dir).await?;
        }

        let engine_config = EngineConfig::from(&config.streaming);
        let mut streams = Vec::new();
        for spec in &config.specs {
            if !spec_applies(spec, &probe) {
                tracing::debug!(spec = %spec.name, "spec does not apply to source");
                continue;
            }
            let spec = adjust_spec(spec, &probe);
            streams.push(Arc::new(Stream::new(
                spec,
                probe.clone(),
                format,
                source.clone(),
                config.codecs.clone(),
                self.tools.ffmpeg().clone(),
                self.hw_accel,
                engine_config.clone(),
                tmp_dir.clone(),
            )?));
        }

        if streams.is_empty() {
            return Err(Error::Validation(
                "no stream spec applies to this source".into(),
            ));
        }

        let registry = self.contexts.clone();
        let on_close = Box::new(move |id: &str, reason: CloseReason| {
            registry.remove(id);
            tracing::debug!(id, %reason, "context deregistered");
        });

        let context = Arc::new(Context::new(
            id.clone(),
            format,
            probe,
            streams,
            tmp_dir,
            on_close,
        ));
        self.contexts.insert(id, context.clone());

        if format == Format::Hls && config.streaming.idle_timeout > 0 {
            spawn_idle_reaper(Arc::downgrade(&context), config.streaming.idle_timeout);
        }

        Ok(context)
    }

    /// Look up an open context.
    pub fn context(&self, id: &str) -> Option<Arc<Context>> {
        self.contexts.get(id).map(|entry| entry.value().clone())
    }

    /// Ids of every open context.
    pub fn context_ids(&self) -> Vec<String> {
        self.contexts.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of open contexts.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Close every context and remove the scratch root.
    pub async fn stop(&self) {
        let contexts: Vec<Arc<Context>> = self
            .contexts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for context in contexts {
            context.close(CloseReason::Shutdown).await;
        }

        let _ = tokio::fs::remove_dir_all(&self.config.streaming.tmp_path).await;
    }
}
