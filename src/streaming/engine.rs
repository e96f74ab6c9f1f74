//! The HLS segment-production engine.
//!
//! One engine owns one variant's sliding window: the map of chunk records,
//! the `goal` watermark, and the current transcoder process. Serving a chunk
//! request classifies it as a hit (wait on the record), a near miss (the
//! producer will reach it shortly, wait), or a far miss (cheaper to kill the
//! process and reseek than to wait).
//!
//! The transcoder's stderr is the only source of truth for segment
//! completion. A drain task per launch parses it and feeds readiness into
//! the engine; the same pass applies backpressure (suspend once the goal is
//! reached) and evicts records that fell out of the window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStderr;
use tokio_util::sync::CancellationToken;

use vf_av::segment_log::{self, LineEvent};
use vf_av::TranscoderProcess;
use vf_core::{Error, Result};
use vf_media::SegmentPlan;

use super::chunk::{ChunkFault, ChunkReader, ChunkRecord};

/// Sliding-window tuning for one engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Chunk duration in seconds.
    pub chunk_duration: u32,
    /// Low watermark: a request within `min_buffer` of the goal advances it.
    pub min_buffer: u32,
    /// Window width: the goal is set `max_buffer` chunks past a request.
    pub max_buffer: u32,
    /// How far behind the freshest resident chunk a request may lag and
    /// still wait for the running producer instead of restarting it.
    pub near_window: u32,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
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
        Ok(())
    }
}

impl From<&vf_core::config::StreamingConfig> for EngineConfig {
    fn from(config: &vf_core::config::StreamingConfig) -> Self {
        Self {
            chunk_duration: config.chunk_duration,
            min_buffer: config.min_buffer,
            max_buffer: config.max_buffer,
            near_window: config.near_window,
        }
    }
}

/// Seam between the engine and the transcoder invocation.
///
/// The production implementation builds ffmpeg argv for the variant and
/// spawns it; tests inject stub producers.
pub trait ChunkProducer: Send + Sync + 'static {
    /// Launch the transcoder seeking to chunk `start`.
    fn launch(&self, start: u32) -> Result<(TranscoderProcess, ChildStderr)>;
}

/// Point-in-time view of the engine, served on the status route.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStatus {
    pub goal: u32,
    /// Resident chunk ids, sorted.
    pub resident: Vec<u32>,
    /// Whether a transcoder process is currently live.
    pub transcoding: bool,
}

struct EngineState {
    chunks: HashMap<u32, Arc<ChunkRecord>>,
    goal: u32,
    proc: Option<TranscoderProcess>,
    /// Bumped on every launch and stop; drain tasks from older generations
    /// observe the mismatch and stop mutating.
    epoch: u64,
    drain: Option<tokio::task::JoinHandle<()>>,
}

/// The segment-production engine for one stream variant.
pub struct ChunkEngine {
    shared: Arc<EngineShared>,
}

struct EngineShared {
    config: EngineConfig,
    plan: SegmentPlan,
    producer: Arc<dyn ChunkProducer>,
    state: Mutex<EngineState>,
    closed: CancellationToken,
}

impl ChunkEngine {
    pub fn new(
        config: EngineConfig,
        plan: SegmentPlan,
        producer: Arc<dyn ChunkProducer>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(EngineShared {
                config,
                plan,
                producer,
                state: Mutex::new(EngineState {
                    chunks: HashMap::new(),
                    goal: 0,
                    proc: None,
                    epoch: 0,
                    drain: None,
                }),
                closed: CancellationToken::new(),
            }),
        })
    }

    pub fn plan(&self) -> &SegmentPlan {
        &self.shared.plan
    }

    /// Serve one chunk request.
    ///
    /// Blocks until the chunk is ready on disk and returns its byte source.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an index beyond the plan.
    /// - [`Error::Tool`] when a seek restart cannot spawn the transcoder.
    /// - [`Error::ChunkEvicted`] when a later seek evicted the wait.
    /// - [`Error::ProducerGone`] when the engine closed while waiting.
    pub async fn serve_chunk(&self, index: u32) -> Result<ChunkReader> {
        let shared = &self.shared;
        if !shared.plan.contains(index) {
            return Err(Error::not_found("segment", index));
        }

        let record = {
            let mut state = shared.state.lock().unwrap();
            if shared.closed.is_cancelled() {
                return Err(Error::ProducerGone);
            }

            shared.advance_goal(&mut state, index);

            if let Some(record) = state.chunks.get(&index).cloned() {
                record
            } else if shared.near_resident(&state, index) {
                // The producer is expected to reach this index shortly.
                let record = shared.insert_pending(&mut state, index);
                tracing::debug!(index, "near miss, waiting for producer");
                record
            } else {
                tracing::debug!(index, goal = state.goal, "far miss, seek restart");
                shared.stop_locked(&mut state, ChunkFault::Evicted);
                state.goal = index + shared.config.max_buffer;

                let (proc, stderr) = shared.producer.launch(index)?;
                state.epoch += 1;
                state.proc = Some(proc);
                let drain = tokio::spawn(drain_stderr(shared.clone(), stderr, state.epoch));
                state.drain = Some(drain);

                shared.insert_pending(&mut state, index)
            }
        };

        let path = tokio::select! {
            resolution = record.ready() => resolution.map_err(Error::from)?,
            _ = shared.closed.cancelled() => return Err(Error::ProducerGone),
        };

        Ok(ChunkReader::new(path))
    }

    /// Stop the transcoder and drop every resident chunk, waking all waiting
    /// readers with [`Error::ProducerGone`]. Idempotent; joins the stderr
    /// drain task before returning, so no background work survives.
    pub async fn close(&self) {
        let drain = {
            let mut state = self.shared.state.lock().unwrap();
            self.shared.stop_locked(&mut state, ChunkFault::ProducerGone);
            state.drain.take()
        };

        self.shared.closed.cancel();

        if let Some(drain) = drain {
            let _ = drain.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    pub fn status(&self) -> EngineStatus {
        let state = self.shared.state.lock().unwrap();
        let mut resident: Vec<u32> = state.chunks.keys().copied().collect();
        resident.sort_unstable();
        EngineStatus {
            goal: state.goal,
            resident,
            transcoding: state.proc.is_some(),
        }
    }
}

impl EngineShared {
    /// Raise the goal when a request reaches the low watermark, and kick a
    /// suspended producer back into motion.
    fn advance_goal(&self, state: &mut EngineState, index: u32) {
        if index + self.config.min_buffer >= state.goal {
            state.goal = index + self.config.max_buffer;
            if let Some(proc) = &state.proc {
                if let Err(e) = proc.resume() {
                    tracing::warn!(pid = proc.id(), "failed to resume transcoder: {e}");
                }
            }
        }
    }

    /// Whether a resident chunk sits within `near_window` before `index`.
    fn near_resident(&self, state: &EngineState, index: u32) -> bool {
        let from = index.saturating_sub(self.config.near_window);
        (from..index).any(|i| state.chunks.contains_key(&i))
    }

    fn insert_pending(&self, state: &mut EngineState, index: u32) -> Arc<ChunkRecord> {
        let duration = self
            .plan
            .duration_of(index)
            .unwrap_or_else(|| f64::from(self.config.chunk_duration));
        let record = ChunkRecord::pending(index, duration);
        state.chunks.insert(index, record.clone());
        record
    }

    /// Tear down the current window: resolve and destroy every record with
    /// `fault`, kill the process, and invalidate the drain generation.
    fn stop_locked(&self, state: &mut EngineState, fault: ChunkFault) {
        let chunks = std::mem::take(&mut state.chunks);
        for record in chunks.into_values() {
            record.destroy(fault);
        }
        if let Some(proc) = state.proc.take() {
            proc.kill();
        }
        state.epoch += 1;
    }

    /// One readiness event from the transcoder's stderr.
    fn ingest(&self, event: segment_log::SegmentEvent, epoch: u64) {
        let mut state = self.state.lock().unwrap();
        if state.epoch != epoch {
            // A restart or close replaced this producer generation.
            return;
        }

        match state.chunks.get(&event.id).cloned() {
            Some(record) => {
                tracing::debug!(id = event.id, path = %event.path.display(), "chunk ready");
                record.fulfill(event.path);
            }
            None => {
                // Finished before any reader asked: insert pre-fulfilled.
                let duration = self
                    .plan
                    .duration_of(event.id)
                    .unwrap_or_else(|| f64::from(self.config.chunk_duration));
                let record = ChunkRecord::fulfilled(event.id, duration, event.path);
                state.chunks.insert(event.id, record);
            }
        }

        // The chunk numbered `goal` is produced before the pause kicks in.
        if event.id >= state.goal {
            if let Some(proc) = &state.proc {
                if let Err(e) = proc.suspend() {
                    tracing::warn!(pid = proc.id(), "failed to suspend transcoder: {e}");
                }
            }
        }

        let floor = state.goal.saturating_sub(self.config.max_buffer);
        let stale: Vec<u32> = state
            .chunks
            .keys()
            .filter(|id| **id < floor)
            .copied()
            .collect();
        for id in stale {
            if let Some(record) = state.chunks.remove(&id) {
                tracing::debug!(id, "evicting chunk below window");
                record.destroy(ChunkFault::Evicted);
            }
        }
    }
}

/// Drain one producer generation's stderr until EOF.
async fn drain_stderr(shared: Arc<EngineShared>, stderr: ChildStderr, epoch: u64) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("transcoder stderr read failed: {e}");
                break;
            }
        };

        match segment_log::parse_line(&line) {
            LineEvent::Ignored => {}
            LineEvent::Malformed => {
                tracing::warn!(line = %line, "unparseable segment completion line");
            }
            LineEvent::Segment(event) => shared.ingest(event, epoch),
        }
    }
    tracing::debug!(epoch, "transcoder stderr closed");
}
