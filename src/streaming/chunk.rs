//! In-memory chunk records and their byte sources.
//!
//! A [`ChunkRecord`] is the handle for one segment: its id, duration, and a
//! single-shot readiness event that resolves to the on-disk path once the
//! transcoder reports the segment ended, or to a fault when the record is
//! evicted or the producer dies. Multiple readers may wait on the same
//! record; the event fires exactly once.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;

/// Why a pending chunk will never become ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFault {
    /// A seek restart replaced the window before this chunk was produced.
    Evicted,
    /// The engine closed (or the transcoder died) while waiting.
    ProducerGone,
}

impl From<ChunkFault> for vf_core::Error {
    fn from(fault: ChunkFault) -> Self {
        match fault {
            ChunkFault::Evicted => vf_core::Error::ChunkEvicted,
            ChunkFault::ProducerGone => vf_core::Error::ProducerGone,
        }
    }
}

/// Lifecycle of one chunk record.
#[derive(Debug, Clone, PartialEq)]
enum ChunkState {
    Pending,
    Ready(PathBuf),
    Failed(ChunkFault),
}

/// Handle for one segment of the sliding window.
#[derive(Debug)]
pub struct ChunkRecord {
    id: u32,
    duration: f64,
    state: watch::Sender<ChunkState>,
}

impl ChunkRecord {
    /// A record whose segment has not been produced yet.
    pub fn pending(id: u32, duration: f64) -> Arc<Self> {
        let (state, _) = watch::channel(ChunkState::Pending);
        Arc::new(Self {
            id,
            duration,
            state,
        })
    }

    /// A record inserted by the ingestion path when the segment finished
    /// before any reader asked for it.
    pub fn fulfilled(id: u32, duration: f64, path: PathBuf) -> Arc<Self> {
        let (state, _) = watch::channel(ChunkState::Ready(path));
        Arc::new(Self {
            id,
            duration,
            state,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Fire the readiness event. Returns false when the record was already
    /// resolved (the event fires at most once).
    pub fn fulfill(&self, path: PathBuf) -> bool {
        self.resolve(ChunkState::Ready(path))
    }

    /// Resolve a still-pending record to `fault` and delete the segment file
    /// if one was recorded. Safe to call while readers still hold open fds
    /// (the inode outlives the unlink) and a no-op when called again.
    pub fn destroy(&self, fault: ChunkFault) {
        self.resolve(ChunkState::Failed(fault));
        if let ChunkState::Ready(path) = &*self.state.borrow() {
            let _ = std::fs::remove_file(path);
        }
    }

    fn resolve(&self, next: ChunkState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ChunkState::Pending {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Wait until the record resolves.
    ///
    /// A caller that observed this record in the engine map is guaranteed a
    /// resolution: restarts and close resolve every record they drop.
    pub async fn ready(&self) -> Result<PathBuf, ChunkFault> {
        let mut rx = self.state.subscribe();
        loop {
            match &*rx.borrow_and_update() {
                ChunkState::Pending => {}
                ChunkState::Ready(path) => return Ok(path.clone()),
                ChunkState::Failed(fault) => return Err(*fault),
            }
            if rx.changed().await.is_err() {
                // Sender dropped while pending: the engine is gone.
                return Err(ChunkFault::ProducerGone);
            }
        }
    }

    /// Whether the readiness event already fired successfully.
    pub fn is_ready(&self) -> bool {
        matches!(&*self.state.borrow(), ChunkState::Ready(_))
    }
}

/// Byte source over a ready chunk.
///
/// The file is opened lazily on the first poll, so a reader that is dropped
/// unread never touches the filesystem. Once open, the fd keeps the data
/// readable even after the engine unlinks the file.
#[derive(Debug)]
pub struct ChunkReader {
    path: PathBuf,
}

impl ChunkReader {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Stream the chunk contents in 64 KiB slices.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send {
        async_stream::try_stream! {
            let mut file = tokio::fs::File::open(&self.path).await?;
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        }
    }

    /// Read the whole chunk into memory.
    pub async fn read_all(self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}
