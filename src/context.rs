//! Per-source playback contexts.
//!
//! A [`Context`] binds one source file to its applicable stream variants and
//! owns their scratch directory. Contexts are closed explicitly, by service
//! shutdown, or by the idle reaper once nobody has touched them for the
//! configured timeout.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

use vf_core::error::CloseReason;
use vf_core::{Format, ProbeInfo};

use crate::streaming::Stream;

/// Callback invoked exactly once when a context closes.
pub type OnClose = Box<dyn Fn(&str, CloseReason) + Send + Sync>;

/// One source file opened for playback.
pub struct Context {
    id: String,
    format: Format,
    probe: Arc<ProbeInfo>,
    streams: Vec<Arc<Stream>>,
    tmp_dir: PathBuf,
    last_access: AtomicI64,
    closed: CancellationToken,
    close_guard: tokio::sync::Mutex<bool>,
    on_close: OnClose,
}

impl Context {
    pub fn new(
        id: String,
        format: Format,
        probe: Arc<ProbeInfo>,
        streams: Vec<Arc<Stream>>,
        tmp_dir: PathBuf,
        on_close: OnClose,
    ) -> Self {
        Self {
            id,
            format,
            probe,
            streams,
            tmp_dir,
            last_access: AtomicI64::new(unix_now()),
            closed: CancellationToken::new(),
            close_guard: tokio::sync::Mutex::new(false),
            on_close,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn probe(&self) -> &Arc<ProbeInfo> {
        &self.probe
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn streams(&self) -> &[Arc<Stream>] {
        &self.streams
    }

    /// Look up a variant by spec name.
    pub fn stream(&self, name: &str) -> Option<Arc<Stream>> {
        self.access();
        self.streams.iter().find(|s| s.name() == name).cloned()
    }

    /// The only variant, or the first when several apply.
    pub fn default_stream(&self) -> Option<Arc<Stream>> {
        self.access();
        self.streams.first().cloned()
    }

    /// Stamp the context as recently used.
    pub fn access(&self) {
        self.last_access.store(unix_now(), Ordering::Relaxed);
    }

    /// Seconds since the last access.
    pub fn idle_secs(&self) -> i64 {
        unix_now() - self.last_access.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Close every stream, remove the scratch directory, and report `reason`
    /// to the close callback. Idempotent: later calls return immediately.
    pub async fn close(&self, reason: CloseReason) {
        {
            let mut closed = self.close_guard.lock().await;
            if *closed {
                return;
            }
            *closed = true;
        }

        tracing::info!(id = %self.id, %reason, "closing context");

        for stream in &self.streams {
            stream.close().await;
        }

        let _ = tokio::fs::remove_dir_all(&self.tmp_dir).await;

        (self.on_close)(&self.id, reason);
        self.closed.cancel();
    }
}

/// Watch a context's `last_access` and close it after `idle_timeout` seconds
/// without traffic.
///
/// The reaper holds only a weak reference: a context dropped elsewhere ends
/// its reaper on the next tick.
pub fn spawn_idle_reaper(context: Weak<Context>, idle_timeout: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let Some(context) = context.upgrade() else {
                return;
            };
            if context.is_closed() {
                return;
            }
            if context.idle_secs() > idle_timeout as i64 {
                tracing::info!(
                    id = %context.id(),
                    idle_secs = context.idle_secs(),
                    "idle timeout reached"
                );
                context.close(CloseReason::IdleTimeout).await;
                return;
            }
        }
    })
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn empty_context(on_close: OnClose) -> Context {
        Context::new(
            "test-ctx".into(),
            Format::Hls,
            Arc::new(ProbeInfo::default()),
            Vec::new(),
            std::env::temp_dir().join("vodforge-test-ctx-none"),
            on_close,
        )
    }

    #[tokio::test]
    async fn close_runs_callback_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let context = empty_context(Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        context.close(CloseReason::Normal).await;
        context.close(CloseReason::Normal).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(context.is_closed());
    }

    #[tokio::test]
    async fn close_reports_reason() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let slot = seen.clone();
        let context = empty_context(Box::new(move |_, reason| {
            *slot.lock().unwrap() = Some(reason);
        }));

        context.close(CloseReason::IdleTimeout).await;
        assert_eq!(*seen.lock().unwrap(), Some(CloseReason::IdleTimeout));
    }

    #[tokio::test]
    async fn access_resets_idle_clock() {
        let context = empty_context(Box::new(|_, _| {}));
        context.access();
        assert!(context.idle_secs() <= 1);
    }

    #[tokio::test]
    async fn reaper_closes_idle_context() {
        let context = Arc::new(empty_context(Box::new(|_, _| {})));
        // Pretend the last access was a minute ago.
        context
            .last_access
            .store(unix_now() - 60, Ordering::Relaxed);

        let reaper = spawn_idle_reaper(Arc::downgrade(&context), 5);
        tokio::time::timeout(Duration::from_secs(5), reaper)
            .await
            .expect("reaper should finish")
            .unwrap();
        assert!(context.is_closed());
    }

    #[tokio::test]
    async fn reaper_exits_when_context_dropped() {
        let context = Arc::new(empty_context(Box::new(|_, _| {})));
        let reaper = spawn_idle_reaper(Arc::downgrade(&context), 3600);
        drop(context);

        tokio::time::timeout(Duration::from_secs(5), reaper)
            .await
            .expect("reaper should notice the dropped context")
            .unwrap();
    }
}
