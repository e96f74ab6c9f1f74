//! Long-lived transcoder process control.
//!
//! Unlike a one-shot tool invocation, the segment transcoder stays alive for
//! the whole sliding window and is cooperatively paused and resumed from the
//! outside. [`TranscoderProcess`] hands its stderr to the caller (the only
//! source of truth for segment completion), reaps the child in a background
//! task, and exposes signal-level suspend/resume by pid.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{ChildStderr, Command};
use tokio_util::sync::CancellationToken;

use vf_core::{Error, Result};

/// Handle over a running transcoder subprocess.
///
/// Dropping the handle does not kill the child; call [`kill`](Self::kill).
/// The child is reaped by a detached task either on natural exit or after a
/// kill.
#[derive(Debug)]
pub struct TranscoderProcess {
    pid: u32,
    kill: CancellationToken,
}

impl TranscoderProcess {
    /// Spawn `program` with `args`, returning the handle and the child's
    /// stderr line source.
    ///
    /// # Errors
    ///
    /// [`Error::Tool`] when the process cannot be spawned.
    pub fn spawn(program: &Path, args: &[String]) -> Result<(Self, ChildStderr)> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::tool("ffmpeg", format!("failed to spawn: {e}")))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("transcoder stderr was not captured".into()))?;
        let pid = child
            .id()
            .ok_or_else(|| Error::Internal("transcoder exited before returning a pid".into()))?;

        let kill = CancellationToken::new();
        tokio::spawn(reap(child, kill.clone()));

        tracing::debug!(pid, "transcoder started");
        Ok((Self { pid, kill }, stderr))
    }

    pub fn id(&self) -> u32 {
        self.pid
    }

    /// Stop the process. Idempotent, synchronous-best-effort: the actual
    /// SIGKILL and reap happen in the background task.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    /// Pause the process (SIGSTOP). The transcoder keeps its open files and
    /// resumes exactly where it stopped.
    pub fn suspend(&self) -> Result<()> {
        signal_stop(self.pid, true)
    }

    /// Continue a paused process (SIGCONT). Harmless when it is not paused.
    pub fn resume(&self) -> Result<()> {
        signal_stop(self.pid, false)
    }
}

/// Waits for the child so it never lingers as a zombie; non-zero exits are a
/// warning, not an error, since the engine always tears the process down
/// externally.
async fn reap(mut child: tokio::process::Child, kill: CancellationToken) {
    let natural_exit = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill.cancelled() => None,
    };

    match natural_exit {
        Some(Ok(status)) if status.success() => {
            tracing::debug!("transcoder exited cleanly");
        }
        Some(Ok(status)) => {
            tracing::warn!(%status, "transcoder exited with non-zero status");
        }
        Some(Err(e)) => {
            tracing::warn!("failed to wait for transcoder: {e}");
        }
        None => {
            if let Err(e) = child.start_kill() {
                tracing::debug!("transcoder kill: {e}");
            }
            match child.wait().await {
                Ok(status) => tracing::debug!(%status, "transcoder killed"),
                Err(e) => tracing::warn!("failed to reap killed transcoder: {e}"),
            }
        }
    }
}

#[cfg(unix)]
fn signal_stop(pid: u32, stop: bool) -> Result<()> {
    let signal = if stop { libc::SIGSTOP } else { libc::SIGCONT };
    // Safety: sending a signal to a pid we spawned; worst case the pid is
    // already reaped and kill(2) reports ESRCH.
    let rc = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(Error::Io {
            source: std::io::Error::last_os_error(),
        })
    }
}

#[cfg(not(unix))]
fn signal_stop(_pid: u32, _stop: bool) -> Result<()> {
    Err(Error::NotSupported(
        "process suspend/resume requires POSIX signals on this platform".into(),
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn spawn_captures_stderr_lines() {
        let (proc, stderr) =
            TranscoderProcess::spawn(Path::new("/bin/sh"), &sh("echo one >&2; echo two >&2"))
                .unwrap();

        let mut lines = BufReader::new(stderr).lines();
        assert_eq!(lines.next_line().await.unwrap(), Some("one".to_string()));
        assert_eq!(lines.next_line().await.unwrap(), Some("two".to_string()));
        assert_eq!(lines.next_line().await.unwrap(), None);
        proc.kill();
    }

    #[tokio::test]
    async fn spawn_missing_program_is_tool_error() {
        let err =
            TranscoderProcess::spawn(Path::new("/definitely/not/ffmpeg"), &[]).unwrap_err();
        assert!(matches!(err, Error::Tool { .. }));
    }

    #[tokio::test]
    async fn kill_is_idempotent_and_closes_stderr() {
        let (proc, stderr) =
            TranscoderProcess::spawn(Path::new("/bin/sh"), &sh("sleep 30")).unwrap();

        proc.kill();
        proc.kill();

        // Stderr reaches EOF once the process is gone.
        let mut lines = BufReader::new(stderr).lines();
        let next = tokio::time::timeout(std::time::Duration::from_secs(5), lines.next_line())
            .await
            .expect("stderr should close after kill");
        assert_eq!(next.unwrap(), None);
    }

    #[tokio::test]
    async fn suspend_and_resume_round_trip() {
        let (proc, _stderr) =
            TranscoderProcess::spawn(Path::new("/bin/sh"), &sh("sleep 30")).unwrap();

        proc.suspend().unwrap();
        proc.resume().unwrap();
        proc.kill();
    }

    #[tokio::test]
    async fn kill_while_suspended_still_terminates() {
        let (proc, stderr) =
            TranscoderProcess::spawn(Path::new("/bin/sh"), &sh("sleep 30")).unwrap();

        proc.suspend().unwrap();
        proc.kill();

        let mut lines = BufReader::new(stderr).lines();
        let next = tokio::time::timeout(std::time::Duration::from_secs(5), lines.next_line())
            .await
            .expect("stderr should close after kill of a suspended process");
        assert_eq!(next.unwrap(), None);
    }
}
