// ABOUTME: runs a command string through the configured shell with a wall-clock deadline.
// ABOUTME: kills and reaps the whole process group on timeout, failure, or cancellation.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use shellgate_common::ExecutionResult;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::error::ExecutionError;

/// Exit code reported when the deadline elapses.
pub const TIMEOUT_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone)]
pub struct Executor {
    shell: PathBuf,
    max_output_bytes: usize,
}

impl Executor {
    pub fn new(shell: impl Into<PathBuf>, max_output_bytes: usize) -> Self {
        Self {
            shell: shell.into(),
            max_output_bytes,
        }
    }

    /// Runs `command` once. A non-zero exit is a normal result; only a process that never
    /// ran (or whose pipes broke) is an error.
    pub async fn execute(
        &self,
        command: &str,
        working_directory: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutionError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(ExecutionError::Spawn)?;
        let mut guard = ReapGuard::new(child);
        let stdout = guard.child.stdout.take();
        let stderr = guard.child.stderr.take();

        let collect = async {
            let (status, stdout, stderr) =
                tokio::join!(guard.child.wait(), drain(stdout), drain(stderr));
            Ok::<_, std::io::Error>((status?, stdout?, stderr?))
        };
        let outcome = tokio::time::timeout(timeout, collect).await;

        match outcome {
            Ok(Ok((status, stdout, stderr))) => {
                guard.reaped = true;
                let (stdout, stdout_truncated) = self.shape_output(&stdout);
                let (stderr, stderr_truncated) = self.shape_output(&stderr);
                Ok(ExecutionResult {
                    stdout,
                    stdout_truncated,
                    stderr,
                    stderr_truncated,
                    exit_code: exit_code(status),
                    timed_out: false,
                })
            }
            Ok(Err(err)) => {
                guard.kill_and_reap().await;
                Err(ExecutionError::Io(err))
            }
            Err(_) => {
                guard.kill_and_reap().await;
                tracing::warn!(command, timeout_secs = timeout.as_secs(), "command timed out");
                Ok(ExecutionResult {
                    stderr: format!("command timed out after {} seconds", timeout.as_secs()),
                    exit_code: TIMEOUT_EXIT_CODE,
                    timed_out: true,
                    ..ExecutionResult::default()
                })
            }
        }
    }

    fn shape_output(&self, bytes: &[u8]) -> (String, bool) {
        let text = String::from_utf8_lossy(bytes);
        let text = text.trim_end();
        if text.len() <= self.max_output_bytes {
            return (text.to_string(), false);
        }

        let mut end = self.max_output_bytes;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        let mut out = text[..end].to_string();
        out.push_str("\n[truncated]");
        (out, true)
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Owns the child for the duration of one call. Anything not explicitly reaped is
/// killed (process group included) when the guard drops, e.g. when the caller's
/// future is cancelled; `kill_on_drop` hands the zombie to tokio's reaper.
struct ReapGuard {
    child: Child,
    pgid: Option<i32>,
    reaped: bool,
}

impl ReapGuard {
    fn new(child: Child) -> Self {
        let pgid = child.id().and_then(|pid| i32::try_from(pid).ok());
        Self {
            child,
            pgid,
            reaped: false,
        }
    }

    fn signal_group(&self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            // SAFETY: killpg only sends a signal; pgid is the group created for this child.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }

    async fn kill_and_reap(&mut self) {
        self.signal_group();
        if let Err(err) = self.child.start_kill() {
            tracing::debug!(error = %err, "child already exited before kill");
        }
        match self.child.wait().await {
            Ok(_) => self.reaped = true,
            Err(err) => tracing::warn!(error = %err, "failed to reap killed command"),
        }
    }
}

impl Drop for ReapGuard {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        self.signal_group();
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.start_kill();
        }
    }
}
