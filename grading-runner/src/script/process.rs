//! Shell process execution
//!
//! Runs one command under a wall-clock budget. Every command gets its own
//! process group so that a timeout can kill the whole subtree it spawned, not
//! just the shell.
//!
//! The budget covers both process exit and draining its output: a step whose
//! shell exits but leaves a background process holding stdout open is still
//! running as far as the budget is concerned.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Status code recorded for a step that ran out of time
pub const TIMEOUT_STATUS: i32 = 124;

/// Status code recorded when the shell could not be started or waited on
pub const SPAWN_FAILURE_STATUS: i32 = 127;

/// Per-stream cap on captured output
pub const MAX_CAPTURED_BYTES: usize = 1024 * 1024;

const TRUNCATION_NOTICE: &str = "\n[output truncated]\n";

/// How long to wait for pipes to close after the process group was killed
const KILL_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Outcome of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// stdout followed by stderr
    pub output: String,
    pub status_code: i32,
    pub timed_out: bool,
}

impl CommandOutcome {
    fn spawn_failure(message: String) -> Self {
        Self {
            output: message,
            status_code: SPAWN_FAILURE_STATUS,
            timed_out: false,
        }
    }
}

/// Runs `<shell> -c <command>` in `working_dir`, bounded by `timeout`
///
/// Never fails: spawn errors and timeouts are reported through the outcome.
pub async fn run_command(
    shell: &str,
    command: &str,
    working_dir: &Path,
    timeout: Duration,
) -> CommandOutcome {
    let mut cmd = Command::new(shell);
    cmd.arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // New process group so a timeout can take down the whole subtree
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to spawn '{}': {}", shell, e);
            return CommandOutcome::spawn_failure(format!("Failed to spawn {}: {}", shell, e));
        }
    };

    // Process group id == pid of the leader; kept because `child.id()` is gone
    // once the leader has been reaped
    let pgid = child.id();

    let mut stdout = child.stdout.take().map(PipeCapture::start);
    let mut stderr = child.stderr.take().map(PipeCapture::start);

    let finished = tokio::time::timeout(timeout, async {
        let status = child.wait().await;
        if let Some(capture) = stdout.as_mut() {
            capture.wait().await;
        }
        if let Some(capture) = stderr.as_mut() {
            capture.wait().await;
        }
        status
    })
    .await;

    let (status_code, timed_out, wait_error) = match finished {
        Ok(Ok(status)) => (exit_code(status), false, None),
        Ok(Err(e)) => {
            warn!("Failed to wait for command: {}", e);
            (SPAWN_FAILURE_STATUS, false, Some(e.to_string()))
        }
        Err(_) => {
            warn!("Command timed out after {:?}", timeout);
            kill_process_group(&mut child, pgid).await;
            (TIMEOUT_STATUS, true, None)
        }
    };

    let mut output = String::new();
    for capture in [stdout, stderr].into_iter().flatten() {
        output.push_str(&capture.finish(KILL_DRAIN_GRACE).await);
    }
    if let Some(error) = wait_error {
        output.push_str(&error);
    }

    CommandOutcome {
        output,
        status_code,
        timed_out,
    }
}

/// Exit code, or `128 + signal` when the process was killed by a signal
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

    SPAWN_FAILURE_STATUS
}

/// Kills every process in the command's group, then reaps the leader
async fn kill_process_group(child: &mut Child, pgid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pgid) = pgid {
            // SAFETY: kill(2) has no memory-safety preconditions; a negative
            // pid targets the process group created for this command.
            let result = unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
            if result != 0 {
                debug!(
                    "kill(-{}) failed: {}",
                    pgid,
                    std::io::Error::last_os_error()
                );
            }
        }
    }

    #[cfg(not(unix))]
    let _ = pgid;

    if let Err(e) = child.kill().await {
        debug!("Failed to kill command leader: {}", e);
    }
}

/// Background reader collecting one output stream
struct PipeCapture {
    buffer: Arc<Mutex<Captured>>,
    handle: JoinHandle<()>,
    done: bool,
}

#[derive(Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl PipeCapture {
    fn start<R>(pipe: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Captured::default()));
        let sink = Arc::clone(&buffer);

        let handle = tokio::spawn(async move {
            let mut pipe = pipe;
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut captured) = sink.lock() {
                            let room = MAX_CAPTURED_BYTES.saturating_sub(captured.bytes.len());
                            if n > room {
                                captured.truncated = true;
                            }
                            let take = n.min(room);
                            captured.bytes.extend_from_slice(&chunk[..take]);
                        }
                    }
                }
            }
        });

        Self {
            buffer,
            handle,
            done: false,
        }
    }

    /// Waits until the stream reaches EOF
    async fn wait(&mut self) {
        if !self.done {
            let _ = (&mut self.handle).await;
            self.done = true;
        }
    }

    /// Gives the reader `grace` to reach EOF, then returns what was captured
    async fn finish(mut self, grace: Duration) -> String {
        if !self.done && tokio::time::timeout(grace, &mut self.handle).await.is_err() {
            debug!("Output pipe still open after grace period, abandoning reader");
            self.handle.abort();
        }

        let captured = match self.buffer.lock() {
            Ok(mut captured) => std::mem::take(&mut *captured),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        let mut text = String::from_utf8_lossy(&captured.bytes).into_owned();
        if captured.truncated {
            text.push_str(TRUNCATION_NOTICE);
        }
        text
    }
}
