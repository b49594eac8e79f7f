//! Step subprocesses
//!
//! Each step runs as one shell process reading its command lines from
//! stdin, so `cd` and `export` carry across lines of the same step only.
//! On Unix the shell leads its own process group; a timeout signals the
//! whole group, first with SIGTERM and then SIGKILL once the grace period
//! runs out.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::result::StepOutcome;

/// Everything needed to spawn one step
#[derive(Debug, Clone)]
pub struct StepProcess {
    pub shell: String,
    pub lines: Vec<String>,
    pub cwd: PathBuf,
    /// Complete environment; nothing else is inherited
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
    pub kill_grace: Duration,
    pub capture_output: bool,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub outcome: StepOutcome,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl StepProcess {
    pub async fn run(&self) -> ProcessOutput {
        let started = Instant::now();

        let mut child = match self.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ProcessOutput {
                    outcome: StepOutcome::SpawnFailed {
                        message: format!("failed to start '{}': {}", self.shell, e),
                    },
                    duration: started.elapsed(),
                    stdout: String::new(),
                    stderr: String::new(),
                }
            }
        };

        let stdout = child.stdout.take().map(read_to_string);
        let stderr = child.stderr.take().map(read_to_string);

        if let Some(mut stdin) = child.stdin.take() {
            let mut script = self.lines.join("\n");
            script.push('\n');
            // The shell may exit before reading everything; a broken pipe is fine
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(script.as_bytes()).await {
                    debug!("stdin closed early: {}", e);
                }
            });
        }

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status_outcome(status),
                Err(_) => {
                    warn!("Step timed out after {:?}, terminating", limit);
                    terminate(&mut child, self.kill_grace).await;
                    StepOutcome::TimedOut {
                        after_ms: limit.as_millis() as u64,
                    }
                }
            },
            None => status_outcome(child.wait().await),
        };

        // Background processes that escaped the group may still hold the
        // pipes open; don't wait on them forever.
        let stdout = collect(stdout, self.kill_grace).await;
        let stderr = collect(stderr, self.kill_grace).await;

        ProcessOutput {
            outcome,
            duration: started.elapsed(),
            stdout,
            stderr,
        }
    }

    fn spawn(&self) -> std::io::Result<Child> {
        let mut command = Command::new(&self.shell);
        command
            .current_dir(&self.cwd)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::piped())
            .kill_on_drop(true);

        if self.capture_output {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        #[cfg(unix)]
        command.process_group(0);

        command.spawn()
    }
}

fn status_outcome(status: std::io::Result<ExitStatus>) -> StepOutcome {
    match status {
        Ok(status) if status.success() => StepOutcome::Passed,
        Ok(status) => StepOutcome::Failed {
            code: exit_code(status),
        },
        Err(e) => StepOutcome::SpawnFailed {
            message: format!("failed to wait for step: {}", e),
        },
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// SIGTERM the process group, then SIGKILL it if the shell has not exited
/// within `grace`.
#[cfg(unix)]
async fn terminate(child: &mut Child, grace: Duration) {
    let Some(pid) = child.id() else {
        return;
    };
    let group = -(pid as libc::pid_t);

    signal_group(group, libc::SIGTERM);
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        debug!("Process group {} ignored SIGTERM, killing", pid);
    }
    // Also catches group members that outlived the shell
    signal_group(group, libc::SIGKILL);
    if let Err(e) = child.wait().await {
        warn!("Failed to reap timed-out step: {}", e);
    }
}

#[cfg(unix)]
fn signal_group(group: libc::pid_t, signal: libc::c_int) {
    // SAFETY: kill(2) has no memory-safety preconditions
    let rc = unsafe { libc::kill(group, signal) };
    if rc != 0 {
        debug!(
            "kill({}, {}) failed: {}",
            group,
            signal,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child, _grace: Duration) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill timed-out step: {}", e);
    }
}

fn read_to_string<R>(mut reader: R) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!("Failed to read step output: {}", e);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn collect(handle: Option<JoinHandle<String>>, limit: Duration) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };
    match tokio::time::timeout(limit, &mut handle).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!("Output reader failed: {}", e);
            String::new()
        }
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}
