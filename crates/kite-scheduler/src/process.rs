//! `ProcessRunner`: the concrete "execute an external program with
//! timeout/cancellation" capability, grounded on
//! `aivcs_ci::runner::CiRunner::execute_stage`'s
//! `tokio::process::Command` + `tokio::time::timeout` pattern, extended
//! with SIGTERM-then-SIGKILL termination on timeout/cancellation.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use kite_model::{CancellationToken, ProcessOutput, ProcessRunner, RuntimeError};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

pub struct TokioProcessRunner {
    hook_grace: Duration,
}

impl TokioProcessRunner {
    pub fn new(hook_grace: Duration) -> Self {
        Self { hook_grace }
    }
}

#[async_trait::async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn execute(
        &self,
        command: &str,
        args: &[String],
        working_dir: &Path,
        env: &HashMap<String, String>,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<ProcessOutput, RuntimeError> {
        let start = Instant::now();

        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(working_dir)
            .envs(env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| RuntimeError::BodyFailure {
            segment: command.to_string(),
            message: format!("failed to spawn '{command}': {e}"),
        })?;

        let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Completed(status),
            _ = sleep_or_pending(timeout) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        match outcome {
            Outcome::Completed(status) => {
                let status = status.map_err(|e| RuntimeError::BodyFailure {
                    segment: command.to_string(),
                    message: format!("failed to wait for '{command}': {e}"),
                })?;
                let stdout = stdout_task.await.unwrap_or_default();
                let stderr = stderr_task.await.unwrap_or_default();
                Ok(ProcessOutput {
                    exit_code: status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
            Outcome::TimedOut => {
                terminate(&mut child, self.hook_grace).await;
                Err(RuntimeError::Timeout {
                    segment: command.to_string(),
                    timeout_ms: timeout.map(|d| d.as_millis() as u64).unwrap_or(0),
                })
            }
            Outcome::Cancelled => {
                terminate(&mut child, self.hook_grace).await;
                Err(RuntimeError::Cancelled {
                    segment: command.to_string(),
                })
            }
        }
    }
}

enum Outcome<T> {
    Completed(T),
    TimedOut,
    Cancelled,
}

async fn sleep_or_pending(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}

/// SIGTERM the child, wait up to `grace` for a voluntary exit, then SIGKILL
/// (spec §4.2: "SIGTERM then SIGKILL after a grace period... best effort
/// termination before the scheduler returns").
async fn terminate(child: &mut Child, grace: Duration) {
    send_sigterm(child);
    if tokio::time::timeout(grace, child.wait()).await.is_ok() {
        return;
    }
    let _ = child.kill().await;
}

#[cfg(unix)]
fn send_sigterm(child: &Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) {}
