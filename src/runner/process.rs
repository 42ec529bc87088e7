//! Process runner implementation
//!
//! Spawns the command directly (no shell) in its own process group with a
//! scrubbed environment. On timeout the whole group is killed.

use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{setpgid, Pid};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{CommandSpec, RunLimits, RunOutcome, RunStatus, Runner};
use crate::error::GraderError;

/// How long to wait for output pipes to close after the process is gone
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Runner that executes commands as plain child processes
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run a command, killing its process group at the deadline
    pub async fn execute(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin_content: Option<&str>,
    ) -> Result<RunOutcome, GraderError> {
        debug!("Running {:?} in {:?}", cmd.to_vec(), cmd.work_dir);

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .env_clear()
            .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if stdin_content.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &cmd.work_dir {
            command.current_dir(dir);
        }

        let fsize = limits.max_file_size_bytes;
        // SAFETY: only async-signal-safe syscalls run between fork and exec.
        unsafe {
            command.pre_exec(move || {
                setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
                setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
                setrlimit(Resource::RLIMIT_FSIZE, fsize, fsize)?;
                Ok(())
            });
        }

        let started = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start {}: {}", cmd.program, e);
                return Ok(RunOutcome::launch_failed(format!(
                    "Failed to start {}: {}",
                    cmd.program, e
                )));
            }
        };
        let pid = child.id();

        // Feed stdin from a separate task so a child that never reads it
        // cannot wedge us on a full pipe.
        if let (Some(input), Some(mut pipe)) = (stdin_content, child.stdin.take()) {
            let input = input.to_owned();
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    debug!("stdin closed early: {}", e);
                }
            });
        }

        let stdout_task = tokio::spawn(read_capped(child.stdout.take(), limits.max_output_bytes));
        let stderr_task = tokio::spawn(read_capped(child.stderr.take(), limits.max_output_bytes));

        let waited = tokio::time::timeout(limits.timeout, child.wait()).await;

        // Reap stragglers in the group whether or not the leader finished.
        kill_process_group(pid);

        let status = match waited {
            Ok(Ok(exit)) => match exit.code() {
                Some(code) => RunStatus::Exited(code),
                None => RunStatus::Signaled(exit.signal().unwrap_or(0)),
            },
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(GraderError::Io(e));
            }
            Err(_) => {
                debug!("{} exceeded {:?}, killed", cmd.program, limits.timeout);
                let _ = child.kill().await;
                RunStatus::TimedOut
            }
        };

        let stdout = collect_pipe(stdout_task).await;
        let stderr = collect_pipe(stderr_task).await;
        if stdout.truncated || stderr.truncated {
            debug!(
                "{} output exceeded {} bytes, truncated",
                cmd.program, limits.max_output_bytes
            );
        }

        Ok(RunOutcome {
            status,
            stdout: String::from_utf8_lossy(&stdout.bytes).into_owned(),
            stdout_truncated: stdout.truncated,
            stderr: String::from_utf8_lossy(&stderr.bytes).into_owned(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: Option<&str>,
    ) -> Result<RunOutcome, GraderError> {
        self.execute(cmd, limits, stdin).await
    }
}

fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // ESRCH just means the group is already gone
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

/// Bytes read from one output stream
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    /// Something past the cap was discarded
    truncated: bool,
}

/// Read a pipe to EOF, keeping at most `cap` bytes and discarding the rest
async fn read_capped<R: AsyncRead + Unpin>(pipe: Option<R>, cap: usize) -> Captured {
    let Some(mut pipe) = pipe else {
        return Captured::default();
    };

    let mut captured = Captured::default();
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(captured.bytes.len());
                if n > room {
                    captured.truncated = true;
                }
                captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    captured
}

async fn collect_pipe(task: JoinHandle<Captured>) -> Captured {
    let abort = task.abort_handle();
    match tokio::time::timeout(PIPE_DRAIN_GRACE, task).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(e)) => {
            warn!("Output reader failed: {}", e);
            Captured::default()
        }
        Err(_) => {
            warn!("Output pipe still open after process exit, dropping capture");
            abort.abort();
            Captured {
                bytes: Vec::new(),
                truncated: true,
            }
        }
    }
}
