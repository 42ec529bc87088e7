//! Runner module - Execution abstraction layer
//!
//! Runs one OS command with a deadline and captures its output. The runner
//! does NOT:
//! - Know about languages, build steps or harnesses
//! - Compare outputs or decide pass/fail
//!
//! `ProcessRunner` gives process-level isolation. Stronger isolation can be
//! plugged in behind the `Runner` trait.

pub mod process;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::GraderError;

pub use process::ProcessRunner;

/// Command specification for execution
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Environment variables; the child sees nothing else
    pub env: Vec<(String, String)>,
    /// Working directory
    pub work_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            work_dir: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    pub fn with_env(
        mut self,
        env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.env = env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Create from a command vector (first element is program, rest are args)
    pub fn from_vec(cmd: &[String]) -> Self {
        let mut iter = cmd.iter();
        let program = iter.next().cloned().unwrap_or_default();
        Self::new(program).with_args(iter.cloned())
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.iter().cloned());
        v
    }
}

/// Resource limits for execution
#[derive(Debug, Clone)]
pub struct RunLimits {
    /// Wall-clock deadline
    pub timeout: Duration,
    /// Bytes kept per output stream
    pub max_output_bytes: usize,
    /// RLIMIT_FSIZE for the child
    pub max_file_size_bytes: u64,
}

impl RunLimits {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_output_bytes: 1024 * 1024,
            max_file_size_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Execution status (raw, no verdict interpretation)
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Killed by signal (not by us)
    Signaled(i32),
    /// Deadline reached; the process group was killed
    TimedOut,
    /// The program could not be started at all
    LaunchFailed(String),
}

impl RunStatus {
    /// Check if execution was successful (exited with code 0)
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Exited(0))
    }
}

/// Outcome of running a program
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Stdout content (lossy UTF-8, capped)
    pub stdout: String,
    /// Bytes past the cap were dropped from stdout
    pub stdout_truncated: bool,
    /// Stderr content (lossy UTF-8, capped)
    pub stderr: String,
    /// Wall-clock time in milliseconds
    pub elapsed_ms: u64,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub(crate) fn launch_failed(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::LaunchFailed(message.into()),
            stdout: String::new(),
            stdout_truncated: false,
            stderr: String::new(),
            elapsed_ms: 0,
        }
    }
}

/// Runner trait for executing programs
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command with the given limits and optional stdin
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: Option<&str>,
    ) -> Result<RunOutcome, GraderError>;
}
