//! Compiler module - build steps of compile-then-run pipelines
//!
//! Steps run strictly in order. The first step that does not exit zero
//! stops the build and its diagnostic becomes the failure reason.

use tracing::{debug, info};

use crate::error::{ExecFailure, GraderError};
use crate::runner::{CommandSpec, RunLimits, RunOutcome, RunStatus, Runner};

/// Result of a compilation attempt
#[derive(Debug)]
pub struct CompileResult {
    /// Why the build stopped; `None` when every step exited zero
    pub failure: Option<ExecFailure>,
}

impl CompileResult {
    fn ok() -> Self {
        Self { failure: None }
    }

    fn failed(failure: ExecFailure) -> Self {
        Self {
            failure: Some(failure),
        }
    }
}

/// Run every build step; an empty list is a successful no-op
pub async fn compile_user_code(
    runner: &dyn Runner,
    steps: &[CommandSpec],
    limits: &RunLimits,
) -> Result<CompileResult, GraderError> {
    for (idx, step) in steps.iter().enumerate() {
        debug!("Build step {}/{}: {:?}", idx + 1, steps.len(), step.to_vec());

        let outcome = runner.run(step, limits, None).await?;
        if !outcome.is_success() {
            info!(
                "Build step {} failed after {}ms: {:?}",
                step.program, outcome.elapsed_ms, outcome.status
            );
            return Ok(CompileResult::failed(build_failure(&outcome)));
        }
    }

    Ok(CompileResult::ok())
}

fn build_failure(outcome: &RunOutcome) -> ExecFailure {
    match &outcome.status {
        RunStatus::TimedOut => return ExecFailure::TimeoutExceeded,
        RunStatus::LaunchFailed(message) => return ExecFailure::LaunchFailure(message.clone()),
        _ => {}
    }

    let message = if !outcome.stderr.trim().is_empty() {
        outcome.stderr.trim_end().to_string()
    } else if !outcome.stdout.trim().is_empty() {
        outcome.stdout.trim_end().to_string()
    } else {
        match outcome.status {
            RunStatus::Exited(code) => format!("Compilation failed with exit code {}", code),
            RunStatus::Signaled(_) => "Compiler crashed".to_string(),
            _ => "Compilation failed".to_string(),
        }
    };

    ExecFailure::BuildFailure(message)
}
