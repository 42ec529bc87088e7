//! Test harness generation and output decoding
//!
//! A harness is glue appended to a function-style solution. It reads one
//! JSON argument from stdin, calls the solution's entry point and prints the
//! JSON-encoded return value. Templates carry exactly one substitution point,
//! the entry point name, which is validated as an identifier first.

use anyhow::bail;
use serde_json::Value;

use crate::error::{ExecFailure, GraderError};
use crate::runner::{RunOutcome, RunStatus};

/// The single substitution point in a harness template
pub const ENTRY_POINT_PLACEHOLDER: &str = "{{ENTRY_POINT}}";

const MAX_ENTRY_POINT_LEN: usize = 128;

/// Reported when stdout was cut at the capture limit
pub const OUTPUT_LIMIT_MESSAGE: &str = "Output limit exceeded";

const PYTHON_HARNESS: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/harness/python.py"));
const JAVASCRIPT_HARNESS: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/harness/javascript.js"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessTemplate {
    template: String,
}

impl HarnessTemplate {
    pub fn new(template: impl Into<String>) -> anyhow::Result<Self> {
        let template = template.into();
        let placeholders = template.matches(ENTRY_POINT_PLACEHOLDER).count();
        if placeholders != 1 {
            bail!(
                "Harness template must contain {} exactly once (found {})",
                ENTRY_POINT_PLACEHOLDER,
                placeholders
            );
        }
        Ok(Self { template })
    }

    /// Bundled template by name ("python", "javascript")
    pub fn builtin(name: &str) -> anyhow::Result<Self> {
        match name {
            "python" => Self::new(PYTHON_HARNESS),
            "javascript" => Self::new(JAVASCRIPT_HARNESS),
            other => bail!("Unknown built-in harness: {}", other),
        }
    }

    /// User code followed by the glue for `entry_point`
    pub fn wrap(&self, code: &str, entry_point: &str) -> Result<String, GraderError> {
        validate_entry_point(entry_point)?;
        let glue = self.template.replace(ENTRY_POINT_PLACEHOLDER, entry_point);

        let mut source = String::with_capacity(code.len() + glue.len() + 1);
        source.push_str(code);
        source.push('\n');
        source.push_str(&glue);
        Ok(source)
    }
}

/// Entry points must be plain identifiers: `[A-Za-z_][A-Za-z0-9_]*`
pub fn validate_entry_point(name: &str) -> Result<(), GraderError> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_start && valid_rest && name.len() <= MAX_ENTRY_POINT_LEN {
        Ok(())
    } else {
        Err(GraderError::InvalidEntryPoint(name.to_string()))
    }
}

/// Interpret a harnessed run as a result value or a failure
pub fn decode_outcome(outcome: &RunOutcome) -> Result<Value, ExecFailure> {
    match &outcome.status {
        // The result line may be past the cut; never guess from a prefix
        RunStatus::Exited(0) if outcome.stdout_truncated => Err(ExecFailure::MalformedOutput(
            OUTPUT_LIMIT_MESSAGE.to_string(),
        )),
        RunStatus::Exited(0) => decode_stdout(&outcome.stdout),
        RunStatus::Exited(code) => Err(ExecFailure::RuntimeFailure(
            last_non_empty_line(&outcome.stderr)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Process exited with code {}", code)),
        )),
        RunStatus::Signaled(sig) => Err(ExecFailure::RuntimeFailure(
            last_non_empty_line(&outcome.stderr)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Process killed by signal {}", sig)),
        )),
        RunStatus::TimedOut => Err(ExecFailure::TimeoutExceeded),
        RunStatus::LaunchFailed(message) => Err(ExecFailure::LaunchFailure(message.clone())),
    }
}

/// The last line of stdout that parses as JSON wins; user debug prints
/// before it are ignored.
fn decode_stdout(stdout: &str) -> Result<Value, ExecFailure> {
    for line in stdout.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(line) {
            return Ok(value);
        }
    }

    let trimmed = stdout.trim();
    if !trimmed.is_empty() {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Ok(value);
        }
    }

    Err(ExecFailure::MalformedOutput(trimmed.to_string()))
}

/// Summary line of a stack trace
pub fn last_non_empty_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rev().find(|line| !line.is_empty())
}
