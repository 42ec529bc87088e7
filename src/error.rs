//! Error taxonomy for the grading engine
//!
//! `ExecFailure` describes why a single execution attempt did not produce a
//! usable result. It is folded into per-test results or freeform replies.
//! `GraderError` rejects a whole request.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Message reported for any attempt that ran past its deadline
pub const TIMEOUT_MESSAGE: &str = "Execution timed out";

/// Failure of one execution attempt (build, run, or output decoding)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecFailure {
    /// A build step exited nonzero; carries the compiler diagnostic
    #[error("{0}")]
    BuildFailure(String),
    /// The run step exited nonzero or was killed by a signal
    #[error("{0}")]
    RuntimeFailure(String),
    /// A build or run step did not finish before its deadline
    #[error("Execution timed out")]
    TimeoutExceeded,
    /// The toolchain binary could not be started
    #[error("{0}")]
    LaunchFailure(String),
    /// Harnessed run exited cleanly but printed no decodable JSON value
    #[error("Malformed output")]
    MalformedOutput(String),
}

impl ExecFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecFailure::BuildFailure(_) => ErrorKind::BuildFailure,
            ExecFailure::RuntimeFailure(_) => ErrorKind::RuntimeFailure,
            ExecFailure::TimeoutExceeded => ErrorKind::TimeoutExceeded,
            ExecFailure::LaunchFailure(_) => ErrorKind::LaunchFailure,
            ExecFailure::MalformedOutput(_) => ErrorKind::MalformedOutput,
        }
    }
}

/// Request-level errors; nothing else leaves the engine
#[derive(Debug, Error)]
pub enum GraderError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("No code provided")]
    EmptySource,

    #[error("Invalid entry point name: {0:?}")]
    InvalidEntryPoint(String),

    #[error("Language {0} does not support test harness execution")]
    HarnessUnavailable(String),

    #[error("No test cases to run")]
    NoTestCases,

    #[error("Question {0} not found")]
    QuestionNotFound(i64),

    #[error("Failed to prepare workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load question: {0:#}")]
    Question(#[source] anyhow::Error),

    #[error("Failed to save submission: {0:#}")]
    PersistenceFailure(#[source] anyhow::Error),
}

impl GraderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraderError::UnsupportedLanguage(_) => ErrorKind::UnsupportedLanguage,
            GraderError::EmptySource
            | GraderError::InvalidEntryPoint(_)
            | GraderError::HarnessUnavailable(_) => ErrorKind::InvalidRequest,
            GraderError::NoTestCases => ErrorKind::NoTestCases,
            GraderError::QuestionNotFound(_) => ErrorKind::QuestionNotFound,
            GraderError::PersistenceFailure(_) => ErrorKind::PersistenceFailure,
            GraderError::Workspace(_) | GraderError::Io(_) | GraderError::Question(_) => {
                ErrorKind::SystemError
            }
        }
    }

    /// Whether the caller sent something we refuse to run (4xx-equivalent)
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnsupportedLanguage | ErrorKind::InvalidRequest | ErrorKind::QuestionNotFound
        )
    }
}

/// Stable error classification carried in replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedLanguage,
    InvalidRequest,
    BuildFailure,
    RuntimeFailure,
    TimeoutExceeded,
    LaunchFailure,
    MalformedOutput,
    NoTestCases,
    QuestionNotFound,
    PersistenceFailure,
    SystemError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::UnsupportedLanguage => "unsupported_language",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::BuildFailure => "build_failure",
            ErrorKind::RuntimeFailure => "runtime_failure",
            ErrorKind::TimeoutExceeded => "timeout_exceeded",
            ErrorKind::LaunchFailure => "launch_failure",
            ErrorKind::MalformedOutput => "malformed_output",
            ErrorKind::NoTestCases => "no_test_cases",
            ErrorKind::QuestionNotFound => "question_not_found",
            ErrorKind::PersistenceFailure => "persistence_failure",
            ErrorKind::SystemError => "system_error",
        };
        write!(f, "{}", s)
    }
}
