//! Code execution and grading engine
//!
//! Runs untrusted source in a registered language toolchain, either once
//! (freeform) or wrapped in a harness against JSON test cases (graded).

pub mod compiler;
pub mod config;
pub mod error;
pub mod executor;
pub mod grader;
pub mod harness;
pub mod jobs;
pub mod languages;
pub mod redis_manager;
pub mod runner;
pub mod store;
pub mod workspace;

pub use config::GraderConfig;
pub use error::{ErrorKind, ExecFailure, GraderError};
pub use executor::{ExecutionMode, ExecutionReport, ExecutionRequest, Executor, FreeformResult};
pub use grader::{GradeReport, TestCase, TestResult};
pub use languages::ToolchainRegistry;
