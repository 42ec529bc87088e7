//! Executor - drives toolchain pipelines for freeform and harnessed runs
//!
//! Every attempt gets its own workspace and its own deadline. Compile-then-run
//! pipelines are strictly sequential: the run step never starts unless every
//! build step exited zero.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::compiler::compile_user_code;
use crate::config::GraderConfig;
use crate::error::{ExecFailure, GraderError};
use crate::grader::{self, ActualOutput, GradeReport, TestCase};
use crate::harness::decode_outcome;
use crate::languages::{CommandTemplate, ToolchainRegistry, ToolchainSpec};
use crate::runner::{CommandSpec, ProcessRunner, RunLimits, RunOutcome, RunStatus, Runner};
use crate::workspace::{with_workspace, write_file};

/// What to do with the submitted code
#[derive(Debug, Clone)]
pub enum ExecutionMode {
    /// Run once and return the console output
    Freeform { stdin: Option<String> },
    /// Wrap in a harness and grade against test cases
    Harnessed {
        entry_point: String,
        test_cases: Vec<TestCase>,
    },
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub language: String,
    pub source_code: String,
    pub mode: ExecutionMode,
}

#[derive(Debug, Clone)]
pub enum ExecutionReport {
    Freeform(FreeformResult),
    Graded(GradeReport),
}

/// Result of a single freeform run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreeformResult {
    pub success: bool,
    /// Run step stdout on success, otherwise the failing step's diagnostic
    pub output: String,
    #[serde(skip)]
    pub failure: Option<ExecFailure>,
}

impl FreeformResult {
    fn succeeded(stdout: &str) -> Self {
        Self {
            success: true,
            output: stdout.trim_end().to_string(),
            failure: None,
        }
    }

    fn failed(failure: ExecFailure) -> Self {
        Self {
            success: false,
            output: failure.to_string(),
            failure: Some(failure),
        }
    }
}

/// How far a pipeline got
#[derive(Debug)]
enum PipelineOutcome {
    /// A build step failed; the run step was not attempted
    BuildFailed(ExecFailure),
    /// The run step executed (successfully or not)
    Ran(RunOutcome),
}

/// Execution engine; cheap to clone, all state is shared read-only
#[derive(Clone)]
pub struct Executor {
    registry: Arc<ToolchainRegistry>,
    config: Arc<GraderConfig>,
    runner: Arc<dyn Runner>,
}

impl Executor {
    pub fn new(registry: Arc<ToolchainRegistry>, config: Arc<GraderConfig>) -> Self {
        Self::with_runner(registry, config, Arc::new(ProcessRunner::new()))
    }

    pub fn with_runner(
        registry: Arc<ToolchainRegistry>,
        config: Arc<GraderConfig>,
        runner: Arc<dyn Runner>,
    ) -> Self {
        Self {
            registry,
            config,
            runner,
        }
    }

    pub fn registry(&self) -> &ToolchainRegistry {
        &self.registry
    }

    /// Run a request in whichever mode it asks for
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReport, GraderError> {
        match &request.mode {
            ExecutionMode::Freeform { stdin } => self
                .run_once(&request.language, &request.source_code, stdin.as_deref())
                .await
                .map(ExecutionReport::Freeform),
            ExecutionMode::Harnessed {
                entry_point,
                test_cases,
            } => self
                .grade(&request.language, &request.source_code, entry_point, test_cases)
                .await
                .map(ExecutionReport::Graded),
        }
    }

    /// Run `code` once with no harness and return its console output
    pub async fn run_once(
        &self,
        language: &str,
        code: &str,
        stdin: Option<&str>,
    ) -> Result<FreeformResult, GraderError> {
        if code.trim().is_empty() {
            return Err(GraderError::EmptySource);
        }
        let toolchain = self.resolve(language)?;

        let started = Instant::now();
        let outcome = with_workspace(&self.config.workspace_root, |dir| async move {
            write_file(&dir, &toolchain.source_file, code).await?;
            self.run_pipeline(toolchain, &dir, stdin).await
        })
        .await??;

        let result = match outcome {
            PipelineOutcome::BuildFailed(failure) => FreeformResult::failed(failure),
            PipelineOutcome::Ran(run) => match run.status {
                RunStatus::Exited(0) => FreeformResult::succeeded(&run.stdout),
                RunStatus::Exited(code) => FreeformResult::failed(ExecFailure::RuntimeFailure(
                    diagnostic_or(&run, || format!("Process exited with code {}", code)),
                )),
                RunStatus::Signaled(sig) => FreeformResult::failed(ExecFailure::RuntimeFailure(
                    diagnostic_or(&run, || format!("Process killed by signal {}", sig)),
                )),
                RunStatus::TimedOut => FreeformResult::failed(ExecFailure::TimeoutExceeded),
                RunStatus::LaunchFailed(message) => {
                    FreeformResult::failed(ExecFailure::LaunchFailure(message))
                }
            },
        };

        info!(
            "Freeform run: language={}, success={}, elapsed_ms={}",
            toolchain.language_id,
            result.success,
            started.elapsed().as_millis()
        );
        Ok(result)
    }

    /// Run a harnessed solution against one test case
    pub async fn run_against_test(
        &self,
        language: &str,
        code: &str,
        entry_point: &str,
        test: &TestCase,
    ) -> Result<ActualOutput, GraderError> {
        let (toolchain, source) = self.prepare_harness(language, code, entry_point)?;
        self.run_harnessed(toolchain, &source, &test.input).await
    }

    /// Run a harnessed solution against every test and reduce the results
    pub async fn grade(
        &self,
        language: &str,
        code: &str,
        entry_point: &str,
        tests: &[TestCase],
    ) -> Result<GradeReport, GraderError> {
        if tests.is_empty() {
            return Err(GraderError::NoTestCases);
        }
        let (toolchain, source) = self.prepare_harness(language, code, entry_point)?;

        let started = Instant::now();
        let actuals = if self.config.test_concurrency <= 1 || tests.len() == 1 {
            let mut actuals = Vec::with_capacity(tests.len());
            for test in tests {
                actuals.push(self.run_harnessed(toolchain, &source, &test.input).await?);
            }
            actuals
        } else {
            self.run_parallel(&toolchain.language_id, source.into(), tests)
                .await?
        };

        let report = grader::grade(tests.iter().cloned().zip(actuals).collect())?;
        info!(
            "Graded {} tests: language={}, passed={}/{}, elapsed_ms={}",
            tests.len(),
            toolchain.language_id,
            report.passed_count(),
            report.results.len(),
            started.elapsed().as_millis()
        );
        Ok(report)
    }

    fn resolve(&self, language: &str) -> Result<&ToolchainSpec, GraderError> {
        self.registry
            .resolve(language)
            .ok_or_else(|| GraderError::UnsupportedLanguage(language.to_string()))
    }

    /// Validate everything that can be checked without spawning a process
    fn prepare_harness(
        &self,
        language: &str,
        code: &str,
        entry_point: &str,
    ) -> Result<(&ToolchainSpec, String), GraderError> {
        if code.trim().is_empty() {
            return Err(GraderError::EmptySource);
        }
        let toolchain = self.resolve(language)?;
        let harness = toolchain
            .harness
            .as_ref()
            .ok_or_else(|| GraderError::HarnessUnavailable(toolchain.language_id.clone()))?;
        let source = harness.wrap(code, entry_point)?;
        Ok((toolchain, source))
    }

    async fn run_harnessed(
        &self,
        toolchain: &ToolchainSpec,
        source: &str,
        input: &str,
    ) -> Result<ActualOutput, GraderError> {
        let outcome = with_workspace(&self.config.workspace_root, |dir| async move {
            write_file(&dir, &toolchain.source_file, source).await?;
            self.run_pipeline(toolchain, &dir, Some(input)).await
        })
        .await??;

        Ok(match outcome {
            PipelineOutcome::BuildFailed(failure) => Err(failure),
            PipelineOutcome::Ran(run) => decode_outcome(&run),
        })
    }

    /// Grade tests on separate tasks, at most `test_concurrency` at a time,
    /// then put the results back in test order.
    async fn run_parallel(
        &self,
        language_id: &str,
        source: Arc<str>,
        tests: &[TestCase],
    ) -> Result<Vec<ActualOutput>, GraderError> {
        let permits = Arc::new(Semaphore::new(self.config.test_concurrency));
        let mut tasks = JoinSet::new();

        for (idx, test) in tests.iter().enumerate() {
            let executor = self.clone();
            let permits = Arc::clone(&permits);
            let source = Arc::clone(&source);
            let language_id = language_id.to_string();
            let input = test.input.clone();

            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| GraderError::Io(std::io::Error::other(e)))?;
                let toolchain = executor.resolve(&language_id)?;
                let actual = executor.run_harnessed(toolchain, &source, &input).await?;
                Ok::<_, GraderError>((idx, actual))
            });
        }

        let mut slots: Vec<Option<ActualOutput>> = vec![None; tests.len()];
        while let Some(joined) = tasks.join_next().await {
            let (idx, actual) = joined.map_err(|e| GraderError::Io(std::io::Error::other(e)))??;
            slots[idx] = Some(actual);
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    GraderError::Io(std::io::Error::other("test case task produced no result"))
                })
            })
            .collect()
    }

    /// The one build-then-run routine shared by every language and mode
    async fn run_pipeline(
        &self,
        toolchain: &ToolchainSpec,
        dir: &Path,
        stdin: Option<&str>,
    ) -> Result<PipelineOutcome, GraderError> {
        let build_steps: Vec<CommandSpec> = toolchain
            .pipeline
            .build_steps()
            .iter()
            .map(|step| self.command_for(step, toolchain, dir))
            .collect();

        if !build_steps.is_empty() {
            let limits = self.limits(self.config.build_timeout());
            let compiled = compile_user_code(self.runner.as_ref(), &build_steps, &limits).await?;
            if let Some(failure) = compiled.failure {
                return Ok(PipelineOutcome::BuildFailed(failure));
            }
        }

        let run = self.command_for(toolchain.pipeline.run_step(), toolchain, dir);
        let limits = self.limits(self.config.exec_timeout());
        let outcome = self.runner.run(&run, &limits, stdin).await?;
        debug!(
            "Run step finished: status={:?}, elapsed_ms={}",
            outcome.status, outcome.elapsed_ms
        );
        Ok(PipelineOutcome::Ran(outcome))
    }

    fn command_for(
        &self,
        template: &CommandTemplate,
        toolchain: &ToolchainSpec,
        dir: &Path,
    ) -> CommandSpec {
        let dir_str = dir.to_string_lossy().into_owned();
        let mut env = vec![
            ("PATH".to_string(), self.config.exec_path.clone()),
            ("HOME".to_string(), dir_str.clone()),
            ("TMPDIR".to_string(), dir_str),
            ("LANG".to_string(), "C.UTF-8".to_string()),
        ];
        env.extend(toolchain.env.iter().cloned());

        CommandSpec::from_vec(&template.render(dir))
            .with_env(env)
            .with_work_dir(dir)
    }

    fn limits(&self, timeout: Duration) -> RunLimits {
        RunLimits {
            timeout,
            max_output_bytes: self.config.max_output_bytes,
            max_file_size_bytes: self.config.max_file_size_bytes,
        }
    }
}

/// Trimmed stderr, else stdout, else the fallback
fn diagnostic_or(run: &RunOutcome, fallback: impl FnOnce() -> String) -> String {
    if !run.stderr.trim().is_empty() {
        run.stderr.trim_end().to_string()
    } else if !run.stdout.trim().is_empty() {
        run.stdout.trim_end().to_string()
    } else {
        fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    use crate::grader::REDACTED;

    const SH_LANGUAGES: &str = r#"
[sh]
source_file = "main.sh"
run_command = "sh main.sh"
harness_template = '''

grader_input=$(cat)
{{ENTRY_POINT}} "$grader_input"
'''

[shc]
source_file = "main.sh"
build_commands = ["sh -n main.sh"]
run_command = "sh {workspace}/main.sh"
harness_template = '''

grader_input=$(cat)
{{ENTRY_POINT}} "$grader_input"
'''

[plain]
source_file = "main.sh"
run_command = "sh main.sh"
"#;

    const SUM_LIST: &str = r#"
sum_list() {
  total=0
  for n in $(echo "$1" | tr -d '[] ' | tr ',' ' '); do
    total=$((total + n))
  done
  echo "$total"
}
"#;

    const SUM_LIST_OFF_BY_ONE: &str = r#"
sum_list() {
  total=1
  for n in $(echo "$1" | tr -d '[] ' | tr ',' ' '); do
    total=$((total + n))
  done
  echo "$total"
}
"#;

    fn executor_with(root: &TempDir, tweak: impl FnOnce(&mut GraderConfig)) -> Executor {
        let mut config = GraderConfig {
            workspace_root: root.path().to_path_buf(),
            exec_timeout_ms: 5_000,
            build_timeout_ms: 5_000,
            ..GraderConfig::default()
        };
        tweak(&mut config);
        let registry = ToolchainRegistry::from_toml_str(SH_LANGUAGES).unwrap();
        Executor::new(Arc::new(registry), Arc::new(config))
    }

    fn executor(root: &TempDir) -> Executor {
        executor_with(root, |_| {})
    }

    fn sample(input: &str, expected: &str) -> TestCase {
        TestCase {
            input: input.into(),
            expected_output: expected.into(),
            is_sample: true,
        }
    }

    fn hidden(input: &str, expected: &str) -> TestCase {
        TestCase {
            is_sample: false,
            ..sample(input, expected)
        }
    }

    fn workspace_count(root: &TempDir) -> usize {
        std::fs::read_dir(root.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_freeform_prints_literal() {
        let root = tempfile::tempdir().unwrap();
        let result = executor(&root)
            .run_once("sh", "echo 'Hello, Shell!'", None)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "Hello, Shell!");
        assert_eq!(workspace_count(&root), 0);
    }

    #[tokio::test]
    async fn test_freeform_with_stdin() {
        let root = tempfile::tempdir().unwrap();
        let result = executor(&root)
            .run_once("sh", "read x; echo \"got $x\"", Some("42\n"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "got 42");
    }

    #[tokio::test]
    async fn test_freeform_runtime_failure_reports_stderr() {
        let root = tempfile::tempdir().unwrap();
        let result = executor(&root)
            .run_once("sh", "echo partial; echo 'it broke' >&2; exit 1", None)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.output, "it broke");
        assert_eq!(
            result.failure,
            Some(ExecFailure::RuntimeFailure("it broke".into()))
        );
    }

    #[tokio::test]
    async fn test_freeform_timeout() {
        let root = tempfile::tempdir().unwrap();
        let result = executor_with(&root, |c| c.exec_timeout_ms = 300)
            .run_once("sh", "while :; do :; done", None)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.output, "Execution timed out");
        assert_eq!(result.failure, Some(ExecFailure::TimeoutExceeded));
        assert_eq!(workspace_count(&root), 0);
    }

    #[tokio::test]
    async fn test_freeform_build_failure() {
        let root = tempfile::tempdir().unwrap();
        let result = executor(&root)
            .run_once("shc", "if then fi (", None)
            .await
            .unwrap();

        assert!(!result.success);
        assert!(matches!(result.failure, Some(ExecFailure::BuildFailure(_))));
        assert!(!result.output.is_empty());
    }

    #[tokio::test]
    async fn test_compile_then_run_success() {
        let root = tempfile::tempdir().unwrap();
        let result = executor(&root)
            .run_once("shc", "echo compiled-and-ran", None)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "compiled-and-ran");
    }

    #[tokio::test]
    async fn test_rejections_happen_before_any_workspace() {
        let root = tempfile::tempdir().unwrap();
        let exec = executor(&root);

        assert!(matches!(
            exec.run_once("fortran", "PRINT *, 'hi'", None).await,
            Err(GraderError::UnsupportedLanguage(_))
        ));
        assert!(matches!(
            exec.run_once("sh", "   \n", None).await,
            Err(GraderError::EmptySource)
        ));
        assert!(matches!(
            exec.grade("plain", SUM_LIST, "sum_list", &[sample("[1]", "1")])
                .await,
            Err(GraderError::HarnessUnavailable(_))
        ));
        assert!(matches!(
            exec.grade("sh", SUM_LIST, "sum_list; rm -rf /", &[sample("[1]", "1")])
                .await,
            Err(GraderError::InvalidEntryPoint(_))
        ));
        assert!(matches!(
            exec.grade("sh", SUM_LIST, "sum_list", &[]).await,
            Err(GraderError::NoTestCases)
        ));
        assert_eq!(workspace_count(&root), 0);
    }

    #[tokio::test]
    async fn test_harnessed_sample_pass() {
        let root = tempfile::tempdir().unwrap();
        let report = executor(&root)
            .grade("sh", SUM_LIST, "sum_list", &[sample("[1,2,3]", "6")])
            .await
            .unwrap();

        assert!(report.passed);
        assert_eq!(report.results[0].input, "[1,2,3]");
        assert_eq!(report.results[0].expected, "6");
        assert_eq!(report.results[0].actual, "6");
    }

    #[tokio::test]
    async fn test_harnessed_hidden_pass_is_redacted() {
        let root = tempfile::tempdir().unwrap();
        let report = executor(&root)
            .grade("sh", SUM_LIST, "sum_list", &[hidden("[1,2,3]", "6")])
            .await
            .unwrap();

        assert!(report.passed);
        assert!(report.results[0].passed);
        assert_eq!(report.results[0].input, REDACTED);
        assert_eq!(report.results[0].expected, REDACTED);
        assert_eq!(report.results[0].actual, REDACTED);
    }

    #[tokio::test]
    async fn test_harnessed_wrong_answer() {
        let root = tempfile::tempdir().unwrap();
        let report = executor(&root)
            .grade("sh", SUM_LIST_OFF_BY_ONE, "sum_list", &[sample("[1,2,3]", "6")])
            .await
            .unwrap();

        assert!(!report.passed);
        assert_eq!(report.results[0].actual, "7");
    }

    #[tokio::test]
    async fn test_harnessed_failures() {
        let root = tempfile::tempdir().unwrap();
        let exec = executor_with(&root, |c| c.exec_timeout_ms = 300);
        let test = sample("[1]", "1");

        let malformed = exec
            .run_against_test("sh", "bad() { echo 'not json'; }", "bad", &test)
            .await
            .unwrap();
        assert_eq!(
            malformed,
            Err(ExecFailure::MalformedOutput("not json".into()))
        );

        let crashed = exec
            .run_against_test(
                "sh",
                "crash() { echo 'trace line' >&2; echo 'ValueError: boom' >&2; exit 2; }",
                "crash",
                &test,
            )
            .await
            .unwrap();
        assert_eq!(
            crashed,
            Err(ExecFailure::RuntimeFailure("ValueError: boom".into()))
        );

        let spun = exec
            .run_against_test("sh", "spin() { while :; do :; done; }", "spin", &test)
            .await
            .unwrap();
        assert_eq!(spun, Err(ExecFailure::TimeoutExceeded));

        let unbuildable = exec
            .run_against_test("shc", "broken() { if then fi (", "broken", &test)
            .await
            .unwrap();
        assert!(matches!(unbuildable, Err(ExecFailure::BuildFailure(_))));

        assert_eq!(workspace_count(&root), 0);
    }

    #[tokio::test]
    async fn test_flooded_stdout_never_passes() {
        let root = tempfile::tempdir().unwrap();
        // Debug lines matching the expected value, then the real (wrong) result
        let code = "wrong() { yes 6 | head -n 2000; echo 7; }";
        let tests = [sample("[1,2,3]", "6")];

        let capped = executor_with(&root, |c| c.max_output_bytes = 1024)
            .grade("sh", code, "wrong", &tests)
            .await
            .unwrap();
        assert!(!capped.passed);
        assert_eq!(
            capped.results[0].actual,
            r#"{"error":"Malformed output","output":"Output limit exceeded"}"#
        );

        let uncapped = executor(&root)
            .grade("sh", code, "wrong", &tests)
            .await
            .unwrap();
        assert!(!uncapped.passed);
        assert_eq!(uncapped.results[0].actual, "7");
        assert_eq!(workspace_count(&root), 0);
    }

    #[tokio::test]
    async fn test_timeout_never_passes() {
        let root = tempfile::tempdir().unwrap();
        let report = executor_with(&root, |c| c.exec_timeout_ms = 300)
            .grade(
                "sh",
                "spin() { while :; do :; done; }",
                "spin",
                &[sample("[1]", "1"), hidden("[2]", "2")],
            )
            .await
            .unwrap();

        assert!(!report.passed);
        assert!(report.results.iter().all(|r| !r.passed));
        assert_eq!(report.results[0].actual, r#"{"error":"Execution timed out"}"#);
    }

    #[tokio::test]
    async fn test_grading_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let exec = executor(&root);
        let tests = [sample("[4,5]", "9")];

        let first = exec.grade("sh", SUM_LIST, "sum_list", &tests).await.unwrap();
        assert_eq!(workspace_count(&root), 0);
        let second = exec.grade("sh", SUM_LIST, "sum_list", &tests).await.unwrap();
        assert_eq!(workspace_count(&root), 0);

        assert_eq!(first, second);
        assert!(first.passed);
    }

    #[tokio::test]
    async fn test_no_state_leaks_between_tests() {
        let root = tempfile::tempdir().unwrap();
        // Leaves a file behind and reports whether it saw one from before
        let code = r#"
check_leftover() {
  if [ -e leftover ]; then echo '"leaked"'; else echo '"clean"'; fi
  touch leftover
}
"#;
        let report = executor(&root)
            .grade(
                "sh",
                code,
                "check_leftover",
                &[sample("0", "\"clean\""), sample("1", "\"clean\"")],
            )
            .await
            .unwrap();

        assert!(report.passed);
    }

    #[tokio::test]
    async fn test_parallel_results_keep_test_order() {
        let root = tempfile::tempdir().unwrap();
        let code = r#"
delayed() {
  n=$(echo "$1" | tr -d '[] ')
  sleep "0.$n"
  echo "$n"
}
"#;
        let tests = vec![
            sample("[3]", "3"),
            sample("[1]", "1"),
            hidden("[2]", "2"),
            sample("[4]", "5"),
        ];

        let report = executor_with(&root, |c| c.test_concurrency = 4)
            .grade("sh", code, "delayed", &tests)
            .await
            .unwrap();

        let inputs: Vec<&str> = report.results.iter().map(|r| r.input.as_str()).collect();
        assert_eq!(inputs, vec!["[3]", "[1]", REDACTED, "[4]"]);
        let passed: Vec<bool> = report.results.iter().map(|r| r.passed).collect();
        assert_eq!(passed, vec![true, true, true, false]);
        assert!(!report.passed);
        assert_eq!(workspace_count(&root), 0);
    }

    #[tokio::test]
    async fn test_execute_dispatches_on_mode() {
        let root = tempfile::tempdir().unwrap();
        let exec = executor(&root);

        let freeform = exec
            .execute(&ExecutionRequest {
                language: "SH".into(),
                source_code: "echo hi".into(),
                mode: ExecutionMode::Freeform { stdin: None },
            })
            .await
            .unwrap();
        assert!(matches!(freeform, ExecutionReport::Freeform(r) if r.output == "hi"));

        let graded = exec
            .execute(&ExecutionRequest {
                language: "sh".into(),
                source_code: SUM_LIST.into(),
                mode: ExecutionMode::Harnessed {
                    entry_point: "sum_list".into(),
                    test_cases: vec![sample("[1,2,3]", "6")],
                },
            })
            .await
            .unwrap();
        assert!(matches!(graded, ExecutionReport::Graded(r) if r.passed));
    }

    /// Records every command instead of running it; builds named `fake-cc`
    /// always fail.
    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl Runner for RecordingRunner {
        async fn run(
            &self,
            cmd: &CommandSpec,
            _limits: &RunLimits,
            _stdin: Option<&str>,
        ) -> Result<RunOutcome, GraderError> {
            self.calls.lock().unwrap().push(cmd.to_vec());
            let failed = cmd.program == "fake-cc";
            Ok(RunOutcome {
                status: RunStatus::Exited(if failed { 1 } else { 0 }),
                stdout: String::new(),
                stdout_truncated: false,
                stderr: if failed {
                    "main.fake:1:1: error: unexpected token".into()
                } else {
                    String::new()
                },
                elapsed_ms: 0,
            })
        }
    }

    #[tokio::test]
    async fn test_build_failure_skips_run_step() {
        let root = tempfile::tempdir().unwrap();
        let registry = ToolchainRegistry::from_toml_str(
            r#"
[fake]
source_file = "main.fake"
build_commands = ["fake-cc main.fake", "fake-link main.o"]
run_command = "{workspace}/main"
"#,
        )
        .unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let config = GraderConfig {
            workspace_root: root.path().to_path_buf(),
            ..GraderConfig::default()
        };
        let exec = Executor::with_runner(Arc::new(registry), Arc::new(config), runner.clone());

        let result = exec.run_once("fake", "garbage", None).await.unwrap();

        assert!(!result.success);
        assert_eq!(
            result.failure,
            Some(ExecFailure::BuildFailure(
                "main.fake:1:1: error: unexpected token".into()
            ))
        );
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["fake-cc", "main.fake"]);
    }

    #[tokio::test]
    async fn test_commands_get_minimal_environment() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let registry = ToolchainRegistry::from_toml_str(SH_LANGUAGES).unwrap();
        let config = GraderConfig {
            workspace_root: root.path().to_path_buf(),
            ..GraderConfig::default()
        };
        let exec = Executor::with_runner(Arc::new(registry), Arc::new(config), runner.clone());
        let toolchain = exec.resolve("shc").unwrap();
        let dir = root.path().join("grader-test");

        let cmd = exec.command_for(toolchain.pipeline.run_step(), toolchain, &dir);

        assert_eq!(cmd.program, "sh");
        assert_eq!(cmd.args, vec![format!("{}/main.sh", dir.display())]);
        assert_eq!(cmd.work_dir.as_deref(), Some(dir.as_path()));
        let keys: Vec<&str> = cmd.env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["PATH", "HOME", "TMPDIR", "LANG"]);
    }

    fn python_available() -> bool {
        which::which_in("python3", Some(crate::config::DEFAULT_EXEC_PATH), "/").is_ok()
    }

    #[tokio::test]
    async fn test_python_harness_end_to_end() {
        if !python_available() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let config = GraderConfig {
            workspace_root: root.path().to_path_buf(),
            ..GraderConfig::default()
        };
        let exec = Executor::new(
            Arc::new(ToolchainRegistry::builtin().unwrap()),
            Arc::new(config),
        );
        let code = "class Solution:\n    def sumList(self, nums):\n        print('debugging', nums)\n        return sum(nums)\n";

        let report = exec
            .grade(
                "python",
                code,
                "sumList",
                &[sample("[1,2,3]", "6"), hidden("[10, 20]", "30.0")],
            )
            .await
            .unwrap();
        assert!(report.passed);
        assert_eq!(report.results[0].actual, "6");

        let actual = exec
            .run_against_test(
                "py",
                "class Solution:\n    def first(self, xs):\n        return xs[5]\n",
                "first",
                &sample("[1]", "1"),
            )
            .await
            .unwrap();
        assert_eq!(
            actual,
            Err(ExecFailure::RuntimeFailure(
                "IndexError: list index out of range".into()
            ))
        );

        let freeform = exec
            .run_once("python", "print('Hello, Python!')", None)
            .await
            .unwrap();
        assert_eq!(freeform.output, "Hello, Python!");
    }
}
