//! Result reducer
//!
//! Turns per-test actual outputs into pass/fail results and an aggregate
//! verdict, hiding the details of non-sample tests.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{ExecFailure, GraderError};

/// Shown in place of input/expected/actual for hidden tests
pub const REDACTED: &str = "Hidden";

/// One test case as supplied by the question store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Piped verbatim to the program's stdin (usually JSON)
    pub input: String,
    /// JSON text of the expected return value
    pub expected_output: String,
    #[serde(default)]
    pub is_sample: bool,
}

/// Decoded return value, or why there is none
pub type ActualOutput = Result<Value, ExecFailure>;

/// Per-test result as exposed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub passed: bool,
    pub input: String,
    pub expected: String,
    pub actual: String,
}

/// Aggregate verdict of a grading run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeReport {
    pub passed: bool,
    pub results: Vec<TestResult>,
}

impl GradeReport {
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }
}

/// Reduce `(test, actual)` pairs in order into a report
pub fn grade(runs: Vec<(TestCase, ActualOutput)>) -> Result<GradeReport, GraderError> {
    if runs.is_empty() {
        return Err(GraderError::NoTestCases);
    }

    let results: Vec<TestResult> = runs
        .into_iter()
        .map(|(test, actual)| {
            let expected = decode_expected(&test.expected_output);
            let passed = match &actual {
                Ok(value) => json_equal(value, &expected),
                Err(_) => false,
            };

            if test.is_sample {
                TestResult {
                    passed,
                    input: test.input,
                    expected: test.expected_output,
                    actual: render_actual(&actual),
                }
            } else {
                TestResult {
                    passed,
                    input: REDACTED.to_string(),
                    expected: REDACTED.to_string(),
                    actual: REDACTED.to_string(),
                }
            }
        })
        .collect();

    let passed = results.iter().all(|r| r.passed);
    Ok(GradeReport { passed, results })
}

/// Expected output is JSON; anything that does not parse is taken as a
/// string literal of its trimmed text.
pub fn decode_expected(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.trim().to_string()))
}

/// Structural equality over JSON values. Object key order is ignored and
/// numbers compare by value, so `6` equals `6.0`.
pub fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    if x.is_f64() || y.is_f64() {
        if let (Some(a), Some(b)) = (x.as_f64(), y.as_f64()) {
            return a == b;
        }
    }
    false
}

/// Text shown as `actual`: the compact JSON value, or an error object
pub fn render_actual(actual: &ActualOutput) -> String {
    let rendered = match actual {
        Ok(value) => return value.to_string(),
        Err(ExecFailure::MalformedOutput(raw)) => serde_json::json!({
            "error": "Malformed output",
            "output": raw,
        }),
        Err(failure) => serde_json::json!({ "error": failure.to_string() }),
    };
    rendered.to_string()
}
