//! Question lookup and submission persistence

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::grader::{GradeReport, TestCase};

/// A coding question: the method to call and its ordered test cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub entry_point: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

impl Question {
    /// Sample tests only, in their original order
    pub fn sample_tests(&self) -> Vec<TestCase> {
        self.test_cases
            .iter()
            .filter(|t| t.is_sample)
            .cloned()
            .collect()
    }
}

#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// `Ok(None)` when no such question exists
    async fn get_question(&self, id: i64) -> Result<Option<Question>>;
}

/// Questions stored as `<dir>/<id>.json`
#[derive(Debug, Clone)]
pub struct FileQuestionStore {
    dir: PathBuf,
}

impl FileQuestionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, id: i64) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

#[async_trait]
impl QuestionStore for FileQuestionStore {
    async fn get_question(&self, id: i64) -> Result<Option<Question>> {
        let path = self.path_for(id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No question file at {:?}", path);
                return Ok(None);
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };

        let question: Question = serde_json::from_str(&content)
            .with_context(|| format!("Invalid question file {:?}", path))?;
        Ok(Some(question))
    }
}

/// Final verdict of a submission as persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionVerdict {
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub user_id: i64,
    pub question_id: i64,
    pub language: String,
    pub code: String,
    pub result: SubmissionVerdict,
    /// Unix seconds
    pub submitted_at: u64,
}

impl SubmissionRecord {
    pub fn new(
        user_id: i64,
        question_id: i64,
        language: &str,
        code: &str,
        report: &GradeReport,
    ) -> Self {
        let submitted_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            user_id,
            question_id,
            language: language.to_string(),
            code: code.to_string(),
            result: if report.passed {
                SubmissionVerdict::Passed
            } else {
                SubmissionVerdict::Failed
            },
            submitted_at,
        }
    }
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn save(&self, record: &SubmissionRecord) -> Result<()>;
}
