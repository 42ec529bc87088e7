pub mod grading;
pub mod run;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{ErrorKind, GraderError};
use crate::executor::Executor;
use crate::grader::{GradeReport, TestResult};
use crate::jobs::grading::{RunSamplesJob, SubmitJob};
use crate::jobs::run::RunJob;
use crate::store::{QuestionStore, SubmissionStore};

/// Worker job enum - the job kinds accepted on the queue
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "job_type")]
pub enum WorkerJob {
    /// Run code once and return its output
    #[serde(rename = "run")]
    Run(RunJob),
    /// Grade code against a question's sample tests
    #[serde(rename = "run_samples")]
    RunSamples(RunSamplesJob),
    /// Grade code against all tests and persist the verdict
    #[serde(rename = "submit")]
    Submit(SubmitJob),
}

impl WorkerJob {
    pub fn request_id(&self) -> &str {
        match self {
            WorkerJob::Run(job) => &job.request_id,
            WorkerJob::RunSamples(job) => &job.request_id,
            WorkerJob::Submit(job) => &job.request_id,
        }
    }
}

/// Reply stored for the requester
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResponse {
    pub request_id: String,
    #[serde(flatten)]
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Output {
        output: String,
    },
    Graded {
        passed: bool,
        results: Vec<TestResult>,
    },
    Error {
        error: String,
        kind: ErrorKind,
    },
}

impl ResponseBody {
    pub fn from_error(err: &GraderError) -> Self {
        let error = match err {
            GraderError::PersistenceFailure(_) => "Failed to save submission".to_string(),
            other => other.to_string(),
        };
        ResponseBody::Error {
            error,
            kind: err.kind(),
        }
    }
}

impl From<GradeReport> for ResponseBody {
    fn from(report: GradeReport) -> Self {
        ResponseBody::Graded {
            passed: report.passed,
            results: report.results,
        }
    }
}

/// Everything a job handler needs
#[derive(Clone)]
pub struct JobContext {
    pub executor: Executor,
    pub questions: Arc<dyn QuestionStore>,
    pub submissions: Arc<dyn SubmissionStore>,
}

/// Handle one job; every outcome becomes a reply
pub async fn process_job(job: WorkerJob, ctx: &JobContext) -> JobResponse {
    let request_id = job.request_id().to_string();

    let outcome = match &job {
        WorkerJob::Run(job) => {
            info!(
                "Received run job: request_id={}, language={}",
                job.request_id, job.language
            );
            run::process_run_job(job, ctx).await
        }
        WorkerJob::RunSamples(job) => {
            info!(
                "Received run_samples job: request_id={}, question_id={}, language={}",
                job.request_id, job.question_id, job.language
            );
            grading::process_run_samples_job(job, ctx).await
        }
        WorkerJob::Submit(job) => {
            info!(
                "Received submit job: request_id={}, user_id={}, question_id={}, language={}",
                job.request_id, job.user_id, job.question_id, job.language
            );
            grading::process_submit_job(job, ctx).await
        }
    };

    let body = match outcome {
        Ok(body) => body,
        Err(e) if e.is_rejection() => {
            warn!("Rejected request {}: {}", request_id, e);
            ResponseBody::from_error(&e)
        }
        Err(e) => {
            error!("Request {} failed: {}", request_id, e);
            ResponseBody::from_error(&e)
        }
    };

    JobResponse { request_id, body }
}
