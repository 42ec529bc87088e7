use serde::{Deserialize, Serialize};
use tracing::info;

use super::{JobContext, ResponseBody};
use crate::error::GraderError;
use crate::store::{Question, SubmissionRecord};

fn default_language() -> String {
    "python".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunSamplesJob {
    pub request_id: String,
    pub question_id: i64,
    #[serde(default = "default_language")]
    pub language: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJob {
    pub request_id: String,
    pub user_id: i64,
    pub question_id: i64,
    #[serde(default = "default_language")]
    pub language: String,
    pub code: String,
}

async fn load_question(ctx: &JobContext, id: i64) -> Result<Question, GraderError> {
    ctx.questions
        .get_question(id)
        .await
        .map_err(GraderError::Question)?
        .ok_or(GraderError::QuestionNotFound(id))
}

/// Grade against the sample tests only; nothing is persisted
pub async fn process_run_samples_job(
    job: &RunSamplesJob,
    ctx: &JobContext,
) -> Result<ResponseBody, GraderError> {
    let question = load_question(ctx, job.question_id).await?;
    let samples = question.sample_tests();

    let report = ctx
        .executor
        .grade(&job.language, &job.code, &question.entry_point, &samples)
        .await?;
    Ok(report.into())
}

/// Grade against every test, then persist the verdict
pub async fn process_submit_job(
    job: &SubmitJob,
    ctx: &JobContext,
) -> Result<ResponseBody, GraderError> {
    let question = load_question(ctx, job.question_id).await?;

    let report = ctx
        .executor
        .grade(
            &job.language,
            &job.code,
            &question.entry_point,
            &question.test_cases,
        )
        .await?;

    let record = SubmissionRecord::new(
        job.user_id,
        job.question_id,
        &job.language,
        &job.code,
        &report,
    );
    ctx.submissions
        .save(&record)
        .await
        .map_err(GraderError::PersistenceFailure)?;
    info!(
        "Saved submission: user_id={}, question_id={}, result={:?}",
        record.user_id, record.question_id, record.result
    );

    Ok(report.into())
}
