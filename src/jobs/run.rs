use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{JobContext, ResponseBody};
use crate::error::{ErrorKind, GraderError};

#[derive(Debug, Serialize, Deserialize)]
pub struct RunJob {
    pub request_id: String,
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub stdin: Option<String>,
}

/// Run once, no harness; the console output is the reply
pub async fn process_run_job(job: &RunJob, ctx: &JobContext) -> Result<ResponseBody, GraderError> {
    let result = ctx
        .executor
        .run_once(&job.language, &job.code, job.stdin.as_deref())
        .await?;

    if result.success {
        return Ok(ResponseBody::Output {
            output: result.output,
        });
    }

    let kind = result
        .failure
        .as_ref()
        .map(|f| f.kind())
        .unwrap_or(ErrorKind::RuntimeFailure);
    debug!("Run job {} failed: kind={}", job.request_id, kind);
    Ok(ResponseBody::Error {
        error: result.output,
        kind,
    })
}
