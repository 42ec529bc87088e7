use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use grader::executor::Executor;
use grader::jobs::{process_job, JobContext};
use grader::languages::ToolchainRegistry;
use grader::redis_manager::RedisManager;
use grader::store::FileQuestionStore;
use grader::GraderConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("grader=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = Arc::new(GraderConfig::from_env().context("Invalid configuration")?);

    let registry = match &config.languages_config {
        Some(path) => {
            let registry = ToolchainRegistry::from_file(path)?;
            info!("Loaded language configurations from {:?}", path);
            registry
        }
        None => ToolchainRegistry::builtin().context("Built-in language table is invalid")?,
    };
    for (language, binary) in registry.missing_binaries(&config.exec_path) {
        warn!(
            "Toolchain binary {} for {} not found on {}",
            binary, language, config.exec_path
        );
    }
    info!("Supported languages: {}", registry.supported_languages().join(", "));

    info!("Starting grader worker...");
    let mut redis = RedisManager::with_url(&config.redis_url).await?;

    let ctx = JobContext {
        executor: Executor::new(Arc::new(registry), Arc::clone(&config)),
        questions: Arc::new(FileQuestionStore::new(&config.questions_dir)),
        submissions: Arc::new(redis.submission_store()),
    };
    info!(
        "Questions from {:?}, workspaces under {:?}",
        config.questions_dir, config.workspace_root
    );

    info!("Waiting for jobs...");
    loop {
        let job = redis.pop_job().await?;
        let response = process_job(job, &ctx).await;

        if let Err(e) = redis.store_reply(&response).await {
            error!(
                "Failed to store reply for request {}: {:#}",
                response.request_id, e
            );
        }
    }
}
