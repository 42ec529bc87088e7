//! Redis Manager - job queue, replies and submission records
//!
//! - Job queue consumption (BLPOP)
//! - Reply storage and publishing
//! - Submission persistence (RPUSH)

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::AsyncCommands;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::jobs::{JobResponse, WorkerJob};
use crate::store::{SubmissionRecord, SubmissionStore};

/// Redis key constants
pub mod keys {
    /// Grader job queue key
    pub const GRADER_QUEUE: &str = "grader:queue";

    /// Reply key prefix (for polling)
    pub const RESULT_PREFIX: &str = "grader:result:";

    /// Reply channel (for pub/sub)
    pub const RESULT_CHANNEL: &str = "grader:results";

    /// List of persisted submission records
    pub const SUBMISSIONS: &str = "grader:submissions";
}

const RESULT_EXPIRY_SECS: u64 = 3600; // 1 hour
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Connect backoff for the submission store: base^n * factor ms, n < retries
const STORE_BACKOFF_BASE: u64 = 2;
const STORE_BACKOFF_FACTOR_MS: u64 = 100;
const STORE_CONNECT_RETRIES: usize = 3;

pub struct RedisManager {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisManager {
    pub async fn with_url(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;
        let conn = get_connection_with_retry(&client).await?;
        info!("Connected to Redis at {}", redis_url);

        Ok(Self { client, conn })
    }

    /// Block until the next well-formed job arrives.
    ///
    /// Malformed payloads are logged and skipped. Reconnects on failure.
    pub async fn pop_job(&mut self) -> Result<WorkerJob> {
        loop {
            let result: Option<(String, String)> =
                match self.conn.blpop(keys::GRADER_QUEUE, 0.0).await {
                    Ok(res) => res,
                    Err(e) => {
                        warn!("Redis BLPOP failed: {}. Reconnecting...", e);
                        self.reconnect().await?;
                        continue;
                    }
                };

            if let Some((_, job_data)) = result {
                match serde_json::from_str::<WorkerJob>(&job_data) {
                    Ok(job) => return Ok(job),
                    Err(e) => {
                        warn!("Failed to parse job data: {}. Data: {}", e, job_data);
                        continue;
                    }
                }
            }
        }
    }

    /// Store a reply with a 1-hour expiry and publish it
    pub async fn store_reply(&mut self, response: &JobResponse) -> Result<()> {
        self.store_result(
            &format!("{}{}", keys::RESULT_PREFIX, response.request_id),
            Some(keys::RESULT_CHANNEL),
            response,
        )
        .await
    }

    /// A submission store on the same server, with its own reconnecting
    /// connection
    pub fn submission_store(&self) -> RedisSubmissionStore {
        RedisSubmissionStore::new(self.client.clone())
    }

    async fn store_result<T: Serialize>(
        &mut self,
        key: &str,
        channel: Option<&str>,
        result: &T,
    ) -> Result<()> {
        let json = serde_json::to_string(result)?;

        if let Err(e) = self
            .conn
            .set_ex::<_, _, ()>(key, &json, RESULT_EXPIRY_SECS)
            .await
        {
            warn!("Failed to store result: {}. Reconnecting...", e);
            self.reconnect().await?;
            self.conn
                .set_ex::<_, _, ()>(key, &json, RESULT_EXPIRY_SECS)
                .await?;
        }

        // No subscribers is not an error
        if let Some(chan) = channel {
            let _ = self.conn.publish::<_, _, ()>(chan, &json).await;
        }

        Ok(())
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.conn = get_connection_with_retry(&self.client).await?;
        Ok(())
    }
}

/// Appends submission records to a Redis list.
///
/// The connection is opened on first use and then re-established by
/// `ConnectionManager` whenever it drops. A failed first connect is retried
/// on the next save.
pub struct RedisSubmissionStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
}

impl RedisSubmissionStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            conn: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = ConnectionManager::new_with_backoff(
                    self.client.clone(),
                    STORE_BACKOFF_BASE,
                    STORE_BACKOFF_FACTOR_MS,
                    STORE_CONNECT_RETRIES,
                )
                .await
                .context("Failed to connect submission store to Redis")?;
                info!("Submission store connected");
                Ok::<_, anyhow::Error>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl SubmissionStore for RedisSubmissionStore {
    async fn save(&self, record: &SubmissionRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let mut conn = self.connection().await?;
        conn.rpush::<_, _, ()>(keys::SUBMISSIONS, &json)
            .await
            .context("Failed to push submission record")?;
        Ok(())
    }
}

async fn get_connection_with_retry(client: &redis::Client) -> Result<MultiplexedConnection> {
    loop {
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                warn!(
                    "Failed to connect to Redis: {}. Retrying in {}s...",
                    e,
                    RECONNECT_DELAY.as_secs()
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
