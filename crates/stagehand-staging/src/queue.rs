//! Postgres-backed message channels.
//!
//! Tables act as ordered channels: producers INSERT, consumers claim with
//! `FOR UPDATE SKIP LOCKED` so multiple workers never contend on the same
//! message.

use async_trait::async_trait;
use sqlx::PgPool;

use stagehand_core::runtime::{AppControlClient, DesireRequest, ProcessGuid};
use stagehand_core::stager::{StagerClient, StagingGuid, StagingRequest};
use stagehand_core::{Error, Result};
use stagehand_db::DbResult;

fn dispatch_error(error: sqlx::Error) -> Error {
    Error::DispatchFailed(error.to_string())
}

/// Sends stage requests onto one backend's staging channel.
pub struct PgStagerClient {
    pool: PgPool,
    channel: String,
}

impl PgStagerClient {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl StagerClient for PgStagerClient {
    async fn stage(&self, staging_guid: &StagingGuid, request: &StagingRequest) -> Result<()> {
        let payload =
            serde_json::to_value(request).map_err(|e| Error::Internal(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO staging_requests (channel, staging_guid, kind, payload)
            VALUES ($1, $2, 'stage', $3)
            "#,
        )
        .bind(&self.channel)
        .bind(staging_guid.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(dispatch_error)?;
        Ok(())
    }

    async fn stop_staging(&self, staging_guid: &StagingGuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO staging_requests (channel, staging_guid, kind)
            VALUES ($1, $2, 'stop_staging')
            "#,
        )
        .bind(&self.channel)
        .bind(staging_guid.as_str())
        .execute(&self.pool)
        .await
        .map_err(dispatch_error)?;
        Ok(())
    }
}

/// Sends process-lifecycle control messages.
pub struct PgAppControlClient {
    pool: PgPool,
}

impl PgAppControlClient {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn send(
        &self,
        process_guid: &ProcessGuid,
        kind: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO process_control_requests (process_guid, kind, payload)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(process_guid.as_str())
        .bind(kind)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(dispatch_error)?;
        Ok(())
    }
}

#[async_trait]
impl AppControlClient for PgAppControlClient {
    async fn desire_app(&self, process_guid: &ProcessGuid, request: &DesireRequest) -> Result<()> {
        let payload =
            serde_json::to_value(request).map_err(|e| Error::Internal(e.to_string()))?;
        self.send(process_guid, "desire", Some(payload)).await
    }

    async fn stop_index(&self, process_guid: &ProcessGuid, index: u32) -> Result<()> {
        self.send(
            process_guid,
            "stop_index",
            Some(serde_json::json!({ "index": index })),
        )
        .await
    }

    async fn stop_app(&self, process_guid: &ProcessGuid) -> Result<()> {
        self.send(process_guid, "stop_app", None).await
    }
}

/// A claimed completion callback.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompletionMessage {
    pub id: i64,
    pub staging_guid: String,
    pub payload: serde_json::Value,
}

/// The inbound staging-completion channel.
pub struct PgCompletionQueue {
    pool: PgPool,
}

impl PgCompletionQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Publish a completion callback. Backends (and tests) use this; the
    /// worker only claims.
    pub async fn publish(
        &self,
        staging_guid: &StagingGuid,
        payload: &serde_json::Value,
    ) -> DbResult<()> {
        sqlx::query("INSERT INTO staging_completions (staging_guid, payload) VALUES ($1, $2)")
            .bind(staging_guid.as_str())
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Claim the oldest pending completion.
    /// Uses SKIP LOCKED so concurrent workers never block each other.
    pub async fn claim(&self, worker_id: &str) -> DbResult<Option<CompletionMessage>> {
        let message = sqlx::query_as::<_, CompletionMessage>(
            r#"
            UPDATE staging_completions
            SET status = 'claimed', claimed_by = $1, claimed_at = NOW()
            WHERE id = (
                SELECT id FROM staging_completions
                WHERE status = 'pending'
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, staging_guid, payload
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(message)
    }

    /// Mark a completion as processed.
    pub async fn complete(&self, id: i64) -> DbResult<()> {
        sqlx::query("UPDATE staging_completions SET status = 'completed' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark a completion as failed, for operator follow-up.
    pub async fn fail(&self, id: i64, error: &str) -> DbResult<()> {
        sqlx::query("UPDATE staging_completions SET status = 'failed', error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
