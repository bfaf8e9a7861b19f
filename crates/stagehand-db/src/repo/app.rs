//! App and process repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;

use stagehand_core::app::AppModel;
use stagehand_core::lifecycle::LifecycleSpec;
use stagehand_core::process::{ProcessModel, WEB_PROCESS_TYPE};
use stagehand_core::Guid;

use crate::{DbError, DbResult};

#[async_trait]
pub trait AppRepo: Send + Sync {
    async fn get(&self, guid: &Guid) -> DbResult<AppModel>;

    /// All processes of an app.
    async fn processes(&self, app_guid: &Guid) -> DbResult<Vec<ProcessModel>>;

    /// The app's primary ("web") process, if it has one.
    async fn web_process(&self, app_guid: &Guid) -> DbResult<Option<ProcessModel>>;

    /// Point the app at a newly staged droplet. Runs under an exclusive
    /// lock on the app row so concurrent completions serialize.
    async fn assign_current_droplet(&self, app_guid: &Guid, droplet_guid: &Guid) -> DbResult<()>;
}

#[derive(Debug, sqlx::FromRow)]
struct AppRow {
    guid: uuid::Uuid,
    name: String,
    droplet_guid: Option<uuid::Uuid>,
    lifecycle: serde_json::Value,
    environment_variables: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AppRow {
    fn into_model(self) -> DbResult<AppModel> {
        let lifecycle: LifecycleSpec = serde_json::from_value(self.lifecycle)
            .map_err(|e| DbError::Corrupt(format!("app {}: lifecycle: {e}", self.guid)))?;
        let environment_variables: HashMap<String, String> = match self.environment_variables {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                DbError::Corrupt(format!("app {}: environment_variables: {e}", self.guid))
            })?,
            None => HashMap::new(),
        };
        Ok(AppModel {
            guid: self.guid.into(),
            name: self.name,
            droplet_guid: self.droplet_guid.map(Into::into),
            lifecycle,
            environment_variables,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProcessRow {
    guid: uuid::Uuid,
    version: uuid::Uuid,
    app_guid: uuid::Uuid,
    process_type: String,
    command: Option<String>,
    clustered: bool,
    health_check_timeout_secs: Option<i32>,
    instances: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProcessRow> for ProcessModel {
    fn from(row: ProcessRow) -> Self {
        ProcessModel {
            guid: row.guid.into(),
            version: row.version.into(),
            app_guid: row.app_guid.into(),
            process_type: row.process_type,
            command: row.command,
            clustered: row.clustered,
            health_check_timeout_secs: row.health_check_timeout_secs.map(|t| t as u32),
            instances: row.instances.max(0) as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// PostgreSQL implementation of AppRepo.
pub struct PgAppRepo {
    pool: PgPool,
}

impl PgAppRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AppRepo for PgAppRepo {
    async fn get(&self, guid: &Guid) -> DbResult<AppModel> {
        let row = sqlx::query_as::<_, AppRow>("SELECT * FROM apps WHERE guid = $1")
            .bind(guid.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("app {guid}")))?;
        row.into_model()
    }

    async fn processes(&self, app_guid: &Guid) -> DbResult<Vec<ProcessModel>> {
        let rows = sqlx::query_as::<_, ProcessRow>(
            "SELECT * FROM processes WHERE app_guid = $1 ORDER BY process_type",
        )
        .bind(app_guid.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn web_process(&self, app_guid: &Guid) -> DbResult<Option<ProcessModel>> {
        let row = sqlx::query_as::<_, ProcessRow>(
            "SELECT * FROM processes WHERE app_guid = $1 AND process_type = $2",
        )
        .bind(app_guid.as_uuid())
        .bind(WEB_PROCESS_TYPE)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn assign_current_droplet(&self, app_guid: &Guid, droplet_guid: &Guid) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT guid FROM apps WHERE guid = $1 FOR UPDATE")
            .bind(app_guid.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("app {app_guid}")))?;

        sqlx::query("UPDATE apps SET droplet_guid = $2, updated_at = NOW() WHERE guid = $1")
            .bind(app_guid.as_uuid())
            .bind(droplet_guid.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
