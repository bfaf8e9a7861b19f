//! Droplet repository.
//!
//! Every state transition runs as a read-modify-write under an exclusive
//! row lock, so concurrent completions for the same droplet serialize and
//! terminal states never regress.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;

use stagehand_core::Guid;
use stagehand_core::droplet::{DropletModel, DropletState, StagedResult};
use stagehand_core::lifecycle::{BuildpackLifecycle, LifecycleKind, LifecycleSpec};

use crate::{DbError, DbResult};

/// Parameters for creating a droplet for a new staging attempt.
#[derive(Debug, Clone)]
pub struct NewDroplet {
    pub app_guid: Guid,
    pub package_guid: Option<Guid>,
    pub lifecycle: LifecycleSpec,
}

#[async_trait]
pub trait DropletRepo: Send + Sync {
    /// Create a droplet in `PENDING` for a fresh staging attempt.
    async fn create(&self, new: NewDroplet) -> DbResult<DropletModel>;

    async fn get(&self, guid: &Guid) -> DbResult<DropletModel>;

    /// The app's newest droplet, i.e. its most recent staging attempt.
    async fn latest_for_app(&self, app_guid: &Guid) -> DbResult<Option<DropletModel>>;

    /// `PENDING` -> `STAGING`, once the stage request is on the wire.
    async fn mark_staging(&self, guid: &Guid) -> DbResult<DropletModel>;

    /// Record a successful completion and move to `STAGED`.
    async fn mark_staged(&self, guid: &Guid, result: &StagedResult) -> DbResult<DropletModel>;

    /// Record a failed completion and move to `FAILED`.
    async fn mark_failed(
        &self,
        guid: &Guid,
        error_id: &str,
        error_description: &str,
    ) -> DbResult<DropletModel>;
}

/// A droplet row as stored.
#[derive(Debug, sqlx::FromRow)]
struct DropletRow {
    guid: uuid::Uuid,
    app_guid: uuid::Uuid,
    package_guid: Option<uuid::Uuid>,
    lifecycle: String,
    state: String,
    error_id: Option<String>,
    error_description: Option<String>,
    process_types: Option<serde_json::Value>,
    execution_metadata: String,
    buildpack_receipt_buildpack: Option<String>,
    buildpack_receipt_buildpack_key: Option<String>,
    buildpack_receipt_stack: Option<String>,
    docker_receipt_image: Option<String>,
    droplet_hash: Option<String>,
    buildpack_lifecycle: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DropletRow {
    fn into_model(self) -> DbResult<DropletModel> {
        let state: DropletState = self
            .state
            .parse()
            .map_err(|_| DbError::Corrupt(format!("droplet {}: state {}", self.guid, self.state)))?;
        let lifecycle: LifecycleKind = self.lifecycle.parse().map_err(|_| {
            DbError::Corrupt(format!("droplet {}: lifecycle {}", self.guid, self.lifecycle))
        })?;
        let process_types: HashMap<String, String> = match self.process_types {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| DbError::Corrupt(format!("droplet {}: process_types: {e}", self.guid)))?,
            None => HashMap::new(),
        };
        let buildpack_lifecycle: Option<BuildpackLifecycle> = match self.buildpack_lifecycle {
            Some(value) => Some(serde_json::from_value(value).map_err(|e| {
                DbError::Corrupt(format!("droplet {}: buildpack_lifecycle: {e}", self.guid))
            })?),
            None => None,
        };

        Ok(DropletModel {
            guid: self.guid.into(),
            app_guid: self.app_guid.into(),
            package_guid: self.package_guid.map(Into::into),
            lifecycle,
            state,
            error_id: self.error_id,
            error_description: self.error_description,
            process_types,
            execution_metadata: self.execution_metadata,
            buildpack_receipt_buildpack: self.buildpack_receipt_buildpack,
            buildpack_receipt_buildpack_key: self.buildpack_receipt_buildpack_key,
            buildpack_receipt_stack: self.buildpack_receipt_stack,
            docker_receipt_image: self.docker_receipt_image,
            droplet_hash: self.droplet_hash,
            buildpack_lifecycle,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// PostgreSQL implementation of DropletRepo.
pub struct PgDropletRepo {
    pool: PgPool,
}

impl PgDropletRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock a droplet row for update inside the given transaction and
    /// refuse the update when the row already reached a terminal state.
    async fn lock_non_terminal(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        guid: &Guid,
    ) -> DbResult<()> {
        let row = sqlx::query_as::<_, DropletRow>("SELECT * FROM droplets WHERE guid = $1 FOR UPDATE")
            .bind(guid.as_uuid())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("droplet {guid}")))?;

        let state: DropletState = row
            .state
            .parse()
            .map_err(|_| DbError::Corrupt(format!("droplet {guid}: state {}", row.state)))?;
        if state.is_terminal() {
            return Err(DbError::Stale(format!(
                "droplet {guid} is already {state}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DropletRepo for PgDropletRepo {
    async fn create(&self, new: NewDroplet) -> DbResult<DropletModel> {
        let buildpack_lifecycle = match &new.lifecycle {
            LifecycleSpec::Buildpack(data) => Some(
                serde_json::to_value(data)
                    .map_err(|e| DbError::Corrupt(format!("buildpack lifecycle: {e}")))?,
            ),
            LifecycleSpec::Docker(_) => None,
        };

        let row = sqlx::query_as::<_, DropletRow>(
            r#"
            INSERT INTO droplets
                (guid, app_guid, package_guid, lifecycle, state, execution_metadata,
                 buildpack_lifecycle, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'PENDING', '', $5, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(new.app_guid.as_uuid())
        .bind(new.package_guid.map(|g| *g.as_uuid()))
        .bind(new.lifecycle.kind().as_str())
        .bind(buildpack_lifecycle)
        .fetch_one(&self.pool)
        .await?;
        row.into_model()
    }

    async fn get(&self, guid: &Guid) -> DbResult<DropletModel> {
        let row = sqlx::query_as::<_, DropletRow>("SELECT * FROM droplets WHERE guid = $1")
            .bind(guid.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("droplet {guid}")))?;
        row.into_model()
    }

    async fn latest_for_app(&self, app_guid: &Guid) -> DbResult<Option<DropletModel>> {
        let row = sqlx::query_as::<_, DropletRow>(
            "SELECT * FROM droplets WHERE app_guid = $1 ORDER BY created_at DESC, guid DESC LIMIT 1",
        )
        .bind(app_guid.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(DropletRow::into_model).transpose()
    }

    async fn mark_staging(&self, guid: &Guid) -> DbResult<DropletModel> {
        let mut tx = self.pool.begin().await?;
        Self::lock_non_terminal(&mut tx, guid).await?;

        let row = sqlx::query_as::<_, DropletRow>(
            r#"
            UPDATE droplets SET state = 'STAGING', updated_at = NOW()
            WHERE guid = $1
            RETURNING *
            "#,
        )
        .bind(guid.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        row.into_model()
    }

    async fn mark_staged(&self, guid: &Guid, result: &StagedResult) -> DbResult<DropletModel> {
        let process_types = serde_json::to_value(&result.process_types)
            .map_err(|e| DbError::Corrupt(format!("process_types: {e}")))?;
        let receipt = result.buildpack_receipt.as_ref();

        let mut tx = self.pool.begin().await?;
        Self::lock_non_terminal(&mut tx, guid).await?;

        let row = sqlx::query_as::<_, DropletRow>(
            r#"
            UPDATE droplets SET
                state = 'STAGED',
                process_types = $2,
                execution_metadata = $3,
                buildpack_receipt_buildpack = $4,
                buildpack_receipt_buildpack_key = $5,
                buildpack_receipt_stack = $6,
                docker_receipt_image = $7,
                updated_at = NOW()
            WHERE guid = $1
            RETURNING *
            "#,
        )
        .bind(guid.as_uuid())
        .bind(process_types)
        .bind(&result.execution_metadata)
        .bind(receipt.map(|r| r.buildpack.as_str()))
        .bind(receipt.and_then(|r| r.buildpack_key.as_deref()))
        .bind(receipt.and_then(|r| r.stack.as_deref()))
        .bind(result.docker_image.as_deref())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        row.into_model()
    }

    async fn mark_failed(
        &self,
        guid: &Guid,
        error_id: &str,
        error_description: &str,
    ) -> DbResult<DropletModel> {
        let mut tx = self.pool.begin().await?;
        Self::lock_non_terminal(&mut tx, guid).await?;

        let row = sqlx::query_as::<_, DropletRow>(
            r#"
            UPDATE droplets SET
                state = 'FAILED',
                error_id = $2,
                error_description = $3,
                updated_at = NOW()
            WHERE guid = $1
            RETURNING *
            "#,
        )
        .bind(guid.as_uuid())
        .bind(error_id)
        .bind(error_description)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        row.into_model()
    }
}
