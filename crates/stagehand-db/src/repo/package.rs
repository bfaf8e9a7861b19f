//! Package repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use stagehand_core::package::{PackageKind, PackageModel, PackageState};
use stagehand_core::Guid;

use crate::{DbError, DbResult};

#[async_trait]
pub trait PackageRepo: Send + Sync {
    /// Create a package. A bits package starts `CREATED` (awaiting
    /// upload); a docker package starts `READY`.
    async fn create(
        &self,
        app_guid: &Guid,
        kind: PackageKind,
        docker_image: Option<&str>,
    ) -> DbResult<PackageModel>;

    async fn get(&self, guid: &Guid) -> DbResult<PackageModel>;

    /// Record a finished bits upload: sets the content hash and `READY`.
    async fn record_upload(&self, guid: &Guid, package_hash: &str) -> DbResult<PackageModel>;
}

#[derive(Debug, sqlx::FromRow)]
struct PackageRow {
    guid: uuid::Uuid,
    app_guid: uuid::Uuid,
    kind: String,
    package_hash: Option<String>,
    docker_image: Option<String>,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PackageRow {
    fn into_model(self) -> DbResult<PackageModel> {
        let kind: PackageKind = self
            .kind
            .parse()
            .map_err(|_| DbError::Corrupt(format!("package {}: kind {}", self.guid, self.kind)))?;
        let state: PackageState = self
            .state
            .parse()
            .map_err(|_| DbError::Corrupt(format!("package {}: state {}", self.guid, self.state)))?;
        Ok(PackageModel {
            guid: self.guid.into(),
            app_guid: self.app_guid.into(),
            kind,
            package_hash: self.package_hash,
            docker_image: self.docker_image,
            state,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// PostgreSQL implementation of PackageRepo.
pub struct PgPackageRepo {
    pool: PgPool,
}

impl PgPackageRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PackageRepo for PgPackageRepo {
    async fn create(
        &self,
        app_guid: &Guid,
        kind: PackageKind,
        docker_image: Option<&str>,
    ) -> DbResult<PackageModel> {
        let state = PackageState::initial_for(kind);
        let row = sqlx::query_as::<_, PackageRow>(
            r#"
            INSERT INTO packages (guid, app_guid, kind, docker_image, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(app_guid.as_uuid())
        .bind(kind.as_str())
        .bind(docker_image)
        .bind(state.as_str())
        .fetch_one(&self.pool)
        .await?;
        row.into_model()
    }

    async fn get(&self, guid: &Guid) -> DbResult<PackageModel> {
        let row = sqlx::query_as::<_, PackageRow>("SELECT * FROM packages WHERE guid = $1")
            .bind(guid.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("package {guid}")))?;
        row.into_model()
    }

    async fn record_upload(&self, guid: &Guid, package_hash: &str) -> DbResult<PackageModel> {
        let row = sqlx::query_as::<_, PackageRow>(
            r#"
            UPDATE packages SET package_hash = $2, state = 'READY', updated_at = NOW()
            WHERE guid = $1
            RETURNING *
            "#,
        )
        .bind(guid.as_uuid())
        .bind(package_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("package {guid}")))?;
        row.into_model()
    }
}
