//! Curated buildpack repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use stagehand_core::buildpack::BuildpackModel;
use stagehand_core::Guid;

use crate::DbResult;

#[async_trait]
pub trait BuildpackRepo: Send + Sync {
    /// Number of buildpacks registered, enabled or not.
    async fn count(&self) -> DbResult<i64>;

    /// Enabled buildpacks in detection (position) order.
    async fn list_enabled(&self) -> DbResult<Vec<BuildpackModel>>;

    async fn find_by_name(&self, name: &str) -> DbResult<Option<BuildpackModel>>;
}

#[derive(Debug, sqlx::FromRow)]
struct BuildpackRow {
    guid: uuid::Uuid,
    name: String,
    key: String,
    position: i32,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BuildpackRow> for BuildpackModel {
    fn from(row: BuildpackRow) -> Self {
        BuildpackModel {
            guid: row.guid.into(),
            name: row.name,
            key: row.key,
            position: row.position,
            enabled: row.enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// PostgreSQL implementation of BuildpackRepo.
pub struct PgBuildpackRepo {
    pool: PgPool,
}

impl PgBuildpackRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BuildpackRepo for PgBuildpackRepo {
    async fn count(&self) -> DbResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM buildpacks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    async fn list_enabled(&self) -> DbResult<Vec<BuildpackModel>> {
        let rows = sqlx::query_as::<_, BuildpackRow>(
            "SELECT * FROM buildpacks WHERE enabled ORDER BY position ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_by_name(&self, name: &str) -> DbResult<Option<BuildpackModel>> {
        let row = sqlx::query_as::<_, BuildpackRow>("SELECT * FROM buildpacks WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }
}
