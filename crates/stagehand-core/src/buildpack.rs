//! Curated buildpack registry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Guid;

/// A curated buildpack registered in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildpackModel {
    pub guid: Guid,
    pub name: String,
    /// Well-known blobstore key under which the buildpack is stored.
    pub key: String,
    /// Detection order; lower positions are tried first.
    pub position: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
