//! Process model: a named runnable role of an app.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Guid;

/// The primary process role started after staging.
pub const WEB_PROCESS_TYPE: &str = "web";

/// A process record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessModel {
    pub guid: Guid,
    /// Bumped whenever the process definition changes; part of the
    /// process correlation id so stale control messages are ignorable.
    pub version: Guid,
    pub app_guid: Guid,
    /// Role name, e.g. "web" or "worker".
    pub process_type: String,
    /// Start command override; `None` falls back to the droplet's
    /// detected command for this role.
    pub command: Option<String>,
    /// Whether this process is placed on the cluster-capable backend.
    pub clustered: bool,
    pub health_check_timeout_secs: Option<u32>,
    pub instances: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessModel {
    pub fn is_web(&self) -> bool {
        self.process_type == WEB_PROCESS_TYPE
    }
}
