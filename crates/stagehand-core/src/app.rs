//! App model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::Guid;
use crate::lifecycle::LifecycleSpec;

/// An app record.
///
/// The app owns its droplets for lifecycle purposes; `droplet_guid` is the
/// droplet currently used at run-time and is only repointed under an
/// exclusive row lock when a staging completion promotes a new droplet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppModel {
    pub guid: Guid,
    pub name: String,
    /// Current droplet used for run-time, once one has staged.
    pub droplet_guid: Option<Guid>,
    /// Build strategy configuration.
    pub lifecycle: LifecycleSpec,
    pub environment_variables: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
