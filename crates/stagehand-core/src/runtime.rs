//! Process-lifecycle control protocol and the runner trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::process::ProcessModel;
use crate::Result;

/// Process correlation id: addresses process-lifecycle control messages.
/// Combines the process guid with its version so messages for a stale
/// definition of the process are distinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessGuid(String);

impl ProcessGuid {
    pub fn from_process(process: &ProcessModel) -> Self {
        Self(format!("{}-{}", process.guid, process.version))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProcessGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ask the runtime to run a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesireRequest {
    pub process_guid: String,
    pub start_command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub droplet_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub droplet_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_image: Option<String>,
    pub health_check_timeout_secs: u32,
}

/// Client for the outbound process-control channel. Independent of the
/// staging protocol; these messages never enter the completion state
/// machine.
#[async_trait]
pub trait AppControlClient: Send + Sync {
    async fn desire_app(&self, process_guid: &ProcessGuid, request: &DesireRequest) -> Result<()>;

    async fn stop_index(&self, process_guid: &ProcessGuid, index: u32) -> Result<()>;

    async fn stop_app(&self, process_guid: &ProcessGuid) -> Result<()>;
}

/// Starts and stops app processes from their staged droplets.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Start a process from its app's current droplet.
    async fn start(&self, process: &ProcessModel) -> Result<()>;

    /// Stop every instance of a process.
    async fn stop(&self, process: &ProcessModel) -> Result<()>;

    /// Stop a single instance of a process.
    async fn stop_index(&self, process: &ProcessModel, index: u32) -> Result<()>;
}
