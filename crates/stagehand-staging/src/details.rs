//! Per-attempt staging parameters.

use std::collections::HashMap;

use stagehand_core::lifecycle::LifecycleSpec;
use stagehand_core::Guid;

/// Everything a single staging attempt needs, assembled by the caller,
/// consumed by the lifecycle protocol and the messenger, and discarded
/// after dispatch. Never persisted.
#[derive(Debug, Clone)]
pub struct StagingDetails {
    /// The droplet this attempt will produce; also the staging
    /// correlation id.
    pub droplet_guid: Guid,
    pub staging_memory_mb: u32,
    pub staging_disk_mb: u32,
    pub environment_variables: HashMap<String, String>,
    pub lifecycle: LifecycleSpec,
}
