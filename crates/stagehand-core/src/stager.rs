//! Outbound staging wire protocol and the stager client trait.
//!
//! Stage requests are fire-and-forget messages addressed by a staging
//! correlation id; the backend answers later with a completion callback
//! addressed by the same id. Nothing here waits for the backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::lifecycle::LifecycleKind;
use crate::{Guid, Result};

/// Staging correlation id: routes a completion callback back to its
/// originating droplet. Derived from the droplet guid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StagingGuid(String);

impl StagingGuid {
    pub fn from_droplet_guid(droplet_guid: &Guid) -> Self {
        Self(droplet_guid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StagingGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The outbound stage-request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingRequest {
    pub memory_mb: u32,
    pub disk_mb: u32,
    pub environment: HashMap<String, String>,
    pub timeout_secs: u64,
    pub lifecycle: LifecycleKind,
    pub lifecycle_data: LifecycleData,
}

/// Backend-specific build instructions, one variant per lifecycle.
/// The sibling `lifecycle` tag on the envelope identifies the variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LifecycleData {
    Buildpack(BuildpackLifecycleData),
    Docker(DockerLifecycleData),
}

/// Payload for buildpack-based staging. Field names are the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildpackLifecycleData {
    pub app_bits_download_uri: String,
    pub build_artifacts_cache_download_uri: Option<String>,
    pub build_artifacts_cache_upload_uri: String,
    pub droplet_upload_uri: String,
    pub buildpacks: Vec<BuildpackEntry>,
    pub stack: String,
}

/// One buildpack the stager may apply, in detection order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildpackEntry {
    pub name: String,
    pub key: String,
    pub url: String,
    /// True when this buildpack was explicitly requested and detection
    /// should not run.
    pub skip_detect: bool,
}

/// Payload for staging a pre-built image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerLifecycleData {
    pub docker_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_email: Option<String>,
}

/// Client for the outbound staging channel.
///
/// Sends are non-blocking and unacknowledged: `Ok` means accepted for
/// transmission, never that staging succeeded.
#[async_trait]
pub trait StagerClient: Send + Sync {
    /// Dispatch a stage request addressed by its staging guid.
    async fn stage(&self, staging_guid: &StagingGuid, request: &StagingRequest) -> Result<()>;

    /// Ask the backend to abandon an in-flight staging job.
    async fn stop_staging(&self, staging_guid: &StagingGuid) -> Result<()>;
}
