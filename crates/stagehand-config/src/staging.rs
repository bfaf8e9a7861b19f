//! System configuration parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// System-wide staging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Resource limits and timeouts applied to staging jobs.
    pub staging: StagingLimits,
    /// Administrative feature flags.
    pub feature_flags: FeatureFlags,
    /// Blobstore the staging URIs point at.
    pub blobstore: BlobstoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingLimits {
    /// Memory budget for a staging job.
    pub memory_limit_mb: u32,
    /// Disk budget for a staging job.
    pub disk_limit_mb: u32,
    /// Wall-clock budget the backend enforces on a staging job.
    pub timeout_secs: u64,
    /// Health-check timeout used when a process declares none.
    pub default_health_check_timeout_secs: u32,
    /// Whether worker-driven completions start the web process on success.
    pub start_after_staging: bool,
}

impl Default for StagingLimits {
    fn default() -> Self {
        Self {
            memory_limit_mb: 1024,
            disk_limit_mb: 4096,
            timeout_secs: 900,
            default_health_check_timeout_secs: 60,
            start_after_staging: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Allow staging of pre-built docker images.
    pub docker_staging: bool,
    /// Allow custom (URL) buildpacks.
    pub custom_buildpacks: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            docker_staging: false,
            custom_buildpacks: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobstoreConfig {
    /// Base endpoint, e.g. `https://blobstore.service.internal`.
    pub endpoint: String,
}

/// Load and parse a configuration file.
pub fn load_staging_config(path: impl AsRef<Path>) -> ConfigResult<StagingConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_staging_config(&text)
}

/// Parse system configuration from KDL text.
pub fn parse_staging_config(kdl: &str) -> ConfigResult<StagingConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut staging = StagingLimits::default();
    let mut feature_flags = FeatureFlags::default();
    let mut blobstore_endpoint = None;

    for node in doc.nodes() {
        match node.name().value() {
            "staging" => parse_staging_limits(node, &mut staging)?,
            "feature-flags" => parse_feature_flags(node, &mut feature_flags)?,
            "blobstore" => {
                blobstore_endpoint = child_string(node, "endpoint");
            }
            _ => {} // Ignore unknown nodes
        }
    }

    let endpoint = blobstore_endpoint
        .ok_or_else(|| ConfigError::MissingField("blobstore endpoint".to_string()))?;

    Ok(StagingConfig {
        staging,
        feature_flags,
        blobstore: BlobstoreConfig { endpoint },
    })
}

fn parse_staging_limits(node: &KdlNode, limits: &mut StagingLimits) -> ConfigResult<()> {
    if let Some(v) = child_int(node, "memory-limit-mb")? {
        limits.memory_limit_mb = v as u32;
    }
    if let Some(v) = child_int(node, "disk-limit-mb")? {
        limits.disk_limit_mb = v as u32;
    }
    if let Some(v) = child_int(node, "timeout-secs")? {
        limits.timeout_secs = v as u64;
    }
    if let Some(v) = child_int(node, "default-health-check-timeout-secs")? {
        limits.default_health_check_timeout_secs = v as u32;
    }
    if let Some(v) = child_bool(node, "start-after-staging") {
        limits.start_after_staging = v;
    }
    Ok(())
}

fn parse_feature_flags(node: &KdlNode, flags: &mut FeatureFlags) -> ConfigResult<()> {
    if let Some(v) = child_bool(node, "docker-staging") {
        flags.docker_staging = v;
    }
    if let Some(v) = child_bool(node, "custom-buildpacks") {
        flags.custom_buildpacks = v;
    }
    Ok(())
}

fn child_node<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlNode> {
    node.children()
        .and_then(|children| children.nodes().iter().find(|n| n.name().value() == name))
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn child_string(node: &KdlNode, name: &str) -> Option<String> {
    child_node(node, name).and_then(get_first_string_arg)
}

fn child_int(node: &KdlNode, name: &str) -> ConfigResult<Option<i128>> {
    let Some(child) = child_node(node, name) else {
        return Ok(None);
    };
    let value = child
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| ConfigError::InvalidValue {
            field: name.to_string(),
            message: "expected an integer".to_string(),
        })?;
    if value < 0 {
        return Err(ConfigError::InvalidValue {
            field: name.to_string(),
            message: "expected a non-negative integer".to_string(),
        });
    }
    Ok(Some(value))
}

fn child_bool(node: &KdlNode, name: &str) -> Option<bool> {
    child_node(node, name).and_then(|child| {
        child
            .entries()
            .iter()
            .find(|e| e.name().is_none())
            .and_then(|e| e.value().as_bool())
    })
}
