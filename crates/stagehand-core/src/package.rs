//! Package model: the input artifact a droplet is built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Guid;

/// What kind of artifact a package holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// An uploaded bits archive, addressed by content hash.
    Bits,
    /// A pre-built image, addressed by image reference.
    Docker,
}

impl PackageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageKind::Bits => "bits",
            PackageKind::Docker => "docker",
        }
    }
}

impl std::str::FromStr for PackageKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bits" => Ok(PackageKind::Bits),
            "docker" => Ok(PackageKind::Docker),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown package kind: {other}"
            ))),
        }
    }
}

/// State of a package.
///
/// A bits package starts `Created` and becomes `Ready` once its archive is
/// uploaded; a docker package is `Ready` from the start since its content
/// lives in a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageState {
    Created,
    Ready,
    Failed,
}

impl PackageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageState::Created => "CREATED",
            PackageState::Ready => "READY",
            PackageState::Failed => "FAILED",
        }
    }

    /// Initial state for a newly created package of the given kind.
    pub fn initial_for(kind: PackageKind) -> Self {
        match kind {
            PackageKind::Bits => PackageState::Created,
            PackageKind::Docker => PackageState::Ready,
        }
    }
}

impl std::str::FromStr for PackageState {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(PackageState::Created),
            "READY" => Ok(PackageState::Ready),
            "FAILED" => Ok(PackageState::Failed),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown package state: {other}"
            ))),
        }
    }
}

/// A package record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageModel {
    pub guid: Guid,
    pub app_guid: Guid,
    pub kind: PackageKind,
    /// Content hash of the uploaded archive, for bits packages.
    pub package_hash: Option<String>,
    /// Image reference, for docker packages.
    pub docker_image: Option<String>,
    pub state: PackageState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PackageModel {
    /// The content locator for this package, if one is set.
    pub fn content_locator(&self) -> Option<&str> {
        let locator = match self.kind {
            PackageKind::Bits => self.package_hash.as_deref(),
            PackageKind::Docker => self.docker_image.as_deref(),
        };
        locator.filter(|l| !l.is_empty())
    }
}
