//! Lifecycle configuration: the build strategy for a staging attempt.

use serde::{Deserialize, Serialize};

use crate::buildpack::BuildpackModel;

/// The build strategy tag carried on droplets and staging requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleKind {
    Buildpack,
    Docker,
}

impl LifecycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleKind::Buildpack => "buildpack",
            LifecycleKind::Docker => "docker",
        }
    }
}

impl std::fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LifecycleKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "buildpack" => Ok(LifecycleKind::Buildpack),
            "docker" => Ok(LifecycleKind::Docker),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown lifecycle: {other}"
            ))),
        }
    }
}

/// Lifecycle configuration for an app or a staging attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LifecycleSpec {
    Buildpack(BuildpackLifecycle),
    Docker(DockerLifecycle),
}

impl LifecycleSpec {
    pub fn kind(&self) -> LifecycleKind {
        match self {
            LifecycleSpec::Buildpack(_) => LifecycleKind::Buildpack,
            LifecycleSpec::Docker(_) => LifecycleKind::Docker,
        }
    }

    /// Whether this lifecycle requests a custom (non-curated) buildpack.
    pub fn requests_custom_buildpack(&self) -> bool {
        match self {
            LifecycleSpec::Buildpack(data) => {
                matches!(data.buildpack, Some(RequestedBuildpack::Custom { .. }))
            }
            LifecycleSpec::Docker(_) => false,
        }
    }
}

/// Buildpack-based build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildpackLifecycle {
    /// Target stack name.
    pub stack: String,
    /// Explicitly requested buildpack; `None` means run detection.
    pub buildpack: Option<RequestedBuildpack>,
    /// Curated buildpacks eligible for detection, in position order.
    /// Loaded by the caller when no buildpack is requested.
    #[serde(default)]
    pub candidates: Vec<BuildpackModel>,
}

impl BuildpackLifecycle {
    /// Name of the requested buildpack, for receipt fallback.
    pub fn requested_buildpack_name(&self) -> Option<&str> {
        match &self.buildpack {
            Some(RequestedBuildpack::Admin(buildpack)) => Some(buildpack.name.as_str()),
            Some(RequestedBuildpack::Custom { url }) => Some(url.as_str()),
            None => None,
        }
    }
}

/// A buildpack requested for a staging attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum RequestedBuildpack {
    /// A curated buildpack, resolved by the caller from the registry.
    Admin(BuildpackModel),
    /// A custom buildpack fetched from a URL.
    Custom { url: String },
}

/// Docker-based build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerLifecycle {
    /// Image reference, e.g. `registry.example.com/org/app:tag`.
    pub image: String,
    /// Registry credentials for private images.
    pub credentials: Option<DockerCredentials>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerCredentials {
    pub user: String,
    pub password: String,
    pub email: String,
}
