//! Droplet model: the persisted outcome of one staging attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::Guid;
use crate::lifecycle::{BuildpackLifecycle, LifecycleKind};

/// State of a droplet.
///
/// A droplet is created `Pending`, moves to `Staging` once a stage request
/// has been dispatched, and ends `Staged` or `Failed` when the completion
/// callback arrives. `Expired` marks droplets reaped by retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DropletState {
    Pending,
    Staging,
    Staged,
    Failed,
    Expired,
}

impl DropletState {
    /// Terminal states never transition again for this staging attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DropletState::Staged | DropletState::Failed | DropletState::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DropletState::Pending => "PENDING",
            DropletState::Staging => "STAGING",
            DropletState::Staged => "STAGED",
            DropletState::Failed => "FAILED",
            DropletState::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for DropletState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DropletState {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DropletState::Pending),
            "STAGING" => Ok(DropletState::Staging),
            "STAGED" => Ok(DropletState::Staged),
            "FAILED" => Ok(DropletState::Failed),
            "EXPIRED" => Ok(DropletState::Expired),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown droplet state: {other}"
            ))),
        }
    }
}

/// A droplet record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropletModel {
    /// Unique identifier; doubles as the staging correlation id.
    pub guid: Guid,
    /// Owning app.
    pub app_guid: Guid,
    /// Package this droplet was built from.
    pub package_guid: Option<Guid>,
    /// Build strategy used for this attempt.
    pub lifecycle: LifecycleKind,
    /// Current state.
    pub state: DropletState,
    /// Error identifier when staging failed.
    pub error_id: Option<String>,
    /// Human-readable error description when staging failed.
    pub error_description: Option<String>,
    /// Process role -> detected start command.
    pub process_types: HashMap<String, String>,
    /// Opaque metadata returned by the stager.
    pub execution_metadata: String,
    /// Detected buildpack name recorded at completion.
    pub buildpack_receipt_buildpack: Option<String>,
    /// Detected buildpack blobstore key recorded at completion.
    pub buildpack_receipt_buildpack_key: Option<String>,
    /// Stack the droplet was built against.
    pub buildpack_receipt_stack: Option<String>,
    /// Image reference recorded for docker droplets.
    pub docker_receipt_image: Option<String>,
    /// Blobstore hash of the built droplet, set at upload.
    pub droplet_hash: Option<String>,
    /// Lifecycle configuration the staging attempt was requested with.
    /// Used as the receipt fallback when the stager detects nothing.
    pub buildpack_lifecycle: Option<BuildpackLifecycle>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DropletModel {
    pub fn staged(&self) -> bool {
        self.state == DropletState::Staged
    }

    pub fn failed(&self) -> bool {
        self.state == DropletState::Failed
    }

    /// Combined error string, `"<id> - <description>"`, when staging failed.
    pub fn error(&self) -> Option<String> {
        match (&self.error_id, &self.error_description) {
            (Some(id), Some(description)) => Some(format!("{id} - {description}")),
            (Some(id), None) => Some(id.clone()),
            (None, Some(description)) => Some(description.clone()),
            (None, None) => None,
        }
    }

    /// Detected start command for a process role, if staging produced one.
    pub fn detected_start_command(&self, process_type: &str) -> Option<&str> {
        self.process_types.get(process_type).map(String::as_str)
    }
}

/// Receipt for the buildpack that produced a droplet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildpackReceipt {
    pub buildpack: String,
    pub buildpack_key: Option<String>,
    pub stack: Option<String>,
}

/// Everything persisted onto a droplet by a successful completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedResult {
    pub process_types: HashMap<String, String>,
    pub execution_metadata: String,
    pub buildpack_receipt: Option<BuildpackReceipt>,
    pub docker_image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn droplet(state: DropletState) -> DropletModel {
        DropletModel {
            guid: Guid::new(),
            app_guid: Guid::new(),
            package_guid: None,
            lifecycle: LifecycleKind::Buildpack,
            state,
            error_id: None,
            error_description: None,
            process_types: HashMap::new(),
            execution_metadata: String::new(),
            buildpack_receipt_buildpack: None,
            buildpack_receipt_buildpack_key: None,
            buildpack_receipt_stack: None,
            docker_receipt_image: None,
            droplet_hash: None,
            buildpack_lifecycle: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!DropletState::Pending.is_terminal());
        assert!(!DropletState::Staging.is_terminal());
        assert!(DropletState::Staged.is_terminal());
        assert!(DropletState::Failed.is_terminal());
        assert!(DropletState::Expired.is_terminal());
    }

    #[test]
    fn test_state_round_trips_through_str() {
        for state in [
            DropletState::Pending,
            DropletState::Staging,
            DropletState::Staged,
            DropletState::Failed,
            DropletState::Expired,
        ] {
            assert_eq!(state.as_str().parse::<DropletState>().unwrap(), state);
        }
        assert!("BROKEN".parse::<DropletState>().is_err());
    }

    #[test]
    fn test_error_combines_id_and_description() {
        let mut d = droplet(DropletState::Failed);
        d.error_id = Some("NoCompatibleCell".to_string());
        d.error_description = Some("Found no compatible cell".to_string());

        assert_eq!(
            d.error().unwrap(),
            "NoCompatibleCell - Found no compatible cell"
        );
    }

    #[test]
    fn test_error_is_none_without_failure() {
        assert_eq!(droplet(DropletState::Staged).error(), None);
    }
}
