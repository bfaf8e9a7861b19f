//! Docker lifecycle protocol.

use stagehand_core::droplet::DropletModel;
use stagehand_core::lifecycle::{DockerLifecycle, LifecycleKind};
use stagehand_core::package::PackageModel;
use stagehand_core::process::ProcessModel;
use stagehand_core::runtime::{DesireRequest, ProcessGuid};
use stagehand_core::stager::{DockerLifecycleData, LifecycleData};
use stagehand_core::Error;

use crate::error::StagingError;

/// Assembles the staging payload for pre-built images.
pub struct DockerLifecycleProtocol;

impl DockerLifecycleProtocol {
    pub fn new() -> Self {
        Self
    }

    pub fn lifecycle_data(
        &self,
        package: &PackageModel,
        lifecycle: &DockerLifecycle,
    ) -> Result<(LifecycleKind, LifecycleData), StagingError> {
        let docker_image = package
            .docker_image
            .clone()
            .filter(|image| !image.is_empty())
            .unwrap_or_else(|| lifecycle.image.clone());
        if docker_image.is_empty() {
            return Err(Error::InvalidInput("package has no image reference".to_string()).into());
        }

        let credentials = lifecycle.credentials.as_ref();
        let data = DockerLifecycleData {
            docker_image,
            docker_user: credentials.map(|c| c.user.clone()),
            docker_password: credentials.map(|c| c.password.clone()),
            docker_email: credentials.map(|c| c.email.clone()),
        };
        Ok((LifecycleKind::Docker, LifecycleData::Docker(data)))
    }

    pub fn desired_app_message(
        &self,
        process: &ProcessModel,
        droplet: &DropletModel,
        default_health_check_timeout_secs: u32,
    ) -> Result<DesireRequest, StagingError> {
        let start_command = process
            .command
            .clone()
            .or_else(|| {
                droplet
                    .detected_start_command(&process.process_type)
                    .map(str::to_string)
            })
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "process {} has no start command for type {}",
                    process.guid, process.process_type
                ))
            })?;

        Ok(DesireRequest {
            process_guid: ProcessGuid::from_process(process).to_string(),
            start_command,
            droplet_uri: None,
            droplet_hash: None,
            docker_image: droplet.docker_receipt_image.clone(),
            health_check_timeout_secs: process
                .health_check_timeout_secs
                .unwrap_or(default_health_check_timeout_secs),
        })
    }
}

impl Default for DockerLifecycleProtocol {
    fn default() -> Self {
        Self::new()
    }
}
