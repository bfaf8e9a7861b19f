//! Lifecycle protocols: translate a package and staging details into the
//! backend-specific build payload for the request envelope.

pub mod buildpack;
pub mod docker;

use std::sync::Arc;

use stagehand_config::StagingConfig;
use stagehand_core::blobstore::StagingUrlProvider;
use stagehand_core::droplet::DropletModel;
use stagehand_core::lifecycle::LifecycleSpec;
use stagehand_core::package::PackageModel;
use stagehand_core::process::ProcessModel;
use stagehand_core::runtime::DesireRequest;
use stagehand_core::stager::StagingRequest;

use crate::details::StagingDetails;
use crate::error::StagingError;
use buildpack::BuildpackLifecycleProtocol;
use docker::DockerLifecycleProtocol;

/// Dispatches to the lifecycle protocol matching the staging details and
/// wraps the result in the outbound envelope. Performs no I/O.
pub struct Protocol {
    buildpack: BuildpackLifecycleProtocol,
    docker: DockerLifecycleProtocol,
}

impl Protocol {
    pub fn new(urls: Arc<dyn StagingUrlProvider>) -> Self {
        Self {
            buildpack: BuildpackLifecycleProtocol::new(urls),
            docker: DockerLifecycleProtocol::new(),
        }
    }

    /// Build the stage-request envelope for a staging attempt.
    pub fn stage_package_request(
        &self,
        package: &PackageModel,
        config: &StagingConfig,
        details: &StagingDetails,
    ) -> Result<StagingRequest, StagingError> {
        let (lifecycle, lifecycle_data) = match &details.lifecycle {
            LifecycleSpec::Buildpack(data) => {
                self.buildpack
                    .lifecycle_data(package, &details.droplet_guid, data)
            }
            LifecycleSpec::Docker(data) => self.docker.lifecycle_data(package, data)?,
        };

        Ok(StagingRequest {
            memory_mb: details.staging_memory_mb,
            disk_mb: details.staging_disk_mb,
            environment: details.environment_variables.clone(),
            timeout_secs: config.staging.timeout_secs,
            lifecycle,
            lifecycle_data,
        })
    }

    /// Build the desire message asking the runtime to run a process from
    /// its droplet.
    pub fn desire_app_request(
        &self,
        process: &ProcessModel,
        droplet: &DropletModel,
        default_health_check_timeout_secs: u32,
    ) -> Result<DesireRequest, StagingError> {
        match droplet.lifecycle {
            stagehand_core::lifecycle::LifecycleKind::Buildpack => self
                .buildpack
                .desired_app_message(process, droplet, default_health_check_timeout_secs),
            stagehand_core::lifecycle::LifecycleKind::Docker => self
                .docker
                .desired_app_message(process, droplet, default_health_check_timeout_secs),
        }
    }
}
