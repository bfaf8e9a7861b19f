//! Backend selection and staging preconditions.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use stagehand_config::StagingConfig;
use stagehand_core::app::AppModel;
use stagehand_core::lifecycle::LifecycleKind;
use stagehand_core::package::{PackageKind, PackageModel};
use stagehand_core::process::ProcessModel;
use stagehand_core::Guid;

use crate::details::StagingDetails;
use crate::error::{StagingError, ValidationFailure};
use crate::messenger::Messenger;
use stagehand_db::{BuildpackRepo, DropletRepo};

/// The execution backends capable of running a staging job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingBackend {
    /// Shared cells with their own placement; the normal path.
    Cluster,
    /// The legacy per-node executor, kept for apps not yet migrated.
    Host,
}

/// A selected backend, ready to stage one package.
#[async_trait]
pub trait Stager: Send + Sync {
    fn backend(&self) -> StagingBackend;

    /// Dispatch the staging job. Fire-and-forget; on success the droplet
    /// is left in `STAGING` awaiting its completion callback.
    async fn stage(&self, details: StagingDetails) -> Result<(), StagingError>;

    /// Cancel an in-flight staging job. Currently inert.
    async fn stop_stage(&self, droplet_guid: &Guid) -> Result<(), StagingError>;
}

/// Validates staging preconditions and picks the backend for a package.
pub struct Stagers {
    config: StagingConfig,
    buildpacks: Arc<dyn BuildpackRepo>,
    droplets: Arc<dyn DropletRepo>,
    cluster_messenger: Arc<Messenger>,
    host_messenger: Arc<Messenger>,
}

impl Stagers {
    pub fn new(
        config: StagingConfig,
        buildpacks: Arc<dyn BuildpackRepo>,
        droplets: Arc<dyn DropletRepo>,
        cluster_messenger: Arc<Messenger>,
        host_messenger: Arc<Messenger>,
    ) -> Self {
        Self {
            config,
            buildpacks,
            droplets,
            cluster_messenger,
            host_messenger,
        }
    }

    /// Check every staging precondition for an app and its package.
    /// No side effects beyond the returned error.
    pub async fn validate(
        &self,
        app: &AppModel,
        package: &PackageModel,
    ) -> Result<(), StagingError> {
        if package.kind == PackageKind::Docker && !self.config.feature_flags.docker_staging {
            return Err(ValidationFailure::DockerDisabled.into());
        }

        if package.content_locator().is_none() {
            let reason = match package.kind {
                PackageKind::Bits => "the package hash is empty",
                PackageKind::Docker => "the package image is empty",
            };
            return Err(ValidationFailure::InvalidPackage(reason.to_string()).into());
        }

        let custom_buildpack = app.lifecycle.requests_custom_buildpack();
        if custom_buildpack && !self.config.feature_flags.custom_buildpacks {
            return Err(ValidationFailure::CustomBuildpacksDisabled.into());
        }

        if !custom_buildpack && self.buildpacks.count().await? == 0 {
            return Err(ValidationFailure::NoBuildpacksFound.into());
        }

        Ok(())
    }

    /// Pick the backend for a package: the cluster when any of the app's
    /// processes runs there, the legacy host executor otherwise. Pure
    /// selection over placement flags already loaded by the caller.
    pub fn stager_for_package(
        &self,
        package: &PackageModel,
        lifecycle: LifecycleKind,
        processes: &[ProcessModel],
    ) -> Box<dyn Stager> {
        if processes.iter().any(|p| p.clustered) {
            Box::new(ClusterStager {
                package: package.clone(),
                lifecycle,
                config: self.config.clone(),
                messenger: self.cluster_messenger.clone(),
                droplets: self.droplets.clone(),
            })
        } else {
            Box::new(HostStager {
                package: package.clone(),
                lifecycle,
                config: self.config.clone(),
                messenger: self.host_messenger.clone(),
                droplets: self.droplets.clone(),
            })
        }
    }
}

/// Stages on the cluster-capable backend.
pub struct ClusterStager {
    package: PackageModel,
    lifecycle: LifecycleKind,
    config: StagingConfig,
    messenger: Arc<Messenger>,
    droplets: Arc<dyn DropletRepo>,
}

#[async_trait]
impl Stager for ClusterStager {
    fn backend(&self) -> StagingBackend {
        StagingBackend::Cluster
    }

    async fn stage(&self, details: StagingDetails) -> Result<(), StagingError> {
        info!(
            package_guid = %self.package.guid,
            lifecycle = %self.lifecycle,
            "staging.dispatch.cluster"
        );
        let droplet_guid = details.droplet_guid;
        self.messenger
            .send_stage_request(&self.package, &self.config, &details)
            .await?;
        self.droplets.mark_staging(&droplet_guid).await?;
        Ok(())
    }

    async fn stop_stage(&self, droplet_guid: &Guid) -> Result<(), StagingError> {
        self.messenger.send_stop_staging_request(droplet_guid).await
    }
}

/// Stages on the legacy per-node executor.
pub struct HostStager {
    package: PackageModel,
    lifecycle: LifecycleKind,
    config: StagingConfig,
    messenger: Arc<Messenger>,
    droplets: Arc<dyn DropletRepo>,
}

#[async_trait]
impl Stager for HostStager {
    fn backend(&self) -> StagingBackend {
        StagingBackend::Host
    }

    async fn stage(&self, details: StagingDetails) -> Result<(), StagingError> {
        warn!(
            package_guid = %self.package.guid,
            lifecycle = %self.lifecycle,
            "staging.dispatch.host"
        );
        let droplet_guid = details.droplet_guid;
        self.messenger
            .send_stage_request(&self.package, &self.config, &details)
            .await?;
        self.droplets.mark_staging(&droplet_guid).await?;
        Ok(())
    }

    async fn stop_stage(&self, _droplet_guid: &Guid) -> Result<(), StagingError> {
        Ok(())
    }
}
