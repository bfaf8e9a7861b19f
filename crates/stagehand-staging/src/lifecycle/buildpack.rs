//! Buildpack lifecycle protocol.

use std::sync::Arc;

use stagehand_core::blobstore::StagingUrlProvider;
use stagehand_core::droplet::DropletModel;
use stagehand_core::lifecycle::{BuildpackLifecycle, LifecycleKind, RequestedBuildpack};
use stagehand_core::package::PackageModel;
use stagehand_core::process::ProcessModel;
use stagehand_core::runtime::{DesireRequest, ProcessGuid};
use stagehand_core::stager::{BuildpackEntry, BuildpackLifecycleData, LifecycleData};
use stagehand_core::{Error, Guid};

use crate::error::StagingError;

/// Assembles the buildpack staging payload. All URIs come from the
/// injected provider; no I/O happens here.
pub struct BuildpackLifecycleProtocol {
    urls: Arc<dyn StagingUrlProvider>,
    entry_generator: BuildpackEntryGenerator,
}

impl BuildpackLifecycleProtocol {
    pub fn new(urls: Arc<dyn StagingUrlProvider>) -> Self {
        let entry_generator = BuildpackEntryGenerator::new(urls.clone());
        Self {
            urls,
            entry_generator,
        }
    }

    pub fn lifecycle_data(
        &self,
        package: &PackageModel,
        droplet_guid: &Guid,
        lifecycle: &BuildpackLifecycle,
    ) -> (LifecycleKind, LifecycleData) {
        let data = BuildpackLifecycleData {
            app_bits_download_uri: self.urls.package_download_url(package),
            build_artifacts_cache_download_uri: self
                .urls
                .buildpack_cache_download_url(&package.app_guid, &lifecycle.stack),
            build_artifacts_cache_upload_uri: self
                .urls
                .buildpack_cache_upload_url(&package.app_guid, &lifecycle.stack),
            droplet_upload_uri: self.urls.droplet_upload_url(droplet_guid),
            buildpacks: self.entry_generator.buildpack_entries(lifecycle),
            stack: lifecycle.stack.clone(),
        };
        (LifecycleKind::Buildpack, LifecycleData::Buildpack(data))
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
            droplet_uri: self.urls.droplet_download_url(droplet),
            droplet_hash: droplet.droplet_hash.clone(),
            docker_image: None,
            health_check_timeout_secs: process
                .health_check_timeout_secs
                .unwrap_or(default_health_check_timeout_secs),
        })
    }
}

/// Expands the requested buildpack (or the detection candidates) into the
/// ordered wire entries.
pub struct BuildpackEntryGenerator {
    urls: Arc<dyn StagingUrlProvider>,
}

impl BuildpackEntryGenerator {
    pub fn new(urls: Arc<dyn StagingUrlProvider>) -> Self {
        Self { urls }
    }

    pub fn buildpack_entries(&self, lifecycle: &BuildpackLifecycle) -> Vec<BuildpackEntry> {
        match &lifecycle.buildpack {
            Some(RequestedBuildpack::Admin(buildpack)) => {
                vec![self.admin_entry(buildpack, true)]
            }
            Some(RequestedBuildpack::Custom { url }) => vec![BuildpackEntry {
                name: "custom".to_string(),
                key: url.clone(),
                url: url.clone(),
                skip_detect: true,
            }],
            None => lifecycle
                .candidates
                .iter()
                .map(|buildpack| self.admin_entry(buildpack, false))
                .collect(),
        }
    }

    fn admin_entry(
        &self,
        buildpack: &stagehand_core::buildpack::BuildpackModel,
        skip_detect: bool,
    ) -> BuildpackEntry {
        BuildpackEntry {
            name: buildpack.name.clone(),
            key: buildpack.key.clone(),
            url: self.urls.buildpack_download_url(buildpack),
            skip_detect,
        }
    }
}
