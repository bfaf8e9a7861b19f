//! Blobstore URL generation against a configured endpoint.

use url::Url;

use stagehand_config::BlobstoreConfig;
use stagehand_core::blobstore::StagingUrlProvider;
use stagehand_core::buildpack::BuildpackModel;
use stagehand_core::droplet::DropletModel;
use stagehand_core::package::PackageModel;
use stagehand_core::Guid;

/// Generates blobstore URIs rooted at a single endpoint.
pub struct BlobstoreUrlGenerator {
    endpoint: Url,
}

impl BlobstoreUrlGenerator {
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    pub fn from_config(config: &BlobstoreConfig) -> Result<Self, url::ParseError> {
        Ok(Self::new(config.endpoint.parse()?))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoint.as_str().trim_end_matches('/'))
    }
}

impl StagingUrlProvider for BlobstoreUrlGenerator {
    fn package_download_url(&self, package: &PackageModel) -> String {
        self.url(&format!("v1/packages/{}/download", package.guid))
    }

    fn buildpack_cache_download_url(&self, app_guid: &Guid, stack: &str) -> Option<String> {
        Some(self.url(&format!("v1/build_artifacts/{app_guid}/{stack}/download")))
    }

    fn buildpack_cache_upload_url(&self, app_guid: &Guid, stack: &str) -> String {
        self.url(&format!("v1/build_artifacts/{app_guid}/{stack}/upload"))
    }

    fn droplet_upload_url(&self, droplet_guid: &Guid) -> String {
        self.url(&format!("v1/droplets/{droplet_guid}/upload"))
    }

    fn droplet_download_url(&self, droplet: &DropletModel) -> Option<String> {
        // Nothing to download until an upload has recorded the hash.
        droplet
            .droplet_hash
            .as_ref()
            .map(|hash| self.url(&format!("v1/droplets/{}/download/{hash}", droplet.guid)))
    }

    fn buildpack_download_url(&self, buildpack: &BuildpackModel) -> String {
        self.url(&format!("v1/buildpacks/{}/download", buildpack.guid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stagehand_core::package::{PackageKind, PackageState};

    #[test]
    fn test_urls_are_rooted_at_the_endpoint() {
        let generator =
            BlobstoreUrlGenerator::new("https://blobstore.service.internal/".parse().unwrap());
        let package = PackageModel {
            guid: Guid::new(),
            app_guid: Guid::new(),
            kind: PackageKind::Bits,
            package_hash: Some("abc".to_string()),
            docker_image: None,
            state: PackageState::Ready,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let url = generator.package_download_url(&package);
        assert_eq!(
            url,
            format!(
                "https://blobstore.service.internal/v1/packages/{}/download",
                package.guid
            )
        );

        let app_guid = Guid::new();
        assert_eq!(
            generator.buildpack_cache_upload_url(&app_guid, "ubuntu-jammy"),
            format!(
                "https://blobstore.service.internal/v1/build_artifacts/{app_guid}/ubuntu-jammy/upload"
            )
        );
    }
}
