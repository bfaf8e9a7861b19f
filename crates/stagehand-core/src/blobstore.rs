//! Blobstore URL generation.

use crate::buildpack::BuildpackModel;
use crate::droplet::DropletModel;
use crate::package::PackageModel;
use crate::Guid;

/// Generates the blobstore URIs embedded in staging and desire messages.
///
/// Implementations own the endpoint and credential scheme; the lifecycle
/// protocols only assemble the URIs into payloads.
pub trait StagingUrlProvider: Send + Sync {
    /// Download URI for a package's bits archive.
    fn package_download_url(&self, package: &PackageModel) -> String;

    /// Download URI for the app's build-artifact cache on a stack, if a
    /// cache may exist.
    fn buildpack_cache_download_url(&self, app_guid: &Guid, stack: &str) -> Option<String>;

    /// Upload URI for the app's build-artifact cache on a stack.
    fn buildpack_cache_upload_url(&self, app_guid: &Guid, stack: &str) -> String;

    /// Upload URI for the droplet a staging attempt will produce.
    fn droplet_upload_url(&self, droplet_guid: &Guid) -> String;

    /// Download URI for a staged droplet.
    fn droplet_download_url(&self, droplet: &DropletModel) -> Option<String>;

    /// Download URI for a curated buildpack.
    fn buildpack_download_url(&self, buildpack: &BuildpackModel) -> String;
}
