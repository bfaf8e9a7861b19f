//! Outbound message dispatch.
//!
//! All sends are fire-and-forget: a returned `Ok` means the message was
//! accepted for transmission, never that the backend acted on it.

use std::sync::Arc;
use tracing::info;

use stagehand_config::StagingConfig;
use stagehand_core::droplet::DropletModel;
use stagehand_core::package::PackageModel;
use stagehand_core::process::ProcessModel;
use stagehand_core::runtime::{AppControlClient, ProcessGuid};
use stagehand_core::stager::{StagerClient, StagingGuid};
use stagehand_core::Guid;

use crate::details::StagingDetails;
use crate::error::StagingError;
use crate::lifecycle::Protocol;

pub struct Messenger {
    stager_client: Arc<dyn StagerClient>,
    app_control_client: Arc<dyn AppControlClient>,
    protocol: Arc<Protocol>,
}

impl Messenger {
    pub fn new(
        stager_client: Arc<dyn StagerClient>,
        app_control_client: Arc<dyn AppControlClient>,
        protocol: Arc<Protocol>,
    ) -> Self {
        Self {
            stager_client,
            app_control_client,
            protocol,
        }
    }

    /// Dispatch a stage request for a package, addressed by the staging
    /// guid derived from the target droplet.
    pub async fn send_stage_request(
        &self,
        package: &PackageModel,
        config: &StagingConfig,
        details: &StagingDetails,
    ) -> Result<(), StagingError> {
        info!(package_guid = %package.guid, "staging.begin");

        let staging_guid = StagingGuid::from_droplet_guid(&details.droplet_guid);
        let staging_message = self.protocol.stage_package_request(package, config, details)?;
        self.stager_client
            .stage(&staging_guid, &staging_message)
            .await?;
        Ok(())
    }

    /// Extension point for canceling an in-flight staging job.
    /// Intentionally inert until cancellation is wired through.
    pub async fn send_stop_staging_request(&self, _droplet_guid: &Guid) -> Result<(), StagingError> {
        Ok(())
    }

    pub async fn send_desire_request(
        &self,
        process: &ProcessModel,
        droplet: &DropletModel,
        default_health_check_timeout_secs: u32,
    ) -> Result<(), StagingError> {
        info!(app_guid = %process.app_guid, "desire.app.begin");

        let process_guid = ProcessGuid::from_process(process);
        let desire_message = self.protocol.desire_app_request(
            process,
            droplet,
            default_health_check_timeout_secs,
        )?;
        self.app_control_client
            .desire_app(&process_guid, &desire_message)
            .await?;
        Ok(())
    }

    pub async fn send_stop_index_request(
        &self,
        process: &ProcessModel,
        index: u32,
    ) -> Result<(), StagingError> {
        info!(app_guid = %process.app_guid, index, "stop.index");

        let process_guid = ProcessGuid::from_process(process);
        self.app_control_client
            .stop_index(&process_guid, index)
            .await?;
        Ok(())
    }

    pub async fn send_stop_app_request(&self, process: &ProcessModel) -> Result<(), StagingError> {
        info!(app_guid = %process.app_guid, "stop.app");

        let process_guid = ProcessGuid::from_process(process);
        self.app_control_client.stop_app(&process_guid).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use stagehand_core::lifecycle::{BuildpackLifecycle, LifecycleKind, LifecycleSpec};
    use stagehand_core::package::{PackageKind, PackageState};
    use stagehand_core::runtime::DesireRequest;
    use stagehand_core::stager::StagingRequest;
    use stagehand_core::Result as CoreResult;

    use crate::blobstore::BlobstoreUrlGenerator;

    #[derive(Default)]
    struct RecordingStagerClient {
        staged: Mutex<Vec<(String, StagingRequest)>>,
        stopped: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StagerClient for RecordingStagerClient {
        async fn stage(
            &self,
            staging_guid: &StagingGuid,
            request: &StagingRequest,
        ) -> CoreResult<()> {
            self.staged
                .lock()
                .unwrap()
                .push((staging_guid.to_string(), request.clone()));
            Ok(())
        }

        async fn stop_staging(&self, staging_guid: &StagingGuid) -> CoreResult<()> {
            self.stopped.lock().unwrap().push(staging_guid.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingControlClient {
        desired: Mutex<Vec<(String, DesireRequest)>>,
        stopped_indexes: Mutex<Vec<(String, u32)>>,
        stopped_apps: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AppControlClient for RecordingControlClient {
        async fn desire_app(
            &self,
            process_guid: &ProcessGuid,
            request: &DesireRequest,
        ) -> CoreResult<()> {
            self.desired
                .lock()
                .unwrap()
                .push((process_guid.to_string(), request.clone()));
            Ok(())
        }

        async fn stop_index(&self, process_guid: &ProcessGuid, index: u32) -> CoreResult<()> {
            self.stopped_indexes
                .lock()
                .unwrap()
                .push((process_guid.to_string(), index));
            Ok(())
        }

        async fn stop_app(&self, process_guid: &ProcessGuid) -> CoreResult<()> {
            self.stopped_apps
                .lock()
                .unwrap()
                .push(process_guid.to_string());
            Ok(())
        }
    }

    fn config() -> StagingConfig {
        stagehand_config::parse_staging_config(
            r#"blobstore { endpoint "https://blobstore.internal" }"#,
        )
        .unwrap()
    }

    fn messenger(
        stager: Arc<RecordingStagerClient>,
        control: Arc<RecordingControlClient>,
    ) -> Messenger {
        let urls = Arc::new(BlobstoreUrlGenerator::new(
            "https://blobstore.internal".parse().unwrap(),
        ));
        Messenger::new(stager, control, Arc::new(Protocol::new(urls)))
    }

    fn package() -> PackageModel {
        PackageModel {
            guid: Guid::new(),
            app_guid: Guid::new(),
            kind: PackageKind::Bits,
            package_hash: Some("abc".to_string()),
            docker_image: None,
            state: PackageState::Ready,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn process(app_guid: Guid) -> ProcessModel {
        ProcessModel {
            guid: Guid::new(),
            version: Guid::new(),
            app_guid,
            process_type: "web".to_string(),
            command: Some("bundle exec rails s".to_string()),
            clustered: true,
            health_check_timeout_secs: None,
            instances: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn droplet(app_guid: Guid) -> DropletModel {
        DropletModel {
            guid: Guid::new(),
            app_guid,
            package_guid: None,
            lifecycle: LifecycleKind::Buildpack,
            state: stagehand_core::droplet::DropletState::Staged,
            error_id: None,
            error_description: None,
            process_types: HashMap::new(),
            execution_metadata: String::new(),
            buildpack_receipt_buildpack: None,
            buildpack_receipt_buildpack_key: None,
            buildpack_receipt_stack: None,
            docker_receipt_image: None,
            droplet_hash: Some("sha".to_string()),
            buildpack_lifecycle: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_stage_request_is_addressed_by_droplet_guid() {
        let stager = Arc::new(RecordingStagerClient::default());
        let control = Arc::new(RecordingControlClient::default());
        let messenger = messenger(stager.clone(), control);

        let droplet_guid = Guid::new();
        let details = StagingDetails {
            droplet_guid,
            staging_memory_mb: 512,
            staging_disk_mb: 2048,
            environment_variables: HashMap::from([("RAILS_ENV".to_string(), "production".into())]),
            lifecycle: LifecycleSpec::Buildpack(BuildpackLifecycle {
                stack: "ubuntu-jammy".to_string(),
                buildpack: None,
                candidates: vec![],
            }),
        };

        messenger
            .send_stage_request(&package(), &config(), &details)
            .await
            .unwrap();

        let staged = stager.staged.lock().unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].0, droplet_guid.to_string());
        assert_eq!(staged[0].1.memory_mb, 512);
        assert_eq!(staged[0].1.disk_mb, 2048);
        assert_eq!(staged[0].1.timeout_secs, 900);
    }

    #[tokio::test]
    async fn test_desire_request_is_addressed_by_process_guid_and_version() {
        let stager = Arc::new(RecordingStagerClient::default());
        let control = Arc::new(RecordingControlClient::default());
        let messenger = messenger(stager, control.clone());

        let app_guid = Guid::new();
        let process = process(app_guid);
        let droplet = droplet(app_guid);

        messenger
            .send_desire_request(&process, &droplet, 60)
            .await
            .unwrap();

        let desired = control.desired.lock().unwrap();
        assert_eq!(desired.len(), 1);
        assert_eq!(
            desired[0].0,
            format!("{}-{}", process.guid, process.version)
        );
        assert_eq!(desired[0].1.start_command, "bundle exec rails s");
        assert_eq!(desired[0].1.health_check_timeout_secs, 60);
    }

    #[tokio::test]
    async fn test_stop_requests_use_the_control_channel() {
        let stager = Arc::new(RecordingStagerClient::default());
        let control = Arc::new(RecordingControlClient::default());
        let messenger = messenger(stager, control.clone());

        let process = process(Guid::new());
        messenger.send_stop_index_request(&process, 2).await.unwrap();
        messenger.send_stop_app_request(&process).await.unwrap();

        assert_eq!(control.stopped_indexes.lock().unwrap()[0].1, 2);
        assert_eq!(control.stopped_apps.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_staging_request_is_inert() {
        let stager = Arc::new(RecordingStagerClient::default());
        let control = Arc::new(RecordingControlClient::default());
        let messenger = messenger(stager.clone(), control);

        messenger
            .send_stop_staging_request(&Guid::new())
            .await
            .unwrap();

        assert!(stager.stopped.lock().unwrap().is_empty());
    }
}
