//! Process runner for the cluster backend.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use stagehand_core::process::ProcessModel;
use stagehand_core::runtime::Runner;
use stagehand_core::{Error, Result};
use stagehand_db::{AppRepo, DbError, DropletRepo};

use crate::messenger::Messenger;

/// Runs processes by speaking the desire/stop protocol through the
/// messenger. Injected into the completion handler so a freshly staged
/// droplet can be started without the handler knowing the protocol.
pub struct ClusterRunner {
    apps: Arc<dyn AppRepo>,
    droplets: Arc<dyn DropletRepo>,
    messenger: Arc<Messenger>,
    default_health_check_timeout_secs: u32,
}

impl ClusterRunner {
    pub fn new(
        apps: Arc<dyn AppRepo>,
        droplets: Arc<dyn DropletRepo>,
        messenger: Arc<Messenger>,
        default_health_check_timeout_secs: u32,
    ) -> Self {
        Self {
            apps,
            droplets,
            messenger,
            default_health_check_timeout_secs,
        }
    }
}

fn db_error(error: DbError) -> Error {
    match error {
        DbError::NotFound(what) => Error::NotFound(what),
        other => Error::Internal(other.to_string()),
    }
}

#[async_trait]
impl Runner for ClusterRunner {
    async fn start(&self, process: &ProcessModel) -> Result<()> {
        let app = self.apps.get(&process.app_guid).await.map_err(db_error)?;
        let droplet_guid = app.droplet_guid.ok_or_else(|| {
            Error::InvalidInput(format!("app {} has no current droplet", app.guid))
        })?;
        let droplet = self.droplets.get(&droplet_guid).await.map_err(db_error)?;

        info!(app_guid = %app.guid, droplet_guid = %droplet.guid, "runner.start");
        self.messenger
            .send_desire_request(process, &droplet, self.default_health_check_timeout_secs)
            .await
            .map_err(|e| Error::DispatchFailed(e.to_string()))
    }

    async fn stop(&self, process: &ProcessModel) -> Result<()> {
        self.messenger
            .send_stop_app_request(process)
            .await
            .map_err(|e| Error::DispatchFailed(e.to_string()))
    }

    async fn stop_index(&self, process: &ProcessModel, index: u32) -> Result<()> {
        self.messenger
            .send_stop_index_request(process, index)
            .await
            .map_err(|e| Error::DispatchFailed(e.to_string()))
    }
}
