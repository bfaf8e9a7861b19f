//! Worker that drains the staging-completion channel.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use stagehand_core::Guid;
use stagehand_db::{DbError, DropletRepo};

use crate::completion::StagingCompletionHandler;
use crate::error::StagingError;
use crate::queue::{CompletionMessage, PgCompletionQueue};

/// Claims completion callbacks and runs them through the handler.
///
/// Invocations for different droplets may overlap freely across worker
/// instances; per-droplet serialization happens in the repository's row
/// locks, not here.
pub struct CompletionWorker {
    id: String,
    queue: Arc<PgCompletionQueue>,
    droplets: Arc<dyn DropletRepo>,
    handler: Arc<StagingCompletionHandler>,
    start_after_staging: bool,
}

impl CompletionWorker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<PgCompletionQueue>,
        droplets: Arc<dyn DropletRepo>,
        handler: Arc<StagingCompletionHandler>,
        start_after_staging: bool,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            droplets,
            handler,
            start_after_staging,
        }
    }

    /// Run the worker loop.
    pub async fn run(&self) {
        info!(worker_id = %self.id, "Starting completion worker");

        loop {
            match self.queue.claim(&self.id).await {
                Ok(Some(message)) => {
                    self.process(message).await;
                }
                Ok(None) => {
                    // No completions pending, wait before polling again
                    sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to claim completion");
                    sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn process(&self, message: CompletionMessage) {
        let staging_guid: Guid = match message.staging_guid.parse() {
            Ok(guid) => guid,
            Err(_) => {
                warn!(
                    staging_guid = %message.staging_guid,
                    "Dropping completion with unparseable staging guid"
                );
                let _ = self.queue.fail(message.id, "unparseable staging guid").await;
                return;
            }
        };

        let droplet = match self.droplets.get(&staging_guid).await {
            Ok(droplet) => droplet,
            Err(DbError::NotFound(_)) => {
                warn!(staging_guid = %staging_guid, "Dropping completion for unknown droplet");
                let _ = self.queue.fail(message.id, "unknown droplet").await;
                return;
            }
            Err(e) => {
                warn!(staging_guid = %staging_guid, error = %e, "Failed to load droplet");
                let _ = self.queue.fail(message.id, &e.to_string()).await;
                return;
            }
        };

        match self
            .handler
            .staging_complete(&droplet, &message.payload, self.start_after_staging)
            .await
        {
            Ok(()) => {
                if let Err(e) = self.queue.complete(message.id).await {
                    warn!(id = message.id, error = %e, "Failed to mark completion processed");
                }
            }
            Err(StagingError::MalformedResponse(decode_error)) => {
                // The failure is already recorded on the droplet; the
                // message is marked failed for operator visibility only.
                warn!(
                    staging_guid = %staging_guid,
                    error = %decode_error,
                    "Malformed completion payload"
                );
                let _ = self.queue.fail(message.id, &decode_error.to_string()).await;
            }
            Err(e) => {
                warn!(staging_guid = %staging_guid, error = %e, "Completion handling failed");
                let _ = self.queue.fail(message.id, &e.to_string()).await;
            }
        }
    }
}
