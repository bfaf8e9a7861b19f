//! Staging completion handling: the droplet state machine.
//!
//! A completion callback is classified into an outcome first, then the
//! outcome is applied. Classification may substitute a synthetic failure
//! for a malformed payload; because the substitution happens during
//! classification and the synthetic outcome is already typed, it can
//! happen at most once per callback.

pub mod payload;

use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use stagehand_core::droplet::{BuildpackReceipt, DropletModel, StagedResult};
use stagehand_core::lifecycle::LifecycleKind;
use stagehand_core::log_stream::AppLogEmitter;
use stagehand_core::runtime::Runner;
use stagehand_db::{AppRepo, DropletRepo};

use crate::error::StagingError;
use self::payload::{decode_failure, decode_success, DecodeError, StagingResult};

const DEFAULT_STAGING_ERROR: &str = "StagingError";

/// Classified result of a completion callback.
enum Outcome {
    Staged(StagingResult),
    Failed {
        error_id: String,
        error_description: String,
        /// Present when the outcome was substituted for a malformed
        /// payload; returned to the invoker after the failure is
        /// recorded.
        malformed: Option<DecodeError>,
    },
}

pub struct StagingCompletionHandler {
    /// Backend name embedded in operator-facing malformed-message text.
    stager_name: &'static str,
    droplets: Arc<dyn DropletRepo>,
    apps: Arc<dyn AppRepo>,
    runner: Arc<dyn Runner>,
    log_emitter: Arc<dyn AppLogEmitter>,
}

impl StagingCompletionHandler {
    pub fn new(
        stager_name: &'static str,
        droplets: Arc<dyn DropletRepo>,
        apps: Arc<dyn AppRepo>,
        runner: Arc<dyn Runner>,
        log_emitter: Arc<dyn AppLogEmitter>,
    ) -> Self {
        Self {
            stager_name,
            droplets,
            apps,
            runner,
            log_emitter,
        }
    }

    /// Process one completion callback for a droplet.
    ///
    /// Exactly-once semantics: by the time this returns, the droplet is
    /// terminal (or the persistence failure has been logged), and a
    /// malformed payload is additionally surfaced as
    /// `StagingError::MalformedResponse`. Never retries, never re-reads
    /// the channel.
    pub async fn staging_complete(
        &self,
        droplet: &DropletModel,
        payload: &Value,
        with_start: bool,
    ) -> Result<(), StagingError> {
        info!(staging_guid = %droplet.guid, response = %payload, "staging.finished");

        let outcome = if payload.get("error").is_some() {
            self.classify_failure(droplet, payload)
        } else {
            self.classify_success(droplet, payload)
        };
        self.apply(droplet, payload, with_start, outcome).await
    }

    fn classify_failure(&self, droplet: &DropletModel, payload: &Value) -> Outcome {
        match decode_failure(payload) {
            Ok(error) => Outcome::Failed {
                error_id: error.id,
                error_description: error.message,
                malformed: None,
            },
            Err(decode_error) => {
                error!(
                    staging_guid = %droplet.guid,
                    payload = %payload,
                    error = %decode_error,
                    "staging.failure.invalid-message"
                );
                self.malformed_outcome(decode_error)
            }
        }
    }

    fn classify_success(&self, droplet: &DropletModel, payload: &Value) -> Outcome {
        match decode_success(payload) {
            Err(decode_error) => {
                error!(
                    staging_guid = %droplet.guid,
                    payload = %payload,
                    error = %decode_error,
                    "staging.success.invalid-message"
                );
                self.malformed_outcome(decode_error)
            }
            Ok(result) if result.process_types.is_empty() => Outcome::Failed {
                error_id: DEFAULT_STAGING_ERROR.to_string(),
                error_description: "No process types returned from stager".to_string(),
                malformed: None,
            },
            Ok(result) => Outcome::Staged(result),
        }
    }

    fn malformed_outcome(&self, decode_error: DecodeError) -> Outcome {
        Outcome::Failed {
            error_id: DEFAULT_STAGING_ERROR.to_string(),
            error_description: format!("Malformed message from {} stager", self.stager_name),
            malformed: Some(decode_error),
        }
    }

    async fn apply(
        &self,
        droplet: &DropletModel,
        payload: &Value,
        with_start: bool,
        outcome: Outcome,
    ) -> Result<(), StagingError> {
        match outcome {
            Outcome::Failed {
                error_id,
                error_description,
                malformed,
            } => {
                if let Err(save_error) = self
                    .droplets
                    .mark_failed(&droplet.guid, &error_id, &error_description)
                    .await
                {
                    error!(
                        staging_guid = %droplet.guid,
                        response = %payload,
                        error = %save_error,
                        "staging.saving-staging-result-failed"
                    );
                }

                self.log_emitter.emit_error(
                    &droplet.guid,
                    &format!("Failed to stage droplet: {error_description}"),
                );

                match malformed {
                    Some(decode_error) => Err(StagingError::MalformedResponse(decode_error)),
                    None => Ok(()),
                }
            }
            Outcome::Staged(result) => {
                if let Err(save_error) = self
                    .save_staging_result(droplet, result, with_start)
                    .await
                {
                    error!(
                        staging_guid = %droplet.guid,
                        response = %payload,
                        error = %save_error,
                        "staging.saving-staging-result-failed"
                    );
                }
                Ok(())
            }
        }
    }

    async fn save_staging_result(
        &self,
        droplet: &DropletModel,
        result: StagingResult,
        with_start: bool,
    ) -> Result<(), StagingError> {
        let staged = self.staged_result(droplet, result);
        self.droplets.mark_staged(&droplet.guid, &staged).await?;
        if with_start {
            self.start_process(droplet).await?;
        }
        Ok(())
    }

    /// Resolve the receipt: prefer what the stager detected, fall back to
    /// the lifecycle configuration the attempt was requested with.
    fn staged_result(&self, droplet: &DropletModel, result: StagingResult) -> StagedResult {
        let (buildpack_receipt, docker_image) = match droplet.lifecycle {
            LifecycleKind::Buildpack => {
                let metadata = &result.lifecycle_metadata;
                let requested = droplet.buildpack_lifecycle.as_ref();

                let buildpack = if metadata.detected_buildpack.is_empty() {
                    requested
                        .and_then(|lifecycle| lifecycle.requested_buildpack_name())
                        .unwrap_or_default()
                        .to_string()
                } else {
                    metadata.detected_buildpack.clone()
                };
                let buildpack_key = (!metadata.buildpack_key.is_empty())
                    .then(|| metadata.buildpack_key.clone());
                let stack = requested.map(|lifecycle| lifecycle.stack.clone());

                (
                    Some(BuildpackReceipt {
                        buildpack,
                        buildpack_key,
                        stack,
                    }),
                    None,
                )
            }
            LifecycleKind::Docker => (None, result.lifecycle_metadata.docker_image.clone()),
        };

        StagedResult {
            process_types: result.process_types,
            execution_metadata: result.execution_metadata,
            buildpack_receipt,
            docker_image,
        }
    }

    /// Promote the droplet to the app's current droplet and start the web
    /// process, unless a newer staging attempt has superseded this one.
    async fn start_process(&self, droplet: &DropletModel) -> Result<(), StagingError> {
        let Some(web_process) = self.apps.web_process(&droplet.app_guid).await? else {
            warn!(app_guid = %droplet.app_guid, "staging.start.no-web-process");
            return Ok(());
        };

        let latest = self.droplets.latest_for_app(&droplet.app_guid).await?;
        if latest.map(|d| d.guid) != Some(droplet.guid) {
            // A newer attempt owns the app now; starting would roll it
            // back onto an outdated build.
            return Ok(());
        }

        self.apps
            .assign_current_droplet(&droplet.app_guid, &droplet.guid)
            .await?;
        self.runner.start(&web_process).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use stagehand_core::app::AppModel;
    use stagehand_core::droplet::DropletState;
    use stagehand_core::lifecycle::{BuildpackLifecycle, RequestedBuildpack};
    use stagehand_core::process::ProcessModel;
    use stagehand_core::{Guid, Result as CoreResult};
    use stagehand_db::{DbError, DbResult, NewDroplet};

    struct InMemoryDroplets {
        droplets: Mutex<Vec<DropletModel>>,
        fail_saves: bool,
    }

    impl InMemoryDroplets {
        fn with(droplets: Vec<DropletModel>) -> Self {
            Self {
                droplets: Mutex::new(droplets),
                fail_saves: false,
            }
        }

        fn failing_saves(droplets: Vec<DropletModel>) -> Self {
            Self {
                droplets: Mutex::new(droplets),
                fail_saves: true,
            }
        }

        fn snapshot(&self, guid: &Guid) -> DropletModel {
            self.droplets
                .lock()
                .unwrap()
                .iter()
                .find(|d| d.guid == *guid)
                .cloned()
                .unwrap()
        }
    }

    #[async_trait]
    impl DropletRepo for InMemoryDroplets {
        async fn create(&self, _new: NewDroplet) -> DbResult<DropletModel> {
            unimplemented!()
        }

        async fn get(&self, guid: &Guid) -> DbResult<DropletModel> {
            self.droplets
                .lock()
                .unwrap()
                .iter()
                .find(|d| d.guid == *guid)
                .cloned()
                .ok_or_else(|| DbError::NotFound(format!("droplet {guid}")))
        }

        async fn latest_for_app(&self, app_guid: &Guid) -> DbResult<Option<DropletModel>> {
            Ok(self
                .droplets
                .lock()
                .unwrap()
                .iter()
                .filter(|d| d.app_guid == *app_guid)
                .max_by_key(|d| d.created_at)
                .cloned())
        }

        async fn mark_staging(&self, guid: &Guid) -> DbResult<DropletModel> {
            self.update_non_terminal(guid, |droplet| {
                droplet.state = DropletState::Staging;
            })
        }

        async fn mark_staged(&self, guid: &Guid, result: &StagedResult) -> DbResult<DropletModel> {
            if self.fail_saves {
                return Err(DbError::Database(sqlx::Error::PoolClosed));
            }
            self.update_non_terminal(guid, |droplet| {
                droplet.state = DropletState::Staged;
                droplet.process_types = result.process_types.clone();
                droplet.execution_metadata = result.execution_metadata.clone();
                if let Some(receipt) = &result.buildpack_receipt {
                    droplet.buildpack_receipt_buildpack = Some(receipt.buildpack.clone());
                    droplet.buildpack_receipt_buildpack_key = receipt.buildpack_key.clone();
                    droplet.buildpack_receipt_stack = receipt.stack.clone();
                }
                droplet.docker_receipt_image = result.docker_image.clone();
            })
        }

        async fn mark_failed(
            &self,
            guid: &Guid,
            error_id: &str,
            error_description: &str,
        ) -> DbResult<DropletModel> {
            if self.fail_saves {
                return Err(DbError::Database(sqlx::Error::PoolClosed));
            }
            self.update_non_terminal(guid, |droplet| {
                droplet.state = DropletState::Failed;
                droplet.error_id = Some(error_id.to_string());
                droplet.error_description = Some(error_description.to_string());
            })
        }
    }

    impl InMemoryDroplets {
        fn update_non_terminal(
            &self,
            guid: &Guid,
            mutate: impl FnOnce(&mut DropletModel),
        ) -> DbResult<DropletModel> {
            let mut droplets = self.droplets.lock().unwrap();
            let droplet = droplets
                .iter_mut()
                .find(|d| d.guid == *guid)
                .ok_or_else(|| DbError::NotFound(format!("droplet {guid}")))?;
            if droplet.state.is_terminal() {
                return Err(DbError::Stale(format!(
                    "droplet {guid} is already {}",
                    droplet.state
                )));
            }
            mutate(droplet);
            Ok(droplet.clone())
        }
    }

    struct InMemoryApps {
        processes: Vec<ProcessModel>,
        assigned: Mutex<Vec<(Guid, Guid)>>,
    }

    impl InMemoryApps {
        fn with_processes(processes: Vec<ProcessModel>) -> Self {
            Self {
                processes,
                assigned: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AppRepo for InMemoryApps {
        async fn get(&self, _guid: &Guid) -> DbResult<AppModel> {
            unimplemented!()
        }

        async fn processes(&self, app_guid: &Guid) -> DbResult<Vec<ProcessModel>> {
            Ok(self
                .processes
                .iter()
                .filter(|p| p.app_guid == *app_guid)
                .cloned()
                .collect())
        }

        async fn web_process(&self, app_guid: &Guid) -> DbResult<Option<ProcessModel>> {
            Ok(self
                .processes
                .iter()
                .find(|p| p.app_guid == *app_guid && p.is_web())
                .cloned())
        }

        async fn assign_current_droplet(
            &self,
            app_guid: &Guid,
            droplet_guid: &Guid,
        ) -> DbResult<()> {
            self.assigned.lock().unwrap().push((*app_guid, *droplet_guid));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingRunner {
        started: Mutex<Vec<Guid>>,
    }

    #[async_trait]
    impl Runner for RecordingRunner {
        async fn start(&self, process: &ProcessModel) -> CoreResult<()> {
            self.started.lock().unwrap().push(process.guid);
            Ok(())
        }

        async fn stop(&self, _process: &ProcessModel) -> CoreResult<()> {
            Ok(())
        }

        async fn stop_index(&self, _process: &ProcessModel, _index: u32) -> CoreResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingEmitter {
        errors: Mutex<Vec<(Guid, String)>>,
    }

    impl AppLogEmitter for RecordingEmitter {
        fn emit_error(&self, guid: &Guid, message: &str) {
            self.errors.lock().unwrap().push((*guid, message.to_string()));
        }
    }

    fn pending_droplet(app_guid: Guid) -> DropletModel {
        DropletModel {
            guid: Guid::new(),
            app_guid,
            package_guid: Some(Guid::new()),
            lifecycle: LifecycleKind::Buildpack,
            state: DropletState::Pending,
            error_id: None,
            error_description: None,
            process_types: HashMap::new(),
            execution_metadata: String::new(),
            buildpack_receipt_buildpack: None,
            buildpack_receipt_buildpack_key: None,
            buildpack_receipt_stack: None,
            docker_receipt_image: None,
            droplet_hash: None,
            buildpack_lifecycle: Some(BuildpackLifecycle {
                stack: "ubuntu-jammy".to_string(),
                buildpack: None,
                candidates: vec![],
            }),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn web_process(app_guid: Guid) -> ProcessModel {
        ProcessModel {
            guid: Guid::new(),
            version: Guid::new(),
            app_guid,
            process_type: "web".to_string(),
            command: None,
            clustered: true,
            health_check_timeout_secs: None,
            instances: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct Harness {
        droplets: Arc<InMemoryDroplets>,
        apps: Arc<InMemoryApps>,
        runner: Arc<RecordingRunner>,
        emitter: Arc<RecordingEmitter>,
        handler: StagingCompletionHandler,
    }

    fn harness(droplets: InMemoryDroplets, apps: InMemoryApps) -> Harness {
        let droplets = Arc::new(droplets);
        let apps = Arc::new(apps);
        let runner = Arc::new(RecordingRunner::default());
        let emitter = Arc::new(RecordingEmitter::default());
        let handler = StagingCompletionHandler::new(
            "cluster",
            droplets.clone(),
            apps.clone(),
            runner.clone(),
            emitter.clone(),
        );
        Harness {
            droplets,
            apps,
            runner,
            emitter,
            handler,
        }
    }

    fn success_response() -> Value {
        json!({
            "result": {
                "lifecycle_type": "buildpack",
                "lifecycle_metadata": {
                    "buildpack_key": "k1",
                    "detected_buildpack": "ruby_buildpack"
                },
                "execution_metadata": "",
                "process_types": {"web": "bundle exec rails s"}
            }
        })
    }

    fn fail_response() -> Value {
        json!({"error": {"id": "NoCompatibleCell", "message": "Found no compatible cell"}})
    }

    #[tokio::test]
    async fn test_success_marks_the_droplet_staged() {
        let droplet = pending_droplet(Guid::new());
        let h = harness(
            InMemoryDroplets::with(vec![droplet.clone()]),
            InMemoryApps::with_processes(vec![]),
        );

        h.handler
            .staging_complete(&droplet, &success_response(), false)
            .await
            .unwrap();

        let saved = h.droplets.snapshot(&droplet.guid);
        assert_eq!(saved.state, DropletState::Staged);
        assert_eq!(saved.process_types["web"], "bundle exec rails s");
        assert_eq!(
            saved.buildpack_receipt_buildpack.as_deref(),
            Some("ruby_buildpack")
        );
        assert_eq!(saved.buildpack_receipt_buildpack_key.as_deref(), Some("k1"));
        assert_eq!(saved.buildpack_receipt_stack.as_deref(), Some("ubuntu-jammy"));
    }

    #[tokio::test]
    async fn test_success_persists_all_process_types_and_metadata() {
        let droplet = pending_droplet(Guid::new());
        let h = harness(
            InMemoryDroplets::with(vec![droplet.clone()]),
            InMemoryApps::with_processes(vec![]),
        );

        let mut payload = success_response();
        payload["result"]["process_types"] = json!({
            "web": "start me",
            "worker": "hello",
            "anything": "hi hi hi"
        });
        payload["result"]["execution_metadata"] = json!("black-box-string");

        h.handler
            .staging_complete(&droplet, &payload, false)
            .await
            .unwrap();

        let saved = h.droplets.snapshot(&droplet.guid);
        assert_eq!(saved.execution_metadata, "black-box-string");
        assert_eq!(saved.process_types.len(), 3);
        assert_eq!(saved.process_types["worker"], "hello");
    }

    #[tokio::test]
    async fn test_empty_detected_buildpack_falls_back_to_requested_lifecycle() {
        let mut droplet = pending_droplet(Guid::new());
        droplet.buildpack_lifecycle = Some(BuildpackLifecycle {
            stack: "alt-stack".to_string(),
            buildpack: Some(RequestedBuildpack::Custom {
                url: "legacy-pack".to_string(),
            }),
            candidates: vec![],
        });
        let h = harness(
            InMemoryDroplets::with(vec![droplet.clone()]),
            InMemoryApps::with_processes(vec![]),
        );

        let mut payload = success_response();
        payload["result"]["lifecycle_metadata"]["detected_buildpack"] = json!("");
        payload["result"]["lifecycle_metadata"]["buildpack_key"] = json!("");

        h.handler
            .staging_complete(&droplet, &payload, false)
            .await
            .unwrap();

        let saved = h.droplets.snapshot(&droplet.guid);
        assert_eq!(saved.buildpack_receipt_buildpack.as_deref(), Some("legacy-pack"));
        assert_eq!(saved.buildpack_receipt_buildpack_key, None);
        assert_eq!(
            saved.buildpack_receipt_stack.as_deref(),
            Some("alt-stack")
        );
    }

    #[tokio::test]
    async fn test_null_process_types_becomes_a_staging_failure() {
        let droplet = pending_droplet(Guid::new());
        let h = harness(
            InMemoryDroplets::with(vec![droplet.clone()]),
            InMemoryApps::with_processes(vec![]),
        );

        let mut payload = success_response();
        payload["result"]["process_types"] = Value::Null;

        h.handler
            .staging_complete(&droplet, &payload, false)
            .await
            .unwrap();

        let saved = h.droplets.snapshot(&droplet.guid);
        assert_eq!(saved.state, DropletState::Failed);
        assert_eq!(
            saved.error().unwrap(),
            "StagingError - No process types returned from stager"
        );
    }

    #[tokio::test]
    async fn test_malformed_success_records_failure_and_raises() {
        let droplet = pending_droplet(Guid::new());
        let h = harness(
            InMemoryDroplets::with(vec![droplet.clone()]),
            InMemoryApps::with_processes(vec![]),
        );

        let mut payload = success_response();
        payload["result"]
            .as_object_mut()
            .unwrap()
            .remove("execution_metadata");

        let result = h.handler.staging_complete(&droplet, &payload, false).await;
        assert!(matches!(result, Err(StagingError::MalformedResponse(_))));

        let saved = h.droplets.snapshot(&droplet.guid);
        assert_eq!(saved.state, DropletState::Failed);
        assert_eq!(saved.error_id.as_deref(), Some("StagingError"));
        assert!(
            saved
                .error_description
                .as_deref()
                .unwrap()
                .contains("Malformed message")
        );

        let emitted = h.emitter.errors.lock().unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].0, droplet.guid);
        assert!(emitted[0].1.contains("Malformed message from cluster stager"));
    }

    #[tokio::test]
    async fn test_failure_marks_the_droplet_failed_and_emits() {
        let droplet = pending_droplet(Guid::new());
        let h = harness(
            InMemoryDroplets::with(vec![droplet.clone()]),
            InMemoryApps::with_processes(vec![]),
        );

        h.handler
            .staging_complete(&droplet, &fail_response(), false)
            .await
            .unwrap();

        let saved = h.droplets.snapshot(&droplet.guid);
        assert_eq!(saved.state, DropletState::Failed);
        assert_eq!(
            saved.error().unwrap(),
            "NoCompatibleCell - Found no compatible cell"
        );

        let emitted = h.emitter.errors.lock().unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].0, droplet.guid);
        assert!(emitted[0].1.contains("Found no compatible cell"));
    }

    #[tokio::test]
    async fn test_malformed_failure_records_substitute_error_and_raises() {
        let droplet = pending_droplet(Guid::new());
        let h = harness(
            InMemoryDroplets::with(vec![droplet.clone()]),
            InMemoryApps::with_processes(vec![]),
        );

        let payload = json!({"error": {"id": "stuff"}});
        let result = h.handler.staging_complete(&droplet, &payload, false).await;
        assert!(matches!(result, Err(StagingError::MalformedResponse(_))));

        let saved = h.droplets.snapshot(&droplet.guid);
        assert_eq!(saved.state, DropletState::Failed);
        assert_eq!(
            saved.error().unwrap(),
            "StagingError - Malformed message from cluster stager"
        );
    }

    #[tokio::test]
    async fn test_save_failure_on_success_path_is_swallowed() {
        let droplet = pending_droplet(Guid::new());
        let h = harness(
            InMemoryDroplets::failing_saves(vec![droplet.clone()]),
            InMemoryApps::with_processes(vec![]),
        );

        h.handler
            .staging_complete(&droplet, &success_response(), true)
            .await
            .unwrap();

        // Nothing persisted, nothing started.
        assert_eq!(
            h.droplets.snapshot(&droplet.guid).state,
            DropletState::Pending
        );
        assert!(h.runner.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_failure_on_failure_path_is_swallowed_but_still_emits() {
        let droplet = pending_droplet(Guid::new());
        let h = harness(
            InMemoryDroplets::failing_saves(vec![droplet.clone()]),
            InMemoryApps::with_processes(vec![]),
        );

        h.handler
            .staging_complete(&droplet, &fail_response(), false)
            .await
            .unwrap();

        assert_eq!(h.emitter.errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_with_start_promotes_droplet_and_starts_web_process() {
        let app_guid = Guid::new();
        let droplet = pending_droplet(app_guid);
        let process = web_process(app_guid);
        let h = harness(
            InMemoryDroplets::with(vec![droplet.clone()]),
            InMemoryApps::with_processes(vec![process.clone()]),
        );

        h.handler
            .staging_complete(&droplet, &success_response(), true)
            .await
            .unwrap();

        let assigned = h.apps.assigned.lock().unwrap();
        assert_eq!(assigned.as_slice(), &[(app_guid, droplet.guid)]);
        assert_eq!(h.runner.started.lock().unwrap().as_slice(), &[process.guid]);
    }

    #[tokio::test]
    async fn test_stale_completion_does_not_start_superseded_droplet() {
        let app_guid = Guid::new();
        let droplet = pending_droplet(app_guid);
        let mut newer = pending_droplet(app_guid);
        newer.created_at = droplet.created_at + chrono::Duration::seconds(5);
        let process = web_process(app_guid);
        let h = harness(
            InMemoryDroplets::with(vec![droplet.clone(), newer]),
            InMemoryApps::with_processes(vec![process]),
        );

        h.handler
            .staging_complete(&droplet, &success_response(), true)
            .await
            .unwrap();

        // Result persisted, but the app stays on whatever the newer
        // attempt produces.
        assert_eq!(
            h.droplets.snapshot(&droplet.guid).state,
            DropletState::Staged
        );
        assert!(h.apps.assigned.lock().unwrap().is_empty());
        assert!(h.runner.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_completion_for_terminal_droplet_is_idempotent() {
        let mut droplet = pending_droplet(Guid::new());
        droplet.state = DropletState::Staged;
        droplet.process_types =
            HashMap::from([("web".to_string(), "original command".to_string())]);
        let h = harness(
            InMemoryDroplets::with(vec![droplet.clone()]),
            InMemoryApps::with_processes(vec![]),
        );

        // A duplicate failure callback for an already-staged droplet must
        // not regress it.
        h.handler
            .staging_complete(&droplet, &fail_response(), false)
            .await
            .unwrap();

        let saved = h.droplets.snapshot(&droplet.guid);
        assert_eq!(saved.state, DropletState::Staged);
        assert_eq!(saved.process_types["web"], "original command");
    }

    #[tokio::test]
    async fn test_docker_success_records_image_receipt() {
        let mut droplet = pending_droplet(Guid::new());
        droplet.lifecycle = LifecycleKind::Docker;
        droplet.buildpack_lifecycle = None;
        let h = harness(
            InMemoryDroplets::with(vec![droplet.clone()]),
            InMemoryApps::with_processes(vec![]),
        );

        let payload = json!({
            "result": {
                "lifecycle_type": "docker",
                "lifecycle_metadata": {"docker_image": "cached/app:sha"},
                "execution_metadata": "{\"cmd\":[]}",
                "process_types": {"web": "/start"}
            }
        });

        h.handler
            .staging_complete(&droplet, &payload, false)
            .await
            .unwrap();

        let saved = h.droplets.snapshot(&droplet.guid);
        assert_eq!(saved.state, DropletState::Staged);
        assert_eq!(saved.docker_receipt_image.as_deref(), Some("cached/app:sha"));
        assert_eq!(saved.buildpack_receipt_buildpack, None);
    }
}
