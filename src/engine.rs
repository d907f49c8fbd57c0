//! Engine facade: the entry points a transport layer calls.
//!
//! An [`Engine`] wires the components together once, from one
//! [`EngineConfig`], and is cheap to clone. Any number of batches may run
//! on the same engine at the same time; they share nothing mutable, and
//! every artifact name carries a per-job suffix.
//!
//! ```text
//! upload ──► accept_upload ──► intake/
//!                                │
//! submission ──► process_batch ──┼─ validate (no I/O)
//!                                ├─ route    (Router)
//!                                ├─ run      (JobSupervisor, deadline)
//!                                └─ reclaim inputs
//!                                        │
//!                                   converted/ ──► resolve_output / delete_output
//!                                        ▲
//!                         spawn_sweeper ─┘  (retention sweep)
//! ```

use crate::adapters::AdapterSet;
use crate::artifact::ArtifactStore;
use crate::batch::BatchCoordinator;
use crate::cleanup::{Cleanup, CleanupOutcome, SweepReport};
use crate::config::EngineConfig;
use crate::error::ConvertError;
use crate::output::BatchResult;
use crate::request::{BatchSubmission, ConversionRequest, FormatRequest, UploadedFile};
use crate::router::{ConversionPlan, Router};
use crate::supervisor::JobSupervisor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    store: ArtifactStore,
    cleanup: Cleanup,
    router: Router,
    coordinator: BatchCoordinator,
}

impl Engine {
    /// Engine with the standard adapter set.
    pub fn new(config: EngineConfig) -> Self {
        let adapters = AdapterSet::standard(&config);
        Self::with_adapters(config, adapters)
    }

    /// Engine with a caller-supplied adapter set.
    pub fn with_adapters(config: EngineConfig, adapters: AdapterSet) -> Self {
        let store = ArtifactStore::from_config(&config);
        let cleanup = Cleanup::new(config.retry_policy());
        let router = Router::new(adapters);
        let supervisor = JobSupervisor::from_config(&config, store.clone(), cleanup.clone());
        let coordinator = BatchCoordinator::new(
            &config,
            router.clone(),
            supervisor,
            store.clone(),
            cleanup.clone(),
        );
        info!(
            adapters = ?router.adapters().names(),
            intake = %config.intake_dir.display(),
            converted = %config.converted_dir.display(),
            "Engine ready"
        );
        Self {
            config: Arc::new(config),
            store,
            cleanup,
            router,
            coordinator,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Copy a client file into intake. See [`ArtifactStore::accept_upload`].
    pub async fn accept_upload(
        &self,
        source: impl AsRef<Path>,
        original_name: &str,
    ) -> Result<UploadedFile, ConvertError> {
        self.store.accept_upload(source.as_ref(), original_name).await
    }

    /// Validate and run one batch. See [`BatchCoordinator::process_batch`].
    pub async fn process_batch(
        &self,
        submission: BatchSubmission,
    ) -> Result<BatchResult, ConvertError> {
        self.coordinator.process_batch(submission).await
    }

    /// Run a batch on its own task.
    pub fn spawn_batch(
        &self,
        submission: BatchSubmission,
    ) -> JoinHandle<Result<BatchResult, ConvertError>> {
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move { coordinator.process_batch(submission).await })
    }

    /// Blocking variant of [`Engine::process_batch`] for non-async callers.
    ///
    /// Creates a runtime for the call; must not be used from inside one.
    pub fn process_batch_sync(
        &self,
        submission: BatchSubmission,
    ) -> Result<BatchResult, ConvertError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.process_batch(submission))
    }

    /// Plan a conversion without running it.
    ///
    /// `input_name` is only used for its extension.
    pub fn plan(
        &self,
        domain: &str,
        input_name: &str,
        target: &str,
    ) -> Result<ConversionPlan, ConvertError> {
        let file = UploadedFile::new(input_name, input_name);
        let request = ConversionRequest::validate(0, &file, &FormatRequest::new(domain, target))?;
        Ok(self.router.plan(&request)?)
    }

    /// Path of a committed output, for serving it.
    pub async fn resolve_output(&self, file_name: &str) -> Result<PathBuf, ConvertError> {
        self.store.resolve_output(file_name).await
    }

    /// Delete a committed output once the client has fetched it. Idempotent.
    pub async fn delete_output(&self, file_name: &str) -> Result<CleanupOutcome, ConvertError> {
        self.store.delete_output(&self.cleanup, file_name).await
    }

    /// One retention pass over both working directories.
    ///
    /// Outputs nobody fetched, stray staging files and uploads from rejected
    /// submissions are all reclaimed once older than the retention window.
    pub async fn sweep(&self) -> Vec<SweepReport> {
        let retention = self.config.output_retention();
        let mut reports = Vec::with_capacity(2);
        for dir in [self.store.converted_dir(), self.store.intake_dir()] {
            reports.push(self.cleanup.sweep_expired(dir, retention).await);
        }
        reports
    }

    /// Run [`Engine::sweep`] every `sweep_interval` until `cancel` fires.
    ///
    /// The first pass runs immediately.
    pub fn spawn_sweeper(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let engine = self.clone();
        let period = self.config.sweep_interval().max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = period.as_secs(), "Retention sweeper started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        for report in engine.sweep().await {
                            if report.failed > 0 {
                                warn!(
                                    dir = %report.directory.display(),
                                    failed = report.failed,
                                    "Sweep left entries behind"
                                );
                            }
                        }
                    }
                }
            }
            info!("Retention sweeper stopped");
        })
    }
}
