//! Batch coordinator: validate a submission, then convert its files in order.
//!
//! Validation covers the whole batch (file count, pairing, every domain and
//! extension) and happens before anything touches the filesystem. Every file
//! is then routed before any of them runs, so a file with no route stops the
//! batch before any adapter is called. Files run one at a time and the first
//! failure stops the batch. Outputs of files that already succeeded stay on
//! disk.
//!
//! Uploaded inputs belong to the batch: once it has started, all of them
//! are reclaimed when it ends, whatever the outcome. A submission rejected
//! by validation leaves its uploads alone (the intake sweep collects them).

use crate::artifact::ArtifactStore;
use crate::cleanup::Cleanup;
use crate::config::EngineConfig;
use crate::error::{ConvertError, ErrorKind, ValidationError};
use crate::output::{BatchFailure, BatchResult, FileResult, JobResult};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::request::{BatchId, BatchSubmission, ConversionRequest, JobId};
use crate::router::Router;
use crate::supervisor::JobSupervisor;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Clone)]
pub struct BatchCoordinator {
    router: Router,
    supervisor: JobSupervisor,
    store: ArtifactStore,
    cleanup: Cleanup,
    max_files: usize,
    progress: ProgressCallback,
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("router", &self.router)
            .field("supervisor", &self.supervisor)
            .field("max_files", &self.max_files)
            .finish_non_exhaustive()
    }
}

impl BatchCoordinator {
    pub fn new(
        config: &EngineConfig,
        router: Router,
        supervisor: JobSupervisor,
        store: ArtifactStore,
        cleanup: Cleanup,
    ) -> Self {
        Self {
            router,
            supervisor,
            store,
            cleanup,
            max_files: config.max_batch_files,
            progress: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
        }
    }

    /// Validate a whole submission without touching the filesystem.
    pub fn validate(
        &self,
        submission: &BatchSubmission,
    ) -> Result<Vec<ConversionRequest>, ValidationError> {
        let files = submission.files.len();
        let formats = submission.formats.len();
        if files == 0 {
            return Err(ValidationError::NoFiles);
        }
        if files > self.max_files {
            return Err(ValidationError::TooManyFiles {
                count: files,
                max: self.max_files,
            });
        }
        if files != formats {
            return Err(ValidationError::CountMismatch { files, formats });
        }

        submission
            .files
            .iter()
            .zip(&submission.formats)
            .enumerate()
            .map(|(index, (file, format))| ConversionRequest::validate(index, file, format))
            .collect()
    }

    /// Validate and run a batch.
    ///
    /// `Err` means the batch was not accepted (validation or working
    /// directories). Once accepted, per-file failures are reported inside
    /// the [`BatchResult`].
    pub async fn process_batch(
        &self,
        submission: BatchSubmission,
    ) -> Result<BatchResult, ConvertError> {
        let requests = self.validate(&submission)?;
        let batch_id = BatchId::new();
        let span = info_span!("batch", batch_id = %batch_id, files = requests.len());

        async move {
            let started = Instant::now();
            let result = match self.store.ensure_dirs().await {
                Ok(()) => Ok(self.run_files(batch_id, &requests, started).await),
                Err(e) => Err(e),
            };

            let inputs: Vec<&std::path::PathBuf> = submission.files.iter().map(|f| &f.path).collect();
            let summary = self.cleanup.reclaim(inputs).await;
            debug!(?summary, "Reclaimed batch inputs");
            result
        }
        .instrument(span)
        .await
    }

    async fn run_files(
        &self,
        batch_id: BatchId,
        requests: &[ConversionRequest],
        started: Instant,
    ) -> BatchResult {
        let total = requests.len();
        let cb = &self.progress;
        cb.on_batch_start(total);
        info!(total, "Batch started");

        let mut files = Vec::with_capacity(total);
        let mut failure = None;

        let plans: Vec<_> = requests.iter().map(|r| self.router.plan(r)).collect();
        // Start at the first unroutable file, if any; it fails before anything runs.
        let first_unroutable = plans.iter().position(Result::is_err);

        for (index, (request, plan)) in requests
            .iter()
            .zip(&plans)
            .enumerate()
            .skip(first_unroutable.unwrap_or(0))
        {
            cb.on_file_start(index, total, &request.original_name);

            let result = match plan {
                Ok(plan) => self.supervisor.run(JobId::new(), request, plan).await,
                Err(e) => {
                    warn!(file = %request.original_name, error = %e, "No conversion plan");
                    JobResult::failed(ErrorKind::Routing, e.to_string(), 0, 0)
                }
            };

            match &result.output {
                Some(output) => cb.on_file_complete(index, total, &output.to_string()),
                None => {
                    let kind = result.error_kind.unwrap_or(ErrorKind::Internal);
                    let message = result.message.clone().unwrap_or_default();
                    cb.on_file_error(index, total, &message);
                    failure = Some(BatchFailure {
                        index,
                        original_name: request.original_name.clone(),
                        domain: request.domain,
                        target: request.target_extension.clone(),
                        kind,
                        message,
                    });
                }
            }

            files.push(FileResult {
                index,
                original_name: request.original_name.clone(),
                result,
            });
            if failure.is_some() {
                break;
            }
        }

        let succeeded = files.iter().filter(|f| f.result.is_success()).count();
        cb.on_batch_complete(total, succeeded);
        match &failure {
            None => info!(total, "Batch completed"),
            Some(f) => warn!(
                index = f.index,
                file = %f.original_name,
                kind = %f.kind,
                succeeded,
                "Batch aborted"
            ),
        }

        BatchResult {
            batch_id,
            files,
            failure,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterSet;
    use crate::request::{FormatRequest, UploadedFile};
    use std::time::Duration;
    use tempfile::TempDir;

    fn coordinator(dir: &TempDir) -> BatchCoordinator {
        let config = EngineConfig::builder()
            .intake_dir(dir.path().join("intake"))
            .converted_dir(dir.path().join("converted"))
            .build()
            .unwrap();
        let store = ArtifactStore::from_config(&config);
        let cleanup = Cleanup::new(config.retry_policy());
        let supervisor = JobSupervisor::new(
            store.clone(),
            cleanup.clone(),
            Duration::from_secs(5),
            Duration::from_secs(1),
        );
        BatchCoordinator::new(
            &config,
            Router::new(AdapterSet::standard(&config)),
            supervisor,
            store,
            cleanup,
        )
    }

    fn files(n: usize) -> Vec<UploadedFile> {
        (0..n)
            .map(|i| UploadedFile::new(format!("/nowhere/{i}.jpg"), format!("{i}.jpg")))
            .collect()
    }

    fn formats(n: usize) -> Vec<FormatRequest> {
        (0..n).map(|_| FormatRequest::new("image", "png")).collect()
    }

    #[tokio::test]
    async fn count_mismatch_is_rejected_without_touching_disk() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        let err = c
            .process_batch(BatchSubmission::new(files(3), formats(2)))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains('3') && msg.contains('2'), "{msg}");
        assert!(matches!(
            err,
            ConvertError::Validation(ValidationError::CountMismatch { files: 3, formats: 2 })
        ));
        assert!(!dir.path().join("intake").exists());
        assert!(!dir.path().join("converted").exists());
    }

    #[test]
    fn size_limits() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        assert_eq!(
            c.validate(&BatchSubmission::default()).unwrap_err(),
            ValidationError::NoFiles
        );
        assert_eq!(
            c.validate(&BatchSubmission::new(files(6), formats(6)))
                .unwrap_err(),
            ValidationError::TooManyFiles { count: 6, max: 5 }
        );
        assert_eq!(c.validate(&BatchSubmission::new(files(5), formats(5))).unwrap().len(), 5);
    }

    #[test]
    fn first_invalid_entry_is_reported() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        let mut fmts = formats(3);
        fmts[1] = FormatRequest::new("image", "mp3");
        fmts[2] = FormatRequest::new("nope", "png");
        let err = c.validate(&BatchSubmission::new(files(3), fmts)).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedOutput { index: 1, .. }));
    }

    #[tokio::test]
    async fn unroutable_file_stops_batch_before_any_conversion() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        // File 0 would fail in its adapter (missing input) if it ever ran.
        let files = vec![
            UploadedFile::new("/nowhere/0.jpg", "0.jpg"),
            UploadedFile::new("/nowhere/scan.pdf", "scan.pdf"),
        ];
        let formats = vec![
            FormatRequest::new("image", "png"),
            FormatRequest::new("document", "docx"),
        ];

        let result = c.process_batch(BatchSubmission::new(files, formats)).await.unwrap();

        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].index, 1);
        let failure = result.failure.unwrap();
        assert_eq!(failure.index, 1);
        assert_eq!(failure.kind, ErrorKind::Routing);
        assert_eq!(std::fs::read_dir(dir.path().join("converted")).unwrap().count(), 0);
    }
}
