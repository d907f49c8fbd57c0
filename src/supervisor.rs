//! Job supervisor: executes one file's plan under a single deadline.
//!
//! Stages run strictly in order. Each stage's output path is recorded in the
//! job's [`JobLedger`] before the adapter is invoked, and is synced to disk
//! before the next stage starts. As soon as stage *i+1* has consumed stage
//! *i*'s intermediate, that intermediate is reclaimed. The final stage
//! writes to a staging name that is renamed into place on success.
//!
//! The deadline covers the whole plan. On expiry the supervisor fires the
//! job's cancellation token (child processes are killed, in-process work
//! discards its output), waits up to the kill grace for the adapter to
//! wind down, and reports [`JobStatus::Timeout`](crate::output::JobStatus).
//! Whatever remains in the ledger is reclaimed on every path out.

use crate::adapters::ConvertOptions;
use crate::artifact::{ArtifactKind, ArtifactStore, JobLedger};
use crate::cleanup::Cleanup;
use crate::config::EngineConfig;
use crate::error::{AdapterError, ErrorKind};
use crate::output::{JobResult, OutputRef};
use crate::request::{ConversionRequest, JobId};
use crate::router::ConversionPlan;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Why a job stopped before committing its output.
#[derive(Debug)]
struct StageFailure {
    kind: ErrorKind,
    message: String,
}

impl StageFailure {
    fn adapter(stage: usize, total: usize, plan: &ConversionPlan, err: AdapterError) -> Self {
        let s = &plan.stages()[stage - 1];
        Self {
            kind: ErrorKind::Adapter,
            message: format!(
                "stage {stage}/{total} ({} → {}, {}): {err}",
                s.source_extension,
                s.dest_extension,
                s.adapter.name()
            ),
        }
    }

    fn cancelled(stage: usize, total: usize) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            message: format!("cancelled after stage {stage}/{total}"),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            message: message.into(),
        }
    }
}

enum Outcome {
    Finished(Result<OutputRef, StageFailure>),
    TimedOut,
}

/// Runs plans. Cheap to clone; holds no per-job state.
#[derive(Debug, Clone)]
pub struct JobSupervisor {
    store: ArtifactStore,
    cleanup: Cleanup,
    timeout: Duration,
    kill_grace: Duration,
}

impl JobSupervisor {
    pub fn new(store: ArtifactStore, cleanup: Cleanup, timeout: Duration, kill_grace: Duration) -> Self {
        Self {
            store,
            cleanup,
            timeout,
            kill_grace,
        }
    }

    pub fn from_config(config: &EngineConfig, store: ArtifactStore, cleanup: Cleanup) -> Self {
        Self::new(store, cleanup, config.job_timeout(), config.kill_grace())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute `plan` for `request`. Never fails; the result says how it went.
    ///
    /// The request's input file is read but never deleted here; inputs
    /// belong to the batch.
    pub async fn run(
        &self,
        job_id: JobId,
        request: &ConversionRequest,
        plan: &ConversionPlan,
    ) -> JobResult {
        let span = info_span!(
            "job",
            job_id = %job_id,
            file = %request.original_name,
            stages = plan.len()
        );
        self.run_inner(job_id, request, plan).instrument(span).await
    }

    async fn run_inner(
        &self,
        job_id: JobId,
        request: &ConversionRequest,
        plan: &ConversionPlan,
    ) -> JobResult {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let cancel = CancellationToken::new();
        let current_stage = AtomicUsize::new(0);
        let mut ledger = JobLedger::new(job_id);
        let total = plan.len();

        info!(plan = %plan, timeout_secs = self.timeout.as_secs(), "Job started");

        let outcome = {
            let exec = self.execute(request, plan, &mut ledger, &cancel, &current_stage);
            tokio::pin!(exec);

            tokio::select! {
                result = &mut exec => Outcome::Finished(result),
                _ = tokio::time::sleep_until(deadline) => {
                    cancel.cancel();
                    warn!(
                        stage = current_stage.load(Ordering::SeqCst),
                        total,
                        "Deadline exceeded, cancelling"
                    );
                    match tokio::time::timeout(self.kill_grace, &mut exec).await {
                        Err(_) => {
                            warn!(grace_ms = self.kill_grace.as_millis() as u64, "Adapter did not stop within grace period");
                        }
                        // Committed while the deadline fired; nobody will be told about it.
                        Ok(Ok(late)) => {
                            let path = self.store.converted_dir().join(&late.file_name);
                            warn!(output = %late, "Discarding output committed after the deadline");
                            self.cleanup.reclaim_path(&path).await;
                        }
                        Ok(Err(_)) => {}
                    }
                    Outcome::TimedOut
                }
            }
        };

        let leftovers = ledger.drain();
        if !leftovers.is_empty() {
            let summary = self.cleanup.reclaim(&leftovers).await;
            debug!(?summary, "Reclaimed job artifacts");
        }

        let elapsed = started.elapsed().as_millis() as u64;
        match outcome {
            Outcome::Finished(Ok(output)) => {
                info!(output = %output, duration_ms = elapsed, "Job succeeded");
                JobResult::success(output, total, elapsed)
            }
            Outcome::Finished(Err(failure)) => {
                warn!(kind = %failure.kind, error = %failure.message, "Job failed");
                JobResult::failed(failure.kind, failure.message, total, elapsed)
            }
            Outcome::TimedOut => {
                let message = format!(
                    "exceeded deadline of {}s during stage {}/{}",
                    self.timeout.as_secs_f64(),
                    current_stage.load(Ordering::SeqCst).max(1),
                    total
                );
                JobResult::timeout(message, total, elapsed)
            }
        }
    }

    async fn execute(
        &self,
        request: &ConversionRequest,
        plan: &ConversionPlan,
        ledger: &mut JobLedger,
        cancel: &CancellationToken,
        current_stage: &AtomicUsize,
    ) -> Result<OutputRef, StageFailure> {
        let job_id = ledger.job_id();
        let total = plan.len();
        let output_name =
            self.store
                .output_name(job_id, &request.original_name, plan.target_extension());

        let mut source: PathBuf = request.input_path.clone();
        let mut previous: Option<PathBuf> = None;

        for (i, stage) in plan.stages().iter().enumerate() {
            let n = i + 1;
            let is_final = n == total;
            current_stage.store(n, Ordering::SeqCst);

            let dest = if is_final {
                self.store.staging_path(&output_name)
            } else {
                self.store
                    .intermediate_path(job_id, &request.original_name, n, &stage.dest_extension)
            };
            let kind = if is_final {
                ArtifactKind::Staging
            } else {
                ArtifactKind::Intermediate
            };
            ledger.track(&dest, kind);

            let options = ConvertOptions::new(stage.domain, &stage.source_extension, &stage.dest_extension)
                .with_sub_section(request.sub_section.clone())
                .with_source_name(request.original_name.as_str())
                .with_cancel(cancel.clone());

            debug!(
                stage = n,
                total,
                adapter = stage.adapter.name(),
                from = %source.display(),
                to = %dest.display(),
                "Running stage"
            );
            stage
                .adapter
                .convert(&source, &dest, &options)
                .await
                .map_err(|e| StageFailure::adapter(n, total, plan, e))?;
            make_durable(&dest)
                .await
                .map_err(|e| StageFailure::adapter(n, total, plan, e))?;

            // The previous intermediate has been consumed.
            if let Some(prev) = previous.take() {
                ledger.release(&prev);
                self.cleanup.reclaim_path(&prev).await;
            }
            if !is_final {
                previous = Some(dest.clone());
            }
            source = dest;
        }

        // Staging output stays in the ledger and is reclaimed with it.
        if cancel.is_cancelled() {
            return Err(StageFailure::cancelled(total, total));
        }
        self.store
            .commit(&source, &output_name)
            .await
            .map_err(|e| StageFailure::internal(e.to_string()))?;
        ledger.release(&source);

        Ok(OutputRef {
            domain: request.domain,
            file_name: output_name,
        })
    }
}

/// Confirm a stage output exists and flush it to disk.
async fn make_durable(path: &Path) -> Result<(), AdapterError> {
    match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => {}
        _ => {
            return Err(AdapterError::MissingOutput {
                path: path.to_path_buf(),
            })
        }
    }
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|source| AdapterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    file.sync_all().await.map_err(|source| AdapterError::Io {
        path: path.to_path_buf(),
        source,
    })
}
