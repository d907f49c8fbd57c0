//! Artifact store: where inputs, intermediates and outputs live on disk.
//!
//! Two directories, both owned by the engine:
//!
//! * **intake** holds uploaded inputs and the intermediates of multi-stage
//!   plans;
//! * **converted** holds committed outputs, plus `.partial-*` staging files
//!   while a final stage is still writing.
//!
//! Every generated name embeds a sanitised stem, a millisecond UTC
//! timestamp and a job-unique suffix, so concurrent jobs never collide and a
//! reader of the converted directory never observes a half-written output:
//! finals are written to a staging name and renamed into place on commit.

use crate::cleanup::{Cleanup, CleanupOutcome};
use crate::config::EngineConfig;
use crate::error::ConvertError;
use crate::request::{JobId, UploadedFile};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Characters allowed in generated file names; everything else becomes `_`.
static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));

const MAX_STEM_CHARS: usize = 64;
const STAGING_PREFIX: &str = ".partial-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The uploaded file a job consumes.
    Input,
    /// Output of a non-final stage.
    Intermediate,
    /// Final stage output under its staging name.
    Staging,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

/// Paths a single job has created or is about to create.
///
/// The supervisor records a path here *before* the adapter that writes it
/// is invoked, so a crash or timeout mid-write still leaves a record, and
/// drains whatever remains at the end of the job.
#[derive(Debug)]
pub struct JobLedger {
    job_id: JobId,
    tracked: Vec<Artifact>,
}

impl JobLedger {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            tracked: Vec::new(),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn track(&mut self, path: impl Into<PathBuf>, kind: ArtifactKind) {
        let path = path.into();
        if !self.tracked.iter().any(|a| a.path == path) {
            self.tracked.push(Artifact { path, kind });
        }
    }

    /// Stop tracking `path`; returns whether it was tracked.
    pub fn release(&mut self, path: &Path) -> bool {
        let before = self.tracked.len();
        self.tracked.retain(|a| a.path != path);
        self.tracked.len() != before
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.tracked.iter().any(|a| a.path == path)
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.tracked
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Take every tracked path, leaving the ledger empty.
    pub fn drain(&mut self) -> Vec<PathBuf> {
        self.tracked.drain(..).map(|a| a.path).collect()
    }
}

/// Naming and placement of artifacts in the two working directories.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    intake_dir: PathBuf,
    converted_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(intake_dir: impl Into<PathBuf>, converted_dir: impl Into<PathBuf>) -> Self {
        Self {
            intake_dir: intake_dir.into(),
            converted_dir: converted_dir.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.intake_dir, &config.converted_dir)
    }

    pub fn intake_dir(&self) -> &Path {
        &self.intake_dir
    }

    pub fn converted_dir(&self) -> &Path {
        &self.converted_dir
    }

    /// Create both working directories if needed.
    pub async fn ensure_dirs(&self) -> Result<(), ConvertError> {
        for dir in [&self.intake_dir, &self.converted_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ConvertError::Directory {
                    path: dir.clone(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Copy a client file into the intake directory under a unique name.
    ///
    /// This is the transport layer's half of the contract: the returned
    /// [`UploadedFile`] points into intake and keeps `original_name`, whose
    /// extension decides the input format.
    pub async fn accept_upload(
        &self,
        source: &Path,
        original_name: &str,
    ) -> Result<UploadedFile, ConvertError> {
        self.ensure_dirs().await?;

        let ext = crate::formats::extension_of(original_name);
        let name = unique_name(original_name, &upload_suffix(), ext.as_deref());
        let dest = self.intake_dir.join(name);

        tokio::fs::copy(source, &dest)
            .await
            .map_err(|e| ConvertError::Upload {
                path: source.to_path_buf(),
                source: e,
            })?;

        debug!(from = %source.display(), to = %dest.display(), "Upload accepted");
        Ok(UploadedFile::new(dest, original_name))
    }

    /// Path for the output of stage `stage` (1-based) of a multi-stage job.
    pub fn intermediate_path(
        &self,
        job_id: JobId,
        original_name: &str,
        stage: usize,
        extension: &str,
    ) -> PathBuf {
        let stem = sanitize_stem(original_name);
        let name = format!(
            "{stem}-{}-{}.s{stage}.{extension}",
            timestamp(),
            job_id.short()
        );
        self.intake_dir.join(name)
    }

    /// Final output name for one job.
    pub fn output_name(&self, job_id: JobId, original_name: &str, extension: &str) -> String {
        unique_name(original_name, &job_id.short(), Some(extension))
    }

    /// Where the final stage writes before the output is committed.
    pub fn staging_path(&self, file_name: &str) -> PathBuf {
        self.converted_dir.join(format!("{STAGING_PREFIX}{file_name}"))
    }

    /// Atomically move a staged output to its final name.
    pub async fn commit(&self, staging: &Path, file_name: &str) -> Result<PathBuf, ConvertError> {
        let dest = self.converted_dir.join(file_name);
        tokio::fs::rename(staging, &dest)
            .await
            .map_err(|e| {
                ConvertError::Internal(format!(
                    "Cannot commit '{}' to '{}': {e}",
                    staging.display(),
                    dest.display()
                ))
            })?;
        info!(output = %dest.display(), "Output committed");
        Ok(dest)
    }

    /// Path of a committed output, refusing names that escape the directory.
    pub async fn resolve_output(&self, file_name: &str) -> Result<PathBuf, ConvertError> {
        check_output_name(file_name)?;
        let path = self.converted_dir.join(file_name);
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => Ok(path),
            _ => Err(ConvertError::OutputNotFound(file_name.to_string())),
        }
    }

    /// Delete a committed output after the client has retrieved it.
    ///
    /// Idempotent: deleting an output that is already gone succeeds with
    /// [`CleanupOutcome::AlreadyGone`].
    pub async fn delete_output(
        &self,
        cleanup: &Cleanup,
        file_name: &str,
    ) -> Result<CleanupOutcome, ConvertError> {
        check_output_name(file_name)?;
        Ok(cleanup
            .reclaim_path(&self.converted_dir.join(file_name))
            .await)
    }
}

/// Reduce a client file name to a short, filesystem-safe stem.
pub fn sanitize_stem(original_name: &str) -> String {
    let base = Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let cleaned = UNSAFE_CHARS.replace_all(base, "_");
    let trimmed: String = cleaned
        .trim_matches(|c| c == '.' || c == '_')
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed
    }
}

fn check_output_name(file_name: &str) -> Result<(), ConvertError> {
    let bad = file_name.is_empty()
        || file_name.starts_with('.')
        || file_name.contains(['/', '\\'])
        || file_name.contains("..");
    if bad {
        Err(ConvertError::InvalidOutputName(file_name.to_string()))
    } else {
        Ok(())
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S%3f").to_string()
}

fn upload_suffix() -> String {
    JobId::new().short()
}

fn unique_name(original_name: &str, suffix: &str, extension: Option<&str>) -> String {
    let stem = sanitize_stem(original_name);
    match extension {
        Some(ext) => format!("{stem}-{}-{suffix}.{ext}", timestamp()),
        None => format!("{stem}-{}-{suffix}", timestamp()),
    }
}
