//! Configuration types for the conversion engine.
//!
//! All engine behaviour is controlled through [`EngineConfig`], built once at
//! startup via its [`EngineConfigBuilder`] and passed by reference into every
//! component and adapter constructor. There is no ambient mutable state:
//! tool locations, directories and time limits all live here.

use crate::cleanup::RetryPolicy;
use crate::error::ConvertError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Hard upper bound on files per batch.
pub const MAX_BATCH_FILES: usize = 5;

/// Configuration for the conversion engine.
///
/// # Example
/// ```rust
/// use edgequake_convert::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .intake_dir("/srv/convert/intake")
///     .converted_dir("/srv/convert/converted")
///     .job_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_batch_files, 5);
/// ```
#[derive(Clone)]
pub struct EngineConfig {
    /// Directory holding uploaded inputs and intermediate artifacts. Default: `./intake`.
    pub intake_dir: PathBuf,

    /// Directory holding finished outputs. Default: `./converted`.
    pub converted_dir: PathBuf,

    /// Deadline for one file's entire plan, all stages together. Default: 120.
    pub job_timeout_secs: u64,

    /// How long a timed-out job waits for its adapter to kill and reap an
    /// external process before the supervisor stops waiting. Default: 5000.
    pub kill_grace_ms: u64,

    /// Maximum files per batch, capped at [`MAX_BATCH_FILES`]. Default: 5.
    pub max_batch_files: usize,

    /// Age after which outputs (and abandoned uploads) are swept. Default: 24 h.
    pub output_retention_secs: u64,

    /// Interval of the background sweeper. Default: 1 h.
    pub sweep_interval_secs: u64,

    /// Total delete attempts for a file blocked by transient contention. Default: 3.
    pub cleanup_max_attempts: u32,

    /// Fixed delay between delete attempts in milliseconds. Default: 1000.
    pub cleanup_retry_delay_ms: u64,

    /// Locations of external converters.
    pub tools: ToolPaths,

    /// Optional batch/file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

/// Program names or absolute paths of the external converters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    /// LibreOffice headless binary. Default: `soffice`.
    pub soffice: PathBuf,
    /// FFmpeg binary. Default: `ffmpeg`.
    pub ffmpeg: PathBuf,
    /// Calibre's converter. Default: `ebook-convert`.
    pub ebook_convert: PathBuf,
    /// Directory containing the pdfium shared library. `None` binds the
    /// system library.
    pub pdfium_library: Option<PathBuf>,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            soffice: PathBuf::from("soffice"),
            ffmpeg: PathBuf::from("ffmpeg"),
            ebook_convert: PathBuf::from("ebook-convert"),
            pdfium_library: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            intake_dir: PathBuf::from("intake"),
            converted_dir: PathBuf::from("converted"),
            job_timeout_secs: 120,
            kill_grace_ms: 5_000,
            max_batch_files: MAX_BATCH_FILES,
            output_retention_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
            cleanup_max_attempts: 3,
            cleanup_retry_delay_ms: 1_000,
            tools: ToolPaths::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("intake_dir", &self.intake_dir)
            .field("converted_dir", &self.converted_dir)
            .field("job_timeout_secs", &self.job_timeout_secs)
            .field("kill_grace_ms", &self.kill_grace_ms)
            .field("max_batch_files", &self.max_batch_files)
            .field("output_retention_secs", &self.output_retention_secs)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("cleanup_max_attempts", &self.cleanup_max_attempts)
            .field("cleanup_retry_delay_ms", &self.cleanup_retry_delay_ms)
            .field("tools", &self.tools)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl EngineConfig {
    /// Create a new builder for `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn output_retention(&self) -> Duration {
        Duration::from_secs(self.output_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Retry policy shared by every cleanup call site.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.cleanup_max_attempts,
            Duration::from_millis(self.cleanup_retry_delay_ms),
        )
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn intake_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.intake_dir = dir.into();
        self
    }

    pub fn converted_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.converted_dir = dir.into();
        self
    }

    pub fn job_timeout_secs(mut self, secs: u64) -> Self {
        self.config.job_timeout_secs = secs;
        self
    }

    pub fn kill_grace_ms(mut self, ms: u64) -> Self {
        self.config.kill_grace_ms = ms;
        self
    }

    pub fn max_batch_files(mut self, n: usize) -> Self {
        self.config.max_batch_files = n.clamp(1, MAX_BATCH_FILES);
        self
    }

    pub fn output_retention_secs(mut self, secs: u64) -> Self {
        self.config.output_retention_secs = secs;
        self
    }

    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs.max(1);
        self
    }

    pub fn cleanup_max_attempts(mut self, n: u32) -> Self {
        self.config.cleanup_max_attempts = n.max(1);
        self
    }

    pub fn cleanup_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.cleanup_retry_delay_ms = ms;
        self
    }

    pub fn tools(mut self, tools: ToolPaths) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn soffice(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tools.soffice = path.into();
        self
    }

    pub fn ffmpeg(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tools.ffmpeg = path.into();
        self
    }

    pub fn ebook_convert(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tools.ebook_convert = path.into();
        self
    }

    pub fn pdfium_library(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.tools.pdfium_library = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EngineConfig, ConvertError> {
        let c = &self.config;
        if c.job_timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "Job timeout must be ≥ 1 second".into(),
            ));
        }
        if c.intake_dir == c.converted_dir {
            return Err(ConvertError::InvalidConfig(format!(
                "Intake and converted directories must differ (both '{}')",
                c.intake_dir.display()
            )));
        }
        if c.intake_dir.as_os_str().is_empty() || c.converted_dir.as_os_str().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "Working directories must not be empty paths".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = EngineConfig::default();
        assert_eq!(c.job_timeout_secs, 120);
        assert_eq!(c.max_batch_files, 5);
        assert_eq!(c.output_retention(), Duration::from_secs(86_400));
        assert_eq!(c.cleanup_max_attempts, 3);
        assert_eq!(c.cleanup_retry_delay_ms, 1_000);
        assert_eq!(c.tools.ffmpeg, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn batch_size_is_capped() {
        let c = EngineConfig::builder().max_batch_files(50).build().unwrap();
        assert_eq!(c.max_batch_files, MAX_BATCH_FILES);
        let c = EngineConfig::builder().max_batch_files(0).build().unwrap();
        assert_eq!(c.max_batch_files, 1);
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = EngineConfig::builder().job_timeout_secs(0).build().unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn shared_directories_rejected() {
        let err = EngineConfig::builder()
            .intake_dir("/tmp/x")
            .converted_dir("/tmp/x")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn retry_policy_follows_config() {
        let c = EngineConfig::builder()
            .cleanup_max_attempts(5)
            .cleanup_retry_delay_ms(10)
            .build()
            .unwrap();
        let p = c.retry_policy();
        assert_eq!(p.max_attempts(), 5);
        assert_eq!(p.delay(), Duration::from_millis(10));
    }

    #[test]
    fn debug_hides_callback() {
        let s = format!("{:?}", EngineConfig::default());
        assert!(s.contains("EngineConfig"));
        assert!(s.contains("progress_callback: None"));
    }
}
