//! Cleanup subsystem: best-effort artifact deletion and the retention sweep.
//!
//! Every deletion in the engine goes through [`Cleanup`], so there is exactly
//! one retry policy: a fixed number of attempts with a fixed delay, and only
//! for errors classified as transient contention (a file held open or
//! locked by another process). Everything here logs and swallows failures;
//! nothing returns an error to the caller, so a stuck file can never mask a
//! successful conversion or block a response.
//!
//! Outcomes are three-way: a path that no longer exists counts as success
//! ([`CleanupOutcome::AlreadyGone`]), contention that outlasts the retries
//! is [`CleanupOutcome::Blocked`], anything else is
//! [`CleanupOutcome::Failed`] immediately.

use crate::error::CleanupError;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio_stream::wrappers::ReadDirStream;
use tracing::{debug, error, info, warn};

#[cfg(windows)]
const SHARING_VIOLATIONS: &[i32] = &[32, 33];
#[cfg(not(windows))]
const SHARING_VIOLATIONS: &[i32] = &[];

/// Fixed-delay retry policy for transient filesystem contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; it is raised to at least 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether an I/O error is transient lock/permission contention.
    pub fn is_retryable(err: &io::Error) -> bool {
        matches!(
            err.kind(),
            io::ErrorKind::PermissionDenied
                | io::ErrorKind::ResourceBusy
                | io::ErrorKind::WouldBlock
                | io::ErrorKind::Interrupted
        ) || err
            .raw_os_error()
            .is_some_and(|code| SHARING_VIOLATIONS.contains(&code))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupOutcome {
    Removed,
    AlreadyGone,
    Blocked,
    Failed,
}

/// Tally of one [`Cleanup::reclaim`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimSummary {
    pub removed: usize,
    pub already_gone: usize,
    pub failed: usize,
}

impl ReclaimSummary {
    fn record(&mut self, outcome: CleanupOutcome) {
        match outcome {
            CleanupOutcome::Removed => self.removed += 1,
            CleanupOutcome::AlreadyGone => self.already_gone += 1,
            CleanupOutcome::Blocked | CleanupOutcome::Failed => self.failed += 1,
        }
    }
}

/// Tally of one retention sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub directory: PathBuf,
    pub scanned: usize,
    pub reclaimed: usize,
    pub kept: usize,
    pub failed: usize,
}

/// Deletes artifacts under a [`RetryPolicy`]. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Cleanup {
    policy: RetryPolicy,
}

impl Cleanup {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Reclaim every path. Never fails; terminal problems are logged.
    pub async fn reclaim<I, P>(&self, paths: I) -> ReclaimSummary
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut summary = ReclaimSummary::default();
        for path in paths {
            summary.record(self.reclaim_path(path.as_ref()).await);
        }
        summary
    }

    /// Reclaim one path (file or directory). Never fails.
    pub async fn reclaim_path(&self, path: &Path) -> CleanupOutcome {
        match self.retry_delete(path, remove_any).await {
            Ok(outcome) => {
                debug!(path = %path.display(), ?outcome, "Reclaimed");
                outcome
            }
            Err(e @ CleanupError::Blocked { .. }) => {
                error!(path = %path.display(), error = %e, "Giving up on blocked artifact");
                CleanupOutcome::Blocked
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Artifact deletion failed");
                CleanupOutcome::Failed
            }
        }
    }

    /// Apply the retry policy around `delete`.
    async fn retry_delete<F, Fut>(
        &self,
        path: &Path,
        mut delete: F,
    ) -> Result<CleanupOutcome, CleanupError>
    where
        F: FnMut(PathBuf) -> Fut,
        Fut: Future<Output = io::Result<()>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match delete(path.to_path_buf()).await {
                Ok(()) => return Ok(CleanupOutcome::Removed),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Ok(CleanupOutcome::AlreadyGone)
                }
                Err(e) if RetryPolicy::is_retryable(&e) => {
                    if attempt >= self.policy.max_attempts {
                        return Err(CleanupError::Blocked {
                            path: path.to_path_buf(),
                            attempts: attempt,
                            source: e,
                        });
                    }
                    warn!(
                        path = %path.display(),
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "Artifact busy, retrying in {:?}",
                        self.policy.delay
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(e) => {
                    return Err(CleanupError::Fatal {
                        path: path.to_path_buf(),
                        source: e,
                    })
                }
            }
        }
    }

    /// Reclaim every entry of `dir` last modified more than `retention` ago.
    ///
    /// A missing directory is an empty sweep.
    pub async fn sweep_expired(&self, dir: &Path, retention: Duration) -> SweepReport {
        let mut report = SweepReport {
            directory: dir.to_path_buf(),
            ..SweepReport::default()
        };

        let read_dir = match tokio::fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot list directory for sweep");
                return report;
            }
        };

        let now = SystemTime::now();
        let cutoff: DateTime<Utc> = now
            .checked_sub(retention)
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .into();
        debug!(dir = %dir.display(), %cutoff, "Sweeping artifacts older than cutoff");

        let mut entries = ReadDirStream::new(read_dir);
        while let Some(entry) = entries.next().await {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Unreadable directory entry");
                    report.failed += 1;
                    continue;
                }
            };
            report.scanned += 1;

            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "No modification time");
                    report.failed += 1;
                    continue;
                }
            };

            let age = now.duration_since(modified).unwrap_or_default();
            if age < retention {
                report.kept += 1;
                continue;
            }

            match self.reclaim_path(&entry.path()).await {
                CleanupOutcome::Removed | CleanupOutcome::AlreadyGone => report.reclaimed += 1,
                CleanupOutcome::Blocked | CleanupOutcome::Failed => report.failed += 1,
            }
        }

        info!(
            dir = %dir.display(),
            scanned = report.scanned,
            reclaimed = report.reclaimed,
            kept = report.kept,
            failed = report.failed,
            "Sweep finished"
        );
        report
    }
}

/// Existence check, then delete a file or a whole directory.
async fn remove_any(path: PathBuf) -> io::Result<()> {
    let meta = tokio::fs::symlink_metadata(&path).await?;
    if meta.is_dir() {
        tokio::fs::remove_dir_all(&path).await
    } else {
        tokio::fs::remove_file(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fast() -> Cleanup {
        Cleanup::new(RetryPolicy::new(3, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn removes_existing_file() {
        let dir = TempDir::new().unwrap();
        let f = dir.path().join("a.tmp");
        std::fs::write(&f, b"x").unwrap();

        assert_eq!(fast().reclaim_path(&f).await, CleanupOutcome::Removed);
        assert!(!f.exists());
    }

    #[tokio::test]
    async fn reclaim_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let f = dir.path().join("gone.tmp");
        let c = fast();

        assert_eq!(c.reclaim_path(&f).await, CleanupOutcome::AlreadyGone);
        assert_eq!(c.reclaim_path(&f).await, CleanupOutcome::AlreadyGone);

        let summary = c.reclaim([&f, &f]).await;
        assert_eq!(summary.already_gone, 2);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn removes_directories() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("scratch");
        std::fs::create_dir_all(sub.join("nested")).unwrap();
        std::fs::write(sub.join("nested/f"), b"x").unwrap();

        assert_eq!(fast().reclaim_path(&sub).await, CleanupOutcome::Removed);
        assert!(!sub.exists());
    }

    #[tokio::test]
    async fn transient_errors_retry_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let outcome = fast()
            .retry_delete(Path::new("/busy"), move |_| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(io::Error::from(io::ErrorKind::PermissionDenied))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(outcome, CleanupOutcome::Removed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn blocked_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = fast()
            .retry_delete(Path::new("/locked"), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(io::Error::from(io::ErrorKind::ResourceBusy)) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CleanupError::Blocked { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_abort_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = fast()
            .retry_delete(Path::new("/bad"), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(io::Error::from(io::ErrorKind::InvalidInput)) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CleanupError::Fatal { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retryable_classification() {
        assert!(RetryPolicy::is_retryable(&io::Error::from(
            io::ErrorKind::PermissionDenied
        )));
        assert!(!RetryPolicy::is_retryable(&io::Error::from(
            io::ErrorKind::NotFound
        )));
        assert!(!RetryPolicy::is_retryable(&io::Error::from(
            io::ErrorKind::InvalidData
        )));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test]
    async fn sweep_respects_retention() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old.png");
        let fresh = dir.path().join("fresh.png");
        std::fs::write(&old, b"x").unwrap();
        std::fs::write(&fresh, b"y").unwrap();

        let two_days_ago = SystemTime::now() - Duration::from_secs(48 * 3600);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(two_days_ago)
            .unwrap();

        let report = fast()
            .sweep_expired(dir.path(), Duration::from_secs(24 * 3600))
            .await;
        assert_eq!(report.scanned, 2);
        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.kept, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn sweep_of_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let report = fast()
            .sweep_expired(&dir.path().join("nope"), Duration::ZERO)
            .await;
        assert_eq!(report.scanned, 0);
    }
}
