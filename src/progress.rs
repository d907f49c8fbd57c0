//! Progress-callback trait for batch and per-file conversion events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::EngineConfigBuilder::progress_callback`] to receive
//! events as the coordinator works through a batch. Callers can forward
//! them to a channel, a WebSocket, or a terminal progress bar.
//!
//! # Example
//!
//! ```rust
//! use edgequake_convert::{BatchProgressCallback, EngineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     converted: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, output: &str) {
//!         self.converted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} → {}", index + 1, total, output);
//!     }
//! }
//!
//! let config = EngineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { converted: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch coordinator as it processes each file.
///
/// Implementations must be `Send + Sync`: many batches run concurrently and
/// share one engine (and therefore one callback). All methods have default
/// no-op implementations so callers only override what they care about.
///
/// Indices are 0-based positions in the submitted batch.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after validation succeeded, before the first file.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a file is routed.
    fn on_file_start(&self, index: usize, total_files: usize, original_name: &str) {
        let _ = (index, total_files, original_name);
    }

    /// Called when a file's output has been committed.
    ///
    /// `output` is the domain-qualified output reference.
    fn on_file_complete(&self, index: usize, total_files: usize, output: &str) {
        let _ = (index, total_files, output);
    }

    /// Called when a file fails; the batch stops after this event.
    fn on_file_error(&self, index: usize, total_files: usize, error: &str) {
        let _ = (index, total_files, error);
    }

    /// Called once after the batch stopped, successfully or not.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::EngineConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
