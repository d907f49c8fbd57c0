//! Error types for the edgequake-convert library.
//!
//! Two tiers, matching the split the engine makes between a batch and the
//! files inside it:
//!
//! * [`ConvertError`] is **fatal** for the call: the batch could not be
//!   accepted (bad request shape, unsupported format), the configuration is
//!   invalid, or the working directories cannot be prepared. Returned as
//!   `Err(ConvertError)` from [`crate::Engine`] entry points.
//!
//! * A **per-file** failure is a value, not an error: it is recorded in
//!   [`crate::output::JobResult`] with a machine-usable [`ErrorKind`] and a
//!   human-readable message, so the caller sees which file failed and why
//!   without a stack trace.
//!
//! The remaining enums describe each concern precisely and are folded into
//! one of the two tiers above. [`CleanupError`] is never surfaced: it is
//! logged by [`crate::cleanup`] and swallowed.

use crate::formats::Domain;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-convert library.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The batch was rejected before any filesystem work.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A batch ran and stopped at the file described here.
    ///
    /// Returned by [`crate::output::BatchResult::into_result`] when the
    /// caller wants to treat a failed batch as an error.
    #[error("File {index} ('{file}', {domain} → {target}) failed [{kind}]: {message}")]
    BatchFailed {
        index: usize,
        file: String,
        domain: Domain,
        target: String,
        kind: ErrorKind,
        message: String,
    },

    /// No conversion plan exists for a request planned outside a batch.
    ///
    /// Inside a batch the same condition is a per-file failure instead.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Could not create or access one of the engine's working directories.
    #[error("Cannot prepare directory '{path}': {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not copy an upload into the intake directory.
    #[error("Failed to accept upload '{path}': {source}")]
    Upload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output name refers to something outside the converted directory.
    #[error("Invalid output name '{0}'")]
    InvalidOutputName(String),

    /// Output does not exist (already served, deleted, or swept).
    #[error("Output '{0}' not found")]
    OutputNotFound(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Request-shape and format errors. Surfaced immediately, never retried,
/// and raised before anything touches the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No files submitted")]
    NoFiles,

    #[error("Too many files: {count} submitted, at most {max} per batch")]
    TooManyFiles { count: usize, max: usize },

    #[error("File and format counts differ: {files} files, {formats} formats")]
    CountMismatch { files: usize, formats: usize },

    #[error("File {index}: missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("File {index}: unsupported domain '{domain}'")]
    UnsupportedDomain { index: usize, domain: String },

    #[error("File {index}: '{name}' has no file extension")]
    MissingExtension { index: usize, name: String },

    #[error("File {index}: input format '{extension}' is not supported by the {domain} domain")]
    UnsupportedInput {
        index: usize,
        domain: Domain,
        extension: String,
    },

    #[error("File {index}: output format '{extension}' is not supported by the {domain} domain")]
    UnsupportedOutput {
        index: usize,
        domain: Domain,
        extension: String,
    },
}

/// No conversion plan exists between the requested input and output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// No adapter reads this input extension at all.
    #[error("No converter accepts '{extension}' input")]
    UnsupportedInput { extension: String },

    /// No direct adapter and no normalization path.
    #[error("No conversion path from '{from}' to '{to}' in the {domain} domain")]
    NoRoute {
        domain: Domain,
        from: String,
        to: String,
    },

    /// The only normalization path would revisit the same format.
    #[error("Conversion '{from}' → '{to}' ({domain}) would loop through '{via}'")]
    Cycle {
        domain: Domain,
        from: String,
        to: String,
        via: String,
    },

    /// The plan would need more stages than allowed.
    #[error("Conversion '{from}' → '{to}' needs more than {max} stages")]
    HopLimit { from: String, to: String, max: usize },
}

/// Failure reported by a capability adapter. Not retried: conversions are
/// deterministic given the same input.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The external tool could not be started because it is not installed.
    #[error("'{tool}' is not installed or not on PATH.\n{hint}")]
    ToolMissing { tool: String, hint: String },

    /// The external tool ran and exited unsuccessfully.
    #[error("'{tool}' exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The adapter was asked for a pair it does not handle.
    #[error("{adapter} adapter cannot convert '{from}' to '{to}'")]
    Unsupported {
        adapter: &'static str,
        from: String,
        to: String,
    },

    /// Decoding or encoding failed inside an in-process library.
    #[error("{adapter} adapter failed: {detail}")]
    Codec {
        adapter: &'static str,
        detail: String,
    },

    /// Adapter reported success but the output file is missing or empty.
    #[error("Converter produced no output at '{path}'")]
    MissingOutput { path: PathBuf },

    /// The job was cancelled while the adapter was running.
    #[error("{adapter} adapter cancelled")]
    Cancelled { adapter: &'static str },

    /// Filesystem error around the conversion.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Best-effort deletion failure. Logged, never surfaced to the caller.
#[derive(Debug, Error)]
pub enum CleanupError {
    /// Transient lock/permission contention outlasted every retry.
    #[error("'{path}' still blocked after {attempts} attempts: {source}")]
    Blocked {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// Non-retryable failure.
    #[error("Cannot delete '{path}': {source}")]
    Fatal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Machine-usable classification of a per-file failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Validation,
    Routing,
    Adapter,
    Timeout,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Routing => "routing",
            ErrorKind::Adapter => "adapter",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}
