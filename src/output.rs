//! Result-side data model: per-file [`JobResult`]s and the [`BatchResult`].

use crate::error::{ConvertError, ErrorKind};
use crate::formats::Domain;
use crate::request::BatchId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relative, domain-qualified reference to a committed output file.
///
/// Renders as `"{domain}/{file_name}"`; the file itself lives flat in the
/// converted directory under `file_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    pub domain: Domain,
    pub file_name: String,
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.file_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Failed,
    Timeout,
}

/// Outcome of one file's conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Stages in the executed plan (0 when routing failed).
    pub stages: usize,
    pub duration_ms: u64,
}

impl JobResult {
    pub fn success(output: OutputRef, stages: usize, duration_ms: u64) -> Self {
        Self {
            status: JobStatus::Success,
            output: Some(output),
            error_kind: None,
            message: None,
            stages,
            duration_ms,
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>, stages: usize, duration_ms: u64) -> Self {
        Self {
            status: JobStatus::Failed,
            output: None,
            error_kind: Some(kind),
            message: Some(message.into()),
            stages,
            duration_ms,
        }
    }

    pub fn timeout(message: impl Into<String>, stages: usize, duration_ms: u64) -> Self {
        Self {
            status: JobStatus::Timeout,
            output: None,
            error_kind: Some(ErrorKind::Timeout),
            message: Some(message.into()),
            stages,
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}

/// Result of one file in a batch, in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    pub index: usize,
    pub original_name: String,
    pub result: JobResult,
}

/// Context of the file that stopped a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub index: usize,
    pub original_name: String,
    pub domain: Domain,
    pub target: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Aggregated outcome of a batch.
///
/// `files` holds one entry per attempted file in input order; after a
/// failure it stops at the failing file and `failure` describes it. Outputs
/// of files before the failure remain on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub batch_id: BatchId,
    pub files: Vec<FileResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<BatchFailure>,
    pub duration_ms: u64,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Output references of successful files, in order.
    pub fn outputs(&self) -> Vec<&OutputRef> {
        self.files
            .iter()
            .filter_map(|f| f.result.output.as_ref())
            .collect()
    }

    /// Treat a failed batch as an error.
    pub fn into_result(self) -> Result<Self, ConvertError> {
        match self.failure {
            None => Ok(self),
            Some(f) => Err(ConvertError::BatchFailed {
                index: f.index,
                file: f.original_name,
                domain: f.domain,
                target: f.target,
                kind: f.kind,
                message: f.message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_ref_is_domain_qualified() {
        let r = OutputRef {
            domain: Domain::Image,
            file_name: "a-1.png".into(),
        };
        assert_eq!(r.to_string(), "image/a-1.png");
    }

    #[test]
    fn job_result_json_shape() {
        let r = JobResult::timeout("too slow", 2, 1500);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "timeout");
        assert_eq!(json["errorKind"], "timeout");
        assert!(json.get("output").is_none());
    }

    #[test]
    fn failed_batch_into_result_carries_context() {
        let batch = BatchResult {
            batch_id: BatchId::new(),
            files: vec![],
            failure: Some(BatchFailure {
                index: 1,
                original_name: "b.docx".into(),
                domain: Domain::Document,
                target: "jpg".into(),
                kind: ErrorKind::Adapter,
                message: "soffice crashed".into(),
            }),
            duration_ms: 3,
        };
        let err = batch.into_result().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("b.docx"), "got: {msg}");
        assert!(msg.contains("[adapter]"), "got: {msg}");
    }
}
