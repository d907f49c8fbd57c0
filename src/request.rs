//! Request-side data model: what the transport layer hands the engine.
//!
//! A [`BatchSubmission`] pairs uploaded files with format descriptors by
//! position. Each pair is validated into a [`ConversionRequest`], which is
//! the only shape the router and supervisor ever see.

use crate::error::ValidationError;
use crate::formats::{self, Domain};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Identity of one submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

/// Identity of one file's conversion job; owns that job's intermediates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, used in artifact names.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file already placed in the intake directory by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Where the upload lives on disk (inside the intake directory).
    pub path: PathBuf,
    /// Name the client sent; its extension decides the input format.
    pub original_name: String,
}

impl UploadedFile {
    pub fn new(path: impl Into<PathBuf>, original_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            original_name: original_name.into(),
        }
    }
}

/// Format descriptor for one uploaded file, as received from the client.
///
/// Fields stay as raw strings so that an unknown domain is reported as a
/// validation error rather than a deserialisation failure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatRequest {
    pub domain: String,
    pub target: String,
    /// Optional strategy hint forwarded to the adapter (quality preset,
    /// page number, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_section: Option<String>,
}

impl FormatRequest {
    pub fn new(domain: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            target: target.into(),
            sub_section: None,
        }
    }

    pub fn with_sub_section(mut self, hint: impl Into<String>) -> Self {
        self.sub_section = Some(hint.into());
        self
    }
}

/// Uploaded files and their format descriptors, matched 1:1 by position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSubmission {
    pub files: Vec<UploadedFile>,
    pub formats: Vec<FormatRequest>,
}

impl BatchSubmission {
    pub fn new(files: Vec<UploadedFile>, formats: Vec<FormatRequest>) -> Self {
        Self { files, formats }
    }

    /// Append one file with its descriptor.
    pub fn push(&mut self, file: UploadedFile, format: FormatRequest) {
        self.files.push(file);
        self.formats.push(format);
    }
}

/// One validated file conversion.
///
/// Invariant: `input_extension` and `target_extension` are lower-case
/// members of the supported universe, the declared domain accepts the
/// input, and `target_extension` is in the domain's output set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionRequest {
    pub input_path: PathBuf,
    pub original_name: String,
    pub input_extension: String,
    pub domain: Domain,
    pub target_extension: String,
    pub sub_section: Option<String>,
}

impl ConversionRequest {
    /// Validate one (file, descriptor) pair at position `index`.
    ///
    /// Pure: never touches the filesystem.
    pub fn validate(
        index: usize,
        file: &UploadedFile,
        format: &FormatRequest,
    ) -> Result<Self, ValidationError> {
        if file.original_name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                index,
                field: "originalName",
            });
        }
        if format.domain.trim().is_empty() {
            return Err(ValidationError::MissingField {
                index,
                field: "domain",
            });
        }
        let target = format.target.trim().trim_start_matches('.').to_ascii_lowercase();
        if target.is_empty() {
            return Err(ValidationError::MissingField {
                index,
                field: "target",
            });
        }

        let domain: Domain =
            format
                .domain
                .parse()
                .map_err(|domain| ValidationError::UnsupportedDomain { index, domain })?;

        let input_extension = formats::extension_of(&file.original_name).ok_or_else(|| {
            ValidationError::MissingExtension {
                index,
                name: file.original_name.clone(),
            }
        })?;

        if !formats::is_supported_input(&input_extension) || !domain.accepts_input(&input_extension)
        {
            return Err(ValidationError::UnsupportedInput {
                index,
                domain,
                extension: input_extension,
            });
        }

        if !formats::is_supported_input(&target) || !formats::is_supported_output(domain, &target) {
            return Err(ValidationError::UnsupportedOutput {
                index,
                domain,
                extension: target,
            });
        }

        Ok(Self {
            input_path: file.path.clone(),
            original_name: file.original_name.clone(),
            input_extension,
            domain,
            target_extension: target,
            sub_section: format
                .sub_section
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str) -> UploadedFile {
        UploadedFile::new(format!("/intake/{name}"), name)
    }

    #[test]
    fn valid_pair_normalises_fields() {
        let req = ConversionRequest::validate(
            0,
            &upload("Photo.JPG"),
            &FormatRequest::new("Image", ".PNG").with_sub_section("  "),
        )
        .unwrap();
        assert_eq!(req.input_extension, "jpg");
        assert_eq!(req.target_extension, "png");
        assert_eq!(req.domain, Domain::Image);
        assert_eq!(req.sub_section, None);
    }

    #[test]
    fn unknown_domain_rejected() {
        let err = ConversionRequest::validate(2, &upload("a.jpg"), &FormatRequest::new("cad", "png"))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedDomain {
                index: 2,
                domain: "cad".into()
            }
        );
    }

    #[test]
    fn output_outside_domain_rejected() {
        let err =
            ConversionRequest::validate(0, &upload("a.mp3"), &FormatRequest::new("audio", "mp4"))
                .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedOutput { .. }));
    }

    #[test]
    fn input_outside_domain_rejected() {
        let err =
            ConversionRequest::validate(0, &upload("a.png"), &FormatRequest::new("audio", "mp3"))
                .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedInput { .. }));
    }

    #[test]
    fn missing_extension_and_fields() {
        let err = ConversionRequest::validate(1, &upload("README"), &FormatRequest::new("pdf", "pdf"))
            .unwrap_err();
        assert!(matches!(err, ValidationError::MissingExtension { index: 1, .. }));

        let err = ConversionRequest::validate(0, &upload("a.pdf"), &FormatRequest::new("pdf", ""))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                index: 0,
                field: "target"
            }
        );
    }

    #[test]
    fn format_request_deserialises_camel_case() {
        let f: FormatRequest =
            serde_json::from_str(r#"{"domain":"compressor","target":"jpg","subSection":"high"}"#)
                .unwrap();
        assert_eq!(f.sub_section.as_deref(), Some("high"));
    }

    #[test]
    fn job_id_short_is_eight_hex_chars() {
        let id = JobId::new();
        let s = id.short();
        assert_eq!(s.len(), 8);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
