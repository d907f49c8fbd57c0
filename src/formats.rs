//! Format registry: static domain / extension tables.
//!
//! Every lookup here is a pure function over `&'static` tables. Nothing in
//! this module touches the filesystem or returns an error: an unknown
//! extension or domain is reported as `None`/`false` and the caller decides
//! whether that is fatal.
//!
//! Two notions are kept apart:
//!
//! * the **declared domain** of a request ([`Domain`]): which capability
//!   family the caller asked for, and which output set is legal;
//! * the **home family** of an extension ([`domain_for`]), e.g. `docx`
//!   lives in [`Domain::Document`], `jpg` in [`Domain::Image`].
//!
//! The router uses the home family only to pick the domain of a
//! normalization leg; it never replaces the declared domain.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ── Extension families ───────────────────────────────────────────────────

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif", "ico",
];

pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    "doc", "docx", "odt", "rtf", "txt", "html", "htm", "ppt", "pptx", "odp", "xls", "xlsx",
    "ods", "csv",
];

pub const PDF_EXTENSIONS: &[&str] = &["pdf"];

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "aac", "m4a", "opus"];

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "webm", "flv", "wmv"];

pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "tar", "tgz", "7z"];

pub const EBOOK_EXTENSIONS: &[&str] = &["epub", "mobi", "azw3", "fb2"];

/// Families that make up the global supported-extension universe.
const UNIVERSE: &[&[&str]] = &[
    IMAGE_EXTENSIONS,
    DOCUMENT_EXTENSIONS,
    PDF_EXTENSIONS,
    AUDIO_EXTENSIONS,
    VIDEO_EXTENSIONS,
    ARCHIVE_EXTENSIONS,
    EBOOK_EXTENSIONS,
];

// ── Per-domain output sets ───────────────────────────────────────────────

const IMAGE_OUTPUTS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "ico", "pdf",
];
const COMPRESSOR_OUTPUTS: &[&str] = &["jpg", "jpeg", "png", "webp"];
const PDF_OUTPUTS: &[&str] = &["pdf", "jpg", "jpeg", "png", "txt"];
const DOCUMENT_OUTPUTS: &[&str] = &["pdf", "docx", "odt", "rtf", "txt", "html", "jpg", "png"];
const AUDIO_OUTPUTS: &[&str] = AUDIO_EXTENSIONS;
const VIDEO_OUTPUTS: &[&str] = &["mp4", "avi", "mkv", "mov", "webm", "gif"];
const ARCHIVE_OUTPUTS: &[&str] = ARCHIVE_EXTENSIONS;
const EBOOK_OUTPUTS: &[&str] = &["epub", "mobi", "azw3", "fb2", "pdf", "txt"];

// ── Per-domain input sets (beyond the whole universe) ────────────────────

const COMPRESSOR_INPUTS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif"];
const EBOOK_EXTRA_INPUTS: &[&str] = &["pdf", "docx", "odt", "rtf", "txt", "html", "htm"];

/// A capability family with its own accepted input and output sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Image,
    Compressor,
    Pdf,
    Document,
    Audio,
    Video,
    Archive,
    Ebook,
}

impl Domain {
    pub const ALL: [Domain; 8] = [
        Domain::Image,
        Domain::Compressor,
        Domain::Pdf,
        Domain::Document,
        Domain::Audio,
        Domain::Video,
        Domain::Archive,
        Domain::Ebook,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Image => "image",
            Domain::Compressor => "compressor",
            Domain::Pdf => "pdf",
            Domain::Document => "document",
            Domain::Audio => "audio",
            Domain::Video => "video",
            Domain::Archive => "archive",
            Domain::Ebook => "ebook",
        }
    }

    /// Extensions this domain may produce.
    pub fn outputs(self) -> &'static [&'static str] {
        match self {
            Domain::Image => IMAGE_OUTPUTS,
            Domain::Compressor => COMPRESSOR_OUTPUTS,
            Domain::Pdf => PDF_OUTPUTS,
            Domain::Document => DOCUMENT_OUTPUTS,
            Domain::Audio => AUDIO_OUTPUTS,
            Domain::Video => VIDEO_OUTPUTS,
            Domain::Archive => ARCHIVE_OUTPUTS,
            Domain::Ebook => EBOOK_OUTPUTS,
        }
    }

    /// Whether this domain accepts `extension` as an input.
    ///
    /// Most domains accept the whole supported universe and leave the finer
    /// decision to the router; media, compressor and ebook domains are
    /// restricted to inputs their tools can actually read.
    pub fn accepts_input(self, extension: &str) -> bool {
        match self {
            Domain::Image | Domain::Pdf | Domain::Document => {
                contains(IMAGE_EXTENSIONS, extension)
                    || contains(DOCUMENT_EXTENSIONS, extension)
                    || contains(PDF_EXTENSIONS, extension)
            }
            Domain::Compressor => contains(COMPRESSOR_INPUTS, extension),
            Domain::Audio => {
                contains(AUDIO_EXTENSIONS, extension) || contains(VIDEO_EXTENSIONS, extension)
            }
            Domain::Video => contains(VIDEO_EXTENSIONS, extension) || extension == "gif",
            Domain::Archive => is_supported_input(extension),
            Domain::Ebook => {
                contains(EBOOK_EXTENSIONS, extension) || contains(EBOOK_EXTRA_INPUTS, extension)
            }
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == wanted)
            .ok_or_else(|| s.to_string())
    }
}

// ── Lookups ──────────────────────────────────────────────────────────────

fn contains(set: &[&str], extension: &str) -> bool {
    set.iter().any(|e| *e == extension)
}

/// Lower-cased extension of a file name, without the dot.
///
/// Returns `None` for names with no extension (`"README"`) or a bare
/// dot-file (`".env"`).
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
}

/// Home family of an extension, or `None` if it is not supported at all.
pub fn domain_for(extension: &str) -> Option<Domain> {
    let ext = extension.to_ascii_lowercase();
    let families = [
        (IMAGE_EXTENSIONS, Domain::Image),
        (PDF_EXTENSIONS, Domain::Pdf),
        (DOCUMENT_EXTENSIONS, Domain::Document),
        (AUDIO_EXTENSIONS, Domain::Audio),
        (VIDEO_EXTENSIONS, Domain::Video),
        (ARCHIVE_EXTENSIONS, Domain::Archive),
        (EBOOK_EXTENSIONS, Domain::Ebook),
    ];
    families
        .into_iter()
        .find(|(set, _)| contains(set, &ext))
        .map(|(_, domain)| domain)
}

/// Whether `domain` may produce `extension`.
pub fn is_supported_output(domain: Domain, extension: &str) -> bool {
    contains(domain.outputs(), &extension.to_ascii_lowercase())
}

/// Whether `extension` belongs to the global supported-extension universe.
pub fn is_supported_input(extension: &str) -> bool {
    let ext = extension.to_ascii_lowercase();
    UNIVERSE.iter().any(|set| contains(set, &ext))
}
