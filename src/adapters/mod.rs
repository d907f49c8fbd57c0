//! Capability adapters: uniform bindings to external conversion tools.
//!
//! The router and supervisor only ever see the [`Adapter`] trait. Everything
//! tool-specific (command lines, codec selection, library calls) lives in
//! the submodules:
//!
//! | Adapter | Backend | Runs |
//! |---------|---------|------|
//! | [`image::ImageAdapter`] | `image` crate | in-process, `spawn_blocking` |
//! | [`document::DocumentAdapter`] | LibreOffice `soffice` | child process |
//! | [`pdf::PdfRenderAdapter`] | pdfium via `pdfium-render` | in-process, `spawn_blocking` |
//! | [`media::MediaAdapter`] | `ffmpeg` | child process |
//! | [`archive::ArchiveAdapter`] | `zip` / `tar` + `flate2` / `sevenz-rust` | in-process, `spawn_blocking` |
//! | [`ebook::EbookAdapter`] | calibre `ebook-convert` | child process |
//!
//! Every adapter honours [`ConvertOptions::cancel`]: child processes are
//! killed and reaped, in-process work discards its output.

pub mod archive;
pub mod document;
pub mod ebook;
pub mod image;
pub mod media;
pub mod pdf;
pub(crate) mod process;

use crate::config::EngineConfig;
use crate::error::AdapterError;
use crate::formats::Domain;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What one stage asks of an adapter.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub domain: Domain,
    pub source_extension: String,
    pub target_extension: String,
    /// Strategy hint from the request (quality preset, page number, …).
    pub sub_section: Option<String>,
    /// The client's name for the job's input, for adapters that embed a
    /// file name in their output (archive entries).
    pub source_name: Option<String>,
    /// Fired by the supervisor when the job's deadline expires.
    pub cancel: CancellationToken,
}

impl ConvertOptions {
    pub fn new(domain: Domain, from: &str, to: &str) -> Self {
        Self {
            domain,
            source_extension: from.to_string(),
            target_extension: to.to_string(),
            sub_section: None,
            source_name: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sub_section(mut self, hint: Option<String>) -> Self {
        self.sub_section = hint;
        self
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One external conversion capability.
///
/// Implementations may assume `input` exists and that they own `output`
/// for the duration of the call. On success `output` must exist.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Short stable name used in logs and plan summaries.
    fn name(&self) -> &'static str;

    /// Whether this adapter converts `from` → `to` in `domain` directly.
    fn supports(&self, domain: Domain, from: &str, to: &str) -> bool;

    /// Whether this adapter can read `extension` at all, in any domain.
    fn accepts_input(&self, extension: &str) -> bool;

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<(), AdapterError>;
}

/// The registered adapters, searched in registration order.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: Vec<Arc<dyn Adapter>>,
}

impl fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl AdapterSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every built-in adapter, configured from `config.tools`.
    pub fn standard(config: &EngineConfig) -> Self {
        Self::empty()
            .with(image::ImageAdapter::new())
            .with(pdf::PdfRenderAdapter::new(config))
            .with(document::DocumentAdapter::new(config))
            .with(media::MediaAdapter::new(config))
            .with(archive::ArchiveAdapter::new())
            .with(ebook::EbookAdapter::new(config))
    }

    pub fn with(mut self, adapter: impl Adapter + 'static) -> Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    pub fn with_shared(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// First adapter that converts `from` → `to` in `domain` directly.
    pub fn find(&self, domain: Domain, from: &str, to: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters
            .iter()
            .find(|a| a.supports(domain, from, to))
            .cloned()
    }

    pub fn accepts_input(&self, extension: &str) -> bool {
        self.adapters.iter().any(|a| a.accepts_input(extension))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Run CPU-bound conversion work on the blocking pool.
///
/// `work` receives the job's cancellation token and should check it before
/// committing its output. If the job was cancelled by the time `work`
/// returns, whatever it wrote to `output` is removed.
pub(crate) async fn run_blocking<F>(
    adapter: &'static str,
    output: &Path,
    cancel: &CancellationToken,
    work: F,
) -> Result<(), AdapterError>
where
    F: FnOnce(CancellationToken) -> Result<(), AdapterError> + Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(AdapterError::Cancelled { adapter });
    }

    let token = cancel.clone();
    let result = tokio::task::spawn_blocking(move || work(token))
        .await
        .map_err(|e| AdapterError::Codec {
            adapter,
            detail: format!("conversion task panicked: {e}"),
        })?;

    if cancel.is_cancelled() {
        let _ = tokio::fs::remove_file(output).await;
        return Err(AdapterError::Cancelled { adapter });
    }
    result
}

/// Map an I/O error on `path` into an adapter error.
pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> AdapterError + '_ {
    move |source| AdapterError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, Domain, &'static str, &'static str);

    #[async_trait]
    impl Adapter for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }
        fn supports(&self, domain: Domain, from: &str, to: &str) -> bool {
            domain == self.1 && from == self.2 && to == self.3
        }
        fn accepts_input(&self, extension: &str) -> bool {
            extension == self.2
        }
        async fn convert(&self, _: &Path, _: &Path, _: &ConvertOptions) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    #[test]
    fn find_respects_registration_order() {
        let set = AdapterSet::empty()
            .with(Fixed("first", Domain::Image, "jpg", "png"))
            .with(Fixed("second", Domain::Image, "jpg", "png"));
        assert_eq!(set.find(Domain::Image, "jpg", "png").unwrap().name(), "first");
        assert!(set.find(Domain::Compressor, "jpg", "png").is_none());
        assert!(set.accepts_input("jpg"));
        assert!(!set.accepts_input("mp3"));
    }

    #[test]
    fn standard_set_covers_every_domain() {
        let set = AdapterSet::standard(&EngineConfig::default());
        assert_eq!(
            set.names(),
            vec!["image", "pdf-render", "document", "media", "archive", "ebook"]
        );
        assert!(set.find(Domain::Image, "jpg", "png").is_some());
        assert!(set.find(Domain::Audio, "wav", "mp3").is_some());
        assert!(set.find(Domain::Archive, "docx", "zip").is_some());
        assert!(set.find(Domain::Ebook, "epub", "mobi").is_some());
        assert!(set.find(Domain::Document, "docx", "pdf").is_some());
        assert!(set.find(Domain::Pdf, "pdf", "png").is_some());
    }

    #[tokio::test]
    async fn run_blocking_discards_output_after_cancel() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("late.bin");
        let cancel = CancellationToken::new();

        let out_clone = out.clone();
        let trigger = cancel.clone();
        let err = run_blocking("test", &out, &cancel, move |_| {
            std::fs::write(&out_clone, b"late").unwrap();
            trigger.cancel();
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AdapterError::Cancelled { .. }));
        assert!(!out.exists());
    }
}
