//! Office documents through LibreOffice in headless mode.
//!
//! `soffice --convert-to` always writes `<input stem>.<ext>` into an output
//! directory it is given, and refuses to run twice against the same user
//! profile. Each call therefore gets its own scratch directory (created
//! next to the requested output so the final rename stays on one
//! filesystem) holding both the output directory and a throwaway profile.
//! The scratch directory is removed when the call returns, cancelled or
//! not.

use super::process::run_tool;
use super::{io_error, Adapter, ConvertOptions};
use crate::config::EngineConfig;
use crate::error::AdapterError;
use crate::formats::{Domain, DOCUMENT_EXTENSIONS, IMAGE_EXTENSIONS};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

const NAME: &str = "document";

const INSTALL_HINT: &str = "Install LibreOffice:\n  \
    macOS:  brew install --cask libreoffice\n  \
    Ubuntu: sudo apt-get install libreoffice-core libreoffice-writer\n  \
    Or set FILECONV_SOFFICE to the soffice binary.";

/// Outputs of document → document conversions.
const DOCUMENT_OUTPUTS: &[&str] = &["pdf", "docx", "odt", "rtf", "txt", "html"];

#[derive(Debug, Clone)]
pub struct DocumentAdapter {
    soffice: PathBuf,
}

impl DocumentAdapter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            soffice: config.tools.soffice.clone(),
        }
    }

    /// The `soffice` invocation converting `input` into `outdir`.
    pub fn command(&self, input: &Path, outdir: &Path, profile: &Path, target: &str) -> Command {
        let mut cmd = Command::new(&self.soffice);
        cmd.arg("--headless")
            .arg("--norestore")
            .arg("--nolockcheck")
            .arg(profile_arg(profile))
            .arg("--convert-to")
            .arg(filter_for(target))
            .arg("--outdir")
            .arg(outdir)
            .arg(input);
        cmd
    }
}

/// `--convert-to` argument for a target extension.
fn filter_for(target: &str) -> &str {
    match target {
        "txt" => "txt:Text (encoded):UTF8",
        "html" => "html:XHTML Writer File:UTF8",
        other => other,
    }
}

fn profile_arg(profile: &Path) -> OsString {
    let path = profile.to_string_lossy().replace('\\', "/");
    let url = if path.starts_with('/') {
        format!("file://{path}")
    } else {
        format!("file:///{path}")
    };
    OsString::from(format!("-env:UserInstallation={url}"))
}

#[async_trait]
impl Adapter for DocumentAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports(&self, domain: Domain, from: &str, to: &str) -> bool {
        let is_doc = DOCUMENT_EXTENSIONS.contains(&from);
        let is_image = IMAGE_EXTENSIONS.contains(&from);
        match domain {
            Domain::Document if from == "pdf" => to == "pdf",
            Domain::Document => is_doc && DOCUMENT_OUTPUTS.contains(&to),
            Domain::Pdf => (is_doc || is_image || from == "pdf") && to == "pdf",
            Domain::Image => is_image && to == "pdf",
            _ => false,
        }
    }

    fn accepts_input(&self, extension: &str) -> bool {
        extension == "pdf"
            || DOCUMENT_EXTENSIONS.contains(&extension)
            || IMAGE_EXTENSIONS.contains(&extension)
    }

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<(), AdapterError> {
        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let scratch = tempfile::Builder::new()
            .prefix(".soffice-")
            .tempdir_in(parent)
            .map_err(io_error(parent))?;
        let outdir = scratch.path().join("out");
        let profile = std::path::absolute(scratch.path().join("profile"))
            .map_err(io_error(scratch.path()))?;
        tokio::fs::create_dir_all(&outdir)
            .await
            .map_err(io_error(&outdir))?;

        let cmd = self.command(input, &outdir, &profile, &options.target_extension);
        run_tool(NAME, &self.soffice, INSTALL_HINT, cmd, &options.cancel).await?;

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let produced = outdir.join(format!("{stem}.{}", options.target_extension));
        if !produced.is_file() {
            return Err(AdapterError::MissingOutput { path: produced });
        }

        debug!(from = %produced.display(), to = %output.display(), "Moving soffice output");
        tokio::fs::rename(&produced, output)
            .await
            .map_err(io_error(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> DocumentAdapter {
        DocumentAdapter::new(&EngineConfig::default())
    }

    #[test]
    fn support_matrix() {
        let a = adapter();
        assert!(a.supports(Domain::Document, "docx", "pdf"));
        assert!(a.supports(Domain::Document, "odt", "docx"));
        assert!(a.supports(Domain::Document, "pdf", "pdf"));
        assert!(!a.supports(Domain::Document, "pdf", "docx"));
        assert!(!a.supports(Domain::Document, "docx", "jpg"));
        assert!(a.supports(Domain::Pdf, "jpg", "pdf"));
        assert!(a.supports(Domain::Pdf, "pptx", "pdf"));
        assert!(a.supports(Domain::Image, "png", "pdf"));
        assert!(!a.supports(Domain::Image, "docx", "pdf"));
        assert!(!a.supports(Domain::Audio, "docx", "pdf"));
    }

    #[test]
    fn command_line() {
        let cmd = adapter().command(
            Path::new("/in/report.docx"),
            Path::new("/scratch/out"),
            Path::new("/scratch/profile"),
            "txt",
        );
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "--headless");
        assert!(args.contains(&"-env:UserInstallation=file:///scratch/profile".to_string()));
        let i = args.iter().position(|a| a == "--convert-to").unwrap();
        assert_eq!(args[i + 1], "txt:Text (encoded):UTF8");
        assert_eq!(args.last().unwrap(), "/in/report.docx");
    }

    #[tokio::test]
    async fn missing_soffice_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("a.docx");
        std::fs::write(&input, b"x").unwrap();
        let config = EngineConfig::builder()
            .soffice("no-such-soffice-binary")
            .build()
            .unwrap();
        let err = DocumentAdapter::new(&config)
            .convert(
                &input,
                &dir.path().join("a.pdf"),
                &ConvertOptions::new(Domain::Document, "docx", "pdf"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::ToolMissing { .. }));
        // scratch directory is gone
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".soffice-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
