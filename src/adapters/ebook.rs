//! E-book conversion through calibre's `ebook-convert`.
//!
//! `ebook-convert` infers both formats from the file extensions, so the
//! invocation is just `ebook-convert <input> <output>`.

use super::process::run_tool;
use super::{Adapter, ConvertOptions};
use crate::config::EngineConfig;
use crate::error::AdapterError;
use crate::formats::{Domain, EBOOK_EXTENSIONS};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

const NAME: &str = "ebook";

const INSTALL_HINT: &str = "Install calibre (provides ebook-convert):\n  \
    macOS:  brew install --cask calibre\n  \
    Ubuntu: sudo apt-get install calibre\n  \
    Or set FILECONV_EBOOK_CONVERT to the ebook-convert binary.";

/// Non-ebook inputs calibre reads.
const EXTRA_INPUTS: &[&str] = &["pdf", "docx", "odt", "rtf", "txt", "html", "htm"];

const OUTPUTS: &[&str] = &["epub", "mobi", "azw3", "fb2", "pdf", "txt"];

#[derive(Debug, Clone)]
pub struct EbookAdapter {
    ebook_convert: PathBuf,
}

impl EbookAdapter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ebook_convert: config.tools.ebook_convert.clone(),
        }
    }

    pub fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.ebook_convert);
        cmd.arg(input).arg(output);
        cmd
    }
}

#[async_trait]
impl Adapter for EbookAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports(&self, domain: Domain, from: &str, to: &str) -> bool {
        domain == Domain::Ebook && self.accepts_input(from) && OUTPUTS.contains(&to) && from != to
    }

    fn accepts_input(&self, extension: &str) -> bool {
        EBOOK_EXTENSIONS.contains(&extension) || EXTRA_INPUTS.contains(&extension)
    }

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<(), AdapterError> {
        let cmd = self.command(input, output);
        run_tool(NAME, &self.ebook_convert, INSTALL_HINT, cmd, &options.cancel).await
    }
}
