//! Packaging a single file into zip, tar, tgz or 7z.
//!
//! The archive holds one entry named after the client's original file name
//! (reduced to its final path component), falling back to the input's own
//! file name.

use super::{io_error, run_blocking, Adapter, ConvertOptions};
use crate::error::AdapterError;
use crate::formats::{self, Domain, ARCHIVE_EXTENSIONS};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use sevenz_rust::{SevenZArchiveEntry, SevenZWriter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const NAME: &str = "archive";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Packing {
    Zip,
    Tar,
    TarGz,
    SevenZ,
}

impl Packing {
    fn for_extension(ext: &str) -> Option<Self> {
        match ext {
            "zip" => Some(Packing::Zip),
            "tar" => Some(Packing::Tar),
            "tgz" => Some(Packing::TarGz),
            "7z" => Some(Packing::SevenZ),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ArchiveAdapter;

impl ArchiveAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Adapter for ArchiveAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports(&self, domain: Domain, from: &str, to: &str) -> bool {
        domain == Domain::Archive && formats::is_supported_input(from) && ARCHIVE_EXTENSIONS.contains(&to)
    }

    fn accepts_input(&self, extension: &str) -> bool {
        formats::is_supported_input(extension)
    }

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<(), AdapterError> {
        let packing =
            Packing::for_extension(&options.target_extension).ok_or_else(|| {
                AdapterError::Unsupported {
                    adapter: NAME,
                    from: options.source_extension.clone(),
                    to: options.target_extension.clone(),
                }
            })?;
        let entry = entry_name(input, options.source_name.as_deref());
        let input = input.to_path_buf();
        let dest = output.to_path_buf();

        run_blocking(NAME, output, &options.cancel, move |cancel| {
            pack(&input, &dest, &entry, packing, &cancel)
        })
        .await
    }
}

/// Name of the single archive entry.
fn entry_name(input: &Path, source_name: Option<&str>) -> String {
    source_name
        .map(|n| n.replace('\\', "/"))
        .and_then(|n| n.rsplit('/').next().map(str::to_string))
        .filter(|n| !n.is_empty() && n != "..")
        .or_else(|| {
            input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "file".to_string())
}

fn codec_error(e: impl std::fmt::Display) -> AdapterError {
    AdapterError::Codec {
        adapter: NAME,
        detail: e.to_string(),
    }
}

fn pack(
    input: &Path,
    output: &Path,
    entry: &str,
    packing: Packing,
    cancel: &CancellationToken,
) -> Result<(), AdapterError> {
    debug!(input = %input.display(), entry, ?packing, "Packing");
    match packing {
        Packing::Zip => {
            let file = File::create(output).map_err(io_error(output))?;
            let mut zip = ZipWriter::new(BufWriter::new(file));
            let opts = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .large_file(true);
            zip.start_file(entry, opts).map_err(codec_error)?;
            let mut src = File::open(input).map_err(io_error(input))?;
            std::io::copy(&mut src, &mut zip).map_err(io_error(output))?;
            let mut writer = zip.finish().map_err(codec_error)?;
            writer.flush().map_err(io_error(output))?;
        }
        Packing::Tar => {
            let file = File::create(output).map_err(io_error(output))?;
            let mut tar = tar::Builder::new(BufWriter::new(file));
            tar.append_path_with_name(input, entry)
                .map_err(io_error(input))?;
            let mut writer = tar.into_inner().map_err(io_error(output))?;
            writer.flush().map_err(io_error(output))?;
        }
        Packing::TarGz => {
            let file = File::create(output).map_err(io_error(output))?;
            let gz = GzEncoder::new(BufWriter::new(file), Compression::default());
            let mut tar = tar::Builder::new(gz);
            tar.append_path_with_name(input, entry)
                .map_err(io_error(input))?;
            let gz = tar.into_inner().map_err(io_error(output))?;
            let mut writer = gz.finish().map_err(io_error(output))?;
            writer.flush().map_err(io_error(output))?;
        }
        Packing::SevenZ => {
            let mut sz = SevenZWriter::create(output).map_err(codec_error)?;
            let src = File::open(input).map_err(io_error(input))?;
            sz.push_archive_entry(
                SevenZArchiveEntry::from_path(input, entry.to_string()),
                Some(src),
            )
            .map_err(codec_error)?;
            sz.finish().map_err(codec_error)?;
        }
    }

    if cancel.is_cancelled() {
        return Err(AdapterError::Cancelled { adapter: NAME });
    }
    Ok(())
}
