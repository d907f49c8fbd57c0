//! PDF rasterisation and text extraction via pdfium.
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which keeps
//! thread-local state and must not be driven from async worker threads;
//! every call runs inside `spawn_blocking`.
//!
//! Renders one page (chosen by a numeric sub-section, 1-based, default 1)
//! to a raster format, or extracts the text of every page. Rendering caps
//! the longest edge at [`MAX_RENDER_EDGE`] pixels regardless of the page's
//! physical size.

use super::{io_error, run_blocking, Adapter, ConvertOptions};
use crate::config::EngineConfig;
use crate::error::AdapterError;
use crate::formats::Domain;
use ::image::{DynamicImage, ImageFormat};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const NAME: &str = "pdf-render";

/// Longest edge of a rendered page, in pixels.
pub const MAX_RENDER_EDGE: i32 = 2000;

const RASTER_OUTPUTS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tiff", "gif"];

#[derive(Debug, Clone)]
pub struct PdfRenderAdapter {
    library_dir: Option<PathBuf>,
}

impl PdfRenderAdapter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            library_dir: config.tools.pdfium_library.clone(),
        }
    }
}

/// What to extract from the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extraction {
    Page { index: usize, format: ImageFormat },
    Text,
}

/// 0-based page index from a 1-based sub-section hint.
fn page_index(hint: Option<&str>) -> Result<usize, AdapterError> {
    match hint.map(str::trim) {
        None | Some("") => Ok(0),
        Some(h) => match h.parse::<usize>() {
            Ok(n) if n >= 1 => Ok(n - 1),
            _ => Err(AdapterError::Codec {
                adapter: NAME,
                detail: format!("page must be a positive number, got '{h}'"),
            }),
        },
    }
}

#[async_trait]
impl Adapter for PdfRenderAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports(&self, domain: Domain, from: &str, to: &str) -> bool {
        if from != "pdf" {
            return false;
        }
        match domain {
            Domain::Pdf | Domain::Document => to == "txt" || RASTER_OUTPUTS.contains(&to),
            Domain::Image => RASTER_OUTPUTS.contains(&to),
            _ => false,
        }
    }

    fn accepts_input(&self, extension: &str) -> bool {
        extension == "pdf"
    }

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<(), AdapterError> {
        let extraction = if options.target_extension == "txt" {
            Extraction::Text
        } else {
            let format = ImageFormat::from_extension(&options.target_extension).ok_or_else(|| {
                AdapterError::Unsupported {
                    adapter: NAME,
                    from: options.source_extension.clone(),
                    to: options.target_extension.clone(),
                }
            })?;
            Extraction::Page {
                index: page_index(options.sub_section.as_deref())?,
                format,
            }
        };

        let library_dir = self.library_dir.clone();
        let input = input.to_path_buf();
        let dest = output.to_path_buf();
        run_blocking(NAME, output, &options.cancel, move |cancel| {
            convert_blocking(library_dir.as_deref(), &input, &dest, extraction, &cancel)
        })
        .await
    }
}

fn pdfium_error(e: PdfiumError) -> AdapterError {
    AdapterError::Codec {
        adapter: NAME,
        detail: format!("{e:?}"),
    }
}

fn bind(library_dir: Option<&Path>) -> Result<Pdfium, AdapterError> {
    let bindings = match library_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| AdapterError::ToolMissing {
        tool: "pdfium".to_string(),
        hint: format!(
            "Could not load the pdfium library ({e:?}).\n\
             Set PDFIUM_LIB_PATH to the directory containing it, or install it system-wide."
        ),
    })?;
    Ok(Pdfium::new(bindings))
}

fn convert_blocking(
    library_dir: Option<&Path>,
    input: &Path,
    output: &Path,
    extraction: Extraction,
    cancel: &CancellationToken,
) -> Result<(), AdapterError> {
    let pdfium = bind(library_dir)?;
    let document = pdfium
        .load_pdf_from_file(input, None)
        .map_err(pdfium_error)?;
    let pages = document.pages();
    let total = pages.len() as usize;
    info!(input = %input.display(), pages = total, "PDF loaded");

    match extraction {
        Extraction::Text => {
            let mut text = String::new();
            for page in pages.iter() {
                if cancel.is_cancelled() {
                    return Err(AdapterError::Cancelled { adapter: NAME });
                }
                let page_text = page.text().map_err(pdfium_error)?.all();
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(page_text.trim_end());
            }
            write_text(output, &text, cancel)
        }
        Extraction::Page { index, format } => {
            if index >= total {
                return Err(AdapterError::Codec {
                    adapter: NAME,
                    detail: format!("page {} out of range (document has {total})", index + 1),
                });
            }
            let page = pages.get(index as u16).map_err(pdfium_error)?;
            let render_config = PdfRenderConfig::new()
                .set_target_width(MAX_RENDER_EDGE)
                .set_maximum_height(MAX_RENDER_EDGE);
            let image = page
                .render_with_config(&render_config)
                .map_err(pdfium_error)?
                .as_image();
            debug!(
                page = index + 1,
                width = image.width(),
                height = image.height(),
                "Rendered page"
            );

            if cancel.is_cancelled() {
                return Err(AdapterError::Cancelled { adapter: NAME });
            }
            let image = match format {
                ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
                _ => DynamicImage::ImageRgba8(image.to_rgba8()),
            };
            image
                .save_with_format(output, format)
                .map_err(|e| AdapterError::Codec {
                    adapter: NAME,
                    detail: e.to_string(),
                })
        }
    }
}

/// Write extracted text unless the job was cancelled while extracting.
fn write_text(output: &Path, text: &str, cancel: &CancellationToken) -> Result<(), AdapterError> {
    if cancel.is_cancelled() {
        return Err(AdapterError::Cancelled { adapter: NAME });
    }
    std::fs::write(output, text).map_err(io_error(output))
}
