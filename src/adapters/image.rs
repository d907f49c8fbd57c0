//! Raster conversion and compression with the `image` crate.
//!
//! Serves two domains:
//!
//! * `image`: re-encode between raster formats;
//! * `compressor`: re-encode to jpg/png/webp with a quality preset picked
//!   from the request's sub-section (`low`, `medium`, `high`).
//!
//! Decoding and encoding are CPU-bound and run on the blocking pool.

use super::{io_error, run_blocking, Adapter, ConvertOptions};
use crate::error::AdapterError;
use crate::formats::Domain;
use ::image::codecs::jpeg::JpegEncoder;
use ::image::codecs::png::{CompressionType, FilterType, PngEncoder};
use ::image::{DynamicImage, ImageFormat, ImageReader};
use async_trait::async_trait;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const NAME: &str = "image";

/// Extensions this adapter decodes.
const RASTER_INPUTS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif", "ico",
];

/// Extensions this adapter encodes in the image domain.
const RASTER_OUTPUTS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "ico"];

const COMPRESSOR_OUTPUTS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Largest edge an ICO may carry.
const ICO_MAX_EDGE: u32 = 256;

/// Compression preset for the compressor domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    /// Parse a sub-section hint; anything unrecognised is `Medium`.
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint.map(|h| h.trim().to_ascii_lowercase()).as_deref() {
            Some("low") => Quality::Low,
            Some("high") => Quality::High,
            _ => Quality::Medium,
        }
    }

    fn jpeg_quality(self) -> u8 {
        match self {
            Quality::Low => 40,
            Quality::Medium => 65,
            Quality::High => 85,
        }
    }

    fn png_compression(self) -> CompressionType {
        match self {
            Quality::Low => CompressionType::Best,
            Quality::Medium => CompressionType::Default,
            Quality::High => CompressionType::Fast,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ImageAdapter;

impl ImageAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Adapter for ImageAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports(&self, domain: Domain, from: &str, to: &str) -> bool {
        if !RASTER_INPUTS.contains(&from) {
            return false;
        }
        match domain {
            Domain::Image => RASTER_OUTPUTS.contains(&to),
            Domain::Compressor => COMPRESSOR_OUTPUTS.contains(&to),
            _ => false,
        }
    }

    fn accepts_input(&self, extension: &str) -> bool {
        RASTER_INPUTS.contains(&extension)
    }

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<(), AdapterError> {
        let format = output_format(options)?;
        let quality = (options.domain == Domain::Compressor)
            .then(|| Quality::from_hint(options.sub_section.as_deref()));
        let input = input.to_path_buf();
        let dest = output.to_path_buf();

        run_blocking(NAME, output, &options.cancel, move |cancel| {
            convert_blocking(&input, &dest, format, quality, &cancel)
        })
        .await
    }
}

fn output_format(options: &ConvertOptions) -> Result<ImageFormat, AdapterError> {
    ImageFormat::from_extension(&options.target_extension).ok_or_else(|| {
        AdapterError::Unsupported {
            adapter: NAME,
            from: options.source_extension.clone(),
            to: options.target_extension.clone(),
        }
    })
}

fn codec_error(e: impl std::fmt::Display) -> AdapterError {
    AdapterError::Codec {
        adapter: NAME,
        detail: e.to_string(),
    }
}

fn convert_blocking(
    input: &Path,
    output: &Path,
    format: ImageFormat,
    quality: Option<Quality>,
    cancel: &CancellationToken,
) -> Result<(), AdapterError> {
    let img = ImageReader::open(input)
        .map_err(io_error(input))?
        .with_guessed_format()
        .map_err(io_error(input))?
        .decode()
        .map_err(codec_error)?;
    debug!(
        input = %input.display(),
        width = img.width(),
        height = img.height(),
        ?format,
        ?quality,
        "Decoded image"
    );
    let img = fit_for(img, format);

    if cancel.is_cancelled() {
        return Err(AdapterError::Cancelled { adapter: NAME });
    }

    let file = File::create(output).map_err(io_error(output))?;
    let mut writer = BufWriter::new(file);
    match (quality, format) {
        (Some(q), ImageFormat::Jpeg) => {
            let encoder = JpegEncoder::new_with_quality(&mut writer, q.jpeg_quality());
            img.write_with_encoder(encoder).map_err(codec_error)?;
        }
        (Some(q), ImageFormat::Png) => {
            let encoder =
                PngEncoder::new_with_quality(&mut writer, q.png_compression(), FilterType::Adaptive);
            img.write_with_encoder(encoder).map_err(codec_error)?;
        }
        _ => img.write_to(&mut writer, format).map_err(codec_error)?,
    }
    let file = writer
        .into_inner()
        .map_err(|e| AdapterError::Io {
            path: PathBuf::from(output),
            source: e.into_error(),
        })?;
    file.sync_all().map_err(io_error(output))
}

/// Adapt pixel layout and size to what `format` can encode.
fn fit_for(img: DynamicImage, format: ImageFormat) -> DynamicImage {
    match format {
        // JPEG has no alpha channel.
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        ImageFormat::Ico if img.width() > ICO_MAX_EDGE || img.height() > ICO_MAX_EDGE => {
            img.thumbnail(ICO_MAX_EDGE, ICO_MAX_EDGE)
        }
        ImageFormat::Ico | ImageFormat::WebP | ImageFormat::Gif => {
            DynamicImage::ImageRgba8(img.to_rgba8())
        }
        _ => img,
    }
}
