// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page loader — turns a document file into one raster per page or frame.
//
// PDFs are rasterised page by page, TIFFs yield every directory, GIFs every
// frame, and single-image formats exactly one image.

use std::io::Cursor;
use std::path::Path;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, GrayAlphaImage, GrayImage, ImageBuffer, RgbImage, RgbaImage};
use lesewerk_core::SourceFormat;
use lesewerk_core::config::RenderConfig;
use lesewerk_core::error::{LesewerkError, Result};
use sha2::{Digest, Sha256};
use tiff::ColorType;
use tiff::decoder::{Decoder as TiffDecoder, DecodingResult};
use tracing::{debug, info, instrument, warn};

use crate::pdf::raster::{cmyk_to_rgb, unpack_bits};
use crate::pdf::reader::PdfReader;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Loads documents as page rasters using a fixed render configuration.
#[derive(Debug, Clone, Default)]
pub struct PageLoader {
    render: RenderConfig,
}

impl PageLoader {
    pub fn new(render: RenderConfig) -> Self {
        Self { render }
    }

    pub fn render_config(&self) -> &RenderConfig {
        &self.render
    }

    /// Load every page of the file at `path`, in order.
    ///
    /// The format comes from the file extension. Files with an unknown
    /// extension are sniffed; if they do not decode as a PDF or an image the
    /// result is [`LesewerkError::UnsupportedDocument`].
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Vec<DynamicImage>> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let format = SourceFormat::from_path(path);
        if format.is_none() {
            debug!("Unrecognised extension, sniffing content");
        }
        self.load_bytes(&bytes, format).map_err(|err| match err {
            LesewerkError::UnsupportedDocument(_) => LesewerkError::UnsupportedDocument(
                path.extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
            ),
            other => other,
        })
    }

    /// Load pages from in-memory document bytes.
    ///
    /// `format` of `None` means "unknown": the bytes are sniffed.
    #[instrument(skip_all, fields(bytes_len = bytes.len(), format = ?format))]
    pub fn load_bytes(
        &self,
        bytes: &[u8],
        format: Option<SourceFormat>,
    ) -> Result<Vec<DynamicImage>> {
        info!(sha256 = %fingerprint(bytes), "Loading document");

        let pages = match format {
            Some(SourceFormat::Pdf) => self.load_pdf(bytes)?,
            Some(SourceFormat::Tiff) => decode_tiff_frames(bytes)?,
            Some(SourceFormat::Gif) => decode_gif_frames(bytes)?,
            Some(_) => vec![decode_single(bytes)?],
            None => self.load_sniffed(bytes)?,
        };

        debug!(pages = pages.len(), "Document loaded");
        Ok(pages)
    }

    fn load_pdf(&self, bytes: &[u8]) -> Result<Vec<DynamicImage>> {
        PdfReader::from_bytes(bytes)?.render_pages(&self.render)
    }

    fn load_sniffed(&self, bytes: &[u8]) -> Result<Vec<DynamicImage>> {
        if bytes.starts_with(PDF_MAGIC) {
            return self.load_pdf(bytes);
        }
        match image::guess_format(bytes) {
            Ok(image::ImageFormat::Tiff) => decode_tiff_frames(bytes),
            Ok(image::ImageFormat::Gif) => decode_gif_frames(bytes),
            Ok(format) => image::load_from_memory_with_format(bytes, format)
                .map(|img| vec![img])
                .map_err(|err| {
                    warn!(%err, "Sniffed image failed to decode");
                    LesewerkError::UnsupportedDocument(format!("{:?}", format))
                }),
            Err(_) => Err(LesewerkError::UnsupportedDocument("unknown".into())),
        }
    }
}

/// Load every page of `path` using `render`.
pub fn load_pages(path: impl AsRef<Path>, render: &RenderConfig) -> Result<Vec<DynamicImage>> {
    PageLoader::new(render.clone()).load(path)
}

/// Load every page of in-memory document bytes using `render`.
pub fn load_pages_from_bytes(
    bytes: &[u8],
    format: Option<SourceFormat>,
    render: &RenderConfig,
) -> Result<Vec<DynamicImage>> {
    PageLoader::new(render.clone()).load_bytes(bytes, format)
}

/// Load every page of `path` with the default render settings (300 DPI).
pub fn file_to_images(path: impl AsRef<Path>) -> Result<Vec<DynamicImage>> {
    PageLoader::default().load(path)
}

/// Short content hash for log correlation.
fn fingerprint(bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    digest[..16].to_string()
}

fn decode_single(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|err| LesewerkError::ImageError(format!("failed to decode image: {}", err)))
}

/// Every frame of an animated or single-frame GIF, fully composited.
fn decode_gif_frames(bytes: &[u8]) -> Result<Vec<DynamicImage>> {
    let decoder = GifDecoder::new(Cursor::new(bytes))
        .map_err(|err| LesewerkError::ImageError(format!("failed to read GIF: {}", err)))?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|err| LesewerkError::ImageError(format!("failed to decode GIF frames: {}", err)))?;
    debug!(frames = frames.len(), "GIF decoded");
    Ok(frames
        .into_iter()
        .map(|frame| DynamicImage::ImageRgba8(frame.into_buffer()))
        .collect())
}

/// Every image directory (page) of a TIFF file.
fn decode_tiff_frames(bytes: &[u8]) -> Result<Vec<DynamicImage>> {
    let tiff_err = |err: tiff::TiffError| LesewerkError::ImageError(format!("TIFF decode failed: {}", err));

    let mut decoder = TiffDecoder::new(Cursor::new(bytes)).map_err(tiff_err)?;
    let mut frames = Vec::new();
    loop {
        let (width, height) = decoder.dimensions().map_err(tiff_err)?;
        let color = decoder.colortype().map_err(tiff_err)?;
        let data = decoder.read_image().map_err(tiff_err)?;
        frames.push(tiff_frame(width, height, color, data)?);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(tiff_err)?;
    }
    debug!(frames = frames.len(), "TIFF decoded");
    Ok(frames)
}

fn tiff_frame(width: u32, height: u32, color: ColorType, data: DecodingResult) -> Result<DynamicImage> {
    let bad_size = || {
        LesewerkError::ImageError(format!(
            "TIFF frame data does not match {}x{} {:?}",
            width, height, color
        ))
    };

    let image = match (color, data) {
        (ColorType::Gray(8), DecodingResult::U8(buf)) => {
            GrayImage::from_raw(width, height, buf).map(DynamicImage::ImageLuma8)
        }
        (ColorType::Gray(1), DecodingResult::U8(buf)) => {
            GrayImage::from_raw(width, height, unpack_bits(&buf, width as usize, height as usize))
                .map(DynamicImage::ImageLuma8)
        }
        (ColorType::GrayA(8), DecodingResult::U8(buf)) => {
            GrayAlphaImage::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8)
        }
        (ColorType::RGB(8), DecodingResult::U8(buf)) => {
            RgbImage::from_raw(width, height, buf).map(DynamicImage::ImageRgb8)
        }
        (ColorType::RGBA(8), DecodingResult::U8(buf)) => {
            RgbaImage::from_raw(width, height, buf).map(DynamicImage::ImageRgba8)
        }
        (ColorType::CMYK(8), DecodingResult::U8(buf)) => {
            RgbImage::from_raw(width, height, cmyk_to_rgb(&buf)).map(DynamicImage::ImageRgb8)
        }
        (ColorType::Gray(16), DecodingResult::U16(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLuma16)
        }
        (ColorType::RGB(16), DecodingResult::U16(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgb16)
        }
        (ColorType::RGBA(16), DecodingResult::U16(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgba16)
        }
        (other, _) => {
            return Err(LesewerkError::ImageError(format!(
                "unsupported TIFF colour type: {:?}",
                other
            )));
        }
    };

    image.ok_or_else(bad_size)
}
