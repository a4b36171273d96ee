// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page rendering through Google PDFium.
//
// PDFium draws everything on the page: text, vector art, and images. The
// library is bound at runtime, so a missing PDFium is a recoverable error and
// callers fall back to the embedded-image rasteriser in `raster`. It is bound
// once per process; the outcome, success or failure, is kept.

use std::sync::OnceLock;

use image::DynamicImage;
use lesewerk_core::config::RenderConfig;
use lesewerk_core::error::{LesewerkError, Result};
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

use super::raster::MAX_RASTER_PIXELS;

/// Environment variable naming an explicit PDFium library file.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_DYNAMIC_LIB_PATH";

const POINTS_PER_INCH: f32 = 72.0;

static PDFIUM: OnceLock<std::result::Result<Pdfium, String>> = OnceLock::new();

/// Renders PDF pages with the process-wide PDFium binding.
#[derive(Clone, Copy)]
pub struct PdfiumRenderer {
    pdfium: &'static Pdfium,
}

impl PdfiumRenderer {
    /// Bind to PDFium.
    ///
    /// Discovery order:
    /// 1. `PDFIUM_DYNAMIC_LIB_PATH` (explicit library file)
    /// 2. Alongside the running executable
    /// 3. System library search paths
    pub fn load() -> Result<Self> {
        match PDFIUM.get_or_init(|| load_pdfium().map_err(|err| err.to_string())) {
            Ok(pdfium) => Ok(Self { pdfium }),
            Err(message) => Err(LesewerkError::PdfError(message.clone())),
        }
    }

    /// Render one page (1-indexed) of `pdf` at `render.dpi`.
    ///
    /// PDFium applies the page's /Rotate itself.
    #[instrument(skip(self, pdf, render), fields(dpi = render.dpi))]
    pub fn render_page(
        &self,
        pdf: &[u8],
        page_number: u32,
        render: &RenderConfig,
    ) -> Result<DynamicImage> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(map_load_error)?;
        render_document_page(&document, page_number, render)
    }

    /// Render every page of `pdf` in order, parsing the document once.
    #[instrument(skip_all, fields(dpi = render.dpi))]
    pub fn render_pages(&self, pdf: &[u8], render: &RenderConfig) -> Result<Vec<DynamicImage>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(map_load_error)?;
        let count = u32::from(document.pages().len());
        (1..=count)
            .map(|page_number| render_document_page(&document, page_number, render))
            .collect()
    }
}

fn render_document_page(
    document: &PdfDocument<'_>,
    page_number: u32,
    render: &RenderConfig,
) -> Result<DynamicImage> {
    let pages = document.pages();
    let page = page_number
        .checked_sub(1)
        .and_then(|index| u16::try_from(index).ok())
        .and_then(|index| pages.get(index).ok())
        .ok_or_else(|| {
            LesewerkError::PdfError(format!(
                "page {} out of range (document has {} pages)",
                page_number,
                pages.len()
            ))
        })?;

    let (width, height) = render_dimensions(page.width().value, page.height().value, render.dpi);
    let fill = render.blank_page_fill;
    let config = PdfRenderConfig::new()
        .set_target_width(width as i32)
        .set_maximum_height(height as i32)
        .set_clear_color(PdfColor::new(fill, fill, fill, 255));

    let bitmap = page.render_with_config(&config).map_err(|err| {
        LesewerkError::PdfError(format!("failed to render page {}: {}", page_number, err))
    })?;

    // Downstream JPEG encoding has no alpha channel.
    let raster = DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8());
    debug!(
        page_number,
        width = raster.width(),
        height = raster.height(),
        "Page rendered with PDFium"
    );
    Ok(raster)
}

/// Pixel size of a page of `width_pt` x `height_pt` points at `dpi`.
///
/// Both sides are at least 1. Pages above [`MAX_RASTER_PIXELS`] are shrunk,
/// keeping the aspect ratio.
pub(crate) fn render_dimensions(width_pt: f32, height_pt: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi.max(1) as f32 / POINTS_PER_INCH;
    let width = (f64::from(width_pt * scale)).round().max(1.0);
    let height = (f64::from(height_pt * scale)).round().max(1.0);

    let area = width * height;
    if area <= MAX_RASTER_PIXELS as f64 {
        return (width as u32, height as u32);
    }

    let shrink = (MAX_RASTER_PIXELS as f64 / area).sqrt();
    let capped = (
        ((width * shrink) as u32).max(1),
        ((height * shrink) as u32).max(1),
    );
    warn!(
        raw_width = width,
        raw_height = height,
        capped_width = capped.0,
        capped_height = capped.1,
        "Page raster capped"
    );
    capped
}

fn load_pdfium() -> Result<Pdfium> {
    if let Ok(path) = std::env::var(PDFIUM_LIB_ENV) {
        debug!(%path, "Loading PDFium from {}", PDFIUM_LIB_ENV);
        let bindings = Pdfium::bind_to_library(&path).map_err(|err| {
            LesewerkError::PdfError(format!("failed to load PDFium from {}: {}", path, err))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
    {
        let library = Pdfium::pdfium_platform_library_name_at_path(&exe_dir);
        if let Ok(bindings) = Pdfium::bind_to_library(&library) {
            debug!(dir = %exe_dir.display(), "Loaded PDFium next to the executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|err| {
        LesewerkError::PdfError(format!(
            "PDFium library not found; set {} or install PDFium: {}",
            PDFIUM_LIB_ENV, err
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn map_load_error(err: PdfiumError) -> LesewerkError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        LesewerkError::PdfError("document is encrypted".into())
    } else {
        LesewerkError::PdfError(format!("failed to load PDF: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::reader::tests::{TestPage, build_pdf};

    #[test]
    fn a4_at_300_dpi() {
        assert_eq!(render_dimensions(595.0, 842.0, 300), (2479, 3508));
    }

    #[test]
    fn zero_sized_page_is_one_pixel() {
        assert_eq!(render_dimensions(0.0, 0.0, 300), (1, 1));
        assert_eq!(render_dimensions(200.0, 100.0, 0), (3, 1));
    }

    #[test]
    fn oversized_page_is_capped_keeping_aspect() {
        let (width, height) = render_dimensions(14_400.0, 7_200.0, 600);
        assert!(width as u64 * height as u64 <= MAX_RASTER_PIXELS);
        let ratio = width as f32 / height as f32;
        assert!((ratio - 2.0).abs() < 0.01, "ratio {ratio}");
    }

    #[test]
    fn text_only_page_has_ink() {
        let Ok(renderer) = PdfiumRenderer::load() else {
            eprintln!("PDFium not available; skipping");
            return;
        };
        let bytes = build_pdf(&[TestPage {
            image: None,
            text: Some("INVOICE 2026"),
            rotate: None,
        }]);
        let render = RenderConfig {
            dpi: 300,
            blank_page_fill: 255,
        };

        let page = renderer.render_page(&bytes, 1, &render).unwrap();
        assert_eq!(page.width(), 833);
        assert!((416..=417).contains(&page.height()), "height {}", page.height());
        let dark = page.to_luma8().pixels().filter(|p| p.0[0] < 128).count();
        assert!(dark > 100, "only {dark} dark pixels");
    }

    #[test]
    fn rotation_is_applied_by_pdfium() {
        let Ok(renderer) = PdfiumRenderer::load() else {
            eprintln!("PDFium not available; skipping");
            return;
        };
        let bytes = build_pdf(&[
            TestPage { image: Some((200, 100)), text: None, rotate: None },
            TestPage { image: Some((200, 100)), text: None, rotate: Some(90) },
        ]);
        let render = RenderConfig {
            dpi: 72,
            blank_page_fill: 255,
        };

        let pages = renderer.render_pages(&bytes, &render).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!((pages[0].width(), pages[0].height()), (200, 100));
        assert_eq!((pages[1].width(), pages[1].height()), (100, 200));
        assert!(renderer.render_page(&bytes, 3, &render).is_err());
    }
}
