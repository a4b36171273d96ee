// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — open PDFs, inspect their text layer, and rasterise pages.
//
// Structure and text come from `lopdf`. Pages are rendered with PDFium when
// the `pdfium` feature is on and the library can be bound; otherwise the
// page's largest embedded image stands in for the page.

use std::path::Path;

use image::{DynamicImage, GrayImage, Luma};
use lesewerk_core::config::RenderConfig;
use lesewerk_core::error::{LesewerkError, Result};
use lopdf::{Document, ObjectId};
use tracing::{debug, info, instrument, warn};

use super::raster::{MAX_RASTER_PIXELS, inherited, largest_page_image};
use crate::image::processor::ImageProcessor;

/// US Letter, used when a page declares no usable MediaBox.
const DEFAULT_PAGE_SIZE_PT: (f32, f32) = (612.0, 792.0);

/// Reads existing PDF files.
///
/// Wraps `lopdf::Document` and keeps the file bytes for the renderer. Page
/// numbers are 1-indexed throughout, matching lopdf's page map.
pub struct PdfReader {
    /// The underlying lopdf document.
    document: Document,
    /// Raw file contents, handed to PDFium for rendering.
    bytes: Vec<u8>,
    /// Source path, if opened from a file (useful for diagnostics).
    source_path: Option<String>,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        info!("Opening PDF: {}", path_ref.display());

        let bytes = std::fs::read(path_ref).map_err(|err| {
            LesewerkError::PdfError(format!("failed to open {}: {}", path_ref.display(), err))
        })?;
        let document = Document::load_mem(&bytes).map_err(|err| {
            LesewerkError::PdfError(format!("failed to open {}: {}", path_ref.display(), err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");

        Ok(Self {
            document,
            bytes,
            source_path: Some(path_ref.display().to_string()),
        })
    }

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            LesewerkError::PdfError(format!("failed to load PDF from memory: {}", err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");

        Ok(Self {
            document,
            bytes: data.to_vec(),
            source_path: None,
        })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Return the source path if the reader was created via [`PdfReader::open`].
    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    /// Whether any page carries a non-blank text layer.
    pub fn contains_text(&self) -> bool {
        self.document
            .get_pages()
            .keys()
            .any(|&page| !self.page_text_or_empty(page).trim().is_empty())
    }

    /// Text of every page, concatenated in page order.
    #[instrument(skip(self))]
    pub fn extract_text(&self) -> String {
        let text: String = self
            .document
            .get_pages()
            .keys()
            .map(|&page| self.page_text_or_empty(page))
            .collect();
        debug!(chars = text.len(), "Extracted PDF text layer");
        text
    }

    /// Text layer of a single page (1-indexed).
    pub fn page_text(&self, page_number: u32) -> Result<String> {
        self.page_id(page_number)?;
        self.document.extract_text(&[page_number]).map_err(|err| {
            LesewerkError::PdfError(format!(
                "failed to extract text from page {}: {}",
                page_number, err
            ))
        })
    }

    /// Page size in points `(width, height)` from the (inherited) MediaBox.
    pub fn page_size_pt(&self, page_number: u32) -> Result<(f32, f32)> {
        let page_id = self.page_id(page_number)?;
        Ok(media_box(&self.document, page_id).unwrap_or(DEFAULT_PAGE_SIZE_PT))
    }

    // -- Rasterisation --------------------------------------------------------

    /// Rasterise every page in order.
    pub fn render_pages(&self, render: &RenderConfig) -> Result<Vec<DynamicImage>> {
        #[cfg(feature = "pdfium")]
        if let Some(renderer) = self.pdfium() {
            return renderer.render_pages(&self.bytes, render);
        }

        (1..=self.page_count() as u32)
            .map(|page| self.render_embedded_page(page, render))
            .collect()
    }

    /// Rasterise one page (1-indexed) at `render.dpi`.
    ///
    /// Renders with PDFium when it is available, otherwise falls back to
    /// [`PdfReader::render_embedded_page`].
    pub fn render_page(&self, page_number: u32, render: &RenderConfig) -> Result<DynamicImage> {
        self.page_id(page_number)?;

        #[cfg(feature = "pdfium")]
        if let Some(renderer) = self.pdfium() {
            return renderer.render_page(&self.bytes, page_number, render);
        }

        self.render_embedded_page(page_number, render)
    }

    /// Rasterise one page (1-indexed) from its largest embedded image.
    ///
    /// The image is scaled so its width matches the MediaBox width at the
    /// target resolution, then turned by the page's /Rotate. Text and vector
    /// content are not drawn. A page without a decodable image becomes a blank
    /// page of the MediaBox size so that page indices stay aligned.
    #[instrument(skip(self, render), fields(page_number, dpi = render.dpi))]
    pub fn render_embedded_page(
        &self,
        page_number: u32,
        render: &RenderConfig,
    ) -> Result<DynamicImage> {
        let page_id = self.page_id(page_number)?;
        let (width_pt, height_pt) =
            media_box(&self.document, page_id).unwrap_or(DEFAULT_PAGE_SIZE_PT);
        let scale = render.dpi.max(1) as f32 / 72.0;
        let target_width = ((width_pt * scale).round() as u32).max(1);

        let raster = match largest_page_image(&self.document, page_id) {
            Ok(Some(img)) => {
                let target_height = ((img.height() as f32 * target_width as f32
                    / img.width().max(1) as f32)
                    .round() as u32)
                    .max(1);
                if img.width() == target_width {
                    img
                } else if target_width as u64 * target_height as u64 > MAX_RASTER_PIXELS {
                    warn!(
                        page_number,
                        target_width, target_height, "Target raster too large, keeping native size"
                    );
                    img
                } else {
                    ImageProcessor::from_dynamic(img)
                        .resize_exact(target_width, target_height)
                        .into_dynamic()
                }
            }
            Ok(None) => {
                warn!(page_number, "Page has no embedded image, rendering blank page");
                blank_page(target_width, ((height_pt * scale).round() as u32).max(1), render)
            }
            Err(err) => {
                warn!(page_number, %err, "Page image could not be decoded, rendering blank page");
                blank_page(target_width, ((height_pt * scale).round() as u32).max(1), render)
            }
        };

        let rotation = inherited(&self.document, page_id, b"Rotate")
            .and_then(|value| value.as_i64().ok())
            .unwrap_or(0);

        debug!(
            width = raster.width(),
            height = raster.height(),
            rotation,
            "Page rasterised"
        );

        Ok(ImageProcessor::from_dynamic(raster)
            .rotate_quarter_turns(rotation)
            .into_dynamic())
    }

    // -- Helpers --------------------------------------------------------------

    #[cfg(feature = "pdfium")]
    fn pdfium(&self) -> Option<crate::pdf::render::PdfiumRenderer> {
        match crate::pdf::render::PdfiumRenderer::load() {
            Ok(renderer) => Some(renderer),
            Err(err) => {
                warn!(%err, "PDFium unavailable, rendering embedded page images only");
                None
            }
        }
    }

    fn page_id(&self, page_number: u32) -> Result<ObjectId> {
        let pages = self.document.get_pages();
        pages.get(&page_number).copied().ok_or_else(|| {
            LesewerkError::PdfError(format!(
                "page {} out of range (document has {} pages)",
                page_number,
                pages.len()
            ))
        })
    }

    fn page_text_or_empty(&self, page_number: u32) -> String {
        self.document
            .extract_text(&[page_number])
            .unwrap_or_else(|err| {
                debug!(page_number, %err, "No extractable text on page");
                String::new()
            })
    }
}

/// MediaBox width and height in points, if present and well-formed.
fn media_box(doc: &Document, page_id: ObjectId) -> Option<(f32, f32)> {
    let values = inherited(doc, page_id, b"MediaBox")?.as_array().ok()?;
    let coords: Vec<f32> = values
        .iter()
        .filter_map(|value| value.as_float().ok())
        .collect();
    let [x0, y0, x1, y1] = coords.as_slice() else {
        return None;
    };
    let (width, height) = ((x1 - x0).abs(), (y1 - y0).abs());
    (width > 0.0 && height > 0.0).then_some((width, height))
}

fn blank_page(width: u32, height: u32, render: &RenderConfig) -> DynamicImage {
    let (width, height) = if width as u64 * height as u64 > MAX_RASTER_PIXELS {
        let shrink = (MAX_RASTER_PIXELS as f64 / (width as f64 * height as f64)).sqrt();
        (
            ((width as f64 * shrink) as u32).max(1),
            ((height as f64 * shrink) as u32).max(1),
        )
    } else {
        (width, height)
    };
    DynamicImage::ImageLuma8(GrayImage::from_pixel(
        width,
        height,
        Luma([render.blank_page_fill]),
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    /// Encode a flat grey JPEG for embedding as a DCT stream.
    pub(crate) fn jpeg(width: u32, height: u32, level: u8) -> Vec<u8> {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([level])));
        crate::image::processor::encode_to_format(&img, image::ImageFormat::Jpeg).unwrap()
    }

    /// One entry per page: optional embedded JPEG, optional text line.
    pub(crate) struct TestPage {
        pub image: Option<(u32, u32)>,
        pub text: Option<&'static str>,
        pub rotate: Option<i64>,
    }

    /// Build a small PDF. MediaBox is set on the /Pages node to exercise inheritance.
    pub(crate) fn build_pdf(pages: &[TestPage]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut kids: Vec<Object> = Vec::new();
        for page in pages {
            let mut operations = Vec::new();
            let mut xobjects = lopdf::Dictionary::new();
            if let Some((w, h)) = page.image {
                let data = jpeg(w, h, 40);
                let mut stream = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => w as i64,
                        "Height" => h as i64,
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => 8,
                        "Filter" => "DCTDecode",
                    },
                    data,
                );
                stream.allows_compression = false;
                let image_id = doc.add_object(stream);
                xobjects.set("Im0", image_id);
                operations.push(Operation::new("q", vec![]));
                operations.push(Operation::new(
                    "cm",
                    vec![200.into(), 0.into(), 0.into(), 100.into(), 0.into(), 0.into()],
                ));
                operations.push(Operation::new("Do", vec!["Im0".into()]));
                operations.push(Operation::new("Q", vec![]));
            }
            if let Some(text) = page.text {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
                operations.push(Operation::new("Td", vec![20.into(), 50.into()]));
                operations.push(Operation::new("Tj", vec![Object::string_literal(text)]));
                operations.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

            let mut page_dict = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                    "XObject" => xobjects,
                },
            };
            if let Some(rotate) = page.rotate {
                page_dict.set("Rotate", rotate);
            }
            kids.push(doc.add_object(page_dict).into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), 200.into(), 100.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn render_72() -> RenderConfig {
        RenderConfig {
            dpi: 72,
            blank_page_fill: 255,
        }
    }

    #[test]
    fn counts_pages() {
        let bytes = build_pdf(&[
            TestPage { image: None, text: Some("one"), rotate: None },
            TestPage { image: None, text: Some("two"), rotate: None },
        ]);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert_eq!(reader.page_count(), 2);
        assert!(reader.source_path().is_none());
    }

    #[test]
    fn text_layer_detected_and_extracted_in_order() {
        let bytes = build_pdf(&[
            TestPage { image: None, text: Some("Invoice 42"), rotate: None },
            TestPage { image: None, text: Some("Total 99"), rotate: None },
        ]);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert!(reader.contains_text());
        let text = reader.extract_text();
        let first = text.find("Invoice 42").unwrap();
        let second = text.find("Total 99").unwrap();
        assert!(first < second);
    }

    #[test]
    fn scanned_pdf_has_no_text() {
        let bytes = build_pdf(&[TestPage { image: Some((100, 50)), text: None, rotate: None }]);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert!(!reader.contains_text());
        assert!(reader.extract_text().trim().is_empty());
    }

    #[test]
    fn media_box_is_inherited_from_parent() {
        let bytes = build_pdf(&[TestPage { image: None, text: None, rotate: None }]);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert_eq!(reader.page_size_pt(1).unwrap(), (200.0, 100.0));
    }

    #[test]
    fn page_out_of_range_is_an_error() {
        let bytes = build_pdf(&[TestPage { image: None, text: None, rotate: None }]);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert!(matches!(reader.page_size_pt(0), Err(LesewerkError::PdfError(_))));
        assert!(reader.render_page(2, &render_72()).is_err());
        assert!(reader.render_embedded_page(2, &render_72()).is_err());
    }

    #[test]
    fn renders_embedded_image_at_page_width() {
        let bytes = build_pdf(&[TestPage { image: Some((400, 200)), text: None, rotate: None }]);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        let page = reader.render_embedded_page(1, &render_72()).unwrap();
        assert_eq!((page.width(), page.height()), (200, 100));
        let page = reader
            .render_embedded_page(1, &RenderConfig { dpi: 144, blank_page_fill: 255 })
            .unwrap();
        assert_eq!((page.width(), page.height()), (400, 200));
    }

    #[test]
    fn embedded_page_without_image_is_blank_fill() {
        let bytes = build_pdf(&[TestPage { image: None, text: Some("only text"), rotate: None }]);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        let render = RenderConfig { dpi: 36, blank_page_fill: 200 };
        let page = reader.render_embedded_page(1, &render).unwrap();
        assert_eq!((page.width(), page.height()), (100, 50));
        assert_eq!(page.to_luma8().get_pixel(10, 10), &Luma([200]));
    }

    #[test]
    fn embedded_rotate_is_applied() {
        let bytes = build_pdf(&[TestPage { image: Some((200, 100)), text: None, rotate: Some(90) }]);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        let page = reader.render_embedded_page(1, &render_72()).unwrap();
        assert_eq!((page.width(), page.height()), (100, 200));
    }

    #[cfg(feature = "pdfium")]
    #[test]
    fn text_only_page_renders_its_text() {
        if crate::pdf::render::PdfiumRenderer::load().is_err() {
            eprintln!("PDFium not available; skipping");
            return;
        }
        let bytes = build_pdf(&[TestPage { image: None, text: Some("Total 99.50"), rotate: None }]);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        let render = RenderConfig { dpi: 300, blank_page_fill: 255 };

        let page = reader.render_page(1, &render).unwrap();
        let dark = page.to_luma8().pixels().filter(|p| p.0[0] < 128).count();
        assert!(dark > 100, "only {dark} dark pixels");
        assert_eq!(reader.render_pages(&render).unwrap().len(), 1);
    }

    #[test]
    fn render_pages_keeps_page_order_and_count() {
        let bytes = build_pdf(&[
            TestPage { image: Some((200, 100)), text: None, rotate: None },
            TestPage { image: None, text: None, rotate: None },
            TestPage { image: Some((200, 100)), text: None, rotate: None },
        ]);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert_eq!(reader.render_pages(&render_72()).unwrap().len(), 3);
    }

    #[test]
    fn garbage_bytes_are_a_pdf_error() {
        assert!(matches!(
            PdfReader::from_bytes(b"not a pdf"),
            Err(LesewerkError::PdfError(_))
        ));
    }
}
