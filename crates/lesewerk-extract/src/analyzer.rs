// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document analyzer: the end-to-end pipeline over one document file.
//
// Pages are loaded once per call. Text-layer PDFs skip OCR entirely;
// everything else is rasterised, preprocessed, and read page by page.

use std::path::Path;

use image::DynamicImage;
use lesewerk_core::config::RenderConfig;
use lesewerk_core::error::{LesewerkError, Result};
use lesewerk_core::{ClassId, ExtractedFields, LabelMap, PageSegments, SourceFormat};
use lesewerk_document::{IdentityPreprocessor, ImagePreprocessor, PageLoader, PdfReader, crop_boxes};
use lesewerk_segment::{SegmentationModel, class_id_for_label};
use tracing::{debug, info, instrument};

use crate::extractor::TextExtractionModel;

/// Runs segmentation and field extraction over document files.
///
/// Either stage may be left out; using a missing stage is a configuration
/// error.
pub struct DocumentAnalyzer {
    segmentation: Option<Box<dyn SegmentationModel>>,
    extractor: Option<Box<dyn TextExtractionModel>>,
    loader: PageLoader,
}

impl DocumentAnalyzer {
    pub fn new(
        segmentation: Box<dyn SegmentationModel>,
        extractor: Box<dyn TextExtractionModel>,
    ) -> Self {
        Self {
            segmentation: Some(segmentation),
            extractor: Some(extractor),
            loader: PageLoader::default(),
        }
    }

    /// Analyzer that can segment and crop but not extract fields.
    pub fn for_segmentation(segmentation: Box<dyn SegmentationModel>) -> Self {
        Self {
            segmentation: Some(segmentation),
            extractor: None,
            loader: PageLoader::default(),
        }
    }

    /// Analyzer that can extract fields but not segment.
    pub fn for_extraction(extractor: Box<dyn TextExtractionModel>) -> Self {
        Self {
            segmentation: None,
            extractor: Some(extractor),
            loader: PageLoader::default(),
        }
    }

    /// Rasterise PDF pages with `render` instead of the defaults.
    pub fn with_render_config(mut self, render: RenderConfig) -> Self {
        self.loader = PageLoader::new(render);
        self
    }

    /// Label map of the segmentation model; empty without one.
    pub fn labels(&self) -> LabelMap {
        self.segmentation
            .as_ref()
            .map(|model| model.labels())
            .unwrap_or_default()
    }

    fn segmentation(&self) -> Result<&dyn SegmentationModel> {
        self.segmentation
            .as_deref()
            .ok_or_else(|| LesewerkError::Config("no segmentation model configured".into()))
    }

    fn extractor(&self) -> Result<&dyn TextExtractionModel> {
        self.extractor
            .as_deref()
            .ok_or_else(|| LesewerkError::Config("no text extraction model configured".into()))
    }

    /// Extract `fields` from the document at `path`.
    ///
    /// PDFs with a text layer are read directly; otherwise every page is
    /// preprocessed and OCRed on its own, page texts joined by `\n`.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), field_count = fields.len()))]
    pub async fn extract_fields(
        &self,
        path: impl AsRef<Path>,
        fields: &[String],
        preprocessor: &dyn ImagePreprocessor,
    ) -> Result<ExtractedFields> {
        let path = path.as_ref();
        let extractor = self.extractor()?;
        let text = match self.pdf_text(path)? {
            Some(text) => {
                info!(chars = text.len(), "Using PDF text layer");
                text
            }
            None => {
                let pages = preprocessor.preprocess_images(self.loader.load(path)?);
                info!(pages = pages.len(), "Running OCR");
                let mut page_texts = Vec::with_capacity(pages.len());
                for page in &pages {
                    page_texts.push(extractor.extract_text(std::slice::from_ref(page)).await?);
                }
                page_texts.join("\n")
            }
        };

        extractor.extract_fields(&text, fields).await
    }

    /// Text layer of `path` when it is a PDF that has one.
    fn pdf_text(&self, path: &Path) -> Result<Option<String>> {
        if SourceFormat::from_path(path) != Some(SourceFormat::Pdf) {
            return Ok(None);
        }
        let reader = PdfReader::open(path)?;
        Ok(reader.contains_text().then(|| reader.extract_text()))
    }

    /// Segments for every page, in page order. `None` marks a page with no
    /// detections.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn segment_document(
        &self,
        path: impl AsRef<Path>,
        preprocessor: &dyn ImagePreprocessor,
    ) -> Result<Vec<Option<PageSegments>>> {
        let pages = preprocessor.preprocess_images(self.loader.load(path)?);
        self.segment_pages(&pages)
    }

    fn segment_pages(&self, pages: &[DynamicImage]) -> Result<Vec<Option<PageSegments>>> {
        let model = self.segmentation()?;
        pages
            .iter()
            .enumerate()
            .map(|(index, page)| {
                let segments = model.segment(page)?;
                debug!(
                    page = index,
                    classes = segments.as_ref().map_or(0, |s| s.len()),
                    "Page segmented"
                );
                Ok(segments)
            })
            .collect()
    }

    /// Crops of every region whose class is in `class_ids`.
    ///
    /// Segmentation runs on the preprocessed pages; crops are cut from the
    /// original pages. Order is page by page, then class id ascending, then
    /// detection order. `None` when nothing matched.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn get_image_ids(
        &self,
        path: impl AsRef<Path>,
        class_ids: &[ClassId],
        preprocessor: &dyn ImagePreprocessor,
    ) -> Result<Option<Vec<DynamicImage>>> {
        let pages = self.loader.load(path)?;
        let segments = self.segment_pages(&preprocessor.preprocess_images(pages.clone()))?;

        let mut crops = Vec::new();
        for (page, segments) in pages.iter().zip(segments) {
            let Some(segments) = segments else {
                continue;
            };
            for (class_id, boxes) in &segments {
                if class_ids.contains(class_id) {
                    crops.extend(crop_boxes(page, boxes));
                }
            }
        }

        info!(crops = crops.len(), "Regions cropped");
        Ok((!crops.is_empty()).then_some(crops))
    }

    /// Crops of one class, without preprocessing.
    pub fn get_by_id(
        &self,
        path: impl AsRef<Path>,
        class_id: ClassId,
    ) -> Result<Option<Vec<DynamicImage>>> {
        self.get_image_ids(path, &[class_id], &IdentityPreprocessor)
    }

    /// Crops of the class named `label`, without preprocessing.
    pub fn get_by_label(
        &self,
        path: impl AsRef<Path>,
        label: &str,
    ) -> Result<Option<Vec<DynamicImage>>> {
        let labels = self.labels();
        let class_id = class_id_for_label(&labels, label).ok_or_else(|| {
            LesewerkError::Segmentation(format!(
                "unknown label {:?}; available labels: {}",
                label,
                labels.values().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;
        self.get_by_id(path, class_id)
    }
}
