// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subcommand implementations. Results go to stdout, logs to stderr.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use lesewerk_core::config::LesewerkConfig;
use lesewerk_core::error::Result;
use lesewerk_core::{ClassId, ExtractedFields, PageSegments};
use lesewerk_document::{ImagePreprocessor, ImageProcessor, PageLoader, crop_code, decode_qr_codes};
use lesewerk_extract::{DocumentAnalyzer, MultiModalModel, TextExtractionModel, TwoStageExtractor};
use lesewerk_segment::{labels_for, segmentation_model};
use serde_json::{Value, json};
use tracing::info;

pub fn qr(config: &LesewerkConfig, file: &Path, crop_dir: Option<&Path>) -> Result<()> {
    let pages = PageLoader::new(config.render.clone()).load(file)?;
    let scan = scan_qr_pages(&pages, crop_dir.is_some());
    for payload in &scan.payloads {
        println!("{}", payload);
    }

    if let Some(dir) = crop_dir {
        let written = save_pngs(&scan.crops, dir, &file_stem(file, "qr"))?;
        info!(count = written.len(), dir = %dir.display(), "QR crops saved");
    }
    Ok(())
}

/// Payloads, and crops when asked for, of every code on every page, in page order.
#[derive(Debug, Default)]
struct QrScan {
    payloads: Vec<String>,
    crops: Vec<DynamicImage>,
}

fn scan_qr_pages(pages: &[DynamicImage], with_crops: bool) -> QrScan {
    let mut scan = QrScan::default();
    for page in pages {
        for code in decode_qr_codes(page) {
            if with_crops {
                scan.crops.push(crop_code(page, &code));
            }
            scan.payloads.push(code.payload);
        }
    }
    scan
}

pub fn labels(config: &LesewerkConfig) -> Result<()> {
    for (id, label) in labels_for(&config.segmentation)? {
        println!("{}\t{}", id, label);
    }
    Ok(())
}

pub fn segment(
    config: &LesewerkConfig,
    file: &Path,
    preprocessor: &dyn ImagePreprocessor,
) -> Result<()> {
    let analyzer = segmenting_analyzer(config)?;
    let pages = analyzer.segment_document(file, preprocessor)?;
    println!("{}", serde_json::to_string_pretty(&pages_json(&pages))?);
    Ok(())
}

pub fn crop(
    config: &LesewerkConfig,
    file: &Path,
    classes: &[ClassId],
    label: Option<&str>,
    out: &Path,
) -> Result<()> {
    let analyzer = segmenting_analyzer(config)?;
    let crops = match label {
        Some(label) => analyzer.get_by_label(file, label)?,
        None => analyzer.get_image_ids(file, classes, &lesewerk_document::IdentityPreprocessor)?,
    };

    let Some(crops) = crops else {
        info!("No matching regions");
        return Ok(());
    };
    for path in save_pngs(&crops, out, &file_stem(file, "crop"))? {
        println!("{}", path.display());
    }
    Ok(())
}

pub async fn extract(
    config: &LesewerkConfig,
    file: &Path,
    fields: &[String],
    preprocessor: &dyn ImagePreprocessor,
    multimodal: bool,
) -> Result<()> {
    let extractor: Box<dyn TextExtractionModel> = if multimodal {
        Box::new(MultiModalModel::from_config(config)?)
    } else {
        Box::new(TwoStageExtractor::from_config(config)?)
    };
    let analyzer =
        DocumentAnalyzer::for_extraction(extractor).with_render_config(config.render.clone());

    let extracted = analyzer.extract_fields(file, fields, preprocessor).await?;
    println!("{}", fields_json(&extracted)?);
    Ok(())
}

/// Pretty JSON object with keys in the order the fields were requested.
fn fields_json(fields: &ExtractedFields) -> Result<String> {
    Ok(serde_json::to_string_pretty(fields)?)
}

fn segmenting_analyzer(config: &LesewerkConfig) -> Result<DocumentAnalyzer> {
    let model = segmentation_model(None, &config.segmentation)?;
    Ok(DocumentAnalyzer::for_segmentation(model).with_render_config(config.render.clone()))
}

/// `[{"page": 1, "segments": {"<class id>": [box, ...]} | null}, ...]`
fn pages_json(pages: &[Option<PageSegments>]) -> Value {
    Value::Array(
        pages
            .iter()
            .enumerate()
            .map(|(index, segments)| json!({"page": index + 1, "segments": segments}))
            .collect(),
    )
}

fn file_stem(file: &Path, fallback: &str) -> String {
    file.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(fallback)
        .to_string()
}

/// Write `images` as `<dir>/<stem>-001.png`, `<stem>-002.png`, ...
fn save_pngs(images: &[DynamicImage], dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(images.len());
    for (index, image) in images.iter().enumerate() {
        let path = dir.join(format!("{}-{:03}.png", stem, index + 1));
        ImageProcessor::from_dynamic(image.clone()).save(&path)?;
        written.push(path);
    }
    Ok(written)
}
