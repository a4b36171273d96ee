// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Segmentation model interface, model registry, and label maps.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use lesewerk_core::config::SegmentationConfig;
use lesewerk_core::error::{LesewerkError, Result};
use lesewerk_core::{ClassId, LabelMap, PageSegments};
use serde_json::Value;
use tracing::{debug, info, instrument};

/// Filename of the bundled layout model inside the model directory.
pub const DEFAULT_MODEL_FILENAME: &str = "yolov11l_best.rten";

/// Model kinds understood by [`segmentation_model`].
pub const AVAILABLE_MODELS: &[&str] = &["yolo"];

/// Detects labelled regions on a page.
pub trait SegmentationModel: Send + Sync {
    /// Class id to human-readable label.
    fn labels(&self) -> LabelMap;

    /// Boxes per class in normalized `xyxyn` coordinates, or `None` when
    /// nothing was detected on the page.
    fn segment(&self, image: &DynamicImage) -> Result<Option<PageSegments>>;
}

impl<T: SegmentationModel + ?Sized> SegmentationModel for Box<T> {
    fn labels(&self) -> LabelMap {
        (**self).labels()
    }

    fn segment(&self, image: &DynamicImage) -> Result<Option<PageSegments>> {
        (**self).segment(image)
    }
}

/// Build a segmentation model by kind.
///
/// `None` selects the kind named in `config.model` (YOLO by default).
#[instrument(skip(config))]
pub fn segmentation_model(
    kind: Option<&str>,
    config: &SegmentationConfig,
) -> Result<Box<dyn SegmentationModel>> {
    let kind = kind.unwrap_or(&config.model);
    match kind {
        "yolo" => build_yolo(config),
        other => Err(LesewerkError::UnknownModel {
            name: other.to_string(),
            available: AVAILABLE_MODELS.join(", "),
        }),
    }
}

#[cfg(feature = "yolo")]
fn build_yolo(config: &SegmentationConfig) -> Result<Box<dyn SegmentationModel>> {
    let model = crate::yolo::YoloSegmentation::from_config(config)?;
    Ok(Box::new(model))
}

#[cfg(not(feature = "yolo"))]
fn build_yolo(_config: &SegmentationConfig) -> Result<Box<dyn SegmentationModel>> {
    Err(LesewerkError::Segmentation(
        "lesewerk-segment was built without the `yolo` feature".into(),
    ))
}

/// `$XDG_DATA_HOME/lesewerk/models`, falling back to `~/.local/share/lesewerk/models`.
pub fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg).join("lesewerk").join("models")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("lesewerk")
            .join("models")
    } else {
        PathBuf::from("models")
    }
}

/// Model file to load: the configured path, or the default model file.
pub fn model_path(config: &SegmentationConfig) -> PathBuf {
    config
        .model_path
        .clone()
        .unwrap_or_else(|| default_model_dir().join(DEFAULT_MODEL_FILENAME))
}

/// Label map for `config`: its label file when set, DocLayNet labels otherwise.
pub fn labels_for(config: &SegmentationConfig) -> Result<LabelMap> {
    match &config.labels_path {
        Some(path) => load_labels(path),
        None => Ok(doclaynet_labels()),
    }
}

/// The eleven DocLayNet layout classes the default model is trained on.
pub fn doclaynet_labels() -> LabelMap {
    [
        "Caption",
        "Footnote",
        "Formula",
        "List-item",
        "Page-footer",
        "Page-header",
        "Picture",
        "Section-header",
        "Table",
        "Text",
        "Title",
    ]
    .iter()
    .enumerate()
    .map(|(id, name)| (id as ClassId, name.to_string()))
    .collect()
}

/// Read a label file: `{"0": "Caption", ...}` or `["Caption", ...]`.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_labels(path: impl AsRef<Path>) -> Result<LabelMap> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let value: Value = serde_json::from_str(&raw)?;

    let labels: LabelMap = match value {
        Value::Object(entries) => entries
            .into_iter()
            .map(|(key, name)| {
                let id = key.trim().parse::<ClassId>().map_err(|_| {
                    LesewerkError::Segmentation(format!("label key {:?} is not a class id", key))
                })?;
                Ok((id, label_name(name)?))
            })
            .collect::<Result<_>>()?,
        Value::Array(names) => names
            .into_iter()
            .enumerate()
            .map(|(id, name)| Ok((id as ClassId, label_name(name)?)))
            .collect::<Result<_>>()?,
        _ => {
            return Err(LesewerkError::Segmentation(
                "label file must be a JSON object or array".into(),
            ));
        }
    };

    if labels.is_empty() {
        return Err(LesewerkError::Segmentation("label file is empty".into()));
    }
    info!(classes = labels.len(), "Labels loaded");
    Ok(labels)
}

fn label_name(value: Value) -> Result<String> {
    match value {
        Value::String(name) => Ok(name),
        other => Err(LesewerkError::Segmentation(format!(
            "label must be a string, got {}",
            other
        ))),
    }
}

/// Class id for `label`: exact match first, then case-insensitive.
pub fn class_id_for_label(labels: &LabelMap, label: &str) -> Option<ClassId> {
    let found = labels
        .iter()
        .find(|(_, name)| name.as_str() == label)
        .or_else(|| {
            labels
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(label))
        })
        .map(|(id, _)| *id);
    debug!(label, ?found, "Resolved label");
    found
}
