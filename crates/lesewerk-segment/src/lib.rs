// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// lesewerk-segment: page layout segmentation for Lesewerk.
//
// Splits page rasters into labelled regions (text, table, picture, ...) with
// an object-detection model. Boxes are reported per class in normalized
// `xyxyn` coordinates.

pub mod model;
pub mod yolo;

pub use model::{
    AVAILABLE_MODELS, DEFAULT_MODEL_FILENAME, SegmentationModel, class_id_for_label,
    default_model_dir, doclaynet_labels, labels_for, load_labels, model_path, segmentation_model,
};
pub use yolo::{
    Detection, LetterboxInfo, decode_predictions, group_by_class, iou, letterbox,
    non_max_suppression,
};

#[cfg(feature = "yolo")]
pub use yolo::YoloSegmentation;
