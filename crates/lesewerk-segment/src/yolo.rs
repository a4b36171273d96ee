// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// YOLO layout detection.
//
// Pre- and post-processing for YOLOv8/v11 detection heads: letterboxing the
// page into the square model input, decoding the `[4 + classes, anchors]`
// output, per-class non-maximum suppression, and grouping the survivors into
// normalized boxes per class. Inference itself runs on `rten` behind the
// `yolo` feature.

use image::DynamicImage;
use image::imageops::FilterType;
use lesewerk_core::{ClassId, NormalizedBox, PageSegments};

/// Grey used by YOLO training pipelines to pad letterboxed inputs.
const PAD_VALUE: f32 = 114.0 / 255.0;

/// How a page was fitted into the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxInfo {
    /// Model input pixels per page pixel.
    pub scale: f32,
    /// Horizontal padding (model input pixels) left of the page.
    pub pad_x: f32,
    /// Vertical padding (model input pixels) above the page.
    pub pad_y: f32,
    /// Side of the square model input.
    pub size: u32,
}

/// One detected region in page pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class_id: ClassId,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in page pixels, clamped to the page.
    pub bbox: [f32; 4],
}

/// Resize `image` to fit a `size` x `size` square, keeping aspect ratio, and
/// pad the remainder with grey.
///
/// Returns RGB planes in CHW order with values in `[0, 1]`.
pub fn letterbox(image: &DynamicImage, size: u32) -> (Vec<f32>, LetterboxInfo) {
    let (width, height) = (image.width().max(1), image.height().max(1));
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let resized = image
        .resize_exact(new_w, new_h, FilterType::Triangle)
        .to_rgb8();

    let plane = (size * size) as usize;
    let mut data = vec![PAD_VALUE; plane * 3];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = ((y + pad_y) * size + (x + pad_x)) as usize;
        for channel in 0..3 {
            data[channel * plane + offset] = pixel.0[channel] as f32 / 255.0;
        }
    }

    (
        data,
        LetterboxInfo {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            size,
        },
    )
}

/// Decode a detection head output laid out as `[4 + num_classes][num_anchors]`
/// (row-major). Rows 0..4 are box centre x, centre y, width and height in
/// model input pixels; the remaining rows are per-class scores.
///
/// Keeps anchors whose best class score exceeds `confidence_threshold` and
/// maps their boxes back onto the `page_width` x `page_height` page.
pub fn decode_predictions(
    output: &[f32],
    num_anchors: usize,
    info: &LetterboxInfo,
    page_width: u32,
    page_height: u32,
    confidence_threshold: f32,
) -> Vec<Detection> {
    if num_anchors == 0 || output.len() % num_anchors != 0 || output.len() / num_anchors <= 4 {
        return Vec::new();
    }
    let rows = output.len() / num_anchors;
    let at = |row: usize, anchor: usize| output[row * num_anchors + anchor];
    let (max_x, max_y) = (page_width as f32, page_height as f32);
    let scale = if info.scale > 0.0 { info.scale } else { 1.0 };

    (0..num_anchors)
        .filter_map(|anchor| {
            let (class_index, confidence) = (4..rows)
                .map(|row| (row - 4, at(row, anchor)))
                .max_by(|a, b| a.1.total_cmp(&b.1))?;
            if confidence <= confidence_threshold {
                return None;
            }

            let (cx, cy) = (at(0, anchor), at(1, anchor));
            let (half_w, half_h) = (at(2, anchor) / 2.0, at(3, anchor) / 2.0);
            let x1 = ((cx - half_w - info.pad_x) / scale).clamp(0.0, max_x);
            let y1 = ((cy - half_h - info.pad_y) / scale).clamp(0.0, max_y);
            let x2 = ((cx + half_w - info.pad_x) / scale).clamp(0.0, max_x);
            let y2 = ((cy + half_h - info.pad_y) / scale).clamp(0.0, max_y);
            if x2 <= x1 || y2 <= y1 {
                return None;
            }

            Some(Detection {
                class_id: class_index as ClassId,
                confidence,
                bbox: [x1, y1, x2, y2],
            })
        })
        .collect()
}

/// Intersection over union of two `xyxy` boxes.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = inter_w * inter_h;
    let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - intersection;
    if union <= 0.0 { 0.0 } else { intersection / union }
}

/// Greedy per-class non-maximum suppression.
///
/// Detections are visited by descending confidence; one is dropped when it
/// overlaps an already kept detection of the same class by more than
/// `iou_threshold`. At most `max_detections` survive.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|keeper| {
            keeper.class_id == candidate.class_id
                && iou(&keeper.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Group detections by class as normalized boxes. `None` when there are none.
pub fn group_by_class(
    detections: &[Detection],
    page_width: u32,
    page_height: u32,
) -> Option<PageSegments> {
    if detections.is_empty() {
        return None;
    }
    let mut segments = PageSegments::new();
    for detection in detections {
        let [x1, y1, x2, y2] = detection.bbox;
        segments
            .entry(detection.class_id)
            .or_default()
            .push(NormalizedBox::from_pixels(x1, y1, x2, y2, page_width, page_height));
    }
    Some(segments)
}

#[cfg(feature = "yolo")]
pub use runtime::YoloSegmentation;

#[cfg(feature = "yolo")]
mod runtime {
    use std::path::Path;

    use image::DynamicImage;
    use lesewerk_core::config::SegmentationConfig;
    use lesewerk_core::error::{LesewerkError, Result};
    use lesewerk_core::{LabelMap, PageSegments};
    use rten::Model;
    use rten_tensor::NdTensor;
    use rten_tensor::prelude::*;
    use tracing::{debug, info, instrument, warn};

    use super::{decode_predictions, group_by_class, letterbox, non_max_suppression};
    use crate::model::{SegmentationModel, labels_for, model_path};

    /// YOLO layout detector running on `rten`.
    pub struct YoloSegmentation {
        model: Model,
        labels: LabelMap,
        input_size: u32,
        confidence_threshold: f32,
        iou_threshold: f32,
        max_detections: usize,
    }

    impl YoloSegmentation {
        /// Load the model and labels named by `config`.
        pub fn from_config(config: &SegmentationConfig) -> Result<Self> {
            let labels = labels_for(config)?;
            Self::load(model_path(config), labels, config)
        }

        /// Load the model at `path` with an explicit label map.
        #[instrument(skip_all, fields(path = %path.as_ref().display()))]
        pub fn load(
            path: impl AsRef<Path>,
            labels: LabelMap,
            config: &SegmentationConfig,
        ) -> Result<Self> {
            let path = path.as_ref();
            if !path.exists() {
                return Err(LesewerkError::ModelNotFound(path.display().to_string()));
            }

            info!("Loading layout model");
            let model = Model::load_file(path).map_err(|err| {
                LesewerkError::Segmentation(format!(
                    "failed to load model from {}: {}",
                    path.display(),
                    err
                ))
            })?;

            Ok(Self {
                model,
                labels,
                input_size: config.input_size.max(32),
                confidence_threshold: config.confidence_threshold,
                iou_threshold: config.iou_threshold,
                max_detections: config.max_detections,
            })
        }

        /// Run the model and return the raw head output as
        /// `([4 + classes][anchors] row-major data, anchors)`.
        fn infer(&self, input: Vec<f32>) -> Result<(Vec<f32>, usize)> {
            let size = self.input_size as usize;
            let input = NdTensor::from_data([1, 3, size, size], input);

            let output = self
                .model
                .run_one(input.view().into(), None)
                .map_err(|err| LesewerkError::Segmentation(format!("inference failed: {}", err)))?;
            let output: NdTensor<f32, 3> = output.try_into().map_err(|err| {
                LesewerkError::Segmentation(format!("unexpected model output: {}", err))
            })?;

            let [_, dim_a, dim_b] = output.shape();
            debug!(dim_a, dim_b, "Model output shape");

            // Heads export either [1, 4+nc, anchors] or [1, anchors, 4+nc];
            // the anchor axis is always the longer one.
            if dim_a <= dim_b {
                Ok((output.to_vec(), dim_b))
            } else {
                let transposed = output.permuted([0, 2, 1]).to_vec();
                Ok((transposed, dim_a))
            }
        }
    }

    impl SegmentationModel for YoloSegmentation {
        fn labels(&self) -> LabelMap {
            self.labels.clone()
        }

        #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
        fn segment(&self, image: &DynamicImage) -> Result<Option<PageSegments>> {
            let (input, info) = letterbox(image, self.input_size);
            let (output, anchors) = self.infer(input)?;

            let classes = (output.len() / anchors.max(1)).saturating_sub(4);
            if classes != self.labels.len() {
                warn!(
                    classes,
                    labels = self.labels.len(),
                    "Model class count does not match label map"
                );
            }

            let candidates = decode_predictions(
                &output,
                anchors,
                &info,
                image.width(),
                image.height(),
                self.confidence_threshold,
            );
            let detections =
                non_max_suppression(candidates, self.iou_threshold, self.max_detections);
            debug!(detections = detections.len(), "Page segmented");

            Ok(group_by_class(&detections, image.width(), image.height()))
        }
    }
}
