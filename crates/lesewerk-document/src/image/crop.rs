// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Region cropping from normalized `xyxyn` boxes.

use image::DynamicImage;
use lesewerk_core::NormalizedBox;
use tracing::{debug, instrument};

use super::processor::normalized_to_pixel_bounds;

/// Crop every box out of `image`, returning one crop per box in input order.
///
/// Box coordinates are fractions of the image size. Each box is clamped to
/// the image, so a box lying entirely outside it (or with `x2 < x1`) yields a
/// zero-area image rather than an error.
#[instrument(skip_all, fields(boxes = boxes.len(), width = image.width(), height = image.height()))]
pub fn crop_boxes(image: &DynamicImage, boxes: &[NormalizedBox]) -> Vec<DynamicImage> {
    boxes
        .iter()
        .map(|bbox| {
            let (left, upper, right, lower) =
                normalized_to_pixel_bounds(bbox, image.width(), image.height());
            debug!(left, upper, right, lower, "Cropping region");
            image.crop_imm(left, upper, right - left, lower - upper)
        })
        .collect()
}
