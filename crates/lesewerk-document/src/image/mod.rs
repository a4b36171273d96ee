// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — normalized-box cropping, resize, grayscale, contrast, encoding.

pub mod crop;
pub mod processor;

pub use crop::crop_boxes;
pub use processor::ImageProcessor;
