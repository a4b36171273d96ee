// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan handling — page preprocessing ahead of segmentation and OCR, and
// optional in-process optical character recognition.

pub mod preprocess;

#[cfg(feature = "ocr")]
pub mod ocr;

pub use preprocess::{Binarization, IdentityPreprocessor, ImagePreprocessor, ScanPreprocessor};

#[cfg(feature = "ocr")]
pub use ocr::{LocalOcrConfig, LocalOcrEngine};
