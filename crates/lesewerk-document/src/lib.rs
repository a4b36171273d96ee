// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// lesewerk-document — Document handling for Lesewerk.
//
// Turns PDFs and (multi-frame) images into page rasters, inspects PDF text
// layers, crops normalized regions, preprocesses scans, decodes QR codes, and
// (with the `ocr` feature) recognises text locally.

pub mod image;
pub mod loader;
pub mod pdf;
pub mod qr;
pub mod scan;

// Re-export the primary entry points so callers can use `lesewerk_document::PageLoader` etc.
pub use crate::image::crop::crop_boxes;
pub use crate::image::processor::ImageProcessor;
pub use loader::{PageLoader, file_to_images, load_pages, load_pages_from_bytes};
pub use pdf::reader::PdfReader;
pub use qr::{
    PixelRect, QrCode, crop_code, decode_qr_codes, detect_and_crop_qr, extract_qrs,
    extract_qrs_decoded, read_qr_code,
};
pub use scan::preprocess::{Binarization, IdentityPreprocessor, ImagePreprocessor, ScanPreprocessor};

#[cfg(feature = "ocr")]
pub use scan::ocr::{LocalOcrConfig, LocalOcrEngine};
