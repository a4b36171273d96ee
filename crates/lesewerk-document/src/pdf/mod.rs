// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — text-layer inspection and page rasterisation.

pub mod raster;
pub mod reader;
#[cfg(feature = "pdfium")]
pub mod render;

pub use reader::PdfReader;
#[cfg(feature = "pdfium")]
pub use render::PdfiumRenderer;
