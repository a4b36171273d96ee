// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Lesewerk.

use thiserror::Error;

/// Top-level error type for all Lesewerk operations.
#[derive(Debug, Error)]
pub enum LesewerkError {
    // -- Document errors --
    #[error("unsupported document type: {0}")]
    UnsupportedDocument(String),

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Model errors --
    #[error("segmentation failed: {0}")]
    Segmentation(String),

    #[error("model file not found at {0}")]
    ModelNotFound(String),

    #[error("unknown model type: {name}. Available models: {available}")]
    UnknownModel { name: String, available: String },

    #[error("OCR failed: {0}")]
    OcrError(String),

    #[error("language model request failed: {0}")]
    Llm(String),

    // -- Remote services --
    #[error("HTTP request failed{}: {detail}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Http { status: Option<u16>, detail: String },

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LesewerkError>;
