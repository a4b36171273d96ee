// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// lesewerk-extract — Field extraction for Lesewerk.
//
// OCR backends (Azure Document Intelligence, local `ocrs`), chat-completion
// language models, prompt construction and reply parsing, and the
// `DocumentAnalyzer` pipeline tying loading, segmentation and extraction
// together.

pub mod analyzer;
pub mod extractor;
pub mod fields;
mod http;
pub mod llm;
pub mod message;
pub mod ocr;
pub mod retry;

pub use analyzer::DocumentAnalyzer;
pub use extractor::{MultiModalModel, TextExtractionModel, TwoStageExtractor};
pub use fields::parse_fields;
pub use llm::{LanguageModel, OpenAiChatModel};
pub use message::{ChatMessage, DefaultExtractionMessage, ExtractionMessage, Role};
pub use ocr::{AzureDocumentOcr, OcrModel, ocr_model};
pub use retry::{RetryConfig, RetryDecision, classify_error, retry_with_backoff, should_retry};

#[cfg(feature = "ocr")]
pub use ocr::LocalOcr;
