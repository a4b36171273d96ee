// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared HTTP plumbing for the remote OCR and LLM adapters.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat};
use lesewerk_core::SourceFormat;
use lesewerk_core::error::{LesewerkError, Result};
use lesewerk_document::image::processor::encode_to_format;
use reqwest::{Client, Response};

/// Longest error body carried into an error message.
const MAX_DETAIL_CHARS: usize = 500;

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|err| LesewerkError::Config(format!("failed to create HTTP client: {}", err)))
}

/// Map a transport failure. No status means the request never completed.
pub(crate) fn transport_error(err: reqwest::Error) -> LesewerkError {
    LesewerkError::Http {
        status: err.status().map(|status| status.as_u16()),
        detail: err.to_string(),
    }
}

/// Pass successful responses through; turn anything else into `Http`.
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("no response body").to_string()
    } else {
        body.chars().take(MAX_DETAIL_CHARS).collect()
    };
    Err(LesewerkError::Http {
        status: Some(status.as_u16()),
        detail,
    })
}

/// Pages leave the process as PNG.
pub(crate) const UPLOAD_FORMAT: SourceFormat = SourceFormat::Png;

pub(crate) fn png_bytes(image: &DynamicImage) -> Result<Vec<u8>> {
    encode_to_format(image, ImageFormat::Png)
}

/// `data:image/png;base64,...` URL for chat vision requests.
pub(crate) fn png_data_url(image: &DynamicImage) -> Result<String> {
    Ok(format!(
        "data:{};base64,{}",
        UPLOAD_FORMAT.mime_type(),
        STANDARD.encode(png_bytes(image)?)
    ))
}

pub(crate) fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}
