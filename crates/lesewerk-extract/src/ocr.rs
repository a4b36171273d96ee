// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR backends: Azure Document Intelligence over REST, or the in-process
// `ocrs` engine (with the `ocr` feature).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::DynamicImage;
use lesewerk_core::config::{OcrBackendKind, OcrServiceConfig};
use lesewerk_core::error::{LesewerkError, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::http::{UPLOAD_FORMAT, build_client, check_status, non_empty, png_bytes, transport_error};
use crate::retry::{RetryConfig, retry_with_backoff};

/// Reads the text on page images.
#[async_trait]
pub trait OcrModel: Send + Sync {
    /// Text of all `images`, one block per image separated by `\n`.
    async fn extract_text(&self, images: &[DynamicImage]) -> Result<String>;
}

/// Build the OCR backend selected by `config.backend`.
pub fn ocr_model(config: &OcrServiceConfig) -> Result<Arc<dyn OcrModel>> {
    match config.backend {
        OcrBackendKind::Azure => Ok(Arc::new(AzureDocumentOcr::new(config)?)),
        OcrBackendKind::Local => local_ocr(config),
    }
}

#[cfg(feature = "ocr")]
fn local_ocr(config: &OcrServiceConfig) -> Result<Arc<dyn OcrModel>> {
    Ok(Arc::new(LocalOcr::new(config)?))
}

#[cfg(not(feature = "ocr"))]
fn local_ocr(_config: &OcrServiceConfig) -> Result<Arc<dyn OcrModel>> {
    Err(LesewerkError::Config(
        "local OCR needs lesewerk-extract built with the `ocr` feature".into(),
    ))
}

// -- Azure Document Intelligence --------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    pages: Vec<AnalyzedPage>,
}

#[derive(Debug, Deserialize)]
struct AnalyzedPage {
    #[serde(default)]
    lines: Vec<AnalyzedLine>,
}

#[derive(Debug, Deserialize)]
struct AnalyzedLine {
    content: String,
}

impl AnalyzeResult {
    /// Every line of every result page, joined by spaces. One submitted
    /// image is one text block.
    fn text(&self) -> String {
        self.pages
            .iter()
            .flat_map(|page| page.lines.iter().map(|line| line.content.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Azure Document Intelligence (Form Recognizer) `analyze` client.
///
/// Each image is submitted as PNG; the long-running operation is polled
/// until it succeeds, fails, or exceeds the configured timeout.
#[derive(Clone)]
pub struct AzureDocumentOcr {
    client: Client,
    endpoint: String,
    api_key: String,
    model_id: String,
    api_version: String,
    poll_interval: Duration,
    timeout: Duration,
    retry: RetryConfig,
}

impl AzureDocumentOcr {
    pub fn new(config: &OcrServiceConfig) -> Result<Self> {
        let endpoint = non_empty(config.endpoint.as_ref())
            .ok_or_else(|| LesewerkError::Config("Azure OCR endpoint is not set".into()))?;
        let api_key = non_empty(config.api_key.as_ref())
            .ok_or_else(|| LesewerkError::Config("Azure OCR API key is not set".into()))?;

        info!(model_id = %config.model_id, "Azure Document Intelligence configured");
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model_id: config.model_id.clone(),
            api_version: config.api_version.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timeout: Duration::from_secs(config.timeout_secs),
            retry: RetryConfig::default(),
        })
    }

    /// Replace the retry policy used for submissions and polls.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/formrecognizer/documentModels/{}:analyze?api-version={}",
            self.endpoint, self.model_id, self.api_version
        )
    }

    /// Submit one PNG and return the operation URL to poll.
    async fn submit(&self, png: &[u8]) -> Result<String> {
        let response = self
            .client
            .post(self.analyze_url())
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, UPLOAD_FORMAT.mime_type())
            .body(png.to_vec())
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        response
            .headers()
            .get("operation-location")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                LesewerkError::OcrError("analyze response has no Operation-Location header".into())
            })
    }

    async fn poll_once(&self, operation_url: &str) -> Result<AnalyzeOperation> {
        let response = self
            .client
            .get(operation_url)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        response.json().await.map_err(|err| {
            LesewerkError::OcrError(format!("malformed analyze operation response: {}", err))
        })
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    async fn analyze(&self, image: &DynamicImage) -> Result<String> {
        let png = png_bytes(image)?;
        let operation_url =
            retry_with_backoff(&self.retry, "ocr submit", || self.submit(&png)).await?;
        debug!(%operation_url, "Analysis submitted");

        let started = Instant::now();
        loop {
            let operation =
                retry_with_backoff(&self.retry, "ocr poll", || self.poll_once(&operation_url))
                    .await?;
            match operation.status.as_str() {
                "succeeded" => {
                    let text = operation.analyze_result.unwrap_or_default().text();
                    debug!(chars = text.len(), "Analysis succeeded");
                    return Ok(text);
                }
                "failed" => {
                    let detail = operation
                        .error
                        .map(|err| err.to_string())
                        .unwrap_or_else(|| "no error detail".into());
                    return Err(LesewerkError::OcrError(format!("analysis failed: {}", detail)));
                }
                status => {
                    if started.elapsed() >= self.timeout {
                        return Err(LesewerkError::OcrError(format!(
                            "analysis timed out after {}s (last status: {})",
                            self.timeout.as_secs(),
                            status
                        )));
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl OcrModel for AzureDocumentOcr {
    async fn extract_text(&self, images: &[DynamicImage]) -> Result<String> {
        let mut blocks = Vec::with_capacity(images.len());
        for image in images {
            blocks.push(self.analyze(image).await?);
        }
        Ok(blocks.join("\n"))
    }
}

// -- Local engine -----------------------------------------------------------

#[cfg(feature = "ocr")]
pub use local::LocalOcr;

#[cfg(feature = "ocr")]
mod local {
    use std::sync::Arc;

    use async_trait::async_trait;
    use image::DynamicImage;
    use lesewerk_core::config::OcrServiceConfig;
    use lesewerk_core::error::{LesewerkError, Result};
    use lesewerk_document::{LocalOcrConfig, LocalOcrEngine};

    use super::OcrModel;

    /// In-process OCR. Recognition runs on the blocking thread pool.
    #[derive(Clone)]
    pub struct LocalOcr {
        engine: Arc<LocalOcrEngine>,
    }

    impl LocalOcr {
        pub fn new(config: &OcrServiceConfig) -> Result<Self> {
            let engine = LocalOcrEngine::new(LocalOcrConfig::from_service_config(config))?;
            Ok(Self::from_engine(engine))
        }

        pub fn from_engine(engine: LocalOcrEngine) -> Self {
            Self {
                engine: Arc::new(engine),
            }
        }
    }

    #[async_trait]
    impl OcrModel for LocalOcr {
        async fn extract_text(&self, images: &[DynamicImage]) -> Result<String> {
            let mut blocks = Vec::with_capacity(images.len());
            for image in images {
                let engine = Arc::clone(&self.engine);
                let image = image.clone();
                let text = tokio::task::spawn_blocking(move || engine.recognize_text(&image))
                    .await
                    .map_err(|err| {
                        LesewerkError::OcrError(format!("OCR worker panicked: {}", err))
                    })??;
                blocks.push(text);
            }
            Ok(blocks.join("\n"))
        }
    }
}
