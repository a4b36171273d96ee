// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.
//
// Settings are read from an optional JSON file; secrets and endpoints can be
// overridden from the environment so they never have to live on disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LesewerkError, Result};

/// Environment variables consulted by [`LesewerkConfig::apply_env_overrides`].
pub const ENV_OCR_ENDPOINT: &str = "LESEWERK_OCR_ENDPOINT";
pub const ENV_OCR_KEY: &str = "LESEWERK_OCR_KEY";
pub const ENV_LLM_ENDPOINT: &str = "LESEWERK_LLM_ENDPOINT";
pub const ENV_LLM_KEY: &str = "LESEWERK_LLM_KEY";
pub const ENV_LLM_MODEL: &str = "LESEWERK_LLM_MODEL";
pub const ENV_SEGMENTATION_MODEL_PATH: &str = "LESEWERK_SEGMENTATION_MODEL_PATH";

/// Top-level settings for every Lesewerk pipeline stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LesewerkConfig {
    pub render: RenderConfig,
    pub segmentation: SegmentationConfig,
    pub ocr: OcrServiceConfig,
    pub llm: LlmConfig,
}

/// How document pages are turned into rasters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Target resolution for PDF pages (dots per inch).
    pub dpi: u32,
    /// Grey level used for PDF pages that carry no raster image.
    pub blank_page_fill: u8,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            blank_page_fill: 255,
        }
    }
}

/// Object-detection model used to segment pages into labelled regions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Model kind understood by the segmentation registry (`"yolo"`).
    pub model: String,
    /// Explicit model file; defaults to the bundled model directory.
    pub model_path: Option<PathBuf>,
    /// JSON label file (`{"0": "Caption", ...}`); defaults to DocLayNet labels.
    pub labels_path: Option<PathBuf>,
    /// Minimum class confidence for a detection to be kept.
    pub confidence_threshold: f32,
    /// IoU above which overlapping detections of the same class are suppressed.
    pub iou_threshold: f32,
    /// Square model input size in pixels.
    pub input_size: u32,
    /// Upper bound on detections per page after suppression.
    pub max_detections: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            model: "yolo".to_string(),
            model_path: None,
            labels_path: None,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            input_size: 640,
            max_detections: 300,
        }
    }
}

/// Which OCR implementation backs the text extraction stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackendKind {
    /// Azure Document Intelligence (Form Recognizer) REST API.
    Azure,
    /// In-process OCR via the `ocrs` engine (requires the `ocr` feature).
    Local,
}

/// OCR service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrServiceConfig {
    pub backend: OcrBackendKind,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Document Intelligence model id.
    pub model_id: String,
    pub api_version: String,
    /// Delay between polls of a running analysis operation.
    pub poll_interval_ms: u64,
    /// Give up on a single analysis after this long.
    pub timeout_secs: u64,
    /// Directory holding `text-detection.rten` / `text-recognition.rten`.
    pub model_dir: Option<PathBuf>,
}

impl Default for OcrServiceConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackendKind::Azure,
            endpoint: None,
            api_key: None,
            model_id: "prebuilt-document".to_string(),
            api_version: "2023-07-31".to_string(),
            poll_interval_ms: 1000,
            timeout_secs: 120,
            model_dir: None,
        }
    }
}

/// Chat-completion provider flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI-compatible `/chat/completions` with bearer auth.
    OpenAi,
    /// Azure OpenAI deployment URL with `api-key` header.
    Azure,
}

/// Sampling parameters sent with every extraction request.
///
/// Defaults are tuned for deterministic JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: 1000,
        }
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Base URL (OpenAI) or resource endpoint (Azure).
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Model name (OpenAI) or deployment name (Azure).
    pub model: String,
    /// Only used by the Azure provider.
    pub api_version: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub settings: ModelSettings,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            endpoint: None,
            api_key: None,
            model: "gpt-4o".to_string(),
            api_version: "2024-02-01".to_string(),
            timeout_secs: 60,
            max_retries: 3,
            settings: ModelSettings::default(),
        }
    }
}

impl LesewerkConfig {
    /// Read a JSON configuration file. Missing sections fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            LesewerkError::Config(format!("cannot read {}: {}", path.display(), err))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load `path` if given, otherwise start from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Overlay endpoints and credentials from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary lookup (the environment in production).
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = non_empty(ENV_OCR_ENDPOINT) {
            debug!(key = ENV_OCR_ENDPOINT, "Overriding OCR endpoint");
            self.ocr.endpoint = Some(value);
        }
        if let Some(value) = non_empty(ENV_OCR_KEY) {
            self.ocr.api_key = Some(value);
        }
        if let Some(value) = non_empty(ENV_LLM_ENDPOINT) {
            debug!(key = ENV_LLM_ENDPOINT, "Overriding LLM endpoint");
            self.llm.endpoint = Some(value);
        }
        if let Some(value) = non_empty(ENV_LLM_KEY) {
            self.llm.api_key = Some(value);
        }
        if let Some(value) = non_empty(ENV_LLM_MODEL) {
            self.llm.model = value;
        }
        if let Some(value) = non_empty(ENV_SEGMENTATION_MODEL_PATH) {
            self.segmentation.model_path = Some(PathBuf::from(value));
        }
    }

    /// Reject settings that would make a pipeline stage misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.render.dpi == 0 {
            return Err(LesewerkError::Config("render.dpi must be positive".into()));
        }
        let seg = &self.segmentation;
        if !(0.0..=1.0).contains(&seg.confidence_threshold) {
            return Err(LesewerkError::Config(format!(
                "segmentation.confidence_threshold must be within [0, 1], got {}",
                seg.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&seg.iou_threshold) {
            return Err(LesewerkError::Config(format!(
                "segmentation.iou_threshold must be within [0, 1], got {}",
                seg.iou_threshold
            )));
        }
        if seg.input_size == 0 || seg.input_size % 32 != 0 {
            return Err(LesewerkError::Config(format!(
                "segmentation.input_size must be a positive multiple of 32, got {}",
                seg.input_size
            )));
        }
        if self.llm.settings.max_tokens == 0 {
            return Err(LesewerkError::Config(
                "llm.settings.max_tokens must be positive".into(),
            ));
        }
        Ok(())
    }
}
