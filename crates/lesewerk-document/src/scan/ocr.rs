// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process OCR for Lesewerk.
//
// Text extraction from page rasters using the `ocrs` crate, a pure-Rust OCR
// engine running neural network models via `rten`. Only compiled with the
// `ocr` feature:
//
// ```toml
// lesewerk-document = { path = "crates/lesewerk-document", features = ["ocr"] }
// ```
//
// The engine needs two model files, `text-detection.rten` and
// `text-recognition.rten`. Running `ocrs-cli` once downloads them to
// `$XDG_CACHE_HOME/ocrs` (typically `~/.cache/ocrs`), which is the default
// model directory.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use lesewerk_core::config::OcrServiceConfig;
use lesewerk_core::error::{LesewerkError, Result};
use ocrs::{ImageSource, OcrEngine as OcrsEngine, OcrEngineParams};
use rten::Model;
use tracing::{debug, info, instrument};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// `$XDG_CACHE_HOME/ocrs`, falling back to `~/.cache/ocrs`.
pub fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Model locations for a [`LocalOcrEngine`].
#[derive(Debug, Clone)]
pub struct LocalOcrConfig {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
}

impl Default for LocalOcrConfig {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl LocalOcrConfig {
    /// Expects `dir` to contain `text-detection.rten` and `text-recognition.rten`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    /// Use `ocr.model_dir` when set, the default cache directory otherwise.
    pub fn from_service_config(config: &OcrServiceConfig) -> Self {
        match &config.model_dir {
            Some(dir) => Self::from_dir(dir),
            None => Self::default(),
        }
    }

    fn models(&self) -> [(&'static str, &Path); 2] {
        [
            ("detection", self.detection_model_path.as_path()),
            ("recognition", self.recognition_model_path.as_path()),
        ]
    }

    /// Verify that both model files exist.
    pub fn validate(&self) -> Result<()> {
        match self.models().into_iter().find(|(_, path)| !path.exists()) {
            Some((kind, path)) => Err(LesewerkError::ModelNotFound(format!(
                "{} ({} model; run `ocrs-cli` once to download models)",
                path.display(),
                kind
            ))),
            None => Ok(()),
        }
    }
}

fn load_model(kind: &str, path: &Path) -> Result<Model> {
    info!(kind, path = %path.display(), "Loading OCR model");
    Model::load_file(path).map_err(|err| {
        LesewerkError::OcrError(format!(
            "failed to load {} model from {}: {}",
            kind,
            path.display(),
            err
        ))
    })
}

/// Recognises text on page rasters. Load once, reuse for every page.
pub struct LocalOcrEngine {
    engine: OcrsEngine,
}

impl LocalOcrEngine {
    /// Load both models. This is the expensive step.
    ///
    /// `ocrs` and `rten` are very slow in debug builds; build them in release.
    #[instrument(skip_all)]
    pub fn new(config: LocalOcrConfig) -> Result<Self> {
        config.validate()?;
        let [(det_kind, det_path), (rec_kind, rec_path)] = config.models();

        let engine = OcrsEngine::new(OcrEngineParams {
            detection_model: Some(load_model(det_kind, det_path)?),
            recognition_model: Some(load_model(rec_kind, rec_path)?),
            ..Default::default()
        })
        .map_err(|err| {
            LesewerkError::OcrError(format!("failed to initialise OCR engine: {}", err))
        })?;

        info!("OCR engine initialised");
        Ok(Self { engine })
    }

    /// All text on the page: trimmed, non-blank lines separated by `\n`.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn recognize_text(&self, image: &DynamicImage) -> Result<String> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            LesewerkError::OcrError(format!(
                "failed to create image source ({}x{}): {}",
                width, height, err
            ))
        })?;

        let input = self.engine.prepare_input(source).map_err(|err| {
            LesewerkError::OcrError(format!("OCR preprocessing failed: {}", err))
        })?;

        let raw = self.engine.get_text(&input).map_err(|err| {
            LesewerkError::OcrError(format!("OCR text recognition failed: {}", err))
        })?;

        let text = tidy_lines(&raw);
        debug!(chars = text.len(), "OCR recognition complete");
        Ok(text)
    }
}

fn tidy_lines(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_known_filenames() {
        let config = LocalOcrConfig::default();
        assert!(config.detection_model_path.ends_with(DETECTION_MODEL_FILENAME));
        assert!(config.recognition_model_path.ends_with(RECOGNITION_MODEL_FILENAME));
    }

    #[test]
    fn service_config_model_dir_wins() {
        let service = OcrServiceConfig {
            model_dir: Some(PathBuf::from("/opt/ocr")),
            ..OcrServiceConfig::default()
        };
        let config = LocalOcrConfig::from_service_config(&service);
        assert_eq!(
            config.detection_model_path,
            PathBuf::from("/opt/ocr/text-detection.rten")
        );
    }

    #[test]
    fn blank_lines_are_dropped() {
        assert_eq!(tidy_lines("  Invoice 7 \n\n   \nTotal: 12\n"), "Invoice 7\nTotal: 12");
        assert_eq!(tidy_lines(""), "");
    }

    #[test]
    fn missing_recognition_model_is_named() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DETECTION_MODEL_FILENAME), b"").unwrap();
        let err = LocalOcrConfig::from_dir(dir.path()).validate().unwrap_err();
        assert!(matches!(err, LesewerkError::ModelNotFound(msg) if msg.contains("recognition")));
    }

    #[test]
    fn missing_models_fail_validation() {
        let err = LocalOcrConfig::from_dir("/nonexistent/ocr-models")
            .validate()
            .unwrap_err();
        assert!(matches!(err, LesewerkError::ModelNotFound(_)));
    }
}
