// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text extraction models: OCR followed by LLM field extraction.

use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use lesewerk_core::config::{LesewerkConfig, ModelSettings};
use lesewerk_core::error::Result;
use lesewerk_core::ExtractedFields;
use tracing::{debug, instrument, warn};

use crate::fields::parse_fields;
use crate::llm::{LanguageModel, OpenAiChatModel};
use crate::message::{DefaultExtractionMessage, ExtractionMessage};
use crate::ocr::{OcrModel, ocr_model};

/// Instruction sent with page images when the chat model does the OCR.
const TRANSCRIBE_PROMPT: &str = "Transcribe all text in this image. Return only the text, \
     in reading order, without commentary or formatting.";

/// Reads text off page images and pulls named fields out of text.
#[async_trait]
pub trait TextExtractionModel: Send + Sync {
    async fn extract_text(&self, images: &[DynamicImage]) -> Result<String>;

    async fn extract_fields(&self, text: &str, fields: &[String]) -> Result<ExtractedFields>;
}

/// Ask `llm` for `fields` in `text`. A failed request yields all-`None` fields.
async fn request_fields(
    llm: &dyn LanguageModel,
    message: &dyn ExtractionMessage,
    settings: &ModelSettings,
    text: &str,
    fields: &[String],
) -> ExtractedFields {
    let messages = message.build(fields, Some(text));
    for msg in &messages {
        debug!(role = ?msg.role, content = %msg.content, "Extraction prompt");
    }

    match llm.complete(&messages, settings).await {
        Ok(reply) => {
            debug!(reply = %reply, "Model response");
            parse_fields(&reply, fields)
        }
        Err(err) => {
            warn!(error = %err, "Field extraction request failed");
            ExtractedFields::all_missing(fields)
        }
    }
}

/// OCR model for text, language model for fields.
pub struct TwoStageExtractor {
    ocr: Arc<dyn OcrModel>,
    llm: Arc<dyn LanguageModel>,
    message: Box<dyn ExtractionMessage>,
    settings: ModelSettings,
}

impl TwoStageExtractor {
    pub fn new(ocr: Arc<dyn OcrModel>, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            ocr,
            llm,
            message: Box::new(DefaultExtractionMessage),
            settings: ModelSettings::default(),
        }
    }

    /// OCR backend and chat model as described by `config`.
    pub fn from_config(config: &LesewerkConfig) -> Result<Self> {
        let ocr = ocr_model(&config.ocr)?;
        let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiChatModel::new(&config.llm)?);
        Ok(Self::new(ocr, llm).with_settings(config.llm.settings))
    }

    pub fn with_message(mut self, message: Box<dyn ExtractionMessage>) -> Self {
        self.message = message;
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }
}

#[async_trait]
impl TextExtractionModel for TwoStageExtractor {
    #[instrument(skip_all, fields(images = images.len()))]
    async fn extract_text(&self, images: &[DynamicImage]) -> Result<String> {
        self.ocr.extract_text(images).await
    }

    #[instrument(skip_all, fields(field_count = fields.len(), chars = text.len()))]
    async fn extract_fields(&self, text: &str, fields: &[String]) -> Result<ExtractedFields> {
        Ok(request_fields(
            self.llm.as_ref(),
            self.message.as_ref(),
            &self.settings,
            text,
            fields,
        )
        .await)
    }
}

/// One vision-capable chat model for both transcription and field extraction.
pub struct MultiModalModel {
    llm: Arc<dyn LanguageModel>,
    message: Box<dyn ExtractionMessage>,
    settings: ModelSettings,
}

impl MultiModalModel {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            message: Box::new(DefaultExtractionMessage),
            settings: ModelSettings::default(),
        }
    }

    pub fn from_config(config: &LesewerkConfig) -> Result<Self> {
        let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiChatModel::new(&config.llm)?);
        Ok(Self::new(llm).with_settings(config.llm.settings))
    }

    pub fn with_message(mut self, message: Box<dyn ExtractionMessage>) -> Self {
        self.message = message;
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[async_trait]
impl TextExtractionModel for MultiModalModel {
    /// One vision request per image; transcriptions joined by `\n`.
    #[instrument(skip_all, fields(images = images.len()))]
    async fn extract_text(&self, images: &[DynamicImage]) -> Result<String> {
        let mut blocks = Vec::with_capacity(images.len());
        for image in images {
            let text = self
                .llm
                .complete_with_images(TRANSCRIBE_PROMPT, std::slice::from_ref(image), &self.settings)
                .await?;
            blocks.push(text);
        }
        Ok(blocks.join("\n"))
    }

    #[instrument(skip_all, fields(field_count = fields.len(), chars = text.len()))]
    async fn extract_fields(&self, text: &str, fields: &[String]) -> Result<ExtractedFields> {
        Ok(request_fields(
            self.llm.as_ref(),
            self.message.as_ref(),
            &self.settings,
            text,
            fields,
        )
        .await)
    }
}
