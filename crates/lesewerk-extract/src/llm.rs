// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Chat-completion language models.
//
// One client speaks both the OpenAI-compatible `/chat/completions` API and
// Azure OpenAI deployments. Transient failures (429, 5xx, timeouts) are
// retried with backoff; authentication and request errors fail at once.

use async_trait::async_trait;
use image::DynamicImage;
use lesewerk_core::config::{LlmConfig, LlmProvider, ModelSettings};
use lesewerk_core::error::{LesewerkError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::http::{build_client, check_status, non_empty, png_data_url, transport_error};
use crate::message::{ChatMessage, Role};
use crate::retry::{RetryConfig, retry_with_backoff};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// A chat model that turns a conversation into a reply.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Text of the first choice.
    async fn complete(&self, messages: &[ChatMessage], settings: &ModelSettings) -> Result<String>;

    /// Single user turn made of `prompt` followed by `images`.
    ///
    /// Models without vision support reject the call.
    async fn complete_with_images(
        &self,
        _prompt: &str,
        _images: &[DynamicImage],
        _settings: &ModelSettings,
    ) -> Result<String> {
        Err(LesewerkError::Llm(
            "this language model does not accept images".into(),
        ))
    }
}

// -- Wire format ------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: WireContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// -- Client -----------------------------------------------------------------

/// OpenAI-compatible or Azure OpenAI chat model.
#[derive(Clone)]
pub struct OpenAiChatModel {
    client: Client,
    provider: LlmProvider,
    endpoint: String,
    api_key: String,
    model: String,
    api_version: String,
    retry: RetryConfig,
}

impl OpenAiChatModel {
    /// Build a client from settings. The API key is required; Azure also
    /// needs the resource endpoint.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = non_empty(config.api_key.as_ref()).ok_or_else(|| {
            LesewerkError::Config("language model API key is not set".into())
        })?;

        let endpoint = match (config.provider, non_empty(config.endpoint.as_ref())) {
            (_, Some(endpoint)) => endpoint,
            (LlmProvider::OpenAi, None) => OPENAI_BASE_URL.to_string(),
            (LlmProvider::Azure, None) => {
                return Err(LesewerkError::Config(
                    "Azure OpenAI needs an endpoint".into(),
                ));
            }
        };

        info!(provider = ?config.provider, model = %config.model, "Language model configured");
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            provider: config.provider,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            api_version: config.api_version.clone(),
            retry: RetryConfig::with_max_retries(config.max_retries),
        })
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        match self.provider {
            LlmProvider::OpenAi => format!("{}/chat/completions", self.endpoint),
            LlmProvider::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.endpoint, self.model, self.api_version
            ),
        }
    }

    fn request<'a>(
        &'a self,
        messages: Vec<WireMessage<'a>>,
        settings: &ModelSettings,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages,
            temperature: settings.temperature,
            top_p: settings.top_p,
            max_tokens: settings.max_tokens,
        }
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<String> {
        let request = self.client.post(self.url()).json(body);
        let request = match self.provider {
            LlmProvider::OpenAi => request.bearer_auth(&self.api_key),
            LlmProvider::Azure => request.header("api-key", &self.api_key),
        };

        let response = request.send().await.map_err(transport_error)?;
        let response = check_status(response).await?;
        let parsed: ChatResponse = response.json().await.map_err(|err| {
            LesewerkError::Llm(format!("malformed chat completion response: {}", err))
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LesewerkError::Llm("response contained no choices".into()))?;
        let content = choice.message.content.unwrap_or_default();
        debug!(chars = content.len(), "Chat completion received");
        Ok(content)
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    async fn complete(&self, messages: &[ChatMessage], settings: &ModelSettings) -> Result<String> {
        let wire = messages
            .iter()
            .map(|message| WireMessage {
                role: message.role,
                content: WireContent::Text(&message.content),
            })
            .collect();
        let body = self.request(wire, settings);

        retry_with_backoff(&self.retry, "chat completion", || self.send(&body)).await
    }

    #[instrument(skip_all, fields(model = %self.model, images = images.len()))]
    async fn complete_with_images(
        &self,
        prompt: &str,
        images: &[DynamicImage],
        settings: &ModelSettings,
    ) -> Result<String> {
        let mut parts = vec![ContentPart::Text {
            text: prompt.to_string(),
        }];
        for image in images {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: png_data_url(image)?,
                },
            });
        }
        let wire = vec![WireMessage {
            role: Role::User,
            content: WireContent::Parts(parts),
        }];
        let body = self.request(wire, settings);

        retry_with_backoff(&self.retry, "vision completion", || self.send(&body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(provider: LlmProvider, endpoint: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider,
            endpoint: endpoint.map(str::to_string),
            api_key: Some("secret".into()),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn openai_defaults_to_public_endpoint() {
        let model = OpenAiChatModel::new(&config(LlmProvider::OpenAi, None)).unwrap();
        assert_eq!(model.url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn azure_url_names_deployment_and_version() {
        let model =
            OpenAiChatModel::new(&config(LlmProvider::Azure, Some("https://res.openai.azure.com/")))
                .unwrap();
        assert_eq!(
            model.url(),
            "https://res.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-01"
        );
    }

    #[test]
    fn azure_without_endpoint_is_rejected() {
        let result = OpenAiChatModel::new(&config(LlmProvider::Azure, None));
        assert!(matches!(result, Err(LesewerkError::Config(_))));
    }

    #[test]
    fn missing_key_is_rejected() {
        let mut cfg = config(LlmProvider::OpenAi, None);
        cfg.api_key = Some("   ".into());
        assert!(matches!(OpenAiChatModel::new(&cfg), Err(LesewerkError::Config(_))));
    }

    #[test]
    fn request_body_carries_settings() {
        let model = OpenAiChatModel::new(&config(LlmProvider::OpenAi, None)).unwrap();
        let settings = ModelSettings {
            temperature: 0.2,
            top_p: 0.9,
            max_tokens: 64,
        };
        let wire = vec![WireMessage {
            role: Role::System,
            content: WireContent::Text("be terse"),
        }];
        let body = serde_json::to_value(model.request(wire, &settings)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "be terse"}));
        assert_eq!(body["max_tokens"], 64);
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn image_parts_are_tagged() {
        let part = ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: "data:image/png;base64,AAAA".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(part).unwrap(),
            json!({"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}})
        );
    }
}
