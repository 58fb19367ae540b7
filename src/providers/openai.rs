//! OpenAI-compatible provider implementation for ChatLLM
//!
//! Every supported backend speaks the `/chat/completions` dialect, so a
//! single provider type covers all of them; only the endpoint, key, model
//! and sampling parameters differ.

use crate::config::{BackendSettings, SamplingConfig};
use crate::error::{ChatllmError, Result};
use crate::providers::{CompletionResponse, Message, Provider, TokenUsage};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible chat completions provider
///
/// # Examples
///
/// ```no_run
/// use chatllm::config::ModelConfig;
/// use chatllm::providers::{BackendKind, Message, OpenAiCompatibleProvider, Provider};
///
/// # async fn example() -> chatllm::error::Result<()> {
/// let settings = ModelConfig::with_api_key("sk-test").resolve(BackendKind::ChatGpt, 120);
/// let provider = OpenAiCompatibleProvider::new(&settings)?;
/// let completion = provider.complete(&[Message::user("Hello!")]).await?;
/// println!("{}", completion.message.text());
/// # Ok(())
/// # }
/// ```
pub struct OpenAiCompatibleProvider {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    sampling: SamplingConfig,
    stop: Vec<String>,
}

/// Request body for `/chat/completions`
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

/// Response body from `/chat/completions`
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider from resolved backend settings
    ///
    /// The HTTP client enforces the configured request timeout; an expired
    /// timeout surfaces as `ChatllmError::BackendUnavailable`.
    ///
    /// # Errors
    ///
    /// Returns `ChatllmError::Config` if the HTTP client cannot be built
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(concat!("chatllm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChatllmError::Config(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized {} provider: endpoint={}, model={}",
            settings.kind.display_name(),
            settings.endpoint,
            settings.model
        );

        Ok(Self {
            client,
            url: format!("{}/chat/completions", settings.endpoint.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            sampling: settings.sampling.clone(),
            stop: settings.stop.clone(),
        })
    }

    /// Full URL requests are posted to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Model name sent with each request
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(&'a self, messages: &'a [Message]) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.sampling.temperature,
            top_p: self.sampling.top_p,
            max_tokens: self.sampling.max_tokens,
            frequency_penalty: self.sampling.frequency_penalty,
            presence_penalty: self.sampling.presence_penalty,
            stop: &self.stop,
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn complete(&self, messages: &[Message]) -> Result<CompletionResponse> {
        let request = self.build_request(messages);

        tracing::debug!(
            "Sending completion request: model={}, {} messages",
            self.model,
            messages.len()
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Completion request failed: {}", e);
                let reason = if e.is_timeout() {
                    format!("request timed out: {}", e)
                } else {
                    format!("request failed: {}", e)
                };
                ChatllmError::BackendUnavailable(reason)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Backend returned error {}: {}", status, error_text);
            return Err(ChatllmError::BackendUnavailable(format!(
                "backend returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse completion response: {}", e);
            ChatllmError::BackendUnavailable(format!("failed to parse response: {}", e))
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                tracing::error!("Completion response carried no message content");
                ChatllmError::BackendUnavailable(
                    "response carried no completion content".to_string(),
                )
            })?;

        let message = Message::assistant(content);
        let response = match body.usage {
            Some(usage) => {
                tracing::debug!(
                    "Completion usage: prompt_tokens={}, completion_tokens={}",
                    usage.prompt_tokens,
                    usage.completion_tokens
                );
                CompletionResponse::with_usage(
                    message,
                    TokenUsage::new(usage.prompt_tokens, usage.completion_tokens),
                )
            }
            None => CompletionResponse::new(message),
        };

        Ok(response)
    }

    fn get_current_model(&self) -> Result<String> {
        Ok(self.model.clone())
    }
}
