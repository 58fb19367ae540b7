//! Test utilities for ChatLLM
//!
//! In-process providers, ready-made configuration and assertion helpers
//! shared by the unit tests.

use crate::config::{BackendSettings, Config, ModelConfig};
use crate::error::{ChatllmError, Result};
use crate::providers::{BackendKind, CompletionResponse, Message, Provider};
use async_trait::async_trait;
use std::sync::Mutex;

/// Provider that always replies with the same text
pub struct StaticProvider {
    reply: String,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl StaticProvider {
    /// Create a provider replying with `reply`
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Messages of every request received so far
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Provider for StaticProvider {
    async fn complete(&self, messages: &[Message]) -> Result<CompletionResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        Ok(CompletionResponse::new(Message::assistant(self.reply.clone())))
    }
}

/// Provider whose every call fails with `BackendUnavailable`
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    async fn complete(&self, _messages: &[Message]) -> Result<CompletionResponse> {
        Err(ChatllmError::BackendUnavailable("backend is down".to_string()).into())
    }
}

/// Resolved settings for `kind` with a dummy key
pub fn test_settings(kind: BackendKind) -> BackendSettings {
    ModelConfig::with_api_key("sk-test").resolve(kind, 30)
}

/// Valid configuration with every backend enabled
pub fn test_config() -> Config {
    let mut config = Config::default();
    for kind in BackendKind::ALL {
        *config.models.entry(kind) = ModelConfig::with_api_key("sk-test");
    }
    config
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: Result<T>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_records_requests() {
        let provider = StaticProvider::new("hi");
        let response = provider.complete(&[Message::user("a")]).await.unwrap();
        assert_eq!(response.message.text(), "hi");
        assert_eq!(provider.requests(), vec![vec![Message::user("a")]]);
    }

    #[tokio::test]
    async fn test_failing_provider() {
        assert_error_contains(
            FailingProvider.complete(&[]).await,
            "Backend unavailable",
        );
    }

    #[test]
    fn test_test_config_is_valid() {
        let config = test_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.backends().len(), 3);
    }

    #[test]
    fn test_test_settings() {
        assert_eq!(test_settings(BackendKind::Claude).model, "claude");
    }

    #[test]
    #[should_panic(expected = "does not contain")]
    fn test_assert_error_contains_wrong_message() {
        let result: Result<()> = Err(ChatllmError::Config("different".to_string()).into());
        assert_error_contains(result, "not present");
    }
}
