//! Provider module for ChatLLM
//!
//! This module contains the completion backend abstraction, the closed set
//! of supported backends and the factory that builds them.

pub mod base;
pub mod openai;

pub use base::{
    CompletionResponse, ContentPart, MediaUrl, Message, MessageContent, Provider, Role,
    TokenUsage,
};
pub use openai::OpenAiCompatibleProvider;

use crate::config::BackendSettings;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported completion backends
///
/// All of them expose an OpenAI-compatible chat completions API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI ChatGPT
    #[serde(rename = "chatgpt")]
    ChatGpt,
    /// Moonshot Kimi
    Kimi,
    /// Anthropic Claude through an OpenAI-compatible gateway
    Claude,
}

impl BackendKind {
    /// Every supported backend, in registry order
    pub const ALL: [BackendKind; 3] = [Self::ChatGpt, Self::Kimi, Self::Claude];

    /// Name used in configuration and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatGpt => "chatgpt",
            Self::Kimi => "kimi",
            Self::Claude => "claude",
        }
    }

    /// Human readable name used in replies and picture cards
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ChatGpt => "ChatGPT",
            Self::Kimi => "Kimi",
            Self::Claude => "Claude",
        }
    }

    /// Base URL used when the configuration does not set one
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::ChatGpt => "https://api.openai.com/v1",
            Self::Kimi => "https://api.moonshot.cn/v1",
            Self::Claude => "https://api.anthropic.com/v1",
        }
    }

    /// Model name used when the configuration does not set one
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::ChatGpt => "gpt-3.5-turbo",
            Self::Kimi => "kimi",
            Self::Claude => "claude",
        }
    }

    /// Character budget used when the configuration does not set one
    pub fn default_max_context_length(&self) -> usize {
        match self {
            Self::ChatGpt => 4000,
            Self::Kimi | Self::Claude => 200_000,
        }
    }

    /// Accent color of the picture card
    pub fn default_logo_color(&self) -> &'static str {
        match self {
            Self::ChatGpt => "#10a37f",
            Self::Kimi => "blue",
            Self::Claude => "#cc9b7a",
        }
    }

    /// Prefix of the environment variables that configure this backend
    pub fn env_prefix(&self) -> String {
        format!("CHATLLM_{}", self.as_str().to_uppercase())
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown backend '{}'", s))
    }
}

/// Create a provider instance for resolved backend settings
///
/// # Errors
///
/// Returns error if provider initialization fails
pub fn create_provider(settings: &BackendSettings) -> Result<Box<dyn Provider>> {
    Ok(Box::new(OpenAiCompatibleProvider::new(settings)?))
}
