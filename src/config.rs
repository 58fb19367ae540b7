//! Configuration management for ChatLLM
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! Every backend is configured with the same [`ModelConfig`] struct; the
//! per-backend defaults come from [`BackendKind`] and are merged in by
//! [`ModelConfig::resolve`].

use crate::error::{ChatllmError, Result};
use crate::providers::BackendKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure for ChatLLM
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Chat behavior shared by every backend
    #[serde(default)]
    pub chat: ChatConfig,

    /// Per-backend configuration
    #[serde(default)]
    pub models: ModelsConfig,
}

/// How incoming messages are grouped into conversations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// One conversation per user, across channels
    User,
    /// One conversation per channel, shared by its users
    #[default]
    Channel,
    /// One conversation per user within each channel
    Both,
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Channel => write!(f, "channel"),
            Self::Both => write!(f, "both"),
        }
    }
}

impl FromStr for InteractionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "channel" => Ok(Self::Channel),
            "both" => Ok(Self::Both),
            other => Err(format!("invalid interaction mode '{}'", other)),
        }
    }
}

/// Chat behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// How session keys are derived
    #[serde(default)]
    pub interaction: InteractionMode,

    /// Backend used when a message does not name one
    #[serde(default = "default_model_name")]
    pub default_model: String,

    /// Number of recent turns carried over by `--continue`
    #[serde(default = "default_continue_turns")]
    pub continue_turns: usize,

    /// Timeout for a single completion request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Interval of the idle-history sweep, 0 disables it
    #[serde(default)]
    pub sweep_interval_seconds: u64,
}

fn default_model_name() -> String {
    BackendKind::ChatGpt.as_str().to_string()
}

fn default_continue_turns() -> usize {
    10
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            interaction: InteractionMode::default(),
            default_model: default_model_name(),
            continue_turns: default_continue_turns(),
            request_timeout_seconds: default_request_timeout(),
            sweep_interval_seconds: 0,
        }
    }
}

/// Configuration blocks for each supported backend
///
/// A backend is enabled by giving it a block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// ChatGPT backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chatgpt: Option<ModelConfig>,

    /// Kimi backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kimi: Option<ModelConfig>,

    /// Claude backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude: Option<ModelConfig>,
}

impl ModelsConfig {
    /// Configuration block of `kind`, if the backend is enabled
    pub fn get(&self, kind: BackendKind) -> Option<&ModelConfig> {
        match kind {
            BackendKind::ChatGpt => self.chatgpt.as_ref(),
            BackendKind::Kimi => self.kimi.as_ref(),
            BackendKind::Claude => self.claude.as_ref(),
        }
    }

    /// Configuration block of `kind`, created with defaults when absent
    pub fn entry(&mut self, kind: BackendKind) -> &mut ModelConfig {
        let slot = match kind {
            BackendKind::ChatGpt => &mut self.chatgpt,
            BackendKind::Kimi => &mut self.kimi,
            BackendKind::Claude => &mut self.claude,
        };
        slot.get_or_insert_with(ModelConfig::default)
    }

    /// Enabled backends in registry order
    pub fn configured(&self) -> Vec<(BackendKind, &ModelConfig)> {
        BackendKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|config| (kind, config)))
            .collect()
    }
}

/// Optional sampling parameters forwarded to the backend
///
/// Unset values are left out of the request so the backend's own
/// defaults apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Sampling temperature, 0.0 to 2.0
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Nucleus sampling mass, 0.0 to 1.0
    #[serde(default)]
    pub top_p: Option<f32>,

    /// Maximum tokens in the completion
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Frequency penalty, -2.0 to 2.0
    #[serde(default)]
    pub frequency_penalty: Option<f32>,

    /// Presence penalty, -2.0 to 2.0
    #[serde(default)]
    pub presence_penalty: Option<f32>,
}

/// Picture card appearance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PictureConfig {
    /// Logo image URL
    #[serde(default)]
    pub logo: Option<String>,

    /// Accent color, defaults to the backend's brand color
    #[serde(default)]
    pub logo_color: Option<String>,
}

/// Configuration of one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API key sent as a bearer token
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the OpenAI-compatible API
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Model name sent with each request
    #[serde(default)]
    pub model: Option<String>,

    /// Character budget for the history sent with each request
    #[serde(default)]
    pub max_context_length: Option<usize>,

    /// Idle time in milliseconds after which a conversation is cleared
    #[serde(default = "default_forget_time_ms")]
    pub forget_time_ms: u64,

    /// Stop sequences passed verbatim to the backend
    #[serde(default)]
    pub stop: Vec<String>,

    /// Send image attachments as image parts
    #[serde(default)]
    pub parse_images: bool,

    /// Send file attachments as file parts
    #[serde(default)]
    pub parse_files: bool,

    /// Sampling parameters
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Picture card appearance
    #[serde(default)]
    pub picture: PictureConfig,
}

fn default_forget_time_ms() -> u64 {
    3_600_000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: None,
            model: None,
            max_context_length: None,
            forget_time_ms: default_forget_time_ms(),
            stop: Vec::new(),
            parse_images: false,
            parse_files: false,
            sampling: SamplingConfig::default(),
            picture: PictureConfig::default(),
        }
    }
}

/// Fully resolved settings of one backend
///
/// Produced by [`ModelConfig::resolve`]; every optional field has been
/// filled from the backend's defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSettings {
    /// Which backend these settings belong to
    pub kind: BackendKind,
    /// API key
    pub api_key: String,
    /// Base URL of the API
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Character budget for outgoing history
    pub max_context_length: usize,
    /// Forget time in milliseconds
    pub forget_time_ms: u64,
    /// Stop sequences
    pub stop: Vec<String>,
    /// Send images as image parts
    pub parse_images: bool,
    /// Send files as file parts
    pub parse_files: bool,
    /// Sampling parameters
    pub sampling: SamplingConfig,
    /// Picture card logo
    pub logo: Option<String>,
    /// Picture card accent color
    pub logo_color: String,
    /// Request timeout
    pub request_timeout: Duration,
}

impl ModelConfig {
    /// Default configuration carrying only an API key
    ///
    /// # Examples
    ///
    /// ```
    /// use chatllm::config::ModelConfig;
    ///
    /// let config = ModelConfig::with_api_key("sk-test");
    /// assert_eq!(config.forget_time_ms, 3_600_000);
    /// ```
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Merges this block with the defaults of `kind`
    ///
    /// # Examples
    ///
    /// ```
    /// use chatllm::config::ModelConfig;
    /// use chatllm::providers::BackendKind;
    ///
    /// let settings = ModelConfig::with_api_key("sk").resolve(BackendKind::Kimi, 60);
    /// assert_eq!(settings.endpoint, "https://api.moonshot.cn/v1");
    /// assert_eq!(settings.max_context_length, 200_000);
    /// assert_eq!(settings.logo_color, "blue");
    /// ```
    pub fn resolve(&self, kind: BackendKind, request_timeout_seconds: u64) -> BackendSettings {
        BackendSettings {
            kind,
            api_key: self.api_key.clone(),
            endpoint: self
                .endpoint
                .clone()
                .unwrap_or_else(|| kind.default_endpoint().to_string()),
            model: self
                .model
                .clone()
                .unwrap_or_else(|| kind.default_model().to_string()),
            max_context_length: self
                .max_context_length
                .unwrap_or_else(|| kind.default_max_context_length()),
            forget_time_ms: self.forget_time_ms,
            stop: self.stop.clone(),
            parse_images: self.parse_images,
            parse_files: self.parse_files,
            sampling: self.sampling.clone(),
            logo: self.picture.logo.clone(),
            logo_color: self
                .picture
                .logo_color
                .clone()
                .unwrap_or_else(|| kind.default_logo_color().to_string()),
            request_timeout: Duration::from_secs(request_timeout_seconds),
        }
    }

    fn validate(&self, kind: BackendKind) -> Result<()> {
        let name = kind.as_str();

        if self.api_key.trim().is_empty() {
            return Err(
                ChatllmError::Config(format!("models.{}.api_key cannot be empty", name)).into(),
            );
        }

        if let Some(endpoint) = &self.endpoint {
            let parsed = url::Url::parse(endpoint).map_err(|e| {
                ChatllmError::Config(format!(
                    "models.{}.endpoint is not a valid URL ({}): {}",
                    name, e, endpoint
                ))
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ChatllmError::Config(format!(
                    "models.{}.endpoint must use http or https: {}",
                    name, endpoint
                ))
                .into());
            }
        }

        if self.max_context_length == Some(0) {
            return Err(ChatllmError::Config(format!(
                "models.{}.max_context_length must be greater than 0",
                name
            ))
            .into());
        }

        if self.forget_time_ms == 0 {
            return Err(ChatllmError::Config(format!(
                "models.{}.forget_time_ms must be greater than 0",
                name
            ))
            .into());
        }

        check_range(name, "temperature", self.sampling.temperature, 0.0, 2.0)?;
        check_range(name, "top_p", self.sampling.top_p, 0.0, 1.0)?;
        check_range(
            name,
            "frequency_penalty",
            self.sampling.frequency_penalty,
            -2.0,
            2.0,
        )?;
        check_range(
            name,
            "presence_penalty",
            self.sampling.presence_penalty,
            -2.0,
            2.0,
        )?;

        Ok(())
    }
}

fn check_range(model: &str, field: &str, value: Option<f32>, min: f32, max: f32) -> Result<()> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(ChatllmError::Config(format!(
            "models.{}.sampling.{} must be between {} and {}",
            model, field, min, max
        ))
        .into()),
        _ => Ok(()),
    }
}

impl Config {
    /// Load configuration from file, environment, and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed command line
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatllmError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| ChatllmError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(mode) = std::env::var("CHATLLM_INTERACTION") {
            match mode.parse() {
                Ok(value) => self.chat.interaction = value,
                Err(_) => tracing::warn!("Invalid CHATLLM_INTERACTION: {}", mode),
            }
        }

        if let Ok(model) = std::env::var("CHATLLM_DEFAULT_MODEL") {
            self.chat.default_model = model;
        }

        if let Ok(timeout) = std::env::var("CHATLLM_REQUEST_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.chat.request_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid CHATLLM_REQUEST_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        for kind in BackendKind::ALL {
            let prefix = kind.env_prefix();

            if let Ok(api_key) = std::env::var(format!("{}_API_KEY", prefix)) {
                self.models.entry(kind).api_key = api_key;
            }

            if let Ok(endpoint) = std::env::var(format!("{}_ENDPOINT", prefix)) {
                self.models.entry(kind).endpoint = Some(endpoint);
            }

            if let Ok(model) = std::env::var(format!("{}_MODEL", prefix)) {
                self.models.entry(kind).model = Some(model);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(model) = cli.model_override() {
            self.chat.default_model = model.to_string();
        }
    }

    /// Resolved settings of every enabled backend
    pub fn backends(&self) -> Vec<BackendSettings> {
        self.models
            .configured()
            .into_iter()
            .map(|(kind, model)| model.resolve(kind, self.chat.request_timeout_seconds))
            .collect()
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let configured = self.models.configured();
        if configured.is_empty() {
            return Err(ChatllmError::Config(
                "At least one backend must be configured under models".to_string(),
            )
            .into());
        }

        let default_kind: BackendKind = self.chat.default_model.parse().map_err(|_| {
            ChatllmError::Config(format!(
                "Invalid default_model: {}. Must be one of: {}",
                self.chat.default_model,
                BackendKind::ALL.map(|k| k.as_str()).join(", ")
            ))
        })?;

        if self.models.get(default_kind).is_none() {
            return Err(ChatllmError::Config(format!(
                "default_model {} has no configuration block",
                default_kind
            ))
            .into());
        }

        if self.chat.continue_turns == 0 {
            return Err(ChatllmError::Config(
                "continue_turns must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.request_timeout_seconds == 0 {
            return Err(ChatllmError::Config(
                "request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        for (kind, model) in configured {
            model.validate(kind)?;
        }

        Ok(())
    }
}
