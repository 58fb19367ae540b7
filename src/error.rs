//! Error types for ChatLLM
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for ChatLLM operations
///
/// Backend, media and input failures are surfaced to the caller unchanged;
/// history truncation and pool operations never produce an error.
#[derive(Error, Debug)]
pub enum ChatllmError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The completion endpoint could not be reached, timed out, returned a
    /// non-success status, or answered with a body we could not interpret
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// No adapter is registered under the requested model name
    #[error("Unknown model: {name} (available: {available})")]
    UnknownModel {
        /// The model name that was requested
        name: String,
        /// Comma separated list of registered model names
        available: String,
    },

    /// The request carried neither text nor a usable attachment
    #[error("Empty input: a message or a supported attachment is required")]
    EmptyInput,

    /// Downloading or hashing an attachment failed
    #[error("Media fetch error: {0}")]
    MediaFetch(String),

    /// The chat command line could not be parsed
    #[error("Command error: {0}")]
    Command(String),

    /// Rendering a reply failed
    #[error("Render error: {0}")]
    Render(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for ChatLLM operations
///
/// Uses `anyhow::Error` so context can be attached while the original
/// `ChatllmError` stays recoverable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ChatllmError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_backend_unavailable_display() {
        let error = ChatllmError::BackendUnavailable("503 Service Unavailable".to_string());
        assert_eq!(
            error.to_string(),
            "Backend unavailable: 503 Service Unavailable"
        );
    }

    #[test]
    fn test_unknown_model_display() {
        let error = ChatllmError::UnknownModel {
            name: "gemini".to_string(),
            available: "chatgpt, kimi".to_string(),
        };
        let s = error.to_string();
        assert!(s.contains("gemini"));
        assert!(s.contains("chatgpt, kimi"));
    }

    #[test]
    fn test_empty_input_display() {
        let error = ChatllmError::EmptyInput;
        assert!(error.to_string().starts_with("Empty input"));
    }

    #[test]
    fn test_media_fetch_display() {
        let error = ChatllmError::MediaFetch("HTTP 404".to_string());
        assert_eq!(error.to_string(), "Media fetch error: HTTP 404");
    }

    #[test]
    fn test_command_error_display() {
        let error = ChatllmError::Command("unexpected argument".to_string());
        assert_eq!(error.to_string(), "Command error: unexpected argument");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ChatllmError = io_error.into();
        assert!(matches!(error, ChatllmError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: ChatllmError = json_error.into();
        assert!(matches!(error, ChatllmError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: ChatllmError = yaml_error.into();
        assert!(matches!(error, ChatllmError::Yaml(_)));
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let result: Result<()> = Err(ChatllmError::EmptyInput.into());
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatllmError>(),
            Some(ChatllmError::EmptyInput)
        ));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ChatllmError>();
    }
}
