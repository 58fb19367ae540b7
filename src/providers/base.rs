//! Base provider trait and common types for ChatLLM
//!
//! This module defines the Provider trait that every completion backend
//! implements, along with the normalized message types that flow through
//! the history pool and into backend requests.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of the message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A message written by the chat user
    User,
    /// A reply produced by the backend
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// URL wrapper used by the multimodal content parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUrl {
    /// Location of the referenced image or document
    pub url: String,
}

/// One typed part of a multimodal message
///
/// Serializes to the OpenAI-compatible shape, e.g.
/// `{"type":"image_url","image_url":{"url":"..."}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text
    Text {
        /// The text itself
        text: String,
    },
    /// Reference to an image
    ImageUrl {
        /// Image location
        image_url: MediaUrl,
    },
    /// Reference to a document
    FileUrl {
        /// Document location
        file_url: MediaUrl,
    },
}

/// Content of a message: either a plain string or an ordered list of parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain UTF-8 text
    Text(String),
    /// Multimodal content
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Returns the text carried by this content
    ///
    /// For multimodal content only the text parts are joined; image and
    /// file references contribute nothing.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    pub content: MessageContent,
}

impl Message {
    /// Creates a new plain-text user message
    ///
    /// # Examples
    ///
    /// ```
    /// use chatllm::providers::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Creates a new assistant message
    ///
    /// # Examples
    ///
    /// ```
    /// use chatllm::providers::{Message, Role};
    ///
    /// let msg = Message::assistant("Hello, user!");
    /// assert_eq!(msg.role, Role::Assistant);
    /// ```
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Creates a user message with image parts followed by one text part
    ///
    /// # Examples
    ///
    /// ```
    /// use chatllm::providers::{ContentPart, Message, MessageContent};
    ///
    /// let msg = Message::user_with_images(vec!["https://a/b.png".to_string()], "what is this?");
    /// let MessageContent::Parts(parts) = &msg.content else { panic!() };
    /// assert!(matches!(parts[0], ContentPart::ImageUrl { .. }));
    /// assert!(matches!(parts[1], ContentPart::Text { .. }));
    /// ```
    pub fn user_with_images(images: Vec<String>, text: impl Into<String>) -> Self {
        let mut parts: Vec<ContentPart> = images
            .into_iter()
            .map(|url| ContentPart::ImageUrl {
                image_url: MediaUrl { url },
            })
            .collect();
        parts.push(ContentPart::Text { text: text.into() });
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }

    /// Creates a user message with file parts followed by one text part
    pub fn user_with_files(files: Vec<String>, text: impl Into<String>) -> Self {
        let mut parts: Vec<ContentPart> = files
            .into_iter()
            .map(|url| ContentPart::FileUrl {
                file_url: MediaUrl { url },
            })
            .collect();
        parts.push(ContentPart::Text { text: text.into() });
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }

    /// Length of this message for context budgeting
    ///
    /// Counts characters, not tokens. Multimodal messages only count their
    /// text parts.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatllm::providers::Message;
    ///
    /// assert_eq!(Message::user("héllo").content_length(), 5);
    /// let msg = Message::user_with_images(vec!["https://x/y.png".to_string()], "hi");
    /// assert_eq!(msg.content_length(), 2);
    /// ```
    pub fn content_length(&self) -> usize {
        match &self.content {
            MessageContent::Text(text) => text.chars().count(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => text.chars().count(),
                    _ => 0,
                })
                .sum(),
        }
    }

    /// Returns the text of this message (text parts only for multimodal content)
    pub fn text(&self) -> String {
        self.content.text()
    }
}

/// Token usage information from a completion
///
/// Reported by the backend when available; used for logging and metrics
/// only, never for context budgeting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub prompt_tokens: usize,
    /// Number of tokens in the completion
    pub completion_tokens: usize,
    /// Total tokens used (prompt + completion)
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Create a new TokenUsage instance
    ///
    /// # Examples
    ///
    /// ```
    /// use chatllm::providers::TokenUsage;
    ///
    /// let usage = TokenUsage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Completion response with the reply text and optional token usage
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The reply message from the backend
    pub message: Message,
    /// Optional token usage information
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    /// Create a new CompletionResponse
    pub fn new(message: Message) -> Self {
        Self {
            message,
            usage: None,
        }
    }

    /// Create a new CompletionResponse with token usage
    pub fn with_usage(message: Message, usage: TokenUsage) -> Self {
        Self {
            message,
            usage: Some(usage),
        }
    }
}

/// Provider trait for completion backends
///
/// A provider is stateless with respect to conversations: it receives the
/// already truncated message list and returns the top completion.
///
/// # Examples
///
/// ```no_run
/// use chatllm::providers::{Provider, Message, CompletionResponse};
/// use chatllm::error::Result;
/// use async_trait::async_trait;
///
/// struct EchoProvider;
///
/// #[async_trait]
/// impl Provider for EchoProvider {
///     async fn complete(&self, messages: &[Message]) -> Result<CompletionResponse> {
///         let last = messages.last().map(|m| m.text()).unwrap_or_default();
///         Ok(CompletionResponse::new(Message::assistant(last)))
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Completes a conversation with the given messages
    ///
    /// # Errors
    ///
    /// Returns `ChatllmError::BackendUnavailable` if the call fails or the
    /// response cannot be interpreted
    async fn complete(&self, messages: &[Message]) -> Result<CompletionResponse>;

    /// Get the name of the model this provider sends requests to
    ///
    /// The default implementation returns an error.
    fn get_current_model(&self) -> Result<String> {
        Err(crate::error::ChatllmError::Config(
            "Current model information is not available from this provider".to_string(),
        )
        .into())
    }
}
