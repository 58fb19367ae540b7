//! Model adapter: one backend plus its conversation histories
//!
//! The adapter owns a [`HistoryPool`] and drives a single request through
//! the full sequence:
//! - Lock the conversation's entry for the whole request
//! - Build the working history (stored turns, carried-over turns, new turn)
//!   where the carried-over turns belong to this request only
//! - Truncate it to the backend's character budget
//! - Call the backend
//! - On success only, apply the forget-time rule and persist the turn pair
//!
//! A failed or cancelled request leaves the stored history exactly as it
//! was.

use crate::agent::metrics::RequestMetrics;
use crate::config::BackendSettings;
use crate::error::{ChatllmError, Result};
use crate::history::{truncate_with_stats, HistoryPool};
use crate::providers::{create_provider, BackendKind, Message, Provider, TokenUsage};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A message to send to a backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    /// Conversation the message belongs to
    pub conversation_id: String,
    /// Message text
    pub text: String,
    /// Image URLs attached to the message
    pub images: Vec<String>,
    /// Document URLs attached to the message
    pub files: Vec<String>,
    /// Turns carried over from another backend, sent after the stored history
    /// for this request only
    pub prior_history: Option<Vec<Message>>,
}

impl ChatRequest {
    /// Creates a text-only request
    ///
    /// # Examples
    ///
    /// ```
    /// use chatllm::agent::ChatRequest;
    ///
    /// let request = ChatRequest::new("conv-1", "hello")
    ///     .with_images(vec!["https://example.com/cat.png".to_string()]);
    /// assert_eq!(request.images.len(), 1);
    /// ```
    pub fn new(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// Attaches image URLs
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    /// Attaches document URLs
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    /// Sets the turns carried over from another backend
    pub fn with_prior_history(mut self, prior_history: Vec<Message>) -> Self {
        self.prior_history = Some(prior_history);
        self
    }
}

/// Reply produced by a backend
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    /// Conversation the reply belongs to
    pub conversation_id: String,
    /// Reply text
    pub reply: String,
    /// Token usage reported by the backend
    pub usage: Option<TokenUsage>,
}

/// A backend together with the histories of its conversations
///
/// # Examples
///
/// ```no_run
/// use chatllm::agent::{ChatRequest, ModelAdapter};
/// use chatllm::config::ModelConfig;
/// use chatllm::providers::BackendKind;
///
/// # async fn example() -> chatllm::error::Result<()> {
/// let settings = ModelConfig::with_api_key("sk-test").resolve(BackendKind::ChatGpt, 120);
/// let adapter = ModelAdapter::new(settings)?;
/// let reply = adapter.generate_response(ChatRequest::new("conv-1", "Hello!")).await?;
/// println!("{}", reply.reply);
/// # Ok(())
/// # }
/// ```
pub struct ModelAdapter {
    settings: BackendSettings,
    provider: Arc<dyn Provider>,
    pool: HistoryPool,
}

impl fmt::Debug for ModelAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("kind", &self.kind())
            .field("model", &self.model_name())
            .finish_non_exhaustive()
    }
}

impl ModelAdapter {
    /// Creates an adapter backed by the OpenAI-compatible provider
    ///
    /// # Errors
    ///
    /// Returns error if the provider cannot be created
    pub fn new(settings: BackendSettings) -> Result<Self> {
        let provider: Arc<dyn Provider> = Arc::from(create_provider(&settings)?);
        Ok(Self::with_provider(settings, provider))
    }

    /// Creates an adapter around an existing provider
    pub fn with_provider(settings: BackendSettings, provider: Arc<dyn Provider>) -> Self {
        let pool = HistoryPool::new(settings.forget_time_ms);
        Self {
            settings,
            provider,
            pool,
        }
    }

    /// Which backend this adapter talks to
    pub fn kind(&self) -> BackendKind {
        self.settings.kind
    }

    /// Resolved backend settings
    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    /// Model name sent with each request
    pub fn model_name(&self) -> &str {
        &self.settings.model
    }

    /// The adapter's history pool
    pub fn pool(&self) -> &HistoryPool {
        &self.pool
    }

    /// Encodes the new user turn
    ///
    /// Images win over files; either is only used when the matching parse
    /// flag is enabled. Without any usable attachment the turn is plain
    /// text.
    ///
    /// # Errors
    ///
    /// Returns `ChatllmError::EmptyInput` when there is neither text nor a
    /// usable attachment
    pub fn build_user_message(&self, request: &ChatRequest) -> Result<Message> {
        let use_images = self.settings.parse_images && !request.images.is_empty();
        let use_files = !use_images && self.settings.parse_files && !request.files.is_empty();

        if request.text.trim().is_empty() && !use_images && !use_files {
            return Err(ChatllmError::EmptyInput.into());
        }

        let message = if use_images {
            Message::user_with_images(request.images.clone(), request.text.clone())
        } else if use_files {
            Message::user_with_files(request.files.clone(), request.text.clone())
        } else {
            Message::user(request.text.clone())
        };
        Ok(message)
    }

    /// Sends one message and records the exchange
    ///
    /// Requests on the same conversation id run one at a time; requests on
    /// different ids do not wait for each other.
    ///
    /// # Errors
    ///
    /// Returns `ChatllmError::EmptyInput` for an empty request and
    /// `ChatllmError::BackendUnavailable` when the backend call fails. In
    /// both cases the stored history is unchanged.
    pub async fn generate_response(&self, request: ChatRequest) -> Result<ChatReply> {
        let user_message = self.build_user_message(&request)?;
        let conversation_id = request.conversation_id;
        let prior = request.prior_history.unwrap_or_default();

        let entry = self.pool.get_or_create(&conversation_id);
        let mut guard = entry.lock().await;

        let now = Utc::now();
        let expired = guard.would_forget(now, self.pool.forget_time_ms());
        let stored: &[Message] = if expired { &[] } else { &guard.history };

        // The carried-over turns are the session's latest exchange, so they
        // follow this backend's own turns.
        let mut working = Vec::with_capacity(stored.len() + prior.len() + 1);
        working.extend(stored.iter().cloned());
        working.extend(prior);
        working.push(user_message.clone());

        let (messages, stats) = truncate_with_stats(&working, self.settings.max_context_length);
        debug!(
            conversation_id = %conversation_id,
            model = %self.kind(),
            total_turns = stats.total_turns,
            kept_turns = stats.kept_turns,
            kept_length = stats.kept_length,
            "Truncated history"
        );

        let metrics = RequestMetrics::new(self.kind().as_str());
        let completion = match self.provider.complete(&messages).await {
            Ok(completion) => completion,
            Err(e) => {
                metrics.record_error(error_label(&e));
                error!(
                    conversation_id = %conversation_id,
                    model = %self.kind(),
                    "Completion failed: {}",
                    e
                );
                return Err(e);
            }
        };

        if self.pool.touch(&mut guard, now) {
            warn!(
                conversation_id = %conversation_id,
                model = %self.kind(),
                "Conversation idle past forget time, history cleared"
            );
        }
        let reply = completion.message.text();
        guard.append(user_message);
        guard.append(Message::assistant(reply.clone()));

        metrics.record_completion(messages.len(), completion.usage.map(|u| u.prompt_tokens));
        info!(
            conversation_id = %conversation_id,
            model = %self.kind(),
            stored_turns = guard.len(),
            "Completion received"
        );

        Ok(ChatReply {
            conversation_id,
            reply,
            usage: completion.usage,
        })
    }

    /// Stored turns of a conversation, empty if unknown
    pub async fn history(&self, conversation_id: &str) -> Vec<Message> {
        self.pool
            .snapshot(conversation_id)
            .await
            .unwrap_or_default()
    }

    /// The last `turns` stored turns of a conversation
    pub async fn recent_history(&self, conversation_id: &str, turns: usize) -> Vec<Message> {
        let mut history = self.history(conversation_id).await;
        let start = history.len().saturating_sub(turns);
        history.split_off(start)
    }

    /// Removes a conversation from this adapter's pool
    pub fn forget(&self, conversation_id: &str) -> bool {
        self.pool.forget(conversation_id)
    }

    /// Removes idle conversations from this adapter's pool
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        self.pool.sweep_idle(now)
    }
}

/// Short metrics label for an error
fn error_label(error: &anyhow::Error) -> &'static str {
    match error.downcast_ref::<ChatllmError>() {
        Some(ChatllmError::BackendUnavailable(_)) => "backend_unavailable",
        Some(ChatllmError::Http(_)) => "http",
        Some(ChatllmError::Serialization(_)) => "serialization",
        Some(_) => "other",
        None => "unknown",
    }
}
