//! Chat message handling
//!
//! [`ChatHandler`] is what a chat platform integration talks to: it takes
//! an incoming message, works out which conversation and backend it belongs
//! to, runs it through the model adapter and renders the reply.

use crate::agent::session::LastChatSnapshot;
use crate::agent::{ChatRequest, ModelAdapter, ModelRegistry, SessionRouter};
use crate::commands::chat_command::ChatCommand;
use crate::config::Config;
use crate::error::{ChatllmError, Result};
use crate::media::{extract_files, extract_images, MediaFetcher};
use crate::providers::Message;
use crate::render::{spacing, HtmlCardRenderer, Renderer, ReplyCard, TextRenderer};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Reply to a reset request
pub const RESET_SUCCESS: &str = "Conversation has been reset.";
/// Shown while waiting for the backend
pub const LOADING: &str = "Thinking...";
/// Asks for a message when only flags were given
pub const EXPECT_PROMPT: &str = "Please enter your message.";
/// Shown for failures that are not the user's doing
pub const UNKNOWN_ERROR: &str = "Something went wrong while generating a reply. Please try again later.";

/// Platform whose image URLs are rewritten to stable content-addressed ones
const QQ_PLATFORM: &str = "qq";

/// A message received from a chat platform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Platform name, e.g. "qq" or "discord"
    pub platform: String,
    /// Channel the message was posted in
    pub channel_id: String,
    /// Author of the message
    pub user_id: String,
    /// Raw message text, including any command flags
    pub text: String,
    /// Image URLs attached by the platform
    pub images: Vec<String>,
    /// Document URLs attached by the platform
    pub files: Vec<String>,
}

impl IncomingMessage {
    /// Text message from `user_id` in `channel_id`
    pub fn new(
        platform: impl Into<String>,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Routes chat messages to backends and renders their replies
pub struct ChatHandler {
    registry: Arc<ModelRegistry>,
    router: SessionRouter,
    fetcher: Option<MediaFetcher>,
    continue_turns: usize,
}

impl ChatHandler {
    /// Creates a handler over an existing registry and router
    pub fn new(registry: Arc<ModelRegistry>, router: SessionRouter, continue_turns: usize) -> Self {
        Self {
            registry,
            router,
            fetcher: None,
            continue_turns,
        }
    }

    /// Builds the registry, router and media fetcher from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Arc::new(ModelRegistry::from_config(config)?);
        let router = SessionRouter::new(config.chat.interaction);
        let fetcher =
            MediaFetcher::new(Duration::from_secs(config.chat.request_timeout_seconds))?;
        Ok(Self::new(registry, router, config.chat.continue_turns).with_media_fetcher(fetcher))
    }

    /// Enables downloading attachments for platforms that need it
    pub fn with_media_fetcher(mut self, fetcher: MediaFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// The adapter registry
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// The session router
    pub fn router(&self) -> &SessionRouter {
        &self.router
    }

    /// Parses and handles a raw chat message
    ///
    /// # Errors
    ///
    /// See [`ChatHandler::handle_command`]; additionally returns
    /// `ChatllmError::Command` if the flags cannot be parsed
    pub async fn handle(&self, message: &IncomingMessage) -> Result<String> {
        let command = ChatCommand::parse_input(&message.text)?;
        self.handle_command(message, &command).await
    }

    /// Handles an already parsed chat command
    ///
    /// The message's own `text` is ignored in favor of `command.text`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownModel`, `EmptyInput`, `MediaFetch`,
    /// `BackendUnavailable` or `Render` errors unchanged
    pub async fn handle_command(
        &self,
        message: &IncomingMessage,
        command: &ChatCommand,
    ) -> Result<String> {
        let key = self
            .router
            .key(&message.platform, &message.channel_id, &message.user_id);

        if command.reset {
            if let Some(conversation_id) = self.router.reset(&key) {
                let removed = self.registry.forget_all(&conversation_id);
                tracing::info!(session = %key, %conversation_id, removed, "Conversation reset");
            }
            return Ok(RESET_SUCCESS.to_string());
        }

        let adapter = match &command.model {
            Some(name) => self.registry.get(name)?,
            None => self.registry.default_adapter()?,
        };

        if command.version {
            return Ok(format!(
                "{} ({})",
                adapter.kind().display_name(),
                adapter.model_name()
            ));
        }

        let request = self.build_request(&key, message, command, &adapter).await?;
        let conversation_id = request.conversation_id.clone();

        let reply = adapter.generate_response(request).await?;

        let turns = adapter
            .recent_history(&conversation_id, self.continue_turns)
            .await;
        self.router.commit(
            &key,
            &conversation_id,
            LastChatSnapshot {
                model: adapter.kind(),
                turns,
            },
        );

        let card = ReplyCard {
            title: adapter.kind().display_name().to_string(),
            subtitle: Some(adapter.model_name().to_string()),
            logo: adapter.settings().logo.clone(),
            logo_color: adapter.settings().logo_color.clone(),
            body: spacing(&reply.reply),
        };

        if command.picture {
            HtmlCardRenderer.render(&card)
        } else {
            TextRenderer.render(&card)
        }
    }

    async fn build_request(
        &self,
        key: &str,
        message: &IncomingMessage,
        command: &ChatCommand,
        adapter: &ModelAdapter,
    ) -> Result<ChatRequest> {
        let mut images = unique(
            message
                .images
                .iter()
                .cloned()
                .chain(extract_images(&command.text)),
        );
        let files = unique(
            message
                .files
                .iter()
                .cloned()
                .chain(extract_files(&command.text)),
        );

        if message.platform.eq_ignore_ascii_case(QQ_PLATFORM)
            && adapter.settings().parse_images
            && !images.is_empty()
        {
            if let Some(fetcher) = &self.fetcher {
                images = fetcher.stable_qq_urls(&images).await?;
            }
        }

        let conversation_id = self.router.resolve(key);
        let mut request = ChatRequest::new(conversation_id, command.text.clone())
            .with_images(images)
            .with_files(files);

        if command.continue_chat {
            if let Some(prior) = self.continuation(key, adapter) {
                tracing::debug!(session = key, turns = prior.len(), "Continuing from another model");
                request = request.with_prior_history(prior);
            }
        }

        Ok(request)
    }

    /// Turns of the session's last exchange, when it came from another model
    fn continuation(&self, key: &str, adapter: &ModelAdapter) -> Option<Vec<Message>> {
        self.router
            .last_chat(key)
            .filter(|snapshot| snapshot.model != adapter.kind() && !snapshot.turns.is_empty())
            .map(|snapshot| snapshot.turns)
    }

    /// Stored turns of the conversation `message` belongs to, for `model`
    ///
    /// # Errors
    ///
    /// Returns `ChatllmError::UnknownModel` for an unregistered model name
    pub async fn current_history(
        &self,
        message: &IncomingMessage,
        model: Option<&str>,
    ) -> Result<Vec<Message>> {
        let key = self
            .router
            .key(&message.platform, &message.channel_id, &message.user_id);
        let adapter = match model {
            Some(name) => self.registry.get(name)?,
            None => self.registry.default_adapter()?,
        };
        Ok(match self.router.binding(&key) {
            Some(binding) => adapter.history(&binding.conversation_id).await,
            None => Vec::new(),
        })
    }

    /// Message to show the user for a failed request
    pub fn describe_error(&self, error: &anyhow::Error) -> String {
        match error.downcast_ref::<ChatllmError>() {
            Some(ChatllmError::EmptyInput) => EXPECT_PROMPT.to_string(),
            Some(ChatllmError::UnknownModel { name, available }) => {
                match self.registry.suggest(name) {
                    Some(suggestion) => format!(
                        "Unknown model '{}'. Did you mean '{}'? Available: {}",
                        name, suggestion, available
                    ),
                    None => format!("Unknown model '{}'. Available: {}", name, available),
                }
            }
            Some(ChatllmError::Command(reason)) => format!("Invalid command: {}", reason),
            _ => UNKNOWN_ERROR.to_string(),
        }
    }
}

/// URLs in first-seen order without repeats
fn unique(urls: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.filter(|url| seen.insert(url.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InteractionMode;
    use crate::providers::BackendKind;
    use crate::test_utils::{test_settings, FailingProvider, StaticProvider};

    fn handler_with(providers: Vec<(BackendKind, Arc<StaticProvider>)>) -> ChatHandler {
        let adapters = providers
            .into_iter()
            .map(|(kind, provider)| ModelAdapter::with_provider(test_settings(kind), provider))
            .collect();
        let registry = ModelRegistry::from_adapters(adapters, BackendKind::ChatGpt).unwrap();
        ChatHandler::new(
            Arc::new(registry),
            SessionRouter::new(InteractionMode::Channel),
            10,
        )
    }

    fn msg(text: &str) -> IncomingMessage {
        IncomingMessage::new("discord", "general", "alice", text)
    }

    #[tokio::test]
    async fn test_plain_chat_applies_spacing() {
        let handler = handler_with(vec![(
            BackendKind::ChatGpt,
            Arc::new(StaticProvider::new("使用Rust")),
        )]);
        assert_eq!(handler.handle(&msg("hi")).await.unwrap(), "使用 Rust");
    }

    #[tokio::test]
    async fn test_version_reports_model() {
        let handler = handler_with(vec![
            (BackendKind::ChatGpt, Arc::new(StaticProvider::new("x"))),
            (BackendKind::Kimi, Arc::new(StaticProvider::new("x"))),
        ]);
        assert_eq!(
            handler.handle(&msg("-v")).await.unwrap(),
            "ChatGPT (gpt-3.5-turbo)"
        );
        assert_eq!(handler.handle(&msg("-v -m kimi")).await.unwrap(), "Kimi (kimi)");
    }

    #[tokio::test]
    async fn test_unknown_model_with_suggestion() {
        let handler = handler_with(vec![(
            BackendKind::ChatGpt,
            Arc::new(StaticProvider::new("x")),
        )]);
        let err = handler.handle(&msg("-m chatgtp hello")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatllmError>(),
            Some(ChatllmError::UnknownModel { .. })
        ));
        assert!(handler.describe_error(&err).contains("Did you mean 'chatgpt'?"));
    }

    #[tokio::test]
    async fn test_reset_starts_new_conversation() {
        let provider = Arc::new(StaticProvider::new("ok"));
        let handler = handler_with(vec![(BackendKind::ChatGpt, provider.clone())]);

        handler.handle(&msg("first")).await.unwrap();
        assert_eq!(handler.current_history(&msg(""), None).await.unwrap().len(), 2);

        assert_eq!(handler.handle(&msg("-r")).await.unwrap(), RESET_SUCCESS);
        assert!(handler.current_history(&msg(""), None).await.unwrap().is_empty());
        assert!(handler.registry().get("chatgpt").unwrap().pool().is_empty());

        handler.handle(&msg("second")).await.unwrap();
        assert_eq!(provider.requests().last().unwrap(), &vec![Message::user("second")]);
    }

    #[tokio::test]
    async fn test_continue_carries_last_chat_to_other_model() {
        let chatgpt = Arc::new(StaticProvider::new("from gpt"));
        let kimi = Arc::new(StaticProvider::new("from kimi"));
        let handler = handler_with(vec![
            (BackendKind::ChatGpt, chatgpt.clone()),
            (BackendKind::Kimi, kimi.clone()),
        ]);

        handler.handle(&msg("question")).await.unwrap();
        handler.handle(&msg("-c -m kimi follow up")).await.unwrap();

        assert_eq!(
            kimi.requests()[0],
            vec![
                Message::user("question"),
                Message::assistant("from gpt"),
                Message::user("follow up"),
            ]
        );
    }

    #[tokio::test]
    async fn test_continue_with_same_model_carries_nothing_over() {
        let provider = Arc::new(StaticProvider::new("r"));
        let handler = handler_with(vec![(BackendKind::ChatGpt, provider.clone())]);

        handler.handle(&msg("one")).await.unwrap();
        handler.handle(&msg("-c two")).await.unwrap();

        assert_eq!(provider.requests()[1].len(), 3);
    }

    #[tokio::test]
    async fn test_picture_mode_renders_card() {
        let handler = handler_with(vec![(
            BackendKind::ChatGpt,
            Arc::new(StaticProvider::new("**bold**")),
        )]);
        let html = handler.handle(&msg("-p hi")).await.unwrap();
        assert!(html.starts_with("<html>"));
        assert!(html.contains("<strong>bold</strong>"));
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let handler = handler_with(vec![(
            BackendKind::ChatGpt,
            Arc::new(StaticProvider::new("x")),
        )]);
        let err = handler.handle(&msg("-p")).await.unwrap_err();
        assert_eq!(handler.describe_error(&err), EXPECT_PROMPT);
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_session_state() {
        let registry = ModelRegistry::from_adapters(
            vec![ModelAdapter::with_provider(
                test_settings(BackendKind::ChatGpt),
                Arc::new(FailingProvider),
            )],
            BackendKind::ChatGpt,
        )
        .unwrap();
        let handler = ChatHandler::new(
            Arc::new(registry),
            SessionRouter::new(InteractionMode::Channel),
            10,
        );

        let err = handler.handle(&msg("hello")).await.unwrap_err();
        assert_eq!(handler.describe_error(&err), UNKNOWN_ERROR);
        assert!(handler.current_history(&msg(""), None).await.unwrap().is_empty());
        assert!(handler.router().last_chat("discord:general").is_none());
    }

    #[tokio::test]
    async fn test_image_links_in_text_become_parts() {
        let provider = Arc::new(StaticProvider::new("a cat"));
        let mut settings = test_settings(BackendKind::ChatGpt);
        settings.parse_images = true;
        let registry = ModelRegistry::from_adapters(
            vec![ModelAdapter::with_provider(settings, provider.clone())],
            BackendKind::ChatGpt,
        )
        .unwrap();
        let handler = ChatHandler::new(
            Arc::new(registry),
            SessionRouter::new(InteractionMode::Channel),
            10,
        );

        handler
            .handle(&msg("what is https://example.com/cat.png"))
            .await
            .unwrap();
        assert_eq!(
            provider.requests()[0],
            vec![Message::user_with_images(
                vec!["https://example.com/cat.png".to_string()],
                "what is https://example.com/cat.png"
            )]
        );
    }

    #[test]
    fn test_unique_keeps_first_occurrence() {
        let urls = ["b", "a", "b", "c", "a"].map(String::from);
        assert_eq!(unique(urls.into_iter()), vec!["b", "a", "c"]);
    }
}
