//! Session routing: which conversation a chat message belongs to
//!
//! A session key is derived from where a message came from (platform,
//! channel and user, combined according to [`InteractionMode`]). Each key is
//! bound to one conversation id until it is reset.

use crate::config::InteractionMode;
use crate::providers::{BackendKind, Message};
use dashmap::DashMap;
use uuid::Uuid;

/// Derives the session key of a message
///
/// # Examples
///
/// ```
/// use chatllm::agent::session::session_key;
/// use chatllm::config::InteractionMode;
///
/// assert_eq!(session_key(InteractionMode::User, "qq", "group1", "alice"), "qq:alice");
/// assert_eq!(session_key(InteractionMode::Channel, "qq", "group1", "alice"), "qq:group1");
/// assert_eq!(session_key(InteractionMode::Both, "qq", "group1", "alice"), "qq:group1:alice");
/// ```
pub fn session_key(mode: InteractionMode, platform: &str, channel_id: &str, user_id: &str) -> String {
    match mode {
        InteractionMode::User => format!("{}:{}", platform, user_id),
        InteractionMode::Channel => format!("{}:{}", platform, channel_id),
        InteractionMode::Both => format!("{}:{}:{}", platform, channel_id, user_id),
    }
}

/// The most recent exchange of a session, used by `--continue`
#[derive(Debug, Clone, PartialEq)]
pub struct LastChatSnapshot {
    /// Backend that produced the exchange
    pub model: BackendKind,
    /// Most recent stored turns of that backend's conversation
    pub turns: Vec<Message>,
}

/// Conversation bound to a session key
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationBinding {
    /// Current conversation id
    pub conversation_id: String,
    /// Last successful exchange, if any
    pub last_chat: Option<LastChatSnapshot>,
}

/// Binds session keys to conversation ids
///
/// Every operation on a key is atomic with respect to the others, so a
/// reset racing with a message either happens before the message picks its
/// conversation id or after it.
#[derive(Debug)]
pub struct SessionRouter {
    mode: InteractionMode,
    bindings: DashMap<String, ConversationBinding>,
}

impl SessionRouter {
    /// Create a router deriving keys with `mode`
    pub fn new(mode: InteractionMode) -> Self {
        Self {
            mode,
            bindings: DashMap::new(),
        }
    }

    /// How keys are derived
    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    /// Session key of a message
    pub fn key(&self, platform: &str, channel_id: &str, user_id: &str) -> String {
        session_key(self.mode, platform, channel_id, user_id)
    }

    /// Conversation id bound to `key`, binding a fresh one if needed
    pub fn resolve(&self, key: &str) -> String {
        self.bindings
            .entry(key.to_string())
            .or_insert_with(|| {
                let conversation_id = Uuid::new_v4().to_string();
                tracing::debug!(session = key, %conversation_id, "Bound new conversation");
                ConversationBinding {
                    conversation_id,
                    last_chat: None,
                }
            })
            .conversation_id
            .clone()
    }

    /// Current binding of `key`, if any
    pub fn binding(&self, key: &str) -> Option<ConversationBinding> {
        self.bindings.get(key).map(|binding| binding.value().clone())
    }

    /// Last successful exchange of `key`
    pub fn last_chat(&self, key: &str) -> Option<LastChatSnapshot> {
        self.bindings
            .get(key)
            .and_then(|binding| binding.last_chat.clone())
    }

    /// Unbinds `key`, returning the conversation id it was bound to
    pub fn reset(&self, key: &str) -> Option<String> {
        let removed = self
            .bindings
            .remove(key)
            .map(|(_, binding)| binding.conversation_id);
        if let Some(conversation_id) = &removed {
            tracing::debug!(session = key, %conversation_id, "Reset session");
        }
        removed
    }

    /// Records the last exchange of `key`
    ///
    /// Only applies while `key` is still bound to `conversation_id`; a
    /// snapshot from before a reset is discarded. Returns whether it was
    /// stored.
    pub fn commit(&self, key: &str, conversation_id: &str, snapshot: LastChatSnapshot) -> bool {
        match self.bindings.get_mut(key) {
            Some(mut binding) if binding.conversation_id == conversation_id => {
                binding.last_chat = Some(snapshot);
                true
            }
            _ => {
                tracing::debug!(session = key, conversation_id, "Discarded stale snapshot");
                false
            }
        }
    }

    /// Number of bound sessions
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no session is bound
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn snapshot(model: BackendKind) -> LastChatSnapshot {
        LastChatSnapshot {
            model,
            turns: vec![Message::user("q"), Message::assistant("a")],
        }
    }

    #[test]
    fn test_key_follows_mode() {
        let router = SessionRouter::new(InteractionMode::Both);
        assert_eq!(router.key("discord", "c", "u"), "discord:c:u");
        assert_eq!(router.mode(), InteractionMode::Both);
    }

    #[test]
    fn test_resolve_is_stable() {
        let router = SessionRouter::new(InteractionMode::Channel);
        let first = router.resolve("qq:1");
        assert_eq!(router.resolve("qq:1"), first);
        assert_ne!(router.resolve("qq:2"), first);
        assert!(Uuid::parse_str(&first).is_ok());
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn test_reset_binds_new_conversation() {
        let router = SessionRouter::new(InteractionMode::Channel);
        let first = router.resolve("qq:1");
        assert_eq!(router.reset("qq:1"), Some(first.clone()));
        assert_eq!(router.reset("qq:1"), None);
        assert_ne!(router.resolve("qq:1"), first);
    }

    #[test]
    fn test_commit_requires_same_conversation() {
        let router = SessionRouter::new(InteractionMode::Channel);
        let id = router.resolve("qq:1");

        assert!(router.commit("qq:1", &id, snapshot(BackendKind::Kimi)));
        assert_eq!(router.last_chat("qq:1"), Some(snapshot(BackendKind::Kimi)));

        assert!(!router.commit("qq:1", "other-id", snapshot(BackendKind::Claude)));
        assert_eq!(router.last_chat("qq:1").unwrap().model, BackendKind::Kimi);
    }

    #[test]
    fn test_commit_after_reset_is_discarded() {
        let router = SessionRouter::new(InteractionMode::Channel);
        let id = router.resolve("qq:1");
        router.reset("qq:1");

        assert!(!router.commit("qq:1", &id, snapshot(BackendKind::Kimi)));
        assert!(router.binding("qq:1").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_resolve_binds_once() {
        let router = Arc::new(SessionRouter::new(InteractionMode::Channel));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let router = Arc::clone(&router);
                tokio::spawn(async move { router.resolve("qq:1") })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }
}
