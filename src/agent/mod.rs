//! Agent module for ChatLLM
//!
//! This module contains the model adapters that turn a chat message into a
//! backend request, the registry that selects them by name, the session
//! router that maps chat sessions to conversations, and request metrics.

pub mod adapter;
pub mod metrics;
pub mod registry;
pub mod session;

pub use adapter::{ChatReply, ChatRequest, ModelAdapter};
pub use registry::ModelRegistry;
pub use session::{ConversationBinding, LastChatSnapshot, SessionRouter};
