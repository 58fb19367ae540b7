//! ChatLLM - chat platform relay to LLM backends
//!
//! This library keeps a short-lived conversation history for every chat
//! session, trims it to each backend's context budget and relays it to
//! OpenAI-compatible chat completion APIs.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `history`: History pool with forget time, and context truncation
//! - `agent`: Model adapters, adapter registry, session routing and metrics
//! - `providers`: Message types, provider abstraction and the HTTP backend
//! - `commands`: Chat command parsing, message handling and CLI commands
//! - `media`: Attachment URL extraction and download
//! - `render`: Text and picture card rendering of replies
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use chatllm::commands::handler::{ChatHandler, IncomingMessage};
//! use chatllm::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_yaml("models:\n  kimi:\n    api_key: sk-test\nchat:\n  default_model: kimi\n")?;
//!     let handler = ChatHandler::from_config(&config)?;
//!
//!     let message = IncomingMessage::new("discord", "general", "alice", "-p hello");
//!     let reply = handler.handle(&message).await?;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod history;
pub mod media;
pub mod providers;
pub mod render;

// Re-export commonly used types
pub use agent::{ChatReply, ChatRequest, ModelAdapter, ModelRegistry, SessionRouter};
pub use commands::handler::{ChatHandler, IncomingMessage};
pub use config::Config;
pub use error::{ChatllmError, Result};
pub use history::{truncate_messages, HistoryPool};
pub use providers::{BackendKind, Message, Provider, Role};

#[cfg(test)]
pub mod test_utils;
