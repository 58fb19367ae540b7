//! Conversation history storage and context truncation

pub mod pool;
pub mod truncate;

pub use pool::{HistoryEntry, HistoryPool, SharedEntry};
pub use truncate::{truncate_messages, truncate_with_stats, TruncationStats};
