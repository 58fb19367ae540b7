//! In-memory history pool keyed by conversation id
//!
//! Each entry sits behind its own `tokio::sync::Mutex` so a request can hold
//! its conversation for the whole build, call and append sequence while
//! requests on other conversation ids proceed untouched. The outer map is a
//! `DashMap`, so lookups never take a pool-wide lock.

use crate::providers::Message;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Stored history of one conversation
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Full, untruncated turns in chronological order
    pub history: Vec<Message>,
    /// Last time the conversation was used
    pub last_accessed: DateTime<Utc>,
}

impl HistoryEntry {
    /// Create an empty entry last accessed at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            history: Vec::new(),
            last_accessed: now,
        }
    }

    /// Whether a touch at `now` would clear this entry
    ///
    /// A clock that went backwards never counts as idle time.
    pub fn would_forget(&self, now: DateTime<Utc>, forget_time_ms: u64) -> bool {
        let idle = now.signed_duration_since(self.last_accessed).num_milliseconds();
        idle >= 0 && idle as u64 >= forget_time_ms
    }

    /// Applies the forget-time rule and records the access
    ///
    /// Clears the history when the entry sat idle for at least
    /// `forget_time_ms`, then sets `last_accessed` to `now` in every case.
    /// Returns `true` when the history was cleared.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatllm::history::HistoryEntry;
    /// use chatllm::providers::Message;
    /// use chrono::{Duration, Utc};
    ///
    /// let t0 = Utc::now();
    /// let mut entry = HistoryEntry::new(t0);
    /// entry.append(Message::user("hi"));
    ///
    /// assert!(!entry.touch(t0 + Duration::milliseconds(999), 1000));
    /// assert_eq!(entry.history.len(), 1);
    ///
    /// let later = t0 + Duration::milliseconds(999) + Duration::milliseconds(1000);
    /// assert!(entry.touch(later, 1000));
    /// assert!(entry.history.is_empty());
    /// assert_eq!(entry.last_accessed, later);
    /// ```
    pub fn touch(&mut self, now: DateTime<Utc>, forget_time_ms: u64) -> bool {
        let forgotten = self.would_forget(now, forget_time_ms);
        if forgotten {
            self.history.clear();
        }
        self.last_accessed = now;
        forgotten
    }

    /// Appends one turn
    pub fn append(&mut self, message: Message) {
        self.history.push(message);
    }

    /// Number of stored turns
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether no turns are stored
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// Shared handle to one conversation's entry
pub type SharedEntry = Arc<Mutex<HistoryEntry>>;

/// Concurrent store of conversation histories
///
/// Owned by one model adapter; the forget time applies to every entry in
/// the pool.
#[derive(Debug)]
pub struct HistoryPool {
    entries: DashMap<String, SharedEntry>,
    forget_time_ms: u64,
}

impl HistoryPool {
    /// Create an empty pool
    ///
    /// # Arguments
    ///
    /// * `forget_time_ms` - Idle time after which a conversation's history is cleared
    pub fn new(forget_time_ms: u64) -> Self {
        Self {
            entries: DashMap::new(),
            forget_time_ms,
        }
    }

    /// Idle time after which a conversation's history is cleared
    pub fn forget_time_ms(&self) -> u64 {
        self.forget_time_ms
    }

    /// Looks up an existing entry
    pub fn get(&self, conversation_id: &str) -> Option<SharedEntry> {
        self.entries
            .get(conversation_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the entry for `conversation_id`, creating an empty one if absent
    ///
    /// An existing entry's `last_accessed` is left alone; only a touch
    /// updates it.
    pub fn get_or_create(&self, conversation_id: &str) -> SharedEntry {
        let entry = self
            .entries
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(conversation_id, "Creating history entry");
                Arc::new(Mutex::new(HistoryEntry::new(Utc::now())))
            });
        Arc::clone(entry.value())
    }

    /// Applies the pool's forget time to a locked entry
    pub fn touch(&self, entry: &mut HistoryEntry, now: DateTime<Utc>) -> bool {
        entry.touch(now, self.forget_time_ms)
    }

    /// Removes a conversation entirely
    ///
    /// Returns `true` if an entry was removed. Other conversations are not
    /// affected.
    pub fn forget(&self, conversation_id: &str) -> bool {
        let removed = self.entries.remove(conversation_id).is_some();
        if removed {
            tracing::debug!(conversation_id, "Forgot conversation");
        }
        removed
    }

    /// Copy of the stored turns, if the conversation exists
    pub async fn snapshot(&self, conversation_id: &str) -> Option<Vec<Message>> {
        let entry = self.get(conversation_id)?;
        let guard = entry.lock().await;
        Some(guard.history.clone())
    }

    /// Removes entries idle for at least the forget time
    ///
    /// Entries that are locked or whose handle is held by an in-flight
    /// request are skipped. Returns the number of removed entries.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            if Arc::strong_count(entry) > 1 {
                return true;
            }
            match entry.try_lock() {
                Ok(guard) => !guard.would_forget(now, self.forget_time_ms),
                Err(_) => true,
            }
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "Swept idle conversations");
        }
        removed
    }

    /// Number of conversations in the pool
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool holds no conversations
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry exists for `conversation_id`
    pub fn contains(&self, conversation_id: &str) -> bool {
        self.entries.contains_key(conversation_id)
    }
}
