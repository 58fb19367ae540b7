//! Context truncation for outgoing requests
//!
//! The budget is a character budget, not a model-token budget: every turn
//! costs `Message::content_length()` and multimodal turns only pay for
//! their text part.

use crate::providers::Message;

/// Summary of one truncation pass, used for logging
///
/// # Examples
///
/// ```
/// use chatllm::history::truncate::TruncationStats;
///
/// let stats = TruncationStats::new(10, 4, 120, 200);
/// assert_eq!(stats.dropped_turns, 6);
/// assert_eq!(stats.remaining_budget, 80);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationStats {
    /// Turns in the working history before truncation
    pub total_turns: usize,
    /// Turns that survived
    pub kept_turns: usize,
    /// Turns that were dropped from the front
    pub dropped_turns: usize,
    /// Characters used by the surviving turns
    pub kept_length: usize,
    /// Characters left in the budget
    pub remaining_budget: usize,
}

impl TruncationStats {
    /// Create a new TruncationStats instance
    pub fn new(total_turns: usize, kept_turns: usize, kept_length: usize, max_length: usize) -> Self {
        let kept_turns = kept_turns.min(total_turns);
        Self {
            total_turns,
            kept_turns,
            dropped_turns: total_turns - kept_turns,
            kept_length,
            remaining_budget: max_length.saturating_sub(kept_length),
        }
    }
}

/// Keeps the longest suffix of `history` whose total length fits `max_length`
///
/// Walks from the newest turn backward and stops at the first turn that
/// would overflow the budget; everything older than that turn is dropped
/// even if it would fit on its own. The result is in chronological order.
/// A budget of zero always yields an empty result.
///
/// # Examples
///
/// ```
/// use chatllm::history::truncate_messages;
/// use chatllm::providers::Message;
///
/// let history = vec![
///     Message::user("a".repeat(10)),
///     Message::assistant("b".repeat(10)),
///     Message::user("c".repeat(10)),
/// ];
/// let kept = truncate_messages(&history, 15);
/// assert_eq!(kept, vec![Message::user("c".repeat(10))]);
/// ```
pub fn truncate_messages(history: &[Message], max_length: usize) -> Vec<Message> {
    let start = kept_suffix_start(history, max_length);
    history[start..].to_vec()
}

/// Same as [`truncate_messages`] but also reports what was kept
pub fn truncate_with_stats(history: &[Message], max_length: usize) -> (Vec<Message>, TruncationStats) {
    let start = kept_suffix_start(history, max_length);
    let kept = history[start..].to_vec();
    let kept_length = kept.iter().map(Message::content_length).sum();
    let stats = TruncationStats::new(history.len(), kept.len(), kept_length, max_length);
    (kept, stats)
}

/// Index of the oldest turn that survives truncation
fn kept_suffix_start(history: &[Message], max_length: usize) -> usize {
    if max_length == 0 {
        return history.len();
    }

    let mut total = 0usize;
    let mut start = history.len();
    for (index, message) in history.iter().enumerate().rev() {
        let next = total.saturating_add(message.content_length());
        if next > max_length {
            break;
        }
        total = next;
        start = index;
    }
    start
}
