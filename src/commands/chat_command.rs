//! Parsing of the chat command
//!
//! A chat message may start with flags that select what happens to it:
//!
//! ```text
//! [-r|--reset] [-p|--picture] [-c|--continue] [-m|--model NAME] [-v|--version] message...
//! ```
//!
//! Flags must come before the message; everything from the first word that
//! is not a flag onwards is the message, with its original spacing and line
//! breaks preserved.

use crate::error::{ChatllmError, Result};
use clap::Parser;

/// A parsed chat command
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(
    name = "chat",
    no_binary_name = true,
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct ChatCommand {
    /// Start a new conversation
    #[arg(short, long)]
    pub reset: bool,

    /// Render the reply as a picture card
    #[arg(short, long)]
    pub picture: bool,

    /// Carry over the last exchange from another model
    #[arg(short = 'c', long = "continue")]
    pub continue_chat: bool,

    /// Model to send the message to
    #[arg(short, long)]
    pub model: Option<String>,

    /// Report the selected model instead of chatting
    #[arg(short, long)]
    pub version: bool,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    words: Vec<String>,

    /// Message text
    #[arg(skip)]
    pub text: String,
}

impl ChatCommand {
    /// Parses a raw chat message
    ///
    /// # Errors
    ///
    /// Returns `ChatllmError::Command` for unknown flags or a `--model`
    /// without a name
    ///
    /// # Examples
    ///
    /// ```
    /// use chatllm::commands::chat_command::ChatCommand;
    ///
    /// let command = ChatCommand::parse_input("-p -m kimi explain  this\ncode").unwrap();
    /// assert!(command.picture);
    /// assert_eq!(command.model.as_deref(), Some("kimi"));
    /// assert_eq!(command.text, "explain  this\ncode");
    /// ```
    pub fn parse_input(input: &str) -> Result<Self> {
        let tokens = tokenize(input);
        let mut command = Self::try_parse_from(tokens.iter().map(|(_, token)| *token))
            .map_err(|e| ChatllmError::Command(e.to_string().trim().to_string()))?;

        command.text = if command.words.is_empty() {
            String::new()
        } else {
            let (start, _) = tokens[tokens.len() - command.words.len()];
            input[start..].trim_end().to_string()
        };
        command.words.clear();
        Ok(command)
    }

    /// Plain message with no flags
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Whether the command only carries flags and still needs a message
    pub fn needs_prompt(&self) -> bool {
        !self.reset && !self.version && self.text.trim().is_empty()
    }
}

/// Whitespace-separated tokens with their byte offsets
fn tokenize(input: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (index, ch) in input.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push((s, &input[s..index]));
                start = None;
            }
            (false, None) => start = Some(index),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push((s, &input[s..]));
    }
    tokens
}
