//! Special commands parser for the interactive chat session
//!
//! Special commands are handled by the REPL itself instead of being sent to
//! a backend. They let the user:
//! - Display help information
//! - Show the stored history of the current conversation
//! - List the configured backends
//! - Exit the session
//!
//! Commands are prefixed with `/` and are case-insensitive. `exit` and
//! `quit` also work without the prefix.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Show the stored history, optionally for a specific model
    History(Option<String>),

    /// List configured backends
    Models,

    /// Display help message
    Help,

    /// Exit the session
    Exit,

    /// Not a special command; send the input as a chat message
    None,
}

/// Parse user input into a special command
///
/// Input that does not start with `/` (other than `exit` and `quit`) is a
/// regular chat message, including messages that start with chat flags such
/// as `-p` or `--model`.
///
/// # Errors
///
/// Returns `CommandError` for unknown commands and unsupported arguments
///
/// # Examples
///
/// ```
/// use chatllm::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/help").unwrap(), SpecialCommand::Help);
/// assert_eq!(
///     parse_special_command("/history kimi").unwrap(),
///     SpecialCommand::History(Some("kimi".to_string()))
/// );
/// assert_eq!(parse_special_command("-p hello").unwrap(), SpecialCommand::None);
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let mut parts = lower.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let arg = parts.next();
    let extra = parts.next();

    match (command, arg, extra) {
        ("/help" | "/?", None, _) => Ok(SpecialCommand::Help),
        ("/models", None, _) => Ok(SpecialCommand::Models),
        ("/history", model, None) => Ok(SpecialCommand::History(model.map(str::to_string))),
        ("exit" | "quit" | "/exit" | "/quit", None, _) => Ok(SpecialCommand::Exit),
        ("/help" | "/?" | "/models" | "/history" | "exit" | "quit" | "/exit" | "/quit", _, _) => {
            let rest = trimmed[command.len()..].trim();
            Err(CommandError::UnsupportedArgument {
                command: command.to_string(),
                arg: rest.to_string(),
            })
        }
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Display help for the interactive chat session
pub fn print_help() {
    println!(
        r#"
Interactive Chat
================

Every line is sent like a chat platform message. Flags go before the text:

  -r, --reset          Start a new conversation
  -p, --picture        Render the reply as an HTML card
  -c, --continue       Carry over the last exchange from another model
  -m, --model <NAME>   Send the message to NAME (chatgpt, kimi, claude)
  -v, --version        Show the model that would answer

Image and document links in the text are attached when the model
accepts them. Giving only flags asks for the message on the next line.

SPECIAL COMMANDS:
  /history [model] - Show the stored history of this conversation
  /models          - List configured backends
  /help            - Show this help message
  /?               - Same as /help

SESSION CONTROL:
  exit             - Exit interactive mode
  quit             - Same as exit

NOTES:
  - Commands are case-insensitive
  - History is forgotten after the model's idle time
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_text_is_not_a_command() {
        assert_eq!(parse_special_command("hello").unwrap(), SpecialCommand::None);
        assert_eq!(
            parse_special_command("-m kimi hello").unwrap(),
            SpecialCommand::None
        );
        assert_eq!(
            parse_special_command("exit the building").unwrap(),
            SpecialCommand::None
        );
    }

    #[test]
    fn test_parse_help() {
        assert_eq!(parse_special_command("/help").unwrap(), SpecialCommand::Help);
        assert_eq!(parse_special_command("/?").unwrap(), SpecialCommand::Help);
        assert_eq!(parse_special_command("  /HELP  ").unwrap(), SpecialCommand::Help);
    }

    #[test]
    fn test_parse_exit() {
        for input in ["exit", "QUIT", "/exit", "/quit"] {
            assert_eq!(parse_special_command(input).unwrap(), SpecialCommand::Exit);
        }
    }

    #[test]
    fn test_parse_history() {
        assert_eq!(
            parse_special_command("/history").unwrap(),
            SpecialCommand::History(None)
        );
        assert_eq!(
            parse_special_command("/History Claude").unwrap(),
            SpecialCommand::History(Some("claude".to_string()))
        );
    }

    #[test]
    fn test_parse_models() {
        assert_eq!(parse_special_command("/models").unwrap(), SpecialCommand::Models);
    }

    #[test]
    fn test_unsupported_argument() {
        let err = parse_special_command("/models list").unwrap_err();
        assert_eq!(
            err,
            CommandError::UnsupportedArgument {
                command: "/models".to_string(),
                arg: "list".to_string(),
            }
        );

        assert!(matches!(
            parse_special_command("/history kimi extra"),
            Err(CommandError::UnsupportedArgument { .. })
        ));
    }

    #[test]
    fn test_unknown_command() {
        let err = parse_special_command("/mode write").unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand("/mode write".to_string()));
        assert!(err.to_string().contains("/help"));
    }
}
