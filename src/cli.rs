//! Command-line interface definition for ChatLLM
//!
//! This module defines the CLI structure using clap's derive API. The `chat`
//! and `ask` commands stand in for a chat platform: they feed messages to
//! the same handler a platform integration would use.

use clap::{Parser, Subcommand};

/// ChatLLM - relay chat messages to LLM backends
///
/// Keeps a short-lived history per conversation and trims it to each
/// backend's context budget before every request.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatllm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for ChatLLM
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    ///
    /// Every line is handled like a chat platform message, so the chat
    /// command flags (`-r`, `-p`, `-c`, `-m NAME`, `-v`) work here too.
    Chat {
        /// Override the default model from config
        #[arg(short, long)]
        model: Option<String>,

        /// Platform name used to build the session key
        #[arg(long, default_value = "cli")]
        platform: String,

        /// Channel id used to build the session key
        #[arg(long, default_value = "local")]
        channel: String,

        /// User id used to build the session key
        #[arg(long, default_value = "local-user")]
        user: String,
    },

    /// Send a single message and print the reply
    Ask {
        /// Model to send the message to
        #[arg(short, long)]
        model: Option<String>,

        /// Render the reply as an HTML picture card
        #[arg(short, long)]
        picture: bool,

        /// Message text
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// List configured backends
    Models,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Model override given on the command line, if any
    pub fn model_override(&self) -> Option<&str> {
        match &self.command {
            Commands::Chat { model, .. } | Commands::Ask { model, .. } => model.as_deref(),
            Commands::Models => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_chat_defaults() {
        let cli = Cli::try_parse_from(["chatllm", "chat"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("config/config.yaml"));
        assert!(!cli.verbose);
        match cli.command {
            Commands::Chat {
                model,
                platform,
                channel,
                user,
            } => {
                assert!(model.is_none());
                assert_eq!(platform, "cli");
                assert_eq!(channel, "local");
                assert_eq!(user, "local-user");
            }
            _ => panic!("Expected Chat command"),
        }
    }

    #[test]
    fn test_cli_parse_chat_with_session() {
        let cli = Cli::try_parse_from([
            "chatllm",
            "chat",
            "--platform",
            "qq",
            "--channel",
            "123",
            "--user",
            "alice",
            "-m",
            "kimi",
        ])
        .unwrap();
        assert_eq!(cli.model_override(), Some("kimi"));
        match cli.command {
            Commands::Chat { platform, .. } => assert_eq!(platform, "qq"),
            _ => panic!("Expected Chat command"),
        }
    }

    #[test]
    fn test_cli_parse_ask() {
        let cli = Cli::try_parse_from(["chatllm", "ask", "-p", "hello", "there"]).unwrap();
        match cli.command {
            Commands::Ask {
                picture,
                text,
                model,
            } => {
                assert!(picture);
                assert!(model.is_none());
                assert_eq!(text, vec!["hello", "there"]);
            }
            _ => panic!("Expected Ask command"),
        }
    }

    #[test]
    fn test_cli_parse_ask_requires_text() {
        assert!(Cli::try_parse_from(["chatllm", "ask"]).is_err());
    }

    #[test]
    fn test_cli_parse_models_with_global_flags() {
        let cli =
            Cli::try_parse_from(["chatllm", "--config", "my.yaml", "-v", "models"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("my.yaml"));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Models));
        assert!(cli.model_override().is_none());
    }
}
