/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes two top-level command modules:

- `chat`: Interactive chat session standing in for a chat platform
- `ask`: Send a single message and print the reply

Both feed messages through the same [`handler::ChatHandler`] a platform
integration would use.
*/

use crate::agent::ModelRegistry;
use crate::commands::handler::{ChatHandler, IncomingMessage};
use crate::config::Config;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

// Chat command flag parsing
pub mod chat_command;

// Message handling shared by every front end
pub mod handler;

// Configured backend listing
pub mod models;

// Special commands parser for the interactive session
pub mod special_commands;

/// Platform name used for messages typed on the command line
pub const CLI_PLATFORM: &str = "cli";

/// Builds the handler and starts the idle sweeper when configured
fn start_handler(config: &Config) -> Result<ChatHandler> {
    let handler = ChatHandler::from_config(config)?;
    let interval = Duration::from_secs(config.chat.sweep_interval_seconds);
    if ModelRegistry::spawn_idle_sweeper(Arc::clone(handler.registry()), interval).is_none() {
        tracing::debug!("Idle sweep disabled, conversations expire on access");
    }
    Ok(handler)
}

// Interactive chat command handler
pub mod chat {
    //! Interactive chat session.
    //!
    //! Runs a readline loop where every line is handled like a message
    //! posted by `user` in `channel` on `platform`, so session keys, resets
    //! and `--continue` behave exactly as they would on a chat platform.

    use super::*;
    use crate::commands::chat_command::ChatCommand;
    use crate::commands::handler::{EXPECT_PROMPT, LOADING};
    use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
    use crate::providers::{Message, Role};
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    /// Where messages typed in the session appear to come from
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SessionOrigin {
        /// Platform name
        pub platform: String,
        /// Channel id
        pub channel: String,
        /// User id
        pub user: String,
    }

    impl SessionOrigin {
        /// Message from this origin carrying `text`
        pub fn message(&self, text: &str) -> IncomingMessage {
            IncomingMessage::new(&self.platform, &self.channel, &self.user, text)
        }
    }

    /// Start interactive chat mode
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `origin` - Platform, channel and user the typed messages come from
    ///
    /// # Errors
    ///
    /// Returns error if the handler cannot be built from `config` or the
    /// terminal cannot be initialized. Failed chat requests are reported
    /// in the session and do not end it.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use chatllm::commands::chat::{run_chat, SessionOrigin};
    /// use chatllm::config::Config;
    ///
    /// # async fn example(config: Config) -> anyhow::Result<()> {
    /// let origin = SessionOrigin {
    ///     platform: "cli".to_string(),
    ///     channel: "local".to_string(),
    ///     user: "me".to_string(),
    /// };
    /// run_chat(config, origin).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_chat(config: Config, origin: SessionOrigin) -> Result<()> {
        tracing::info!("Starting interactive chat mode");

        let handler = start_handler(&config)?;
        let mut rl = DefaultEditor::new()?;

        print_welcome_banner(&handler, &origin);

        // Flags typed on their own wait for the message on the next line
        let mut pending: Option<ChatCommand> = None;

        loop {
            let prompt = if pending.is_some() { "...> " } else { ">> " };
            match rl.readline(prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(trimmed)?;

                    match parse_special_command(trimmed) {
                        Ok(SpecialCommand::Help) => {
                            print_help();
                            continue;
                        }
                        Ok(SpecialCommand::Models) => {
                            if let Err(e) = models::list_models(&config) {
                                eprintln!("{}", format!("Error: {}", e).red());
                            }
                            continue;
                        }
                        Ok(SpecialCommand::History(model)) => {
                            let message = origin.message("");
                            match handler.current_history(&message, model.as_deref()).await {
                                Ok(turns) => print_history(&turns),
                                Err(e) => eprintln!("{}", handler.describe_error(&e).red()),
                            }
                            continue;
                        }
                        Ok(SpecialCommand::Exit) => break,
                        Ok(SpecialCommand::None) => {}
                        Err(e) => {
                            eprintln!("{}", e.to_string().red());
                            continue;
                        }
                    }

                    let command = match pending.take() {
                        Some(mut command) => {
                            command.text = trimmed.to_string();
                            command
                        }
                        None => match ChatCommand::parse_input(&line) {
                            Ok(command) => command,
                            Err(e) => {
                                eprintln!("{}", handler.describe_error(&e).red());
                                continue;
                            }
                        },
                    };

                    if command.needs_prompt() {
                        println!("{}", EXPECT_PROMPT.yellow());
                        pending = Some(command);
                        continue;
                    }

                    println!("{}", LOADING.dimmed());
                    let message = origin.message(&line);
                    match handler.handle_command(&message, &command).await {
                        Ok(reply) => println!("\n{}\n", reply),
                        Err(e) => {
                            tracing::debug!("Chat request failed: {:#}", e);
                            eprintln!("{}\n", handler.describe_error(&e).red());
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    if pending.take().is_some() {
                        continue;
                    }
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Display welcome banner at the start of interactive chat mode
    fn print_welcome_banner(handler: &ChatHandler, origin: &SessionOrigin) {
        let registry = handler.registry();
        let session = handler
            .router()
            .key(&origin.platform, &origin.channel, &origin.user);

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║              ChatLLM Interactive Chat - Welcome!             ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Default model: {}", registry.default_kind().to_string().green());
        println!("Models:        {}", registry.names().join(", "));
        println!(
            "Session:       {} ({} mode)\n",
            session.cyan(),
            handler.router().mode()
        );
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

    /// Print stored turns, oldest first
    fn print_history(turns: &[Message]) {
        if turns.is_empty() {
            println!("No history for this conversation.\n");
            return;
        }

        println!();
        for turn in turns {
            let role = match turn.role {
                Role::User => turn.role.to_string().cyan(),
                Role::Assistant => turn.role.to_string().green(),
            };
            println!("{}: {}", role.bold(), turn.text());
        }
        println!("\n{} turns\n", turns.len());
    }

}

// One-shot command handler
pub mod ask {
    //! Single message mode: send one message, print the reply and exit.

    use super::*;
    use crate::commands::chat_command::ChatCommand;

    /// Channel used for one-shot messages
    const ASK_CHANNEL: &str = "ask";

    /// Send `text` to the default model and print the reply
    ///
    /// `text` is sent verbatim; chat flags inside it are not interpreted.
    /// Select the model with the `--model` CLI override, which replaces
    /// the configured default.
    ///
    /// # Errors
    ///
    /// Returns error if the handler cannot be built or the request fails
    pub async fn run_ask(config: Config, picture: bool, text: String) -> Result<()> {
        let reply = ask(&config, picture, text).await?;
        println!("{}", reply);
        Ok(())
    }

    /// Send `text` and return the rendered reply
    ///
    /// # Errors
    ///
    /// Returns error if the handler cannot be built or the request fails
    pub async fn ask(config: &Config, picture: bool, text: String) -> Result<String> {
        let handler = start_handler(config)?;
        let user = whoami();
        tracing::debug!(user = %user, picture, "Sending one-shot message");

        let message = IncomingMessage::new(CLI_PLATFORM, ASK_CHANNEL, user, text.clone());
        let mut command = ChatCommand::message(text);
        command.picture = picture;
        handler.handle_command(&message, &command).await
    }

    fn whoami() -> String {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "local-user".to_string())
    }

}
