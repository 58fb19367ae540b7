//! ChatLLM - relay chat messages to LLM backends
//!
#![doc = "ChatLLM - relay chat messages to LLM backends"]
#![doc = "Main entry point for the ChatLLM command line."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatllm::agent::metrics::init_metrics_exporter;
use chatllm::cli::{Cli, Commands};
use chatllm::commands;
use chatllm::commands::chat::SessionOrigin;
use chatllm::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);
    init_metrics_exporter();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat {
            model,
            platform,
            channel,
            user,
        } => {
            if let Some(m) = &model {
                tracing::debug!("Using model override: {}", m);
            }

            let origin = SessionOrigin {
                platform,
                channel,
                user,
            };
            commands::chat::run_chat(config, origin).await?;
            Ok(())
        }
        Commands::Ask {
            model,
            picture,
            text,
        } => {
            if let Some(m) = &model {
                tracing::debug!("Using model override: {}", m);
            }

            commands::ask::run_ask(config, picture, text.join(" ")).await?;
            Ok(())
        }
        Commands::Models => {
            commands::models::list_models(&config)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects debug output.
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "chatllm=debug" } else { "chatllm=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
