//! Model listing for ChatLLM
//!
//! Shows the configured backends with the settings they resolve to, so the
//! effective endpoint, model and context budget can be checked without
//! sending a request.

use crate::config::{BackendSettings, Config};
use crate::error::{ChatllmError, Result};
use crate::providers::BackendKind;
use prettytable::{row, Table};

/// Print a table of the configured backends
///
/// # Errors
///
/// Returns error if the configuration has no usable default model
///
/// # Examples
///
/// ```no_run
/// use chatllm::config::Config;
/// use chatllm::commands::models::list_models;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::load("config/config.yaml", &chatllm::cli::Cli::parse_args())?;
/// list_models(&config)?;
/// # Ok(())
/// # }
/// ```
pub fn list_models(config: &Config) -> Result<()> {
    let default_kind: BackendKind = config
        .chat
        .default_model
        .parse()
        .map_err(ChatllmError::Config)?;
    let backends = config.backends();

    tracing::info!("Listing {} configured backends", backends.len());

    println!("\nConfigured backends:\n");
    models_table(&backends, default_kind).printstd();
    println!();
    Ok(())
}

/// Table of resolved backend settings, default backend marked with `*`
pub fn models_table(backends: &[BackendSettings], default_kind: BackendKind) -> Table {
    let mut table = Table::new();
    table.add_row(row![
        "Name",
        "Display Name",
        "Model",
        "Endpoint",
        "Context Budget",
        "Forget Time",
        "Media"
    ]);

    for settings in backends {
        let name = if settings.kind == default_kind {
            format!("{} *", settings.kind)
        } else {
            settings.kind.to_string()
        };

        table.add_row(row![
            name,
            settings.kind.display_name(),
            settings.model,
            settings.endpoint,
            format!("{} chars", settings.max_context_length),
            format_forget_time(settings.forget_time_ms),
            format_media(settings)
        ]);
    }

    table
}

/// Format a forget time for display
fn format_forget_time(forget_time_ms: u64) -> String {
    let seconds = forget_time_ms / 1000;
    match seconds {
        0 => format!("{} ms", forget_time_ms),
        s if s % 3600 == 0 => format!("{} h", s / 3600),
        s if s % 60 == 0 => format!("{} min", s / 60),
        s => format!("{} s", s),
    }
}

/// Attachment kinds a backend accepts
fn format_media(settings: &BackendSettings) -> String {
    match (settings.parse_images, settings.parse_files) {
        (true, true) => "images, files".to_string(),
        (true, false) => "images".to_string(),
        (false, true) => "files".to_string(),
        (false, false) => "None".to_string(),
    }
}
