//! Parley CLI
//!
//! Command-line interface for Parley - live conversation sync.

use std::fs::File;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use parley_core::{Config, SyncError, TransportError};

mod commands;
mod http;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley - paginated conversation history with live updates")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream live updates
    Watch {
        /// Conversation to open
        #[arg(short, long)]
        conversation: Option<Uuid>,
        /// Conversation lists to subscribe to (default: inbox)
        #[arg(short, long)]
        list: Vec<String>,
    },
    /// Print a conversation's recent messages
    History {
        /// Conversation ID
        conversation: Uuid,
        /// Number of pages to load
        #[arg(short, long, default_value_t = 1)]
        pages: u32,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (socket_url, api_url, max_conversations, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let result = match cli.command {
        Commands::Config { command } => handle_config_command(command, &output),
        Commands::Watch { conversation, list } => {
            let config = load_config(cli.verbose)?;
            commands::watch::run(&config, conversation, list, &output).await
        }
        Commands::History {
            conversation,
            pages,
        } => {
            let config = load_config(cli.verbose)?;
            commands::history::show(&config, conversation, pages, &output).await
        }
    };

    if let Err(ref e) = result {
        if !output.is_quiet() {
            if let Some(hint) = recovery_hint(e) {
                eprintln!("Hint: {}", hint);
            }
        }
    }
    result
}

/// Recovery advice for a sync or transport failure anywhere in the chain
fn recovery_hint(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(e) = err.downcast_ref::<SyncError>() {
        return e.recovery_suggestion();
    }
    err.downcast_ref::<TransportError>()
        .and_then(TransportError::recovery_suggestion)
}

/// Load configuration and start logging
fn load_config(verbose: u8) -> Result<Config> {
    let config = Config::load().context("Failed to load configuration")?;
    init_logging(&config, verbose);
    Ok(config)
}

fn handle_config_command(command: Option<ConfigCommands>, output: &Output) -> Result<()> {
    let path = Config::config_file_path();
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(&path, output),
        Some(ConfigCommands::Set { key, value }) => commands::config::set(&path, key, value, output),
    }
}

/// Initialize logging
///
/// RUST_LOG takes precedence over the verbosity flag. Logs go to
/// `config.log_file` when set, otherwise to stderr.
fn init_logging(config: &Config, verbose: u8) {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("parley_core={},parley_cli={}", log_level, log_level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    match config.log_file {
        Some(ref log_path) => match File::create(log_path) {
            Ok(file) => {
                let _ = builder.with_ansi(false).with_writer(Mutex::new(file)).try_init();
            }
            Err(e) => {
                eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
                let _ = builder.with_writer(std::io::stderr).try_init();
            }
        },
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_watch_flags() {
        let conv = Uuid::new_v4();
        let cli = Cli::parse_from([
            "parley",
            "-vv",
            "--json",
            "watch",
            "--conversation",
            conv.to_string().as_str(),
            "--list",
            "mentions",
        ]);

        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        match cli.command {
            Commands::Watch { conversation, list } => {
                assert_eq!(conversation, Some(conv));
                assert_eq!(list, vec!["mentions".to_string()]);
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_recovery_hint_through_context() {
        let conv = Uuid::new_v4();
        let err = Err::<(), _>(SyncError::UnknownConversation(conv))
            .with_context(|| format!("Failed to load messages for {}", conv))
            .unwrap_err();
        assert_eq!(
            recovery_hint(&err),
            Some("Refresh the conversation list and try again.")
        );

        let err = Err::<(), _>(TransportError::Closed)
            .context("Failed to start transport")
            .unwrap_err();
        assert_eq!(recovery_hint(&err), Some("Restart the connection before sending."));

        assert_eq!(recovery_hint(&anyhow::anyhow!("plain failure")), None);
    }

    #[test]
    fn test_history_pages_default() {
        let conv = Uuid::new_v4();
        let cli = Cli::parse_from(["parley", "history", conv.to_string().as_str()]);
        assert!(matches!(cli.command, Commands::History { pages: 1, .. }));
    }
}
