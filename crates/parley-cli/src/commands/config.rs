//! Config command handlers

use std::path::Path;

use anyhow::{bail, Context, Result};

use parley_core::{Config, RecencyPolicy};

use crate::output::{Output, OutputFormat};

/// Keys accepted by `config set`
const KEYS: &str = "socket_url, api_url, log_file, send_timeout_secs, max_conversations, \
                    recency, reconnect_initial_ms, reconnect_max_ms";

/// Show current configuration
pub fn show(config_path: &Path, output: &Output) -> Result<()> {
    let config = Config::load_from_path(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to encode configuration")?
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config_path.display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  socket_url:        {}", or_unset(config.socket_url.as_deref()));
            println!("  api_url:           {}", or_unset(config.api_url.as_deref()));
            println!(
                "  log_file:          {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  send_timeout_secs: {}", config.send_timeout_secs);
            println!("  max_conversations: {}", config.cache.max_conversations);
            println!("  recency:           {:?}", config.cache.recency);
            println!(
                "  reconnect:         {}ms doubling to {}ms",
                config.reconnect.initial_delay_ms, config.reconnect.max_delay_ms
            );
            println!();
            println!("Config file: {}", config_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(config_path: &Path, key: String, value: String, output: &Output) -> Result<()> {
    let mut config = Config::load_from_path(config_path).context("Failed to load configuration")?;

    apply_setting(&mut config, &key, &value)?;

    config
        .save_to_path(config_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

/// Update one field of `config` from its string form
fn apply_setting(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "socket_url" => config.socket_url = optional(value),
        "api_url" => config.api_url = optional(value),
        "log_file" => config.log_file = optional(value).map(Into::into),
        "send_timeout_secs" => {
            config.send_timeout_secs = value
                .parse()
                .context("Invalid value for send_timeout_secs. Use a number of seconds.")?;
        }
        "max_conversations" => {
            config.cache.max_conversations = value
                .parse()
                .context("Invalid value for max_conversations. Use a positive number.")?;
        }
        "recency" => {
            config.cache.recency = match value {
                "insertion" => RecencyPolicy::Insertion,
                "access" => RecencyPolicy::Access,
                _ => bail!("Invalid value for recency. Use 'insertion' or 'access'."),
            };
        }
        "reconnect_initial_ms" => {
            config.reconnect.initial_delay_ms = value
                .parse()
                .context("Invalid value for reconnect_initial_ms. Use milliseconds.")?;
        }
        "reconnect_max_ms" => {
            config.reconnect.max_delay_ms = value
                .parse()
                .context("Invalid value for reconnect_max_ms. Use milliseconds.")?;
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: {}",
                key,
                KEYS
            );
        }
    }

    Ok(())
}

/// Empty string or "none" clears a setting
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

fn or_unset(value: Option<&str>) -> &str {
    value.unwrap_or("(not set)")
}
