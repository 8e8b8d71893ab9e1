//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use parley_core::models::Direction;
use parley_core::{Message, Notice};
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print one message as it arrives
    pub fn print_message(&self, message: &Message) {
        match self.format {
            OutputFormat::Human => println!("{}", message_line(message)),
            OutputFormat::Json => print_json(message),
            OutputFormat::Quiet => println!("{}", message.uuid),
        }
    }

    /// Print a conversation's messages, oldest first
    pub fn print_messages(&self, messages: &[Message]) {
        match self.format {
            OutputFormat::Human => {
                if messages.is_empty() {
                    println!("No messages found.");
                    return;
                }
                for message in messages {
                    println!("{}", message_line(message));
                }
                println!("\n{} message(s)", messages.len());
            }
            OutputFormat::Json => print_json(&messages),
            OutputFormat::Quiet => {
                for message in messages {
                    println!("{}", message.uuid);
                }
            }
        }
    }

    /// Report a sync failure
    pub fn notice(&self, notice: &Notice) {
        match self.format {
            OutputFormat::Human => eprintln!("⚠ {}", notice.message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "notice",
                        "kind": format!("{:?}", notice.kind),
                        "message": notice.message
                    })
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

/// One line per message: time, direction, sender and content preview
fn message_line(message: &Message) -> String {
    let arrow = match message.direction {
        Direction::Incoming => "<",
        Direction::Outgoing => ">",
        Direction::Other => "·",
    };
    let sender = message.meta.from.as_deref().unwrap_or("-");
    let private = if message.is_private() { " (private)" } else { "" };

    format!(
        "[{}] {} {}: {}{}",
        message.created_at.format("%Y-%m-%d %H:%M"),
        arrow,
        truncate(sender, 24),
        message.preview(80),
        private
    )
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
