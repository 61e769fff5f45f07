//! Command-line interface for chatstitch
//!
//! Provides argument parsing and subcommand handling for the chatstitch binary.

use clap::{Parser, Subcommand};

/// Streaming chat client with out-of-order reassembly
#[derive(Parser)]
#[command(name = "chatstitch")]
#[command(version)]
#[command(about = "Streaming chat client with out-of-order reassembly")]
#[command(
    long_about = "chatstitch sends a conversation to a streaming chat endpoint and reconciles \
    the server-sent events (including out-of-order fragments and tool-call deltas) into the \
    assistant reply as it arrives."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Send a message and stream the reply to stdout
    Send {
        /// User message text
        #[arg(short, long)]
        message: String,

        /// Conversation id reported in request options (random if omitted)
        #[arg(long)]
        conversation_id: Option<String>,

        /// Abort the stream after this many published updates
        #[arg(long)]
        abort_after: Option<usize>,

        /// Print Prometheus metrics after the stream ends
        #[arg(long)]
        metrics: bool,

        /// Save the finished conversation as JSON in this directory
        #[arg(long)]
        save_dir: Option<String>,
    },

    /// Ask the backend to stop generating for a request
    Kill {
        /// Request id printed by `send`
        #[arg(long)]
        request_id: String,
    },

    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# chatstitch Configuration
# ========================
#
# This file configures the chat endpoint, generation defaults and logging
# for chatstitch.

# ─────────────────────────────────────────────────────────────────────────────
# CLIENT
# ─────────────────────────────────────────────────────────────────────────────

[client]
# Base URL of the chat backend (http:// or https://)
base_url = "http://localhost:8080"

# Path of the streaming chat endpoint; kill requests go to the same URL
chat_path = "/chat"

# Seconds allowed to establish the connection
connect_timeout_seconds = 10

# Longest silence in seconds between streamed chunks; long replies that keep
# producing data are never cut off
read_timeout_seconds = 300

# Environment variable holding a bearer token (omit for no Authorization header)
# api_key_env = "CHATSTITCH_API_KEY"

# ─────────────────────────────────────────────────────────────────────────────
# CHAT DEFAULTS
# ─────────────────────────────────────────────────────────────────────────────

[chat]
# Model identifier sent as "model"
model = "your-model"

# Sampling temperature (0.0-2.0)
temperature = 0.7

# Maximum tokens to generate
max_tokens = 2048

# Prepended as a system message unless the conversation already starts with one
# system_prompt = "You are a helpful assistant."

# Reported to the backend in request options
time_zone = "UTC"

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
# Logs go to stderr; RUST_LOG overrides this setting
log_level = "info"
"#
}
