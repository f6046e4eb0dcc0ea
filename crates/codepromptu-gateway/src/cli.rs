//! CLI definition for the gateway binary.

use clap::{Parser, Subcommand};

/// CodePromptu gateway: transparent LLM capture and prompt storage.
#[derive(Debug, Parser)]
#[command(name = "codepromptu-gateway", version, about)]
pub struct Cli {
    /// Subcommand; defaults to `serve`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Gateway subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the gateway server.
    Serve {
        /// Bind address, e.g. `0.0.0.0:8080` (overrides config).
        #[arg(long)]
        bind: Option<String>,
        /// Path to a YAML config file (overrides `CONFIG_URI`).
        #[arg(long)]
        config: Option<std::path::PathBuf>,
    },
    /// Print the resolved configuration and exit.
    Config {
        /// Path to a YAML config file (overrides `CONFIG_URI`).
        #[arg(long)]
        config: Option<std::path::PathBuf>,
    },
}
