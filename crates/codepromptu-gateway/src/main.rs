//! codepromptu-gateway binary: serve the capture gateway and REST surface.
//!
//! Logging: set `RUST_LOG=codepromptu_gateway=debug` (or `info`, `warn`)
//! to adjust gateway logs on stderr.

mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use codepromptu_gateway::GatewayConfig;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "codepromptu_gateway=info,codepromptu_store=info,codepromptu_embedding=info",
        )
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match cli.command {
        None | Some(Command::Serve { bind: None, config: None }) => {
            codepromptu_gateway::run(GatewayConfig::load()?).await
        }
        Some(Command::Serve { bind, config }) => {
            let mut resolved = GatewayConfig::load()?;
            if let Some(path) = config {
                resolved.apply_file(&path)?;
                resolved.apply_env();
            }
            if let Some(bind) = bind {
                resolved.bind_addr = bind;
            }
            codepromptu_gateway::run(resolved).await
        }
        Some(Command::Config { config }) => {
            let mut resolved = GatewayConfig::load()?;
            if let Some(path) = config {
                resolved.apply_file(&path)?;
                resolved.apply_env();
            }
            println!("{resolved:#?}");
            Ok(())
        }
    }
}
