//! Upgrade Guard Agent Binary Entry Point

use clap::Parser;
use upgrade_agent::{logging::init_logging, run_agent, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _log_guard = init_logging(&args.logging_config())?;

    tokio::select! {
        result = run_agent(args) => {
            if let Err(e) = result {
                tracing::error!("Agent failed: {:#}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
             tracing::info!("Shutdown signal received, stopping proxy server...");
        }
    }

    Ok(())
}
