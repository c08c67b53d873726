use anyhow::Result;
use clap::Parser;
use kube::Client;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cli;
mod external_service_controller;

use cli::{Args, LogFormat};
use external_service_controller::ExternalServiceController;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    info!("Starting egress-controller...");

    let client = Client::try_default().await?;
    let controller = ExternalServiceController::new(client, args.controller_config());

    // Start ExternalService reconciliation
    tokio::spawn(async move {
        if let Err(e) = controller.run().await {
            error!("ExternalService controller error: {}", e);
        }
    });

    // Keep the process alive
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting...");

    Ok(())
}

fn init_tracing(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_new(&args.log_level)?;
    match args.log_format {
        LogFormat::Plain => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
    Ok(())
}
