mod cli;
mod logging;

use clap::Parser;
use cli::{Cli, Commands};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use tokio::signal;
use txsettle::service;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(logging::DEFAULT_DIRECTIVE, cli.log_format);

    match cli.command {
        Commands::Serve(args) => {
            service::serve(args.to_config(), shutdown_signal())
                .await
                .into_diagnostic()?;
        }
        Commands::Replay(args) => {
            let config = args.settlement.to_config();
            let store = service::open_store(config.db_path.as_deref()).into_diagnostic()?;

            let file = File::open(&args.input).into_diagnostic()?;
            let stdout = io::stdout();
            service::replay(file, stdout.lock(), store, &config)
                .await
                .into_diagnostic()?;
        }
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
