//! Command-line interface. Every flag can also be set through its
//! `TXSETTLE_*` environment variable.

use crate::logging::LogFormat;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use txsettle::application::settlement::SettlementConfig;
use txsettle::service::ServiceConfig;

/// Webhook-driven transaction recording and settlement service.
#[derive(Parser, Debug)]
#[command(name = "txsettle", author, version, about, long_about = None, propagate_version = true)]
pub struct Cli {
    /// Log output format.
    #[arg(long, global = true, env = "TXSETTLE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the webhook intake and status API.
    Serve(ServeArgs),
    /// Re-submit webhooks from a CSV file and print the resulting statuses.
    Replay(ReplayArgs),
}

/// Options shared by every command that runs settlements.
#[derive(Args, Debug)]
pub struct SettlementArgs {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "TXSETTLE_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Simulated external confirmation delay, in milliseconds.
    #[arg(long, env = "TXSETTLE_SETTLEMENT_DELAY_MS", default_value_t = 30_000)]
    pub settlement_delay_ms: u64,

    /// Give up on a confirmation after this many milliseconds.
    #[arg(long, env = "TXSETTLE_CONFIRMATION_TIMEOUT_MS")]
    pub confirmation_timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "TXSETTLE_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// How long shutdown waits for in-flight settlements, in milliseconds.
    #[arg(long, env = "TXSETTLE_SHUTDOWN_GRACE_MS", default_value_t = 5_000)]
    pub shutdown_grace_ms: u64,

    #[command(flatten)]
    pub settlement: SettlementArgs,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Input CSV with columns transaction_id,source_account,destination_account,amount,currency.
    pub input: PathBuf,

    #[command(flatten)]
    pub settlement: SettlementArgs,
}

impl SettlementArgs {
    pub fn to_config(&self) -> ServiceConfig {
        ServiceConfig {
            db_path: self.db_path.clone(),
            confirmation_delay: Duration::from_millis(self.settlement_delay_ms),
            settlement: SettlementConfig {
                confirmation_timeout: self.confirmation_timeout_ms.map(Duration::from_millis),
            },
            ..ServiceConfig::default()
        }
    }
}

impl ServeArgs {
    pub fn to_config(&self) -> ServiceConfig {
        ServiceConfig {
            bind: self.bind,
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
            ..self.settlement.to_config()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_args_map_to_config() {
        let cli = Cli::try_parse_from([
            "txsettle",
            "serve",
            "--bind",
            "127.0.0.1:9000",
            "--settlement-delay-ms",
            "250",
            "--confirmation-timeout-ms",
            "1000",
        ])
        .unwrap();

        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.to_config();
        assert_eq!(config.bind, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.confirmation_delay, Duration::from_millis(250));
        assert_eq!(
            config.settlement.confirmation_timeout,
            Some(Duration::from_millis(1000))
        );
        assert!(config.db_path.is_none());
    }
}
