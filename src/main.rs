//! Telegram history CLI - main entry point
//!
//! Without a subcommand the full sync job runs. The process exits with 0 on a
//! clean run and 1 on any error, panic or termination signal.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use telegram_history::fetch::WriteMode;
use telegram_history::storage::{ArchiveStore, MySqlStore};
use telegram_history::{commands, metrics, Config, Error};

#[derive(Parser)]
#[command(name = "telegram_history")]
#[command(about = "Telegram channel history ingestion", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Commands {
    /// Fetch the configured channel's history into MySQL (default)
    Sync {
        /// Commit every message in its own transaction instead of per page
        #[arg(long, default_value_t = false)]
        one_by_one: bool,
    },

    /// Restore or create the Telegram session and store it
    Login,

    /// Create the database tables
    InitDb,

    /// Show the stored cursor and row counts
    Status,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Sync { one_by_one: false }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("telegram_history=info".parse()?),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing() {
        eprintln!("Failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let start = Instant::now();
    let result = run(cli.command.unwrap_or_default()).await;
    metrics::record_run_result(start.elapsed(), result.is_ok());

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Internal application error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    // Nothing touches the network before the configuration is valid
    let config = Arc::new(Config::from_env()?);
    // The pool connects lazily; schema setup runs inside the job so the pool
    // is disconnected on every path
    let store = Arc::new(MySqlStore::new(&config.database)?);

    let mut job = tokio::spawn(execute_command(
        command,
        Arc::clone(&config),
        Arc::clone(&store),
    ));

    let outcome = tokio::select! {
        joined = &mut job => match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(anyhow::anyhow!("job panicked")),
            Err(err) => Err(err.into()),
        },
        signal = shutdown_signal() => {
            job.abort();
            warn!("Received {}, stopping", signal);
            Err(Error::Interrupted(signal.to_string()).into())
        }
    };

    if let Err(err) = store.close().await {
        warn!("Failed to close database pool: {}", err);
    }
    outcome
}

async fn execute_command(
    command: Commands,
    config: Arc<Config>,
    store: Arc<MySqlStore>,
) -> anyhow::Result<()> {
    if command != Commands::InitDb {
        store.ensure_schema().await?;
    }

    match command {
        Commands::Sync { one_by_one } => {
            let mode = if one_by_one {
                WriteMode::OneByOne
            } else {
                WriteMode::Batch
            };
            commands::sync::run(&config, store.as_ref(), mode).await?;
        }
        Commands::Login => {
            commands::login::run(&config, store.as_ref()).await?;
        }
        Commands::InitDb => {
            commands::init_db::run(&store).await?;
        }
        Commands::Status => {
            commands::status::run(&config.channel_key(), store.as_ref()).await?;
        }
    }
    info!("Done");
    Ok(())
}

/// Resolves with the name of the first termination signal received.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                _ = ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            },
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                ctrl_c().await;
                "SIGINT"
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
        "SIGINT"
    }
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for SIGINT: {}", err);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_sync() {
        let cli = Cli::try_parse_from(["telegram_history"]).unwrap();
        assert_eq!(cli.command.unwrap_or_default(), Commands::Sync { one_by_one: false });
    }

    #[test]
    fn sync_accepts_one_by_one() {
        let cli = Cli::try_parse_from(["telegram_history", "sync", "--one-by-one"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Sync { one_by_one: true }));
    }

    #[test]
    fn parses_maintenance_commands() {
        let cli = Cli::try_parse_from(["telegram_history", "init-db"]).unwrap();
        assert_eq!(cli.command, Some(Commands::InitDb));

        let cli = Cli::try_parse_from(["telegram_history", "status"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Status));
    }

    #[test]
    fn metrics_addr_flag() {
        let cli =
            Cli::try_parse_from(["telegram_history", "--metrics-addr", "127.0.0.1:9898", "login"])
                .unwrap();
        assert_eq!(cli.metrics_addr.as_deref(), Some("127.0.0.1:9898"));
        assert_eq!(cli.command, Some(Commands::Login));
    }
}
