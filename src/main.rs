//! Leaderboard server binary: wires the store, engine and HTTP/WebSocket
//! layer together.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use leaderboard_engine::{LeaderboardConfig, LeaderboardService};
use leaderboard_server::ServerConfig;
use leaderboard_store::{Database, ScoreRepo};
use leaderboard_telemetry::{init_telemetry, TelemetryConfig};

/// Real-time leaderboard server.
#[derive(Parser, Debug)]
#[command(name = "leaderboard", about = "Real-time leaderboard server")]
struct Cli {
    /// Host to bind.
    #[arg(long, env = "LEADERBOARD_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, env = "LEADERBOARD_PORT", default_value = "9091")]
    port: u16,

    /// Path to the SQLite database, or `:memory:`.
    #[arg(long, env = "LEADERBOARD_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Entries carried by each leaderboard snapshot.
    #[arg(long, env = "LEADERBOARD_TOP_N", default_value = "10")]
    top_n: usize,

    /// Scores strictly above this raise a HighScore notification.
    #[arg(long, env = "LEADERBOARD_HIGH_SCORE_THRESHOLD", default_value = "1000")]
    high_score_threshold: u32,

    /// Drop WebSocket clients silent for this many seconds.
    #[arg(long, env = "LEADERBOARD_CLIENT_TIMEOUT_SECS", default_value = "90")]
    client_timeout_secs: u64,

    /// Default log level (RUST_LOG takes precedence).
    #[arg(long, env = "LEADERBOARD_LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Emit JSON log lines.
    #[arg(long, env = "LEADERBOARD_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn default_db_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home)
            .join(".leaderboard")
            .join("database")
            .join("scores.db")
    }

    fn leaderboard_config(&self) -> LeaderboardConfig {
        LeaderboardConfig {
            top_n: self.top_n,
            high_score_threshold: self.high_score_threshold,
            ..Default::default()
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            client_timeout: Duration::from_secs(self.client_timeout_secs),
            ..Default::default()
        }
    }
}

fn open_database(path: Option<PathBuf>) -> Result<Database> {
    match path {
        Some(p) if p.as_os_str() == ":memory:" => {
            Database::in_memory().context("Failed to open in-memory database")
        }
        p => {
            let path = p.unwrap_or_else(Cli::default_db_path);
            Database::open(&path)
                .with_context(|| format!("Failed to open database: {}", path.display()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let telemetry = init_telemetry(TelemetryConfig {
        log_level: cli.log_level,
        json: cli.log_json,
        ..Default::default()
    });

    tracing::info!("Starting leaderboard server");

    let db = open_database(cli.db_path.clone())?;
    tracing::info!(path = %db.path().display(), "Database opened");

    let service = Arc::new(LeaderboardService::new(
        Arc::new(ScoreRepo::new(db)),
        cli.leaderboard_config(),
        telemetry.metrics(),
    ));

    let handle = leaderboard_server::start(cli.server_config(), service)
        .await
        .context("Failed to start server")?;

    tracing::info!(port = handle.port, "Leaderboard server ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}
