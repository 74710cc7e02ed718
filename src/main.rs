use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use arcade_index::config::{IndexConfig, DEFAULT_LEADERBOARD_LIMIT, DEFAULT_SCORES_LIMIT};
use arcade_index::http::{self, AppState};
use arcade_index::store::StoreBackend;
use clap::Parser;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "ARCADE_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Storage backend: memory or sqlite.
    #[arg(long, env = "ARCADE_STORE", default_value = "memory")]
    store: String,

    /// SQLite database file (required with --store sqlite).
    #[arg(long, env = "ARCADE_SQLITE_PATH")]
    sqlite_path: Option<PathBuf>,

    /// Shared secret for write endpoints. Writes are refused when unset.
    #[arg(long, env = "ARCADE_WRITE_SECRET", hide_env_values = true)]
    write_secret: Option<String>,

    /// Largest page any list endpoint returns.
    #[arg(long, env = "ARCADE_MAX_PAGE_SIZE")]
    max_page_size: Option<usize>,

    #[arg(long, env = "ARCADE_LOG_LEVEL", default_value = "info")]
    log_level: tracing::Level,
}

fn init_tracing(level: tracing::Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn build_config(args: &Args) -> Result<IndexConfig> {
    let defaults = IndexConfig::default();

    let backend = match args.store.trim().to_ascii_lowercase().as_str() {
        "memory" => StoreBackend::Memory,
        "sqlite" => {
            let path = args
                .sqlite_path
                .clone()
                .context("--sqlite-path is required with --store sqlite")?;
            StoreBackend::Sqlite(path)
        }
        other => anyhow::bail!("unknown store backend: {other} (expected memory or sqlite)"),
    };

    if let Some(0) = args.max_page_size {
        anyhow::bail!("max_page_size must be > 0");
    }
    let max_page_size = args.max_page_size.unwrap_or(defaults.max_page_size);

    let write_secret = args
        .write_secret
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let config = IndexConfig {
        bind: args.bind,
        backend,
        write_secret,
        max_page_size,
        default_leaderboard_limit: DEFAULT_LEADERBOARD_LIMIT.min(max_page_size),
        default_scores_limit: DEFAULT_SCORES_LIMIT.min(max_page_size),
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level);

    let config = build_config(&args)?;
    if config.write_secret.is_none() {
        warn!("no write secret configured; register and submit-score will be refused");
    }

    let store = config
        .backend
        .open()
        .with_context(|| format!("failed to open {} store", config.backend.name()))?;
    info!(
        backend = store.backend_name(),
        max_page_size = config.max_page_size,
        "store ready"
    );

    http::serve(AppState::new(config, store))
        .await
        .context("http server failed")?;
    Ok(())
}
