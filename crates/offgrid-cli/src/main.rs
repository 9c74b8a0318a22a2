//! Offgrid - command-line front-end for the connectivity-aware data layer.
//!
//! Commands:
//! - `status`: probe once and print the network state
//! - `watch`: run the monitor and print every connectivity change
//! - `fetch <key> <url> [max-age-minutes]`: GET JSON with cache fallback
//! - `cache-clear`: remove all cached responses

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use offgrid_core::api::{ApiClient, ApiError};
use offgrid_core::cache::{SystemClock, TtlCache};
use offgrid_core::connectivity::{select_backend, ConnectivityMonitor, Platform};
use offgrid_core::storage::{FileStore, KeyValueStore};
use offgrid_core::{Config, DataLayer, FetchResult};

// ============================================================================
// Constants
// ============================================================================

/// Default maximum age of cached data served when a live fetch fails
const DEFAULT_MAX_AGE_MINUTES: u64 = 60;

/// Log file prefix inside `OFFGRID_LOG_DIR`
const LOG_FILE_PREFIX: &str = "offgrid.log";

const USAGE: &str = "usage: offgrid <status | watch | fetch <key> <url> [max-age-minutes] | cache-clear>";

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG to control the level (e.g., RUST_LOG=debug); set
/// OFFGRID_LOG_DIR to also write daily-rolling log files.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var("OFFGRID_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn load_config() -> Result<Config> {
    let mut config = Config::load().context("Failed to load config")?;
    config
        .apply_env()
        .context("Invalid OFFGRID_* environment override")?;
    Ok(config)
}

fn open_store(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    let dir = config.storage_dir()?;
    let store = FileStore::new(dir.clone())
        .with_context(|| format!("Failed to open storage at {}", dir.display()))?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> Result<ExitCode> {
    let config = load_config()?;

    match args.first().map(String::as_str) {
        Some("status") => status(&config).await,
        Some("watch") => watch(&config).await,
        Some("fetch") => {
            let (key, url) = match (args.get(1), args.get(2)) {
                (Some(key), Some(url)) => (key.as_str(), url.as_str()),
                _ => bail!("{}", USAGE),
            };
            let max_age = match args.get(3) {
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("Invalid max age: {}", raw))?,
                None => DEFAULT_MAX_AGE_MINUTES,
            };
            fetch(&config, key, url, max_age).await
        }
        Some("cache-clear") => cache_clear(&config).await,
        _ => {
            eprintln!("{}", USAGE);
            Ok(ExitCode::from(2))
        }
    }
}

async fn status(config: &Config) -> Result<ExitCode> {
    let platform = config.platform.unwrap_or_else(Platform::detect);
    let selected = select_backend(platform, config)?;
    let monitor = ConnectivityMonitor::new(selected.backend, open_store(config)?, config).await;

    let state = monitor.check_connection().await;
    println!("{}", state.status_display());
    println!("{}", serde_json::to_string_pretty(&state)?);

    Ok(if state.is_online() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn watch(config: &Config) -> Result<ExitCode> {
    let layer = DataLayer::start(config).await?;
    info!(platform = %layer.platform, "Watching connectivity");

    println!("{}", layer.monitor.get_state().status_display());
    let subscription = layer.monitor.on_change(|state| {
        println!("{}", state.status_display());
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    subscription.unsubscribe();
    layer.shutdown().await;
    Ok(ExitCode::SUCCESS)
}

async fn fetch(config: &Config, key: &str, url: &str, max_age: u64) -> Result<ExitCode> {
    let layer = DataLayer::start(config).await?;
    let api = ApiClient::new(url)?;

    let result = layer
        .fetcher
        .fetch_with_fallback(key, || api.get_json::<serde_json::Value>(url), max_age)
        .await;

    if let Some(notice) = layer.fetcher.saved_data_notice(&result) {
        eprintln!("{}", notice);
    }

    let code = match result {
        FetchResult::Live(data) | FetchResult::Cached { data, .. } => {
            println!("{}", serde_json::to_string_pretty(&data)?);
            ExitCode::SUCCESS
        }
        FetchResult::Failed(error) => {
            eprintln!("Error: {}", error);
            if let ApiError::Unreachable(_) = error {
                let state = layer.monitor.check_connection().await;
                eprintln!("Connection: {} - retry when back online", state.status_display());
            }
            ExitCode::FAILURE
        }
    };

    layer.shutdown().await;
    Ok(code)
}

async fn cache_clear(config: &Config) -> Result<ExitCode> {
    let cache = TtlCache::new(open_store(config)?, Arc::new(SystemClock));
    let removed = cache.clear_all().await;
    println!("Removed {} cached entries", removed);
    Ok(ExitCode::SUCCESS)
}
