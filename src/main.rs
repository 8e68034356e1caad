use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use newswire::config::Config;
use newswire::coordinator::Coordinator;
use newswire::feed;
use newswire::registry;
use newswire::storage::CacheStore;

/// Get the config directory path (~/.config/newswire/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newswire"))
}

#[derive(Parser, Debug)]
#[command(
    name = "newswire",
    about = "Aggregate configured RSS/Atom feeds through a freshness cache"
)]
struct Args {
    /// Delete the cache entry before fetching
    #[arg(long)]
    force: bool,

    /// Trigger a background-style refresh and exit
    #[arg(long)]
    refresh: bool,

    /// Report whether a refresh is in progress and exit
    #[arg(long)]
    status: bool,

    /// Delete the cache entry and exit
    #[arg(long)]
    clear: bool,

    /// Feed registry file (overrides config and the default location)
    #[arg(long, value_name = "FILE")]
    feeds: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    let config = Config::load(&config_dir.join("config.toml"))
        .context("Failed to load configuration")?;

    let feeds_path = args
        .feeds
        .or_else(|| config.feeds_file.clone())
        .unwrap_or_else(|| config_dir.join("feeds.toml"));

    if !feeds_path.exists() {
        eprintln!("Error: No feeds file found at {}", feeds_path.display());
        eprintln!();
        eprintln!("Create it with one [[feeds]] table per source, for example:");
        eprintln!();
        eprintln!("  [[feeds]]");
        eprintln!("  url = \"https://example.com/rss\"");
        eprintln!("  is_top_channel = true");
        std::process::exit(1);
    }

    let feed_sources = registry::load(&feeds_path).context("Failed to load feed registry")?;
    if feed_sources.is_empty() {
        eprintln!(
            "Warning: No feeds configured in {}; responses will be empty",
            feeds_path.display()
        );
    }

    let cache_path = config
        .cache_db
        .clone()
        .unwrap_or_else(|| config_dir.join("cache.db"));
    let cache_path_str = cache_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in cache database path"))?;
    let store = CacheStore::open(cache_path_str)
        .await
        .context("Failed to open cache database")?;

    let client = feed::build_client().context("Failed to build HTTP client")?;
    let coordinator = Coordinator::new(
        store,
        client,
        feed_sources,
        config.batch_size,
        config.fetch_timeout(),
    );

    if args.clear {
        let cleared = coordinator.clear_cache().await;
        println!("{}", serde_json::json!({ "cleared": cleared }));
        return Ok(());
    }

    if args.status {
        println!(
            "{}",
            serde_json::json!({ "refreshing": coordinator.is_refreshing() })
        );
        return Ok(());
    }

    if args.refresh {
        let status = coordinator.trigger_refresh();
        println!("{}", serde_json::json!({ "status": status }));
        // A one-shot process would kill the task on exit; let it land.
        coordinator.join_refresh().await;
        return Ok(());
    }

    let response = coordinator.read(args.force).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("Failed to serialize response")?
    );

    // If the read left a stale-triggered refresh in flight, let it finish
    // so the next invocation sees the updated entry.
    coordinator.join_refresh().await;

    Ok(())
}
