//! # Festa
//!
//! Birthday reminder service: an HTTP gateway for records, devices and
//! settings, plus two scheduling drivers (a local timer loop and an
//! external-cron entry point) delivering through local and push
//! channels.
//!
//! Usage:
//!   festa                        # Start the gateway (default port 3000)
//!   festa --port 8080            # Custom port
//!   festa --owner lena           # Also run the local notifier for one user
//!   festa --db ./festa.db        # Custom database location

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use festa_core::FestaConfig;
use festa_core::traits::{Channel, MulticastSender, Presenter, RecordStore};
use festa_notify::{ConsolePresenter, FcmClient, LocalChannel};
use festa_scheduler::{LocalDriver, run_notifier};
use festa_store::SqliteStore;

#[derive(Parser)]
#[command(name = "festa", version, about = "🎂 Festa, a birthday reminder service")]
struct Cli {
    /// Gateway port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Database path (overrides config)
    #[arg(long)]
    db: Option<String>,

    /// Config file path (default: ~/.festa/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Run the in-process local notifier for this user
    #[arg(long)]
    owner: Option<String>,

    /// Local notifier check interval in seconds
    #[arg(long)]
    tick_secs: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug,hyper=info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Config: file, then env, then flags
    let mut config = match &cli.config {
        Some(path) => {
            let mut loaded = FestaConfig::load_from(std::path::Path::new(path))?;
            loaded.apply_env();
            loaded
        }
        None => FestaConfig::load()?,
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(host) = &cli.host {
        config.gateway.host = host.clone();
    }
    if let Some(db) = &cli.db {
        config.store.db_path = db.clone();
    }
    if let Some(owner) = &cli.owner {
        config.notifier.owner = Some(owner.clone());
    }
    if let Some(tick_secs) = cli.tick_secs {
        config.notifier.tick_secs = tick_secs;
    }

    let db_path = expand_path(&config.store.db_path);
    let store = SqliteStore::open(std::path::Path::new(&db_path))?;
    let tracked = store.birthday_count();
    let store: Arc<dyn RecordStore> = Arc::new(store);
    let sender: Arc<dyn MulticastSender> = Arc::new(FcmClient::new(config.push.clone()));

    println!("🎂 Festa v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "   🌐 Gateway:  http://{}:{}",
        config.gateway.host, config.gateway.port
    );
    println!("   🗄️  Database: {db_path} ({tracked} birthdays)");
    if sender.is_configured() {
        println!("   📣 Push:     FCM configured");
    } else {
        println!("   📴 Push:     simulation (no server key set)");
    }
    match &config.notifier.owner {
        Some(owner) if config.notifier.enabled => {
            println!(
                "   ⏰ Notifier: {owner} (every {}s)",
                config.notifier.tick_secs
            );
        }
        _ => println!("   ⏰ Notifier: off (set --owner to enable)"),
    }
    println!();

    if config.gateway.cron_secret.is_empty() {
        tracing::warn!("⚠️ CRON_SECRET not set: the cron endpoint rejects every request");
    }

    // Local notifier loop for a single user, alongside the gateway
    let mut notifier_stop = None;
    if config.notifier.enabled
        && let Some(owner) = config.notifier.owner.clone()
    {
        let presenter: Arc<dyn Presenter> = Arc::new(ConsolePresenter::new());
        let channel: Arc<dyn Channel> = Arc::new(LocalChannel::new(presenter.clone()));
        let driver = LocalDriver::new(
            store.clone(),
            channel,
            presenter,
            &owner,
            config.notifier.tick_secs,
        );
        notifier_stop = Some(driver.stop_handle());
        tokio::spawn(run_notifier(driver));
    }

    tokio::select! {
        result = festa_gateway::start(config, store, sender) => result,
        _ = tokio::signal::ctrl_c() => {
            if let Some(stop) = notifier_stop {
                stop.notify_one();
            }
            tracing::info!("👋 Ctrl+C received, shutting down");
            Ok(())
        }
    }
}
