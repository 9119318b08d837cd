//! holo-remote entry point.
//!
//! ```text
//! holo-remote                       Connect with defaults
//! holo-remote --config <path>       Use custom config TOML
//! holo-remote --listen              Wait for the peer instead of connecting
//! holo-remote --frames 600          Stop after 600 frames
//! holo-remote --gen-config          Dump default config and exit
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use holo_remote::app::RemoteApp;
use holo_remote::config::RemoteConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "holo-remote", about = "Headless holographic remoting host")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "holo-remote.toml")]
    config: PathBuf,

    /// Peer address (overrides config). Example: 192.168.1.50
    #[arg(short, long)]
    address: Option<String>,

    /// Listen for the peer instead of connecting.
    #[arg(short, long)]
    listen: bool,

    /// Stop after this many frames.
    #[arg(short, long)]
    frames: Option<u64>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&RemoteConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // The log level lives in the config, so report how loading went
    // only once the subscriber is installed.
    let loaded = RemoteConfig::read(&cli.config);
    let mut config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => RemoteConfig::default(),
    };
    if let Some(address) = cli.address {
        config.session.address = address;
    }
    if cli.listen {
        config.session.listen = true;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("holo-remote v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Ok(Some(_)) => info!("loaded config from {}", cli.config.display()),
        Ok(None) => info!("no config at {}; using defaults", cli.config.display()),
        Err(e) => warn!("invalid config {}: {e}; using defaults", cli.config.display()),
    }

    let mut app = RemoteApp::new(&config, Handle::current())?;
    let running = app.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; stopping");
            running.store(false, Ordering::SeqCst);
        }
    });

    let frames = cli.frames;
    let summary = tokio::task::spawn_blocking(move || app.run(frames)).await??;
    info!(frames = summary.frames, "shutting down");

    Ok(())
}
