//! nanmgr daemon binary
//!
//! Loads configuration, creates the session manager and drains firmware
//! events until interrupted.

use clap::Parser;
use nanmgr::{event_channel, run_event_loop, Config, NullFirmware, SessionManager};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// NAN session manager daemon
#[derive(Parser, Debug)]
#[command(name = "nanmgr", version, about)]
struct Args {
    /// Path to configuration file (overrides default search paths)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    dump_config: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    info!("nanmgr starting");

    let (config, loaded_paths) = if let Some(config_path) = &args.config {
        match Config::load_file(config_path) {
            Ok(config) => (config, vec![config_path.clone()]),
            Err(e) => {
                error!("Failed to load configuration from {}: {}", config_path.display(), e);
                std::process::exit(1);
            }
        }
    } else {
        match Config::load() {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    };

    if loaded_paths.is_empty() {
        info!("No config files found, using defaults");
    } else {
        for path in &loaded_paths {
            info!(path = %path.display(), "Loaded config file");
        }
    }

    if args.dump_config {
        match config.to_yaml() {
            Ok(yaml) => print!("{}", yaml),
            Err(e) => {
                error!("Failed to serialize configuration: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let watchdog = config.watchdog.clone();
    let manager = match SessionManager::new(config, NullFirmware) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        max_ndp = manager.config().limits.max_ndp_instances(),
        max_ndl_slots = manager.config().limits.max_ndl_slots(),
        max_services = manager.config().limits.max_services(),
        "Session manager created"
    );

    // No radio backend feeds this channel yet; the sender is held so the
    // loop keeps running until shutdown.
    let (event_tx, event_rx) = event_channel(watchdog.event_buffer());
    let event_loop = tokio::spawn(run_event_loop(Arc::clone(&manager), event_rx, watchdog));

    info!("nanmgr running, press Ctrl+C to exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    info!("nanmgr shutting down");

    manager.disable(0);
    drop(event_tx);
    if let Err(e) = event_loop.await {
        warn!("Event loop ended abnormally: {}", e);
    }

    info!(snapshot = %manager.snapshot(), "nanmgr shutdown complete");
}
