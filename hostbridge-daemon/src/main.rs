//! # hostbridge-daemon
//!
//! The hostbridge host daemon.
//!
//! This daemon is responsible for:
//! - Collecting the extensions linked into the binary
//! - Activating them with a context bound to the host collaborators
//! - Draining their dispatched callbacks
//! - Unloading them cleanly on shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    hostbridge-daemon                      │
//! │                                                           │
//! │  ┌──────────────┐    ┌──────────────────────────────┐    │
//! │  │  Extension   │───▶│        ExtensionHost          │    │
//! │  │  Registry    │    │  ┌─────────┐   ┌─────────┐   │    │
//! │  └──────────────┘    │  │ Context │   │ Context │   │    │
//! │                      │  │ + queue │   │ + queue │   │    │
//! │                      │  └─────────┘   └─────────┘   │    │
//! │                      └──────────────────────────────┘    │
//! │                                  │                        │
//! │        ┌─────────────┬───────────┴────────┐               │
//! │        ▼             ▼                    ▼               │
//! │   ┌─────────┐  ┌────────────┐     ┌─────────────┐        │
//! │   │ tracing │  │  console   │     │ environment │        │
//! │   │  sink   │  │  bridge    │     │   overlay   │        │
//! │   └─────────┘  └────────────┘     └─────────────┘        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//!
//! The daemon reads configuration from `$XDG_CONFIG_HOME/hostbridge/config.toml`
//! or from the file named by `HOSTBRIDGE_CONFIG`.
//!
//! ## Running
//!
//! ```bash
//! # Start the daemon
//! cargo run --bin hostbridge-daemon
//!
//! # With debug logging
//! RUST_LOG=debug cargo run --bin hostbridge-daemon
//! ```

use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use hostbridge_core::registry;
use hostbridge_daemon::bootstrap;
use hostbridge_daemon::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let loaded = Config::load_default();
    let config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => Config::default(),
    };

    bootstrap::init_tracing(&config.runtime.log_level);

    info!("Starting hostbridge-daemon v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Ok(_) => info!("Loaded configuration"),
        Err(e) => warn!("Failed to load config, using defaults: {:#}", e),
    }

    let registry = registry::global();
    info!(
        "Registered {} extension(s): {:?}",
        registry.len(),
        registry.names()
    );

    let mut host = bootstrap::build_host(&config, registry);

    let activated = host.activate_all();
    for name in host.active_names() {
        if let Some(ctx) = host.context(&name) {
            info!(
                "Extension: {} v{} - pending callbacks: {}",
                ctx.name(),
                ctx.version(),
                ctx.pending()
            );
        }
    }

    info!(
        "Daemon startup complete ({} active, {:?} scheduling, {:?} teardown)",
        activated, config.runtime.scheduling, config.runtime.teardown
    );
    info!("Press Ctrl+C to stop");

    let tick = Duration::from_millis(config.runtime.tick_interval_ms);
    bootstrap::run_until(&mut host, tick, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
        }
    })
    .await;

    info!("Daemon stopped");
    Ok(())
}
