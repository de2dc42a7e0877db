//! Daemon wiring: logging, host collaborators and the scheduling loop.

use crate::config::Config;
use hostbridge_core::{
    Collaborators, ConsoleScriptBridge, ExtensionHost, ExtensionRegistry, LogSink, OverlayEnv,
    ProcessEnv, SchedulingMode, TracingLogSink,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Does nothing if a subscriber is
/// already installed.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Collaborators shared by every extension context.
///
/// Extension logs go to tracing, scripts to the console bridge, and
/// environment lookups see configured overrides before the process env.
pub fn collaborators(config: &Config) -> Collaborators {
    let log_sink: Arc<dyn LogSink> = Arc::new(TracingLogSink);
    let script_bridge = Arc::new(ConsoleScriptBridge::new(Arc::clone(&log_sink)));
    let env_store = Arc::new(OverlayEnv::new(
        config.environment_overrides(),
        Arc::new(ProcessEnv),
    ));

    Collaborators::new(log_sink, script_bridge, env_store)
}

/// Build the extension host for a configuration.
pub fn build_host(config: &Config, registry: Arc<ExtensionRegistry>) -> ExtensionHost {
    ExtensionHost::new(registry, collaborators(config), config.runtime_config())
}

/// Drive the host until `shutdown` resolves, then unload everything.
///
/// In cooperative mode pending callbacks are drained every `tick`. In worker
/// mode the per-extension workers do the draining and this only waits.
pub async fn run_until<F>(host: &mut ExtensionHost, tick: Duration, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let cooperative = host.config().scheduling == SchedulingMode::Cooperative;
    let mut interval = tokio::time::interval(tick);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,
            _ = interval.tick(), if cooperative => {
                let executed = host.run_pending();
                if executed > 0 {
                    debug!("Drained {} callback(s)", executed);
                }
            }
        }
    }

    info!("Shutting down extension host...");
    host.shutdown().await;
}
