//! The runtime driver.
//!
//! [`ExtensionHost`] selects registered extensions, builds one context per
//! activation, runs the initializer exactly once, and drives or delegates
//! callback draining according to [`SchedulingMode`]. Teardown settles leftover
//! callbacks per [`TeardownPolicy`] before the context is released.

use crate::config::{RuntimeConfig, SchedulingMode};
use crate::context::{ExtensionApi, ExtensionContext, TeardownPolicy, TeardownReport};
use crate::dispatcher::{panic_message, DispatcherState};
use crate::error::{HostError, HostResult};
use crate::host::{Collaborators, LogLevel};
use crate::registry::ExtensionRegistry;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct ActiveExtension {
    context: Arc<ExtensionContext>,
    worker: Option<JoinHandle<()>>,
}

/// Owns the contexts of all active extensions.
pub struct ExtensionHost {
    registry: Arc<ExtensionRegistry>,
    collaborators: Collaborators,
    config: RuntimeConfig,
    active: BTreeMap<String, ActiveExtension>,
    /// Extensions whose last activation failed, with the reason.
    failed: BTreeMap<String, String>,
}

impl ExtensionHost {
    pub fn new(
        registry: Arc<ExtensionRegistry>,
        collaborators: Collaborators,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            registry,
            collaborators,
            config,
            active: BTreeMap::new(),
            failed: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Activate one extension by name.
    ///
    /// Builds a fresh context and invokes the initializer once. A `false`
    /// return or a panic leaves the extension inactive; anything it managed to
    /// dispatch is discarded with a diagnostic.
    pub fn activate(&mut self, name: &str) -> HostResult<()> {
        if self.active.contains_key(name) {
            return Err(HostError::AlreadyActive(name.to_string()));
        }

        if !self.config.is_enabled(name) {
            info!(extension = %name, "Skipping disabled extension");
            return Err(HostError::Disabled(name.to_string()));
        }

        let descriptor = self.registry.lookup(name)?;

        let handle = match self.config.scheduling {
            SchedulingMode::Cooperative => None,
            SchedulingMode::Worker => Some(Handle::try_current().map_err(|_| {
                HostError::SchedulerUnavailable(
                    "worker scheduling requires a tokio runtime".to_string(),
                )
            })?),
        };

        info!(
            extension = %descriptor.name(),
            version = %descriptor.version(),
            "Activating extension"
        );

        let context = Arc::new(ExtensionContext::new(
            Arc::clone(&descriptor),
            self.collaborators.clone(),
        ));

        let initializer = descriptor.initializer();
        let init_data = self.config.init_data(name);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| initializer(&*context, init_data)));

        let reason = match outcome {
            Ok(true) => None,
            Ok(false) => Some("initializer returned failure".to_string()),
            Err(panic) => Some(format!("initializer {}", panic_message(&*panic))),
        };

        if let Some(reason) = reason {
            let err = HostError::InitializationFailed {
                name: name.to_string(),
                reason: reason.clone(),
            };
            error!(extension = %name, "{}", err);
            context.log_at(LogLevel::Error, &err.to_string());
            context.close(TeardownPolicy::Discard);
            self.failed.insert(name.to_string(), reason);
            return Err(err);
        }

        self.failed.remove(name);
        let worker = handle.map(|h| spawn_worker(&h, Arc::clone(&context)));

        debug!(
            extension = %name,
            pending = context.pending(),
            "Extension initialized"
        );
        self.active
            .insert(name.to_string(), ActiveExtension { context, worker });
        Ok(())
    }

    /// Activate the configured extensions, or every registered one.
    ///
    /// Failures are logged and skipped. Returns the number newly activated.
    pub fn activate_all(&mut self) -> usize {
        let names = self
            .config
            .activate
            .clone()
            .unwrap_or_else(|| self.registry.names());

        let mut activated = 0;
        for name in names {
            if self.active.contains_key(&name) {
                continue;
            }
            match self.activate(&name) {
                Ok(()) => activated += 1,
                Err(HostError::Disabled(_)) => {}
                // Already logged with the extension attributed.
                Err(HostError::InitializationFailed { .. }) => {}
                Err(e) => warn!(extension = %name, "Failed to activate extension: {}", e),
            }
        }

        info!("Activated {} extension(s)", activated);
        activated
    }

    /// Drain every active context on the calling thread.
    ///
    /// This is the cooperative scheduling point. In worker mode it is harmless:
    /// a context already being drained by its worker is skipped.
    pub fn run_pending(&self) -> usize {
        self.active
            .values()
            .map(|active| active.context.drain())
            .sum()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    /// Names of active extensions, sorted.
    pub fn active_names(&self) -> Vec<String> {
        self.active.keys().cloned().collect()
    }

    /// Non-owning handle to an active extension's context.
    pub fn context(&self, name: &str) -> Option<&ExtensionContext> {
        self.active.get(name).map(|a| a.context.as_ref())
    }

    /// Callbacks waiting to run for an active extension.
    pub fn pending(&self, name: &str) -> Option<usize> {
        self.active.get(name).map(|a| a.context.pending())
    }

    /// Why the last activation of `name` failed, if it did.
    pub fn failure(&self, name: &str) -> Option<&str> {
        self.failed.get(name).map(String::as_str)
    }

    /// Unload one extension.
    ///
    /// Stops new dispatches, waits for the worker (if any), settles leftover
    /// callbacks, then runs the extension's teardown hook.
    pub async fn unload(&mut self, name: &str) -> HostResult<TeardownReport> {
        let active = self
            .active
            .remove(name)
            .ok_or_else(|| HostError::NotFound(name.to_string()))?;

        active.context.dispatcher.shut();
        if let Some(worker) = active.worker {
            if let Err(e) = worker.await {
                error!(extension = %name, "Dispatch worker ended abnormally: {}", e);
            }
        }

        Ok(teardown(&active.context, self.config.teardown))
    }

    /// Unload every active extension.
    pub async fn shutdown(&mut self) {
        let names = self.active_names();
        info!("Unloading {} extension(s)", names.len());

        for name in names {
            if let Err(e) = self.unload(&name).await {
                warn!(extension = %name, "Failed to unload extension: {}", e);
            }
        }
    }
}

impl Drop for ExtensionHost {
    fn drop(&mut self) {
        for (name, active) in std::mem::take(&mut self.active) {
            warn!(extension = %name, "Host dropped without shutdown; tearing down");
            if let Some(worker) = &active.worker {
                // The worker exits on its own once it observes the closed state.
                active.context.dispatcher.shut();
                debug!(extension = %name, finished = worker.is_finished(), "Detaching worker");
            }
            teardown(&active.context, self.config.teardown);
        }
    }
}

fn teardown(context: &ExtensionContext, policy: TeardownPolicy) -> TeardownReport {
    let report = context.close(policy);

    if let Some(hook) = context.descriptor().teardown() {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| hook(context))) {
            let message = format!("Teardown hook {}", panic_message(&*panic));
            error!(extension = %context.name(), "{}", message);
            context.log_at(LogLevel::Error, &message);
        }
    }

    info!(
        extension = %context.name(),
        executed = report.executed,
        failed = report.failed,
        discarded = report.discarded,
        "Extension unloaded"
    );
    report
}

/// One background task per context: wait for a wakeup, drain off the async
/// threads, repeat until the dispatcher is closed.
fn spawn_worker(handle: &Handle, context: Arc<ExtensionContext>) -> JoinHandle<()> {
    handle.spawn(async move {
        debug!(extension = %context.name(), "Dispatch worker started");
        loop {
            context.dispatcher.notified().await;
            if context.dispatcher_state() == DispatcherState::Closed {
                break;
            }

            let ctx = Arc::clone(&context);
            match tokio::task::spawn_blocking(move || ctx.drain()).await {
                Ok(executed) => debug!(extension = %context.name(), executed, "Drained callbacks"),
                Err(e) => error!(extension = %context.name(), "Drain task failed: {}", e),
            }
        }
        debug!(extension = %context.name(), "Dispatch worker stopped");
    })
}
