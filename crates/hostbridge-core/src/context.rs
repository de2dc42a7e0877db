//! Extension execution contexts and the capability API.
//!
//! An [`ExtensionContext`] is created by the host right before an extension's
//! initializer runs and lives until the extension is unloaded. Extensions only
//! ever see `&ExtensionContext`; the host keeps ownership.

use crate::descriptor::ExtensionDescriptor;
use crate::dispatcher::{self, DispatchCallback, Dispatcher, DispatcherState, Payload};
use crate::error::{HostResult, ScriptResult};
use crate::host::{Collaborators, LogLevel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The operations an extension may perform through its context.
pub trait ExtensionApi {
    /// Log a message at info level, tagged with the extension name.
    fn log(&self, message: &str);

    /// Log a message at the given level.
    fn log_at(&self, level: LogLevel, message: &str);

    /// Evaluate `source` in the host scripting engine under unit `unit`.
    fn evaluate(&self, unit: &str, source: &str) -> ScriptResult;

    /// Read an environment value. `None` means unset, never an error.
    fn get_env(&self, name: &str) -> Option<String>;

    /// Defer `callback` to a later scheduling point. Returns its sequence number.
    ///
    /// Fails only with `ContextClosed` once teardown has begun.
    fn dispatch(&self, payload: Payload, callback: DispatchCallback) -> HostResult<u64>;
}

/// What to do with callbacks still queued when a context is torn down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownPolicy {
    /// Run every remaining entry, in order, before teardown completes.
    #[default]
    Drain,
    /// Drop remaining entries, logging each one.
    Discard,
}

/// Outcome of tearing down a context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Leftover entries that ran successfully during teardown.
    pub executed: usize,
    /// Leftover entries that ran and failed during teardown.
    pub failed: usize,
    /// Leftover entries dropped without running.
    pub discarded: usize,
}

/// Execution state for one activated extension.
pub struct ExtensionContext {
    descriptor: Arc<ExtensionDescriptor>,
    collaborators: Collaborators,
    pub(crate) dispatcher: Dispatcher,
}

impl ExtensionContext {
    pub(crate) fn new(descriptor: Arc<ExtensionDescriptor>, collaborators: Collaborators) -> Self {
        Self {
            descriptor,
            collaborators,
            dispatcher: Dispatcher::new(),
        }
    }

    /// Get the extension name.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Get the extension version.
    pub fn version(&self) -> &str {
        self.descriptor.version()
    }

    pub fn descriptor(&self) -> &ExtensionDescriptor {
        &self.descriptor
    }

    /// Number of callbacks waiting to run.
    pub fn pending(&self) -> usize {
        self.dispatcher.pending()
    }

    pub fn dispatcher_state(&self) -> DispatcherState {
        self.dispatcher.state()
    }

    /// Run pending callbacks on the calling thread.
    pub(crate) fn drain(&self) -> usize {
        self.dispatcher.drain(self)
    }

    /// Close the dispatcher and settle leftover entries according to `policy`.
    ///
    /// Waits for any in-flight callback before touching the queue.
    pub(crate) fn close(&self, policy: TeardownPolicy) -> TeardownReport {
        let leftovers = self.dispatcher.close();
        let mut report = TeardownReport::default();

        if leftovers.is_empty() {
            debug!(extension = %self.name(), "Context closed with empty queue");
            return report;
        }

        match policy {
            TeardownPolicy::Drain => {
                info!(
                    extension = %self.name(),
                    pending = leftovers.len(),
                    "Running pending callbacks before teardown"
                );
                for entry in leftovers {
                    if dispatcher::execute(self, entry) {
                        report.executed += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
            TeardownPolicy::Discard => {
                for entry in leftovers {
                    let message = format!("Discarding callback #{} at teardown", entry.seq());
                    warn!(extension = %self.name(), seq = entry.seq(), "{}", message);
                    self.log_at(LogLevel::Warn, &message);
                    report.discarded += 1;
                }
            }
        }

        report
    }
}

impl ExtensionApi for ExtensionContext {
    fn log(&self, message: &str) {
        self.log_at(LogLevel::Info, message);
    }

    fn log_at(&self, level: LogLevel, message: &str) {
        self.collaborators.log_sink.log(self.name(), level, message);
    }

    fn evaluate(&self, unit: &str, source: &str) -> ScriptResult {
        debug!(extension = %self.name(), unit = %unit, "Evaluating script");
        self.collaborators
            .script_bridge
            .evaluate(self.name(), unit, source)
    }

    fn get_env(&self, name: &str) -> Option<String> {
        self.collaborators.env_store.get(name)
    }

    fn dispatch(&self, payload: Payload, callback: DispatchCallback) -> HostResult<u64> {
        self.dispatcher.enqueue(self.name(), callback, payload)
    }
}
