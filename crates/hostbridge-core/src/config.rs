//! Host-side runtime policy.
//!
//! These types are deserialized from the `[runtime]`, `activate` and
//! `[extensions.*]` parts of the daemon configuration file.

use crate::context::TeardownPolicy;
use crate::descriptor::InitData;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where dispatched callbacks execute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingMode {
    /// Drained on the host's own thread whenever it calls `run_pending`.
    #[default]
    Cooperative,
    /// Drained by one background task per context.
    Worker,
}

/// Scheduling and teardown policy plus per-extension settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub scheduling: SchedulingMode,

    #[serde(default)]
    pub teardown: TeardownPolicy,

    /// Extensions to activate. `None` activates everything registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activate: Option<Vec<String>>,

    #[serde(default)]
    pub extensions: HashMap<String, ExtensionSettings>,
}

/// Per-extension host settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Passed through to the initializer untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_data: Option<InitData>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            init_data: None,
        }
    }
}

impl RuntimeConfig {
    /// Whether the host configuration allows activating `name`.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.extensions.get(name).map(|s| s.enabled).unwrap_or(true)
    }

    /// Configured init data for `name`, if any.
    pub fn init_data(&self, name: &str) -> Option<&InitData> {
        self.extensions
            .get(name)
            .and_then(|s| s.init_data.as_ref())
    }
}
