//! Extension registration records and descriptors.
//!
//! Each extension module presents exactly one [`ExtensionRegistration`] to the
//! runtime at link time. The registry turns it into an immutable
//! [`ExtensionDescriptor`] that lives for the rest of the process.

use crate::context::ExtensionContext;
use crate::error::{HostError, HostResult};
use std::fmt;

/// Opaque data the host passes through from its own configuration.
pub type InitData = toml::Value;

/// Entry point invoked once per activation.
///
/// Returns `true` on success. `init_data` is `None` when the host has nothing
/// configured for the extension.
pub type Initializer = fn(&ExtensionContext, Option<&InitData>) -> bool;

/// Optional hook invoked when the extension is unloaded.
pub type Teardown = fn(&ExtensionContext);

/// The record an extension module presents to the runtime at load time.
///
/// Built entirely from `'static` data so it can sit in a link-time slice.
#[derive(Clone, Copy)]
pub struct ExtensionRegistration {
    /// Unique extension name.
    pub name: &'static str,

    /// Declared version string.
    pub version: &'static str,

    /// Human-readable description.
    pub description: &'static str,

    /// Activation entry point.
    pub initializer: Initializer,

    /// Unload hook.
    pub teardown: Option<Teardown>,
}

impl fmt::Debug for ExtensionRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistration")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("has_teardown", &self.teardown.is_some())
            .finish()
    }
}

/// Immutable metadata identifying a registered extension.
#[derive(Clone)]
pub struct ExtensionDescriptor {
    name: String,
    version: String,
    description: String,
    initializer: Initializer,
    teardown: Option<Teardown>,
}

impl ExtensionDescriptor {
    /// Create a descriptor, rejecting an empty name.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
        initializer: Initializer,
    ) -> HostResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(HostError::InvalidDescriptor(
                "Extension name cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            name,
            version: version.into(),
            description: description.into(),
            initializer,
            teardown: None,
        })
    }

    /// Attach an unload hook.
    pub fn with_teardown(mut self, teardown: Teardown) -> Self {
        self.teardown = Some(teardown);
        self
    }

    /// Get the extension name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the declared version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get the description.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn initializer(&self) -> Initializer {
        self.initializer
    }

    pub fn teardown(&self) -> Option<Teardown> {
        self.teardown
    }
}

impl TryFrom<&ExtensionRegistration> for ExtensionDescriptor {
    type Error = HostError;

    fn try_from(reg: &ExtensionRegistration) -> HostResult<Self> {
        let descriptor =
            ExtensionDescriptor::new(reg.name, reg.version, reg.description, reg.initializer)?;
        Ok(match reg.teardown {
            Some(teardown) => descriptor.with_teardown(teardown),
            None => descriptor,
        })
    }
}

impl fmt::Debug for ExtensionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("description", &self.description)
            .finish()
    }
}
