//! Extension registry.
//!
//! Extension modules self-register at link time through
//! [`register_extension!`](crate::register_extension), which places their
//! [`ExtensionRegistration`] record in the [`EXTENSIONS`] slice. The
//! process-wide registry returned by [`global`] is built from that slice on
//! first access. Tests and embedders can construct their own
//! [`ExtensionRegistry`] instead.

use crate::descriptor::{ExtensionDescriptor, ExtensionRegistration};
use crate::error::{HostError, HostResult};
use linkme::distributed_slice;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Registration records contributed by every linked extension module.
#[distributed_slice]
pub static EXTENSIONS: [ExtensionRegistration] = [..];

static GLOBAL: Lazy<Arc<ExtensionRegistry>> = Lazy::new(|| {
    let registry = ExtensionRegistry::new();
    let mut registered = 0;

    for registration in EXTENSIONS {
        match registry.register_static(registration) {
            Ok(()) => registered += 1,
            Err(e) => warn!("Dropping extension registration: {}", e),
        }
    }

    info!("Registered {} extension(s)", registered);
    Arc::new(registry)
});

/// The process-wide registry, populated from [`EXTENSIONS`] on first use.
pub fn global() -> Arc<ExtensionRegistry> {
    Arc::clone(&GLOBAL)
}

/// Table mapping extension names to their descriptors.
///
/// Writes are serialized behind a lock; lookups may run concurrently. There is
/// no removal operation.
pub struct ExtensionRegistry {
    descriptors: RwLock<HashMap<String, Arc<ExtensionDescriptor>>>,
}

impl ExtensionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
        }
    }

    /// Register a descriptor. The first registration of a name wins.
    pub fn register(&self, descriptor: ExtensionDescriptor) -> HostResult<()> {
        let mut descriptors = self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if descriptors.contains_key(descriptor.name()) {
            warn!(
                extension = %descriptor.name(),
                version = %descriptor.version(),
                "Rejected duplicate extension registration"
            );
            return Err(HostError::DuplicateName(descriptor.name().to_string()));
        }

        debug!(
            extension = %descriptor.name(),
            version = %descriptor.version(),
            "Registered extension"
        );
        descriptors.insert(descriptor.name().to_string(), Arc::new(descriptor));
        Ok(())
    }

    /// Register a link-time record.
    pub fn register_static(&self, registration: &ExtensionRegistration) -> HostResult<()> {
        self.register(ExtensionDescriptor::try_from(registration)?)
    }

    /// Look up a descriptor by name.
    pub fn lookup(&self, name: &str) -> HostResult<Arc<ExtensionDescriptor>> {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| HostError::NotFound(name.to_string()))
    }

    /// Check whether a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Snapshot of registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Get the number of registered extensions.
    pub fn len(&self) -> usize {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
