//! # hostbridge-core
//!
//! Extension registration and context dispatch for the hostbridge runtime.
//!
//! This crate provides:
//! - A process-wide extension registry populated at link time
//! - Per-extension execution contexts exposing a small capability API
//!   (logging, script evaluation, environment access, deferred callbacks)
//! - A FIFO callback dispatcher with cooperative or worker scheduling
//! - The host driver that activates, drains and tears down extensions
//!
//! ## Writing an extension
//!
//! ```ignore
//! use hostbridge_core::prelude::*;
//!
//! fn init(ctx: &ExtensionContext, _data: Option<&InitData>) -> bool {
//!     ctx.log("loaded");
//!     ctx.dispatch(None, later).is_ok()
//! }
//!
//! fn later(ctx: &ExtensionContext, _payload: Payload) -> anyhow::Result<()> {
//!     ctx.log("deferred work");
//!     Ok(())
//! }
//!
//! hostbridge_core::register_extension!(MY_EXTENSION, ExtensionRegistration {
//!     name: "my-extension",
//!     version: env!("CARGO_PKG_VERSION"),
//!     description: "Example extension",
//!     initializer: init,
//!     teardown: None,
//! });
//! ```
//!
//! The host links the extension crate and builds an [`ExtensionHost`] over
//! [`registry::global()`].

pub mod config;
pub mod context;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod registry;
pub mod runtime;

pub use config::{ExtensionSettings, RuntimeConfig, SchedulingMode};
pub use context::{ExtensionApi, ExtensionContext, TeardownPolicy, TeardownReport};
pub use descriptor::{ExtensionDescriptor, ExtensionRegistration, InitData, Initializer, Teardown};
pub use dispatcher::{DispatchCallback, DispatchEntry, DispatcherState, Payload};
pub use error::{HostError, HostResult, ScriptError, ScriptResult};
pub use host::{
    Collaborators, ConsoleScriptBridge, EnvStore, LogLevel, LogRecord, LogSink, MapEnv,
    MemoryLogSink, OverlayEnv, ProcessEnv, ScriptBridge, TracingLogSink, UnavailableScriptBridge,
};
pub use registry::ExtensionRegistry;
pub use runtime::ExtensionHost;

/// Everything an extension module needs.
pub mod prelude {
    pub use crate::context::{ExtensionApi, ExtensionContext};
    pub use crate::descriptor::{ExtensionRegistration, InitData};
    pub use crate::dispatcher::Payload;
    pub use crate::error::{HostError, ScriptError};
    pub use crate::host::LogLevel;
}

#[doc(hidden)]
pub mod __private {
    pub use linkme;
}

/// Register an extension with the process-wide registry at link time.
///
/// Expands to a static [`ExtensionRegistration`] placed in
/// [`registry::EXTENSIONS`]. Use once per extension crate.
#[macro_export]
macro_rules! register_extension {
    ($ident:ident, $registration:expr $(,)?) => {
        #[$crate::__private::linkme::distributed_slice($crate::registry::EXTENSIONS)]
        #[linkme(crate = $crate::__private::linkme)]
        static $ident: $crate::ExtensionRegistration = $registration;
    };
}
