//! Error types for the extension host.

use thiserror::Error;

/// Errors that can occur while registering, activating or dispatching to
/// extensions.
///
/// None of these are fatal to the process. Each one is handled at the layer
/// that detects it and surfaces as a log line naming the extension.
#[derive(Error, Debug)]
pub enum HostError {
    /// An extension with the same name is already registered.
    #[error("Extension already registered: {0}")]
    DuplicateName(String),

    /// No extension is registered under the name.
    #[error("Extension not found: {0}")]
    NotFound(String),

    /// The registration record is malformed.
    #[error("Invalid extension descriptor: {0}")]
    InvalidDescriptor(String),

    /// The context is tearing down or already closed.
    #[error("Context closed for extension: {0}")]
    ContextClosed(String),

    /// The extension already has a live context.
    #[error("Extension already active: {0}")]
    AlreadyActive(String),

    /// The extension is disabled by host configuration.
    #[error("Extension is disabled: {0}")]
    Disabled(String),

    /// The initializer reported failure.
    #[error("Initialization failed for extension '{name}': {reason}")]
    InitializationFailed { name: String, reason: String },

    /// A dispatched callback failed while executing.
    #[error("Callback #{seq} failed for extension '{name}': {reason}")]
    CallbackFailed {
        name: String,
        seq: u64,
        reason: String,
    },

    /// Worker scheduling was requested outside a tokio runtime.
    #[error("Scheduler unavailable: {0}")]
    SchedulerUnavailable(String),
}

/// Result type for host operations.
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Failure reported by the scripting bridge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Evaluation of '{unit}' failed{}", message_suffix(.message))]
pub struct ScriptError {
    /// Logical unit the source was evaluated under.
    pub unit: String,

    /// Engine-provided message, if any.
    pub message: Option<String>,
}

impl ScriptError {
    /// Create a script error with an engine message.
    pub fn new(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            message: Some(message.into()),
        }
    }
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

/// Result of evaluating a script through the bridge.
pub type ScriptResult = std::result::Result<(), ScriptError>;
