//! Host collaborators bound into every extension context.
//!
//! The host provides three services: a log sink, a scripting bridge and an
//! environment store. They are shared by all contexts and must be internally
//! thread-safe.

use crate::error::{ScriptError, ScriptResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Log level for extension logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Destination for extension log lines.
///
/// Fire-and-forget: sink failures are the sink's concern and never reach the
/// extension.
pub trait LogSink: Send + Sync {
    fn log(&self, extension: &str, level: LogLevel, message: &str);
}

/// The host's embedded scripting engine, seen only at its evaluation boundary.
pub trait ScriptBridge: Send + Sync {
    /// Evaluate `source` under the logical unit `unit` on behalf of
    /// `extension`. Units are for attribution only and may repeat.
    fn evaluate(&self, extension: &str, unit: &str, source: &str) -> ScriptResult;
}

/// Read-only view of host-managed environment values.
pub trait EnvStore: Send + Sync {
    /// Get the value bound to `name`, or `None` if unset.
    fn get(&self, name: &str) -> Option<String>;
}

/// Shared handles to the host collaborators.
#[derive(Clone)]
pub struct Collaborators {
    pub log_sink: Arc<dyn LogSink>,
    pub script_bridge: Arc<dyn ScriptBridge>,
    pub env_store: Arc<dyn EnvStore>,
}

impl Collaborators {
    pub fn new(
        log_sink: Arc<dyn LogSink>,
        script_bridge: Arc<dyn ScriptBridge>,
        env_store: Arc<dyn EnvStore>,
    ) -> Self {
        Self {
            log_sink,
            script_bridge,
            env_store,
        }
    }
}

impl Default for Collaborators {
    /// Tracing logs, no scripting engine, process environment.
    fn default() -> Self {
        Self::new(
            Arc::new(TracingLogSink),
            Arc::new(UnavailableScriptBridge),
            Arc::new(ProcessEnv),
        )
    }
}

// ============================================================================
// Log sinks
// ============================================================================

/// Forwards extension logs to `tracing`, tagged with the extension name.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, extension: &str, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(extension = %extension, "{}", message),
            LogLevel::Debug => tracing::debug!(extension = %extension, "{}", message),
            LogLevel::Info => tracing::info!(extension = %extension, "{}", message),
            LogLevel::Warn => tracing::warn!(extension = %extension, "{}", message),
            LogLevel::Error => tracing::error!(extension = %extension, "{}", message),
        }
    }
}

/// A captured log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub extension: String,
    pub level: LogLevel,
    pub message: String,
}

/// Keeps every log line in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured records.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages logged by one extension, in order.
    pub fn messages_for(&self, extension: &str) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.extension == extension)
            .map(|r| r.message.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogSink for MemoryLogSink {
    fn log(&self, extension: &str, level: LogLevel, message: &str) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogRecord {
                extension: extension.to_string(),
                level,
                message: message.to_string(),
            });
    }
}

// ============================================================================
// Script bridges
// ============================================================================

/// Bridge used when the host has no scripting engine attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableScriptBridge;

impl ScriptBridge for UnavailableScriptBridge {
    fn evaluate(&self, _extension: &str, unit: &str, _source: &str) -> ScriptResult {
        Err(ScriptError::new(unit, "no scripting engine attached"))
    }
}

/// Minimal stand-in engine that understands `console.log` of string literals.
///
/// One statement per line; a trailing `;` is allowed. Each literal is written
/// to the log sink under the evaluating extension's name. Anything else fails
/// the whole evaluation before any output is produced.
pub struct ConsoleScriptBridge {
    sink: Arc<dyn LogSink>,
}

impl ConsoleScriptBridge {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    fn parse_statement(statement: &str) -> Option<&str> {
        let args = statement
            .strip_prefix("console.log(")?
            .strip_suffix(')')?
            .trim();

        let quote = args.chars().next().filter(|c| *c == '\'' || *c == '"')?;
        if args.len() < 2 || !args.ends_with(quote) {
            return None;
        }
        Some(&args[1..args.len() - 1])
    }
}

impl ScriptBridge for ConsoleScriptBridge {
    fn evaluate(&self, extension: &str, unit: &str, source: &str) -> ScriptResult {
        let mut output = Vec::new();

        for (line_no, line) in source.lines().enumerate() {
            let statement = line.trim().trim_end_matches(';').trim_end();
            if statement.is_empty() {
                continue;
            }

            match Self::parse_statement(statement) {
                Some(literal) => output.push(literal),
                None => {
                    return Err(ScriptError::new(
                        unit,
                        format!("{}:{}: unsupported statement `{}`", unit, line_no + 1, statement),
                    ))
                }
            }
        }

        for literal in output {
            self.sink.log(extension, LogLevel::Info, literal);
        }
        Ok(())
    }
}

// ============================================================================
// Environment stores
// ============================================================================

/// The process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvStore for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var_os(name).map(|v| v.to_string_lossy().into_owned())
    }
}

/// A fixed set of values.
#[derive(Debug, Default, Clone)]
pub struct MapEnv {
    values: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl FromIterator<(String, String)> for MapEnv {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl EnvStore for MapEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Overrides consulted before a fallback store.
pub struct OverlayEnv {
    overrides: MapEnv,
    fallback: Arc<dyn EnvStore>,
}

impl OverlayEnv {
    pub fn new(overrides: MapEnv, fallback: Arc<dyn EnvStore>) -> Self {
        Self {
            overrides,
            fallback,
        }
    }
}

impl EnvStore for OverlayEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.overrides.get(name).or_else(|| self.fallback.get(name))
    }
}
