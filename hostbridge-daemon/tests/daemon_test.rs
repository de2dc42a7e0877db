//! Integration tests for the daemon wiring.
//!
//! These tests run the linked `hello` extension through the same host loop the
//! daemon binary uses, with an in-memory log sink in place of tracing.

use hostbridge_core::registry;
use hostbridge_core::{
    Collaborators, ConsoleScriptBridge, ExtensionHost, MapEnv, MemoryLogSink, SchedulingMode,
    TeardownPolicy,
};
use hostbridge_daemon::bootstrap;
use hostbridge_daemon::config::Config;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

fn host_for(config: &Config, env: MapEnv) -> (ExtensionHost, Arc<MemoryLogSink>) {
    let sink = Arc::new(MemoryLogSink::new());
    let collaborators = Collaborators::new(
        sink.clone(),
        Arc::new(ConsoleScriptBridge::new(sink.clone())),
        Arc::new(env),
    );
    let host = ExtensionHost::new(registry::global(), collaborators, config.runtime_config());
    (host, sink)
}

#[test]
fn test_hello_is_linked() {
    assert!(registry::global().contains(extension_hello::NAME));
}

#[tokio::test]
async fn test_cooperative_loop_runs_template() {
    let config = Config::default();
    let (mut host, sink) = host_for(&config, MapEnv::new().with("HOME", "/home/daemon"));

    assert!(host.activate_all() >= 1);
    assert!(host.is_active("hello"));

    bootstrap::run_until(
        &mut host,
        Duration::from_millis(5),
        tokio::time::sleep(Duration::from_millis(50)),
    )
    .await;

    assert!(host.active_names().is_empty());
    assert_eq!(
        sink.messages_for("hello"),
        vec![
            "from wasm",
            "hello world!",
            "/home/daemon",
            "dispatched callback",
            "unloading"
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_loop_runs_template() {
    let mut config = Config::default();
    config.runtime.scheduling = SchedulingMode::Worker;
    config.activate = Some(vec!["hello".to_string()]);

    let (mut host, sink) = host_for(&config, MapEnv::new());
    assert_eq!(host.activate_all(), 1);

    bootstrap::run_until(
        &mut host,
        Duration::from_millis(5),
        tokio::time::sleep(Duration::from_millis(50)),
    )
    .await;

    let messages = sink.messages_for("hello");
    assert_eq!(messages[2], "absent");
    assert_eq!(
        messages
            .iter()
            .filter(|m| *m == "dispatched callback")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_immediate_shutdown_discards_with_diagnostic() {
    let mut config = Config::default();
    config.runtime.teardown = TeardownPolicy::Discard;
    config.activate = Some(vec!["hello".to_string()]);

    let (mut host, sink) = host_for(&config, MapEnv::new());
    host.activate_all();

    bootstrap::run_until(&mut host, Duration::from_secs(3600), async {}).await;

    let messages = sink.messages_for("hello");
    assert!(!messages.iter().any(|m| m == "dispatched callback"));
    assert!(messages
        .iter()
        .any(|m| m == "Discarding callback #0 at teardown"));
}

#[test]
fn test_config_file_disables_extension() {
    let config_content = r#"
[runtime]
log_level = "info"

[extensions.hello]
enabled = false
"#;

    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(config_content.as_bytes()).unwrap();
    let config = Config::load(temp_file.path()).unwrap();

    let (mut host, sink) = host_for(&config, MapEnv::new());
    host.activate_all();

    assert!(!host.is_active("hello"));
    assert!(sink.messages_for("hello").is_empty());
}
