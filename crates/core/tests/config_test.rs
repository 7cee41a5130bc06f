use scheduler_core::config::*;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_full_config_from_toml() {
    let toml_content = r#"
[store]
thread_count = 4
misfire_threshold_ms = 5000
idle_wait_ms = 200
persistence_url = "sqlite://data/scheduler.db"

[audit]
backend = "sqlite"
database_url = "sqlite://data/audit.db"
max_connections = 3

[id_generator]
machine_id = 12

[notification]
channel_capacity = 64

[observability]
log_level = "debug"
log_format = "json"
metrics_enabled = true
metrics_port = 9100
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();
    assert_eq!(config.store.thread_count, 4);
    assert_eq!(config.store.misfire_threshold_ms, 5000);
    assert_eq!(
        config.store.persistence_url.as_deref(),
        Some("sqlite://data/scheduler.db")
    );
    assert_eq!(config.audit.backend, AuditBackend::Sqlite);
    assert_eq!(config.audit.max_connections, 3);
    assert_eq!(config.id_generator.machine_id, Some(12));
    assert_eq!(config.notification.channel_capacity, 64);
    assert_eq!(config.observability.log_format, "json");
    assert!(config.observability.metrics_enabled);
    assert_eq!(config.observability.metrics_port, 9100);
}

#[test]
fn test_environment_overrides_file() {
    let file = write_config("[store]\nthread_count = 4\nidle_wait_ms = 500\n");

    env::set_var("SCHEDULER_STORE__IDLE_WAIT_MS", "50");
    let config = AppConfig::load(file.path().to_str());
    env::remove_var("SCHEDULER_STORE__IDLE_WAIT_MS");

    let config = config.unwrap();
    assert_eq!(config.store.thread_count, 4);
    assert_eq!(config.store.idle_wait_ms, 50);
}

#[test]
fn test_invalid_file_is_rejected() {
    let file = write_config("[notification]\nchannel_capacity = 0\n");
    assert!(AppConfig::load(file.path().to_str()).is_err());

    let file = write_config("[observability]\nmetrics_enabled = true\nmetrics_port = 0\n");
    assert!(AppConfig::load(file.path().to_str()).is_err());
}

#[test]
fn test_serialized_config_skips_unset_options() {
    let text = AppConfig::default().to_toml().unwrap();
    assert!(!text.contains("persistence_url"));
    assert!(!text.contains("machine_id"));
    assert!(text.contains("[store]"));
}
