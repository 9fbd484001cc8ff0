//! Tests for configuration validation

use std::io::Write;

use fleet_dispatch::config::{DispatchConfig, Limits, WorkerConfig};
use fleet_dispatch::core::{InvocationSource, TimedFrequency};

const YAML: &str = r#"
FanOutQueue: render-jobs
ScopeToRegions: [us-east-1]
Commit: true
Limits:
  MaxReceiveCount: 5
  ConsumerCount: 2
Workers:
  RoleSyncWorker:
    TemplatePrefix: RoleSync/
    InvocationQueue: role-sync-tasks
    InvocationSources: [EVENTBRIDGE_TIMED_EVENT, S3]
    TimedFrequency: HOURLY
  RepoMirrorWorker:
    Enabled: false
    TemplatePrefix: Repo/
    InvocationQueue: repo-tasks
    InvocationSources: [STORE_EVENT]
"#;

fn timed_worker() -> WorkerConfig {
    WorkerConfig {
        enabled: true,
        template_prefix: "RoleSync/".to_string(),
        invocation_queue: "role-sync-tasks".to_string(),
        invocation_sources: [InvocationSource::Timed].into_iter().collect(),
        timed_frequency: Some(TimedFrequency::Daily),
    }
}

#[test]
fn test_yaml_config_with_defaults_and_aliases() {
    let config = DispatchConfig::from_yaml_str(YAML).expect("valid config");
    assert_eq!(config.fan_out_queue, "render-jobs");
    assert_eq!(config.inventory_key, "accountIndex.json");
    assert!(config.commit);
    assert_eq!(config.limits.max_receive_count, 5);
    assert_eq!(config.limits.consumer_count, 2);
    assert_eq!(config.limits.enqueue_attempts, Limits::default().enqueue_attempts);
    assert!(config.supported_regions.contains("eu-west-1"));

    let role_sync = &config.workers["RoleSyncWorker"];
    assert!(role_sync.invocation_sources.contains(&InvocationSource::Timed));
    assert!(role_sync.invocation_sources.contains(&InvocationSource::StoreEvent));
    assert_eq!(role_sync.timed_frequency, Some(TimedFrequency::Hourly));
    assert!(!config.workers["RepoMirrorWorker"].enabled);
}

#[test]
fn test_json_config() {
    let json = r#"{
        "FanOutQueue": "render-jobs",
        "Workers": {
            "RoleSyncWorker": {
                "TemplatePrefix": "RoleSync/",
                "InvocationQueue": "role-sync-tasks",
                "InvocationSources": ["TIMED"],
                "TimedFrequency": "SIX_HOURLY"
            }
        }
    }"#;
    let config = DispatchConfig::from_json_str(json).expect("valid config");
    assert_eq!(
        config.workers["RoleSyncWorker"].timed_frequency,
        Some(TimedFrequency::SixHourly)
    );
    assert!(!config.commit);
}

#[test]
fn test_timed_worker_requires_frequency() {
    let mut worker = timed_worker();
    assert!(worker.validate().is_ok());
    worker.timed_frequency = None;
    assert!(worker.validate().is_err());

    let mut store_only = timed_worker();
    store_only.invocation_sources = [InvocationSource::StoreEvent].into_iter().collect();
    assert!(store_only.validate().is_err());
    store_only.timed_frequency = None;
    assert!(store_only.validate().is_ok());
}

#[test]
fn test_worker_requires_queue_and_sources() {
    let mut worker = timed_worker();
    worker.invocation_queue = " ".to_string();
    assert!(worker.validate().is_err());

    let mut worker = timed_worker();
    worker.invocation_sources.clear();
    assert!(worker.validate().is_err());
}

#[test]
fn test_zero_limits_rejected() {
    let mut config = DispatchConfig::new("render-jobs");
    assert!(config.validate().is_ok());
    config.limits.enqueue_attempts = 0;
    let err = config.validate().unwrap_err();
    assert!(err.contains("EnqueueAttempts"), "{err}");
}

#[test]
fn test_scope_must_be_supported() {
    let mut config = DispatchConfig::new("render-jobs");
    config.scope_to_regions.insert("mars-north-1".to_string());
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_worker_named_in_error() {
    let mut worker = timed_worker();
    worker.template_prefix.clear();
    let config = DispatchConfig::new("render-jobs").with_worker("RoleSyncWorker", worker);
    let err = config.validate().unwrap_err();
    assert!(err.contains("RoleSyncWorker"), "{err}");
}

#[test]
fn test_config_from_path() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(YAML.as_bytes()).unwrap();
    let config = DispatchConfig::from_path(file.path()).expect("valid file");
    assert_eq!(config.workers.len(), 2);

    assert!(DispatchConfig::from_path(std::path::Path::new("/nonexistent/dispatch.yaml")).is_err());
}

#[test]
fn test_malformed_documents_are_parse_errors() {
    assert!(DispatchConfig::from_yaml_str("FanOutQueue: q\nWorkers: [1, 2]\n").is_err());
    assert!(DispatchConfig::from_yaml_str("InventoryKey: x\n").is_err());
}
