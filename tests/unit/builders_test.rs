//! Tests for builder modules

use std::sync::Arc;

use fleet_dispatch::builders::{build_queues, build_registry};
use fleet_dispatch::config::{DispatchConfig, WorkerConfig};
use fleet_dispatch::core::{DispatchError, FanOutStrategy, InvocationSource, TimedFrequency};
use fleet_dispatch::infra::{InMemoryDeadLetterQueue, InMemoryQueue, MessageQueue};
use fleet_dispatch::workers::{builtin_definitions, config_recorder, role_sync};

fn worker(prefix: &str, queue: &str) -> WorkerConfig {
    WorkerConfig {
        enabled: true,
        template_prefix: prefix.to_string(),
        invocation_queue: queue.to_string(),
        invocation_sources: [InvocationSource::Timed, InvocationSource::StoreEvent]
            .into_iter()
            .collect(),
        timed_frequency: Some(TimedFrequency::Hourly),
    }
}

fn config() -> DispatchConfig {
    DispatchConfig::new("render-jobs")
        .with_worker(role_sync::NAME, worker("RoleSync/", "role-sync-tasks"))
        .with_worker(config_recorder::NAME, worker("ConfigRecorder/", "recorder-tasks"))
}

#[test]
fn test_registry_from_builtin_definitions() {
    let registry = build_registry(&config(), &builtin_definitions()).unwrap();
    assert_eq!(registry.len(), 2);

    let recorder = registry.require(config_recorder::NAME).unwrap();
    assert_eq!(recorder.fan_out_strategy, FanOutStrategy::AccountRegion);
    assert_eq!(recorder.target_queue, "recorder-tasks");
    assert_eq!(
        registry.worker_for_key("RoleSync/admins.yaml").map(|w| w.name.as_str()),
        Some(role_sync::NAME)
    );
}

#[test]
fn test_disabled_workers_are_skipped() {
    let mut disabled = worker("RoleSync/", "role-sync-tasks");
    disabled.enabled = false;
    let cfg = config().with_worker(role_sync::NAME, disabled);
    let registry = build_registry(&cfg, &builtin_definitions()).unwrap();
    assert!(registry.get(role_sync::NAME).is_none());
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_unknown_worker_is_config_error() {
    let cfg = config().with_worker("GhostWorker", worker("Ghost/", "ghost-tasks"));
    assert!(matches!(
        build_registry(&cfg, &builtin_definitions()),
        Err(DispatchError::Config(_))
    ));
}

#[test]
fn test_shared_prefix_is_config_error() {
    let cfg = config().with_worker(config_recorder::NAME, worker("RoleSync/", "recorder-tasks"));
    assert!(matches!(
        build_registry(&cfg, &builtin_definitions()),
        Err(DispatchError::Config(_))
    ));
}

#[test]
fn test_queues_cover_fan_out_and_workers() {
    let cfg = config();
    let registry = build_registry(&cfg, &builtin_definitions()).unwrap();
    let dead_letters = Arc::new(InMemoryDeadLetterQueue::new());
    let queues = build_queues(&cfg, &registry, |name, limits| {
        Ok(Arc::new(InMemoryQueue::new(
            name,
            limits.visibility_timeout(),
            limits.max_receive_count,
            Arc::clone(&dead_letters) as _,
        )) as Arc<dyn MessageQueue>)
    })
    .unwrap();

    let mut names: Vec<_> = queues.names().cloned().collect();
    names.sort();
    assert_eq!(names, vec!["recorder-tasks", "render-jobs", "role-sync-tasks"]);
    assert!(queues.require("missing").is_err());
}

#[test]
fn test_queue_factory_errors_propagate() {
    let cfg = config();
    let registry = build_registry(&cfg, &builtin_definitions()).unwrap();
    let result = build_queues(&cfg, &registry, |name, _| {
        Err(DispatchError::Config(format!("cannot create {name}")))
    });
    assert!(result.is_err());
}
