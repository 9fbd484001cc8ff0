//! Builders to construct the worker registry and queues from configuration.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{DispatchConfig, Limits};
use crate::core::registry::{WorkerDefinition, WorkerDescriptor, WorkerRegistry};
use crate::core::DispatchError;
use crate::infra::queue::{MessageQueue, QueueRegistry};

/// Combine enabled worker settings with their static definitions.
///
/// Definitions without settings are not registered.
///
/// # Errors
///
/// [`DispatchError::Config`] if the configuration is invalid, names a worker with no
/// definition, or registers two workers under one template prefix.
pub fn build_registry(
    cfg: &DispatchConfig,
    definitions: &[WorkerDefinition],
) -> Result<WorkerRegistry, DispatchError> {
    cfg.validate()
        .map_err(|e| DispatchError::Config(format!("config invalid: {e}")))?;

    let mut registry = WorkerRegistry::new();
    for (name, worker) in &cfg.workers {
        if !worker.enabled {
            debug!(worker = %name, "worker disabled");
            continue;
        }
        let definition = definitions
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| DispatchError::Config(format!("no worker definition named `{name}`")))?;
        registry.register(WorkerDescriptor {
            name: name.clone(),
            fan_out_strategy: definition.fan_out_strategy,
            template_prefix: worker.template_prefix.clone(),
            invocation_sources: worker.invocation_sources.clone(),
            timed_frequency: worker.timed_frequency,
            target_queue: worker.invocation_queue.clone(),
            payload_schema: Arc::clone(&definition.schema),
        })?;
    }
    info!(workers = registry.len(), "worker registry built");
    Ok(registry)
}

/// Create the render-job queue and every registered worker's queue using `queue_factory`.
///
/// # Errors
///
/// The factory's error.
pub fn build_queues<F>(
    cfg: &DispatchConfig,
    registry: &WorkerRegistry,
    mut queue_factory: F,
) -> Result<QueueRegistry, DispatchError>
where
    F: FnMut(&str, &Limits) -> Result<Arc<dyn MessageQueue>, DispatchError>,
{
    let mut names = BTreeSet::new();
    names.insert(cfg.fan_out_queue.clone());
    names.extend(registry.iter().map(|w| w.target_queue.clone()));

    let mut queues = QueueRegistry::new();
    for name in &names {
        queues.insert(queue_factory(name, &cfg.limits)?);
    }
    Ok(queues)
}
