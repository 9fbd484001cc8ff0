//! Two-phase dispatcher.
//!
//! Phase 1 ([`Dispatcher::enumerate`]) turns a trigger into render jobs without touching
//! template contents. Phase 2 ([`Dispatcher::process`]) turns one render job into task
//! messages: fetch, validate, resolve, overlap-check, expand, render, enqueue. Both
//! phases are stateless and safe to re-run from scratch.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::DispatchConfig;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::fanout::{expand, FanOutStrategy, ResolvedTargets};
use crate::core::overrides::{assign_configurations, resolve_overrides, validate_overrides, ConfigurationSource};
use crate::core::registry::{TimedFrequency, WorkerDescriptor, WorkerRegistry};
use crate::core::render::{render_payload, RenderContext};
use crate::core::resolver::AccountResolver;
use crate::core::template::{TemplateValidator, ValidatedTemplate};
use crate::core::DispatchError;
use crate::infra::inventory::InventorySource;
use crate::infra::queue::{MessageQueue, QueueRegistry, MAX_BATCH_SIZE};
use crate::infra::store::TemplateStoreClient;
use crate::util::keys::is_template_key;

const ENQUEUE_BACKOFF: Duration = Duration::from_millis(50);

/// Render-job queue message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJob {
    /// Worker the template belongs to.
    pub worker_name: String,
    /// Template object key.
    pub template_key: String,
}

impl RenderJob {
    /// Create a job.
    pub fn new(worker_name: impl Into<String>, template_key: impl Into<String>) -> Self {
        Self {
            worker_name: worker_name.into(),
            template_key: template_key.into(),
        }
    }

    /// Encode as a queue body.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidMessage`] if encoding fails.
    pub fn to_body(&self) -> Result<String, DispatchError> {
        serde_json::to_string(self).map_err(|e| DispatchError::InvalidMessage(e.to_string()))
    }

    /// Decode a queue body.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidMessage`] if the body is not a render job.
    pub fn from_body(body: &str) -> Result<Self, DispatchError> {
        serde_json::from_str(body)
            .map_err(|e| DispatchError::InvalidMessage(format!("render job: {e}")))
    }
}

/// Task queue message handed to a worker's executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMessage {
    /// Worker name.
    pub worker_name: String,
    /// Template the task was rendered from.
    pub template_key: String,
    /// Target account; absent for SINGLE workers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Target region; present only for ACCOUNT_REGION workers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Final payload for the executor.
    pub rendered_payload: Value,
}

impl TaskMessage {
    /// Encode as a queue body.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidMessage`] if encoding fails.
    pub fn to_body(&self) -> Result<String, DispatchError> {
        serde_json::to_string(self).map_err(|e| DispatchError::InvalidMessage(e.to_string()))
    }

    /// Decode a queue body.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidMessage`] if the body is not a task message.
    pub fn from_body(body: &str) -> Result<Self, DispatchError> {
        serde_json::from_str(body).map_err(|e| DispatchError::InvalidMessage(format!("task: {e}")))
    }
}

/// External signal starting phase 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Timer signal with its frequency label.
    Timed(TimedFrequency),
    /// A template was created or updated; `key` is already decoded.
    StoreEvent {
        /// Object key.
        key: String,
    },
}

/// Result of phase 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumerationSummary {
    /// Workers considered.
    pub workers: usize,
    /// Jobs emitted onto the render-job queue.
    pub jobs: Vec<RenderJob>,
}

/// Collaborators shared by both phases; built once at start-up.
#[derive(Clone)]
pub struct DispatchContext {
    /// Process configuration.
    pub config: Arc<DispatchConfig>,
    /// Registered workers.
    pub registry: Arc<WorkerRegistry>,
    /// Template store.
    pub templates: TemplateStoreClient,
    /// Inventory snapshot source.
    pub inventory: Arc<dyn InventorySource>,
    /// Render-job queue and worker queues.
    pub queues: QueueRegistry,
    /// Optional audit trail.
    pub audit: Option<Arc<dyn AuditSink>>,
}

/// The two-phase dispatcher.
#[derive(Clone)]
pub struct Dispatcher {
    ctx: DispatchContext,
}

impl Dispatcher {
    /// Create a dispatcher over `ctx`.
    #[must_use]
    pub const fn new(ctx: DispatchContext) -> Self {
        Self { ctx }
    }

    /// Shared collaborators.
    #[must_use]
    pub const fn context(&self) -> &DispatchContext {
        &self.ctx
    }

    /// Phase 1: emit one render job per template of every worker the trigger selects.
    ///
    /// A worker whose templates cannot be listed does not stop the others; the first
    /// such error is returned after the remaining jobs are emitted.
    ///
    /// # Errors
    ///
    /// [`DispatchError::BudgetExceeded`] past the enumeration budget, a listing error,
    /// or an enqueue error.
    pub async fn enumerate(&self, trigger: &Trigger) -> Result<EnumerationSummary, DispatchError> {
        let budget = self.ctx.config.limits.enumeration_budget();
        tokio::time::timeout(budget, self.enumerate_inner(trigger))
            .await
            .map_err(|_| DispatchError::BudgetExceeded(budget))?
    }

    async fn enumerate_inner(&self, trigger: &Trigger) -> Result<EnumerationSummary, DispatchError> {
        let queue = self.ctx.queues.require(&self.ctx.config.fan_out_queue)?;
        let mut summary = EnumerationSummary::default();
        let mut first_error = None;

        match trigger {
            Trigger::Timed(frequency) => {
                let workers = self.ctx.registry.timed_workers(*frequency);
                summary.workers = workers.len();
                for worker in workers {
                    match self.ctx.templates.list_templates(&worker.template_prefix).await {
                        Ok(keys) => summary
                            .jobs
                            .extend(keys.into_iter().map(|k| RenderJob::new(&worker.name, k))),
                        Err(e) => {
                            error!(worker = %worker.name, error = %e, "template listing failed");
                            self.record(&worker.name, None, AuditAction::Failed, Some(e.to_string()));
                            first_error.get_or_insert(e);
                        }
                    }
                }
            }
            Trigger::StoreEvent { key } => {
                if let Some(worker) = self.store_event_worker(key) {
                    summary.workers = 1;
                    summary.jobs.push(RenderJob::new(&worker.name, key.clone()));
                }
            }
        }

        for chunk in summary.jobs.chunks(MAX_BATCH_SIZE) {
            let bodies = chunk
                .iter()
                .map(RenderJob::to_body)
                .collect::<Result<Vec<_>, _>>()?;
            queue.send_batch(bodies).await?;
            for job in chunk {
                self.record(&job.worker_name, Some(job.template_key.as_str()), AuditAction::Enumerated, None);
            }
        }

        info!(
            ?trigger,
            workers = summary.workers,
            jobs = summary.jobs.len(),
            "enumeration complete"
        );
        first_error.map_or(Ok(summary), Err)
    }

    fn store_event_worker(&self, key: &str) -> Option<&WorkerDescriptor> {
        if !is_template_key(key) {
            warn!(key, "ignoring store event for a non-template object");
            return None;
        }
        let Some(worker) = self.ctx.registry.worker_for_key(key) else {
            warn!(key, "no worker owns this template prefix");
            return None;
        };
        if !worker.accepts_store_events() {
            info!(key, worker = %worker.name, "worker does not run on store events");
            return None;
        }
        Some(worker)
    }

    /// Phase 2 without enqueueing: the task messages a render job produces.
    ///
    /// An empty result is a legitimate outcome, not an error.
    ///
    /// # Errors
    ///
    /// Validation-class errors for a bad template or unknown worker; store and inventory
    /// errors when those are unreachable.
    pub async fn render(&self, job: &RenderJob) -> Result<Vec<TaskMessage>, DispatchError> {
        let worker = self.ctx.registry.require(&job.worker_name)?;
        if !worker.owns_key(&job.template_key) {
            return Err(DispatchError::InvalidMessage(format!(
                "template `{}` is outside the prefix of worker `{}`",
                job.template_key, worker.name
            )));
        }

        let raw = self.ctx.templates.fetch_template(&job.template_key).await?;
        let strategy = worker.fan_out_strategy;
        let template = TemplateValidator::new(&self.ctx.config.supported_regions).validate(
            &job.template_key,
            &raw,
            strategy,
            &worker.payload_schema,
        )?;

        let tasks: Vec<TaskMessage> = match (&template.targeting, strategy) {
            (Some(targeting), FanOutStrategy::Account | FanOutStrategy::AccountRegion) => {
                let inventory = self.ctx.inventory.load().await?;
                let resolver = AccountResolver::new(&inventory, &self.ctx.config.scope_to_regions);
                let resolved = resolver.resolve_targets(targeting, strategy)?;
                let override_targets = resolve_overrides(&resolver, &template.overrides, strategy)?;
                validate_overrides(&override_targets)?;

                let assigned = assign_configurations(expand(strategy, &resolved)?, &override_targets);
                assigned
                    .into_iter()
                    .map(|(skeleton, source)| {
                        let name = skeleton
                            .account_id
                            .as_deref()
                            .and_then(|id| inventory.account(id))
                            .map(|a| a.name.clone());
                        let ctx = RenderContext::for_skeleton(&skeleton, name);
                        self.task(worker, &template, &ctx, source)
                    })
                    .collect()
            }
            _ => expand(strategy, &ResolvedTargets::Unscoped)?
                .into_iter()
                .map(|skeleton| {
                    let ctx = RenderContext::for_skeleton(&skeleton, None);
                    self.task(worker, &template, &ctx, ConfigurationSource::Default)
                })
                .collect::<Vec<_>>(),
        };

        if tasks.is_empty() {
            warn!(
                worker = %worker.name,
                template_key = %job.template_key,
                "template resolved to no targets"
            );
        } else {
            debug!(
                worker = %worker.name,
                template_key = %job.template_key,
                tasks = tasks.len(),
                "template rendered"
            );
        }
        Ok(tasks)
    }

    fn task(
        &self,
        worker: &WorkerDescriptor,
        template: &ValidatedTemplate,
        ctx: &RenderContext,
        source: ConfigurationSource,
    ) -> TaskMessage {
        let configuration = match source {
            ConfigurationSource::Default => template.default_configuration.as_ref(),
            ConfigurationSource::Override(i) => template.overrides.get(i).map(|o| &o.configuration),
        };
        let document_schema = worker.payload_schema.document_schema(worker.fan_out_strategy);
        TaskMessage {
            worker_name: worker.name.clone(),
            template_key: template.key.clone(),
            account_id: ctx.account_id.clone(),
            region: ctx.region.clone(),
            rendered_payload: render_payload(
                &document_schema,
                worker.payload_schema.configuration.as_ref(),
                &template.base,
                configuration,
                ctx,
            ),
        }
    }

    /// Enqueue tasks onto the worker's queue.
    ///
    /// Each task is retried independently; tasks already enqueued stay enqueued when a
    /// sibling fails.
    ///
    /// # Errors
    ///
    /// [`DispatchError::EnqueueFailure`] if any task exhausted its attempts.
    pub async fn publish(
        &self,
        worker: &WorkerDescriptor,
        tasks: Vec<TaskMessage>,
    ) -> Result<usize, DispatchError> {
        let queue = self.ctx.queues.require(&worker.target_queue)?;
        let limits = &self.ctx.config.limits;
        let attempts = limits.enqueue_attempts;
        let total = tasks.len();

        let results: Vec<Result<(), DispatchError>> = stream::iter(tasks.into_iter().map(|task| {
            let queue = Arc::clone(&queue);
            async move { send_with_retry(queue.as_ref(), &task, attempts).await }
        }))
        .buffer_unordered(limits.enqueue_concurrency)
        .collect()
        .await;

        let mut enqueued = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(()) => enqueued += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => {
                info!(worker = %worker.name, queue = %worker.target_queue, tasks = enqueued, "tasks enqueued");
                Ok(enqueued)
            }
            Some(e) => {
                error!(
                    worker = %worker.name,
                    queue = %worker.target_queue,
                    enqueued,
                    failed = total - enqueued,
                    error = %e,
                    "some tasks could not be enqueued"
                );
                Err(e)
            }
        }
    }

    /// Phase 2: render a job and enqueue its tasks, within the render budget.
    ///
    /// # Errors
    ///
    /// Any error from [`Dispatcher::render`] or [`Dispatcher::publish`], or
    /// [`DispatchError::BudgetExceeded`].
    pub async fn process(&self, job: &RenderJob) -> Result<usize, DispatchError> {
        let budget = self.ctx.config.limits.render_budget();
        let result = tokio::time::timeout(budget, async {
            let tasks = self.render(job).await?;
            self.record(
                &job.worker_name,
                Some(job.template_key.as_str()),
                AuditAction::Rendered,
                Some(format!("{} tasks", tasks.len())),
            );
            let worker = self.ctx.registry.require(&job.worker_name)?;
            self.publish(worker, tasks).await
        })
        .await
        .unwrap_or(Err(DispatchError::BudgetExceeded(budget)));

        match &result {
            Ok(count) => self.record(
                &job.worker_name,
                Some(job.template_key.as_str()),
                AuditAction::Enqueued,
                Some(format!("{count} tasks")),
            ),
            Err(e) => {
                error!(
                    worker = %job.worker_name,
                    template_key = %job.template_key,
                    kind = e.kind(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "render job failed"
                );
                self.record(
                    &job.worker_name,
                    Some(job.template_key.as_str()),
                    AuditAction::Failed,
                    Some(e.to_string()),
                );
            }
        }
        result
    }

    fn record(&self, worker: &str, template_key: Option<&str>, action: AuditAction, detail: Option<String>) {
        if let Some(sink) = &self.ctx.audit {
            sink.record(build_audit_event(
                worker,
                template_key.map(str::to_string),
                action,
                detail,
            ));
        }
    }
}

async fn send_with_retry(
    queue: &dyn MessageQueue,
    task: &TaskMessage,
    attempts: u32,
) -> Result<(), DispatchError> {
    let body = task.to_body()?;
    let mut last_error = None;
    for attempt in 1..=attempts {
        match queue.send(body.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    queue = queue.name(),
                    account = task.account_id.as_deref().unwrap_or("-"),
                    region = task.region.as_deref().unwrap_or("-"),
                    attempt,
                    error = %e,
                    "task enqueue failed"
                );
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(ENQUEUE_BACKOFF * attempt).await;
                }
            }
        }
    }
    Err(DispatchError::EnqueueFailure {
        queue: queue.name().to_string(),
        reason: last_error.map_or_else(|| "no attempts made".to_string(), |e| e.to_string()),
    })
}
