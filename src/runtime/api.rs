//! Invocation entry points and queue consumers.
//!
//! Triggers call [`handle_timed_event`] or [`handle_store_event`]. A
//! [`RenderJobConsumer`] drains the render-job queue one message at a time; a
//! [`TaskConsumer`] per worker queue hands tasks to the bound executor.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::dispatcher::{Dispatcher, EnumerationSummary, RenderJob, TaskMessage, Trigger};
use crate::core::executor::{Spawn, TaskExecutor};
use crate::core::registry::TimedFrequency;
use crate::core::DispatchError;
use crate::infra::queue::{MessageQueue, ReceivedMessage};
use crate::util::keys::decode_object_key;

const IDLE_POLL: Duration = Duration::from_millis(200);

/// Handle a timer signal carrying a frequency label such as `"HOURLY"`.
///
/// # Errors
///
/// [`DispatchError::InvalidMessage`] for an unknown label, otherwise any phase 1 error.
pub async fn handle_timed_event(
    dispatcher: &Dispatcher,
    frequency: &str,
) -> Result<EnumerationSummary, DispatchError> {
    let frequency: TimedFrequency = frequency.parse()?;
    dispatcher.enumerate(&Trigger::Timed(frequency)).await
}

/// Handle a store event for the URL-encoded object key `raw_key`.
///
/// # Errors
///
/// Any phase 1 error.
pub async fn handle_store_event(
    dispatcher: &Dispatcher,
    raw_key: &str,
) -> Result<EnumerationSummary, DispatchError> {
    let key = decode_object_key(raw_key);
    debug!(raw_key, key = %key, "store event");
    dispatcher.enumerate(&Trigger::StoreEvent { key }).await
}

/// What a consumer did with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed and acknowledged.
    Acked,
    /// Failed with a retryable error and released for redelivery.
    Released,
    /// Failed permanently and moved to the dead-letter queue.
    DeadLettered,
}

/// Drains the render-job queue through phase 2.
#[derive(Clone)]
pub struct RenderJobConsumer {
    dispatcher: Dispatcher,
    queue: Arc<dyn MessageQueue>,
}

impl RenderJobConsumer {
    /// Bind to the dispatcher's render-job queue.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Config`] if the queue is not registered.
    pub fn new(dispatcher: Dispatcher) -> Result<Self, DispatchError> {
        let ctx = dispatcher.context();
        let queue = ctx.queues.require(&ctx.config.fan_out_queue)?;
        Ok(Self { dispatcher, queue })
    }

    /// Receive and handle at most one render job. Returns `None` when the queue is empty.
    ///
    /// # Errors
    ///
    /// Queue errors only; job failures are reported through the [`Disposition`].
    pub async fn poll_once(&self) -> Result<Option<Disposition>, DispatchError> {
        let Some(message) = self.queue.receive(1).await?.into_iter().next() else {
            return Ok(None);
        };

        let outcome = match RenderJob::from_body(&message.body) {
            Ok(job) => self.dispatcher.process(&job).await.map(|_| ()),
            Err(e) => Err(e),
        };
        let audit = self.dispatcher.context().audit.clone();
        settle(self.queue.as_ref(), &message, outcome, audit.as_deref())
            .await
            .map(Some)
    }

    /// Poll until the process stops.
    pub async fn run(self) {
        info!(queue = self.queue.name(), "render-job consumer started");
        loop {
            match self.poll_once().await {
                Ok(Some(_)) => {}
                Ok(None) => tokio::time::sleep(IDLE_POLL).await,
                Err(e) => {
                    error!(queue = self.queue.name(), error = %e, "render-job queue unavailable");
                    tokio::time::sleep(IDLE_POLL).await;
                }
            }
        }
    }
}

/// Hands a worker's tasks to its executor.
pub struct TaskConsumer<E> {
    worker: String,
    queue: Arc<dyn MessageQueue>,
    executor: Arc<E>,
    commit: bool,
}

impl<E> Clone for TaskConsumer<E> {
    fn clone(&self) -> Self {
        Self {
            worker: self.worker.clone(),
            queue: Arc::clone(&self.queue),
            executor: Arc::clone(&self.executor),
            commit: self.commit,
        }
    }
}

impl<E: TaskExecutor> TaskConsumer<E> {
    /// Bind `executor` to the queue of the registered worker `worker`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::UnknownWorker`] or [`DispatchError::Config`] if the worker or its
    /// queue is not registered.
    pub fn new(dispatcher: &Dispatcher, worker: &str, executor: Arc<E>) -> Result<Self, DispatchError> {
        let ctx = dispatcher.context();
        let descriptor = ctx.registry.require(worker)?;
        Ok(Self {
            worker: descriptor.name.clone(),
            queue: ctx.queues.require(&descriptor.target_queue)?,
            executor,
            commit: ctx.config.commit,
        })
    }

    /// Receive and execute at most one task. Returns `None` when the queue is empty.
    ///
    /// # Errors
    ///
    /// Queue errors only.
    pub async fn poll_once(&self) -> Result<Option<Disposition>, DispatchError> {
        let Some(message) = self.queue.receive(1).await?.into_iter().next() else {
            return Ok(None);
        };

        let outcome = match TaskMessage::from_body(&message.body) {
            Ok(task) if task.worker_name != self.worker => Err(DispatchError::InvalidMessage(
                format!("task for `{}` on the queue of `{}`", task.worker_name, self.worker),
            )),
            Ok(task) => self
                .executor
                .execute(task, self.commit)
                .await
                .map_err(|e| DispatchError::Backend(format!("{e:#}"))),
            Err(e) => Err(e),
        };
        settle(self.queue.as_ref(), &message, outcome, None).await.map(Some)
    }

    /// Poll until the process stops.
    pub async fn run(self) {
        info!(worker = %self.worker, queue = self.queue.name(), commit = self.commit, "task consumer started");
        loop {
            match self.poll_once().await {
                Ok(Some(_)) => {}
                Ok(None) => tokio::time::sleep(IDLE_POLL).await,
                Err(e) => {
                    error!(worker = %self.worker, error = %e, "task queue unavailable");
                    tokio::time::sleep(IDLE_POLL).await;
                }
            }
        }
    }
}

async fn settle(
    queue: &dyn MessageQueue,
    message: &ReceivedMessage,
    outcome: Result<(), DispatchError>,
    audit: Option<&dyn AuditSink>,
) -> Result<Disposition, DispatchError> {
    match outcome {
        Ok(()) => {
            queue.ack(&message.receipt).await?;
            Ok(Disposition::Acked)
        }
        Err(e) if e.is_retryable() => {
            warn!(
                queue = queue.name(),
                message_id = %message.message_id,
                receive_count = message.receive_count,
                error = %e,
                "releasing message for redelivery"
            );
            queue.release(&message.receipt).await?;
            Ok(Disposition::Released)
        }
        Err(e) => {
            error!(
                queue = queue.name(),
                message_id = %message.message_id,
                kind = e.kind(),
                error = %e,
                "dead-lettering message"
            );
            let reason = e.to_string();
            queue.dead_letter(&message.receipt, &reason).await?;
            if let Some(sink) = audit {
                let job = RenderJob::from_body(&message.body).ok();
                sink.record(build_audit_event(
                    job.as_ref().map_or("-", |j| j.worker_name.as_str()),
                    job.as_ref().map(|j| j.template_key.clone()),
                    AuditAction::DeadLettered,
                    Some(reason),
                ));
            }
            Ok(Disposition::DeadLettered)
        }
    }
}

/// Launches the render-job consumers and task consumers on a spawner.
pub struct ExecutorHost<S> {
    dispatcher: Dispatcher,
    spawner: S,
    consumer_count: usize,
}

impl<S: Spawn> ExecutorHost<S> {
    /// Create a host using `Limits::consumer_count` consumers per queue.
    #[must_use]
    pub fn new(dispatcher: Dispatcher, spawner: S) -> Self {
        let consumer_count = dispatcher.context().config.limits.consumer_count;
        Self {
            dispatcher,
            spawner,
            consumer_count,
        }
    }

    /// Spawn the render-job consumers.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Config`] if the render-job queue is not registered.
    pub fn start_render_consumers(&self) -> Result<(), DispatchError> {
        let consumer = RenderJobConsumer::new(self.dispatcher.clone())?;
        for _ in 0..self.consumer_count {
            self.spawner.spawn(consumer.clone().run());
        }
        info!(consumers = self.consumer_count, "render-job consumers spawned");
        Ok(())
    }

    /// Bind `executor` to `worker` and spawn its task consumers.
    ///
    /// # Errors
    ///
    /// [`DispatchError::UnknownWorker`] or [`DispatchError::Config`].
    pub fn bind<E: TaskExecutor>(&self, worker: &str, executor: Arc<E>) -> Result<(), DispatchError> {
        let consumer = TaskConsumer::new(&self.dispatcher, worker, executor)?;
        for _ in 0..self.consumer_count {
            self.spawner.spawn(consumer.clone().run());
        }
        info!(worker, consumers = self.consumer_count, "task consumers spawned");
        Ok(())
    }
}
