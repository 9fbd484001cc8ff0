//! Worker descriptors and the registry the dispatcher reads.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::fanout::FanOutStrategy;
use crate::core::schema::PayloadSchema;
use crate::core::DispatchError;
use crate::util::keys::is_template_key;

/// Signals that can invoke a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationSource {
    /// Periodic timer signal.
    #[serde(alias = "EVENTBRIDGE_TIMED_EVENT")]
    Timed,
    /// Template created or updated in the store.
    #[serde(alias = "S3")]
    StoreEvent,
}

/// Timer frequency labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimedFrequency {
    /// Every five minutes.
    FiveMin,
    /// Every fifteen minutes.
    FifteenMin,
    /// Every thirty minutes.
    ThirtyMin,
    /// Every hour.
    Hourly,
    /// Every six hours.
    SixHourly,
    /// Every twelve hours.
    TwelveHourly,
    /// Every day.
    Daily,
}

impl TimedFrequency {
    /// Label as carried by timer signals.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FiveMin => "FIVE_MIN",
            Self::FifteenMin => "FIFTEEN_MIN",
            Self::ThirtyMin => "THIRTY_MIN",
            Self::Hourly => "HOURLY",
            Self::SixHourly => "SIX_HOURLY",
            Self::TwelveHourly => "TWELVE_HOURLY",
            Self::Daily => "DAILY",
        }
    }
}

impl fmt::Display for TimedFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TimedFrequency {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| DispatchError::InvalidMessage(format!("unknown timed frequency `{s}`")))
    }
}

/// Static per-worker metadata; immutable after start-up.
#[derive(Debug, Clone)]
pub struct WorkerDescriptor {
    /// Worker name.
    pub name: String,
    /// Fan-out strategy.
    pub fan_out_strategy: FanOutStrategy,
    /// Template path prefix in the store.
    pub template_prefix: String,
    /// Signals that invoke the worker.
    pub invocation_sources: BTreeSet<InvocationSource>,
    /// Frequency for timed invocation.
    pub timed_frequency: Option<TimedFrequency>,
    /// Queue the worker's tasks go to.
    pub target_queue: String,
    /// Template payload schema.
    pub payload_schema: Arc<PayloadSchema>,
}

impl WorkerDescriptor {
    /// Whether the worker runs on `frequency` timer signals.
    #[must_use]
    pub fn is_due(&self, frequency: TimedFrequency) -> bool {
        self.invocation_sources.contains(&InvocationSource::Timed)
            && self.timed_frequency == Some(frequency)
    }

    /// Whether `key` falls under the worker's template prefix.
    ///
    /// A prefix that is itself a template key owns exactly that key.
    #[must_use]
    pub fn owns_key(&self, key: &str) -> bool {
        if is_template_key(&self.template_prefix) {
            key == self.template_prefix
        } else {
            key.starts_with(&self.template_prefix)
        }
    }

    /// Whether store events trigger the worker.
    #[must_use]
    pub fn accepts_store_events(&self) -> bool {
        self.invocation_sources.contains(&InvocationSource::StoreEvent)
    }
}

/// Static registration entry: what a worker is, independent of deployment settings.
#[derive(Debug, Clone)]
pub struct WorkerDefinition {
    /// Worker name; matches the `Workers` key in configuration.
    pub name: &'static str,
    /// Fan-out strategy.
    pub fan_out_strategy: FanOutStrategy,
    /// Template payload schema.
    pub schema: Arc<PayloadSchema>,
}

impl WorkerDefinition {
    /// Create a definition.
    #[must_use]
    pub fn new(name: &'static str, fan_out_strategy: FanOutStrategy, schema: PayloadSchema) -> Self {
        Self {
            name,
            fan_out_strategy,
            schema: Arc::new(schema),
        }
    }
}

/// Registered workers by name.
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    workers: BTreeMap<String, WorkerDescriptor>,
}

impl WorkerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Config`] for a duplicate name, or a template prefix equal to
    /// another worker's (store events would be ambiguous).
    pub fn register(&mut self, descriptor: WorkerDescriptor) -> Result<(), DispatchError> {
        if self.workers.contains_key(&descriptor.name) {
            return Err(DispatchError::Config(format!(
                "worker `{}` registered twice",
                descriptor.name
            )));
        }
        if let Some(other) = self
            .workers
            .values()
            .find(|w| w.template_prefix == descriptor.template_prefix)
        {
            return Err(DispatchError::Config(format!(
                "workers `{}` and `{}` share template prefix `{}`",
                other.name, descriptor.name, descriptor.template_prefix
            )));
        }
        self.workers.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Look up a worker.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&WorkerDescriptor> {
        self.workers.get(name)
    }

    /// Look up a worker or fail with [`DispatchError::UnknownWorker`].
    ///
    /// # Errors
    ///
    /// When no worker is registered under `name`.
    pub fn require(&self, name: &str) -> Result<&WorkerDescriptor, DispatchError> {
        self.get(name)
            .ok_or_else(|| DispatchError::UnknownWorker(name.to_string()))
    }

    /// Iterate workers in name order.
    pub fn iter(&self) -> impl Iterator<Item = &WorkerDescriptor> {
        self.workers.values()
    }

    /// Number of registered workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Workers due on a `frequency` timer signal.
    #[must_use]
    pub fn timed_workers(&self, frequency: TimedFrequency) -> Vec<&WorkerDescriptor> {
        self.workers.values().filter(|w| w.is_due(frequency)).collect()
    }

    /// The worker whose template prefix matches `key`; the longest prefix wins.
    ///
    /// The worker is returned whether or not it accepts store events.
    #[must_use]
    pub fn worker_for_key(&self, key: &str) -> Option<&WorkerDescriptor> {
        self.workers
            .values()
            .filter(|w| w.owns_key(key))
            .max_by_key(|w| w.template_prefix.len())
    }
}
