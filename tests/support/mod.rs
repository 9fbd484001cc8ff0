//! Shared fixtures for dispatch scenario tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use fleet_dispatch::builders::{build_queues, build_registry};
use fleet_dispatch::config::{DispatchConfig, WorkerConfig};
use fleet_dispatch::core::{
    Account, AccountInventory, DispatchContext, Dispatcher, FanOutStrategy, FieldSpec, FieldType,
    InMemoryAuditSink, InvocationSource, ObjectSchema, PayloadSchema, RenderJob, TaskMessage,
    TimedFrequency, WorkerDefinition,
};
use fleet_dispatch::infra::{
    InMemoryDeadLetterQueue, InMemoryQueue, InMemoryStore, MessageQueue, StaticInventory,
    TemplateStoreClient,
};

pub const FAN_OUT: &str = "render-jobs";

pub const BASELINE: &str = "BaselineWorker";
pub const BASELINE_QUEUE: &str = "baseline-tasks";
pub const TAGGER: &str = "TaggerWorker";
pub const TAGGER_QUEUE: &str = "tagger-tasks";
pub const MIRROR: &str = "MirrorWorker";
pub const MIRROR_QUEUE: &str = "mirror-tasks";

pub const ALPHA: &str = "111111111111";
pub const BRAVO: &str = "222222222222";
pub const ROOT: &str = "999999999999";

pub const EAST: &str = "us-east-1";
pub const WEST: &str = "us-west-2";

/// Two member accounts and the organization root.
pub fn inventory() -> AccountInventory {
    AccountInventory::from_accounts([
        Account::new(ALPHA, "alpha")
            .with_tag("env", "prod")
            .with_org_unit("ou-prod-1", "Production")
            .with_regions([EAST, WEST]),
        Account::new(BRAVO, "bravo")
            .with_tag("env", "dev")
            .with_org_unit("ou-dev-1", "Development")
            .with_regions([EAST, WEST]),
        Account::new(ROOT, "management").org_root().with_regions([EAST]),
    ])
}

pub fn definitions() -> Vec<WorkerDefinition> {
    vec![
        WorkerDefinition::new(
            BASELINE,
            FanOutStrategy::AccountRegion,
            PayloadSchema::new(Vec::new()).with_configuration(ObjectSchema::closed(vec![
                FieldSpec::required("Level", FieldType::Integer),
                FieldSpec::optional("Owner", FieldType::String).substitutable(),
            ])),
        ),
        WorkerDefinition::new(
            TAGGER,
            FanOutStrategy::Account,
            PayloadSchema::new(vec![FieldSpec::required("TagKey", FieldType::String)]),
        ),
        WorkerDefinition::new(
            MIRROR,
            FanOutStrategy::Single,
            PayloadSchema::new(vec![FieldSpec::required("Repository", FieldType::String)]),
        ),
    ]
}

fn worker(
    prefix: &str,
    queue: &str,
    sources: &[InvocationSource],
    frequency: Option<TimedFrequency>,
) -> WorkerConfig {
    WorkerConfig {
        enabled: true,
        template_prefix: prefix.to_string(),
        invocation_queue: queue.to_string(),
        invocation_sources: sources.iter().copied().collect::<BTreeSet<_>>(),
        timed_frequency: frequency,
    }
}

pub fn config() -> DispatchConfig {
    let mut cfg = DispatchConfig::new(FAN_OUT)
        .with_worker(
            BASELINE,
            worker(
                "Baseline/",
                BASELINE_QUEUE,
                &[InvocationSource::Timed, InvocationSource::StoreEvent],
                Some(TimedFrequency::Hourly),
            ),
        )
        .with_worker(
            TAGGER,
            worker("Tagger/", TAGGER_QUEUE, &[InvocationSource::Timed], Some(TimedFrequency::Hourly)),
        )
        .with_worker(
            MIRROR,
            worker("Mirror/", MIRROR_QUEUE, &[InvocationSource::StoreEvent], None),
        );
    cfg.limits.max_receive_count = 3;
    cfg.limits.consumer_count = 1;
    cfg
}

/// A dispatcher over in-memory adapters with handles to inspect them.
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub store: Arc<InMemoryStore>,
    pub dead_letters: Arc<InMemoryDeadLetterQueue>,
    pub audit: Arc<InMemoryAuditSink>,
    pub queues: BTreeMap<String, Arc<InMemoryQueue>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(config())
    }

    pub fn with_config(cfg: DispatchConfig) -> Self {
        let registry = build_registry(&cfg, &definitions()).expect("registry builds");
        let dead_letters = Arc::new(InMemoryDeadLetterQueue::new());
        let mut concrete = BTreeMap::new();
        let queues = build_queues(&cfg, &registry, |name, limits| {
            let queue = Arc::new(InMemoryQueue::new(
                name,
                limits.visibility_timeout(),
                limits.max_receive_count,
                Arc::clone(&dead_letters) as _,
            ));
            concrete.insert(name.to_string(), Arc::clone(&queue));
            Ok(queue as Arc<dyn MessageQueue>)
        })
        .expect("queues build");

        let store = Arc::new(InMemoryStore::new());
        let audit = Arc::new(InMemoryAuditSink::new(1_000));
        let dispatcher = Dispatcher::new(DispatchContext {
            config: Arc::new(cfg),
            registry: Arc::new(registry),
            templates: TemplateStoreClient::new(Arc::clone(&store) as _),
            inventory: Arc::new(StaticInventory::new(inventory())),
            queues,
            audit: Some(Arc::clone(&audit) as _),
        });

        Self {
            dispatcher,
            store,
            dead_letters,
            audit,
            queues: concrete,
        }
    }

    pub fn queue(&self, name: &str) -> Arc<InMemoryQueue> {
        Arc::clone(self.queues.get(name).expect("queue registered"))
    }

    pub fn put_template(&self, key: &str, yaml: &str) {
        self.store.put(key, yaml.as_bytes().to_vec());
    }

    pub fn render_jobs(&self) -> Vec<RenderJob> {
        self.queue(FAN_OUT)
            .bodies()
            .iter()
            .map(|b| RenderJob::from_body(b).expect("render job body"))
            .collect()
    }

    pub fn tasks(&self, queue: &str) -> Vec<TaskMessage> {
        self.queue(queue)
            .bodies()
            .iter()
            .map(|b| TaskMessage::from_body(b).expect("task body"))
            .collect()
    }
}

/// Tasks keyed by `(account, region)`.
pub fn by_target(tasks: &[TaskMessage]) -> BTreeMap<(String, String), &TaskMessage> {
    tasks
        .iter()
        .map(|t| {
            (
                (
                    t.account_id.clone().unwrap_or_default(),
                    t.region.clone().unwrap_or_default(),
                ),
                t,
            )
        })
        .collect()
}
