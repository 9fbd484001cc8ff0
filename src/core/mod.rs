//! Domain types and the dispatch engine.

pub mod account;
pub mod audit;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod fanout;
pub mod filter;
pub mod overrides;
pub mod registry;
pub mod render;
pub mod resolver;
pub mod schema;
pub mod template;

pub use account::{Account, AccountId, AccountInventory, OrgUnit, Region, Tag};
pub use audit::{
    build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use dispatcher::{
    DispatchContext, Dispatcher, EnumerationSummary, RenderJob, TaskMessage, Trigger,
};
pub use error::{AppResult, DispatchError};
pub use executor::{Spawn, TaskExecutor};
pub use fanout::{expand, FanOutStrategy, ResolvedTargets, TaskSkeleton};
pub use filter::{AccountFilter, RegionFilter, RegionSelection};
pub use overrides::{ConfigurationSource, OverlapEntry, OverlapReport};
pub use registry::{
    InvocationSource, TimedFrequency, WorkerDefinition, WorkerDescriptor, WorkerRegistry,
};
pub use render::RenderContext;
pub use resolver::AccountResolver;
pub use schema::{
    Constraint, FieldSpec, FieldType, ObjectSchema, PayloadSchema, ValidationErrors,
};
pub use template::{OverrideConfiguration, Targeting, TemplateValidator, ValidatedTemplate};
