//! # Fleet Dispatch
//!
//! Account-resolution and fan-out dispatch engine for multi-account cloud automation.
//!
//! Operators drop declarative YAML templates into an object store, one prefix per worker.
//! The engine turns every template into per-target tasks in two phases:
//!
//! 1. **Enumerate.** A timer or store event selects workers and lists their templates.
//!    One render job per template goes onto the render-job queue, in batches of ten.
//! 2. **Render.** Each render job is validated against the worker's payload schema,
//!    its account filters are resolved against an inventory snapshot, overrides are
//!    checked for overlap, and the template is expanded by the worker's fan-out
//!    strategy into one task message per target.
//!
//! Workers are plain [`TaskExecutor`](core::TaskExecutor) implementations bound to
//! their task queue; the dispatcher itself never mutates infrastructure.
//!
//! ## Fan-out strategies
//!
//! - `SINGLE`: one task per template, no account context.
//! - `ACCOUNT`: one task per resolved account.
//! - `ACCOUNT_REGION`: one task per resolved account and enabled region.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use fleet_dispatch::builders::{build_queues, build_registry};
//! use fleet_dispatch::config::DispatchConfig;
//! use fleet_dispatch::core::{DispatchContext, Dispatcher};
//! use fleet_dispatch::infra::{FileSystemStore, StoreInventory, TemplateStoreClient};
//! use fleet_dispatch::runtime::{handle_timed_event, ExecutorHost, TokioSpawner};
//!
//! let config = Arc::new(DispatchConfig::from_env().map_err(anyhow::Error::msg)?);
//! let registry = Arc::new(build_registry(&config, &fleet_dispatch::workers::builtin_definitions())?);
//! let queues = build_queues(&config, &registry, make_queue)?;
//! let store = Arc::new(FileSystemStore::new("/srv/templates"));
//!
//! let dispatcher = Dispatcher::new(DispatchContext {
//!     config: Arc::clone(&config),
//!     registry,
//!     templates: TemplateStoreClient::new(store.clone()),
//!     inventory: Arc::new(StoreInventory::new(store, config.inventory_key.clone())),
//!     queues,
//!     audit: None,
//! });
//!
//! let host = ExecutorHost::new(dispatcher.clone(), TokioSpawner::current());
//! host.start_render_consumers()?;
//! host.bind("RoleSyncWorker", Arc::new(my_role_sync_executor))?;
//!
//! handle_timed_event(&dispatcher, "HOURLY").await?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Domain types and the dispatch engine.
pub mod core;
/// Process configuration.
pub mod config;
/// Builders to construct the worker registry and queues from configuration.
pub mod builders;
/// Adapters for queues, dead letters, object stores and inventory sources.
pub mod infra;
/// Invocation entry points, consumers and the tokio spawner.
pub mod runtime;
/// Shared utilities.
pub mod util;
/// Built-in worker definitions.
pub mod workers;
