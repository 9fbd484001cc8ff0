//! Static registration table of the built-in workers.
//!
//! Adding a worker means adding a module here and one entry to [`builtin_definitions`].
//! Executor bindings are supplied separately when the runtime is assembled.

pub mod account_index;
pub mod config_recorder;
pub mod repo_mirror;
pub mod role_sync;

use crate::core::registry::WorkerDefinition;

/// Every built-in worker definition.
#[must_use]
pub fn builtin_definitions() -> Vec<WorkerDefinition> {
    vec![
        account_index::definition(),
        config_recorder::definition(),
        repo_mirror::definition(),
        role_sync::definition(),
    ]
}
