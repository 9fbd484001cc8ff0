//! Builders to construct dispatcher components from configuration.

pub mod registry_builder;

pub use registry_builder::{build_queues, build_registry};
