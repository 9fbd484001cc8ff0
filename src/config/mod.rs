//! Configuration models for the dispatcher, workers and limits.

pub mod dispatch;

pub use dispatch::{DispatchConfig, Limits, WorkerConfig};
