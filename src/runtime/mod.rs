//! Invocation entry points, queue consumers and the tokio spawner.

pub mod api;
pub mod tokio_spawner;

pub use api::{
    handle_store_event, handle_timed_event, Disposition, ExecutorHost, RenderJobConsumer,
    TaskConsumer,
};
pub use tokio_spawner::TokioSpawner;
