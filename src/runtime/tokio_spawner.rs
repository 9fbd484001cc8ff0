//! Tokio spawner for background consumers.

use std::future::Future;

use tokio::runtime::{Handle, Runtime};

use crate::core::Spawn;

/// Spawns consumers onto a tokio runtime.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: Handle,
}

impl TokioSpawner {
    /// Spawn onto the runtime behind `handle`.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Spawn onto the runtime the caller is running in.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Build a dedicated multi-threaded runtime with `worker_threads` threads.
    ///
    /// The returned runtime must be kept alive for as long as spawned consumers run.
    ///
    /// # Errors
    ///
    /// The runtime builder's I/O error.
    pub fn with_worker_threads(worker_threads: usize) -> Result<(Self, Runtime), std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("fleet-dispatch")
            .enable_all()
            .build()?;
        Ok((Self::new(runtime.handle().clone()), runtime))
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }
}
