//! Tests for tokio spawner utilities

use fleet_dispatch::core::Spawn;
use fleet_dispatch::runtime::tokio_spawner::TokioSpawner;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[test]
fn test_dedicated_runtime_spawner() {
    let (spawner, runtime) = TokioSpawner::with_worker_threads(1).expect("runtime builds");
    let (tx, rx) = std::sync::mpsc::channel();
    spawner.spawn(async move {
        tx.send("done").unwrap();
    });
    assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(), "done");
    drop(runtime);
}
