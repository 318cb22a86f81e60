//! Concurrent dispatcher: partial results, shared deadline, batches.

use std::time::{Duration, Instant};

use bytes::Bytes;
use mfsprobe::{ConnectionSettings, Dispatcher};
use mfsprobe_protocol::commands::{CLTOMA_INFO, MATOCL_INFO};
use mfsprobe_protocol::NodeState;

use crate::harness::{closed_endpoint, modern, FakeMaster, Reply};

fn dispatcher(deadline: Duration) -> Dispatcher {
    Dispatcher::new(
        deadline,
        ConnectionSettings {
            connect_timeout: Duration::from_millis(200),
            reconnect_timeout: Duration::from_millis(200),
            connect_attempts: 1,
            io_timeout: deadline,
            command_retries: 1,
        },
    )
}

#[tokio::test]
async fn test_returns_only_answering_endpoints() {
    let answering = [
        FakeMaster::answering(modern(NodeState::Leader)).await,
        FakeMaster::answering(modern(NodeState::Follower)).await,
        FakeMaster::answering(modern(NodeState::Follower)).await,
    ];
    let dropping = FakeMaster::spawn(vec![Reply::Drop]).await;
    let mut endpoints: Vec<_> = answering.iter().map(|s| s.endpoint).collect();
    endpoints.push(closed_endpoint().await);
    endpoints.push(closed_endpoint().await);
    endpoints.push(dropping.endpoint);

    let out = dispatcher(Duration::from_secs(3))
        .run(&endpoints, CLTOMA_INFO, MATOCL_INFO, Bytes::new())
        .await;

    assert_eq!(out.len(), 3);
    for s in &answering {
        assert_eq!(out[&s.endpoint.key()].len(), 205);
    }
    assert!(!out.contains_key(&dropping.endpoint.key()));
}

#[tokio::test]
async fn test_deadline_bounds_hanging_peers() {
    let mut servers = Vec::new();
    for _ in 0..5 {
        servers.push(FakeMaster::spawn(vec![Reply::Hang]).await);
    }
    let fast = FakeMaster::answering(modern(NodeState::Leader)).await;
    let mut endpoints: Vec<_> = servers.iter().map(|s| s.endpoint).collect();
    endpoints.push(fast.endpoint);

    let deadline = Duration::from_millis(400);
    let started = Instant::now();
    let out = dispatcher(deadline)
        .run(&endpoints, CLTOMA_INFO, MATOCL_INFO, Bytes::new())
        .await;
    let elapsed = started.elapsed();

    assert!(elapsed >= deadline, "returned before the deadline: {elapsed:?}");
    assert!(elapsed < deadline + Duration::from_millis(600), "took {elapsed:?}");
    assert_eq!(out.len(), 1);
    assert!(out.contains_key(&fast.endpoint.key()));
}

#[tokio::test]
async fn test_all_answer_before_deadline_returns_early() {
    let a = FakeMaster::answering(modern(NodeState::Leader)).await;
    let b = FakeMaster::answering(modern(NodeState::Elect)).await;

    let started = Instant::now();
    let out = dispatcher(Duration::from_secs(10))
        .run(&[a.endpoint, b.endpoint], CLTOMA_INFO, MATOCL_INFO, Bytes::new())
        .await;
    assert_eq!(out.len(), 2);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_zero_endpoints() {
    let out = dispatcher(Duration::from_secs(10))
        .run(&[], CLTOMA_INFO, MATOCL_INFO, Bytes::new())
        .await;
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_run_each_sends_own_payload() {
    let a = FakeMaster::answering(vec![0]).await;
    let b = FakeMaster::answering(vec![0]).await;

    let out = dispatcher(Duration::from_secs(3))
        .run_each(
            vec![
                (a.endpoint, Bytes::from_static(b"alpha")),
                (b.endpoint, Bytes::from_static(b"beta")),
            ],
            CLTOMA_INFO,
            MATOCL_INFO,
        )
        .await;
    assert_eq!(out.len(), 2);
    assert_eq!(a.last_payload(), b"alpha".to_vec());
    assert_eq!(b.last_payload(), b"beta".to_vec());
}

#[tokio::test]
async fn test_batch_per_endpoint() {
    let a = FakeMaster::answering(vec![1, 1]).await;
    let b = FakeMaster::answering(vec![2]).await;
    let stuck = FakeMaster::spawn(vec![Reply::info(vec![3]), Reply::Hang]).await;
    let payloads = vec![Bytes::from_static(&[0]), Bytes::from_static(&[1])];

    let out = dispatcher(Duration::from_millis(800))
        .run_batch(
            vec![
                (a.endpoint, payloads.clone()),
                (b.endpoint, payloads.clone()),
                (stuck.endpoint, payloads),
            ],
            CLTOMA_INFO,
            MATOCL_INFO,
        )
        .await;

    assert_eq!(out.len(), 2);
    assert_eq!(out[&a.endpoint.key()].len(), 2);
    assert_eq!(&out[&b.endpoint.key()][1][..], &[2]);
    assert!(!out.contains_key(&stuck.endpoint.key()));
    assert_eq!(a.connections(), 1);
}
