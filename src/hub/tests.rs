use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::timeout;

use super::registry::{Registry, Topic};
use super::{Hub, Inbox, MemoryHub, SnapshotHub, Subscription, mailbox};
use crate::persistence::{MemoryStore, SnapshotStore};
use crate::utils::error::{HubError, StoreError};

fn drain(inbox: &mut Inbox) -> Vec<Bytes> {
    let mut out = Vec::new();
    while let Ok(payload) = inbox.try_recv() {
        out.push(payload);
    }
    out
}

async fn subscribe(
    hub: &dyn Hub,
    topic: &str,
    capacity: usize,
) -> (Box<dyn Subscription>, Inbox) {
    let (tx, rx) = mailbox(capacity);
    (hub.subscribe(topic, tx).await, rx)
}

/// Store whose every call fails, standing in for an unreachable backend.
struct BrokenStore;

#[async_trait]
impl SnapshotStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
        Err(StoreError::Sled(sled::Error::Unsupported("offline".into())))
    }

    async fn set(&self, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Sled(sled::Error::Unsupported("offline".into())))
    }
}

/// Store that accepts calls and never answers them.
struct StalledStore;

#[async_trait]
impl SnapshotStore for StalledStore {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
        std::future::pending().await
    }

    async fn set(&self, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
        std::future::pending().await
    }
}

#[test]
fn test_topic_subscribe_and_unsubscribe() {
    let (tx, _rx) = mailbox(1);
    let mut topic = Topic::new("b1");
    assert!(topic.is_empty());

    topic.subscribe(7, tx);
    assert!(topic.subscribers.contains_key(&7));
    assert!(topic.unsubscribe(7));
    assert!(!topic.unsubscribe(7));
    assert!(topic.is_empty());
}

#[test]
fn test_registry_drops_empty_topics() {
    let (tx, _rx) = mailbox(1);
    let mut registry = Registry::new();

    registry.insert("b1", 1, tx.clone());
    registry.insert("b1", 2, tx.clone());
    registry.insert("b2", 3, tx);
    assert_eq!(registry.topic_count(), 2);
    assert_eq!(registry.subscriber_count("b1"), 2);

    assert!(registry.remove("b1", 1));
    assert_eq!(registry.topic_count(), 2);
    assert!(registry.remove("b1", 2));
    assert_eq!(registry.topic_count(), 1);
    assert_eq!(registry.subscribers("b1").count(), 0);

    assert!(!registry.remove("b1", 2));
    assert!(!registry.remove("missing", 1));
}

#[tokio::test]
async fn test_broadcast_skips_sender() {
    let hub = MemoryHub::new();
    let (a, mut a_rx) = subscribe(&hub, "b1", 4).await;
    let (_b, mut b_rx) = subscribe(&hub, "b1", 4).await;
    let (_c, mut c_rx) = subscribe(&hub, "b1", 4).await;

    a.broadcast(Bytes::from_static(b"hello")).await.unwrap();

    assert!(drain(&mut a_rx).is_empty());
    assert_eq!(drain(&mut b_rx), vec![Bytes::from_static(b"hello")]);
    assert_eq!(drain(&mut c_rx), vec![Bytes::from_static(b"hello")]);
}

#[tokio::test]
async fn test_saturated_subscriber_does_not_block_others() {
    let hub = MemoryHub::new();
    let (sender, _) = subscribe(&hub, "b1", 4).await;
    let (_slow, mut slow_rx) = subscribe(&hub, "b1", 1).await;
    let (_fast, mut fast_rx) = subscribe(&hub, "b1", 16).await;

    for i in 0..10 {
        sender
            .broadcast(Bytes::from(format!("msg-{i}")))
            .await
            .expect("drops are not errors");
    }

    let slow = drain(&mut slow_rx);
    assert_eq!(slow, vec![Bytes::from_static(b"msg-0")]);

    let fast = drain(&mut fast_rx);
    assert_eq!(fast.len(), 10);
    // FIFO for a single sender
    for (i, payload) in fast.iter().enumerate() {
        assert_eq!(payload, &Bytes::from(format!("msg-{i}")));
    }
}

#[tokio::test]
async fn test_topics_are_isolated() {
    let hub = MemoryHub::new();
    let (a, _) = subscribe(&hub, "b1", 4).await;
    let (_b, mut b_rx) = subscribe(&hub, "b1", 4).await;
    let (_c, mut c_rx) = subscribe(&hub, "b2", 4).await;

    a.broadcast(Bytes::from_static(b"for b1")).await.unwrap();

    assert_eq!(drain(&mut b_rx).len(), 1);
    assert!(drain(&mut c_rx).is_empty());
}

#[tokio::test]
async fn test_send_reports_slow_client() {
    let hub = MemoryHub::new();
    let (sub, mut rx) = subscribe(&hub, "b1", 1).await;

    sub.send(Bytes::from_static(b"one")).unwrap();
    assert_eq!(
        sub.send(Bytes::from_static(b"two")),
        Err(HubError::SlowClient)
    );
    assert_eq!(drain(&mut rx), vec![Bytes::from_static(b"one")]);

    drop(rx);
    assert_eq!(
        sub.send(Bytes::from_static(b"three")),
        Err(HubError::MailboxClosed)
    );
}

#[tokio::test]
async fn test_broadcast_ignores_closed_mailboxes() {
    let hub = MemoryHub::new();
    let (a, _) = subscribe(&hub, "b1", 4).await;
    let (_gone, gone_rx) = subscribe(&hub, "b1", 4).await;
    let (_b, mut b_rx) = subscribe(&hub, "b1", 4).await;
    drop(gone_rx);

    a.broadcast(Bytes::from_static(b"x")).await.unwrap();
    assert_eq!(drain(&mut b_rx).len(), 1);
}

#[tokio::test]
async fn test_close_removes_topic() {
    let hub = MemoryHub::new();
    let (a, _) = subscribe(&hub, "b1", 4).await;
    let (b, _) = subscribe(&hub, "b1", 4).await;
    assert_eq!(hub.topic_count(), 1);
    assert_eq!(hub.subscriber_count("b1"), 2);

    a.close().unwrap();
    assert_eq!(hub.subscriber_count("b1"), 1);
    b.close().unwrap();
    assert_eq!(hub.topic_count(), 0);
}

#[tokio::test]
async fn test_double_close_is_a_no_op() {
    let hub = MemoryHub::new();
    let (a, _) = subscribe(&hub, "b1", 4).await;
    let (_b, _) = subscribe(&hub, "b1", 4).await;

    a.close().unwrap();
    a.close().unwrap();
    assert_eq!(hub.subscriber_count("b1"), 1);

    assert_eq!(
        a.broadcast(Bytes::from_static(b"x")).await,
        Err(HubError::Closed)
    );
    assert_eq!(a.send(Bytes::from_static(b"x")), Err(HubError::Closed));
}

#[tokio::test]
async fn test_drop_unsubscribes() {
    let hub = MemoryHub::new();
    {
        let (_a, _) = subscribe(&hub, "b1", 4).await;
        assert_eq!(hub.topic_count(), 1);
    }
    assert_eq!(hub.topic_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_broadcast_and_close() {
    let hub = MemoryHub::new();
    let mut handles = Vec::new();

    for t in 0..8 {
        let hub = hub.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..200 {
                let (sub, _rx) = subscribe(&hub, "b1", 2).await;
                sub.broadcast(Bytes::from(format!("{t}-{i}"))).await.unwrap();
                sub.close().unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(hub.topic_count(), 0);
}

#[tokio::test]
async fn test_snapshot_delivered_to_new_subscriber_only() {
    let store = Arc::new(MemoryStore::new());
    let hub = SnapshotHub::new(MemoryHub::new(), store.clone());

    let (s1, mut s1_rx) = subscribe(&hub, "b1", 4).await;
    assert!(drain(&mut s1_rx).is_empty());

    s1.broadcast(Bytes::from_static(b"state-A")).await.unwrap();
    assert_eq!(
        store.get("board:snapshot:b1").await.unwrap(),
        Some(Bytes::from_static(b"state-A"))
    );

    let (s2, mut s2_rx) = subscribe(&hub, "b1", 4).await;
    assert_eq!(drain(&mut s2_rx), vec![Bytes::from_static(b"state-A")]);
    // the snapshot push is not a broadcast
    assert!(drain(&mut s1_rx).is_empty());

    s2.broadcast(Bytes::from_static(b"state-B")).await.unwrap();
    assert_eq!(drain(&mut s1_rx), vec![Bytes::from_static(b"state-B")]);
    assert!(drain(&mut s2_rx).is_empty());

    let (_s3, mut s3_rx) = subscribe(&hub, "b1", 4).await;
    assert_eq!(drain(&mut s3_rx), vec![Bytes::from_static(b"state-B")]);
}

#[tokio::test]
async fn test_snapshot_precedes_live_traffic() {
    let hub = SnapshotHub::new(MemoryHub::new(), Arc::new(MemoryStore::new()));
    let (s1, _) = subscribe(&hub, "b1", 4).await;
    s1.broadcast(Bytes::from_static(b"P1")).await.unwrap();
    s1.broadcast(Bytes::from_static(b"P2")).await.unwrap();

    let (_s2, mut s2_rx) = subscribe(&hub, "b1", 4).await;
    s1.broadcast(Bytes::from_static(b"P3")).await.unwrap();

    assert_eq!(
        drain(&mut s2_rx),
        vec![Bytes::from_static(b"P2"), Bytes::from_static(b"P3")]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_joiners_never_see_a_stale_snapshot() {
    const ROUNDS: u64 = 500;
    let hub = Arc::new(SnapshotHub::new(
        MemoryHub::new(),
        Arc::new(MemoryStore::new()),
    ));
    let (writer, _) = subscribe(&*hub, "b1", 4).await;
    writer.broadcast(Bytes::from("0")).await.unwrap();

    let broadcaster = tokio::spawn(async move {
        for seq in 1..=ROUNDS {
            writer.broadcast(Bytes::from(seq.to_string())).await.unwrap();
            tokio::task::yield_now().await;
        }
    });

    let mut joiners = Vec::new();
    for _ in 0..4 {
        let hub = hub.clone();
        joiners.push(tokio::spawn(async move {
            let mut joined = Vec::new();
            for _ in 0..50 {
                joined.push(subscribe(&*hub, "b1", ROUNDS as usize + 1).await);
                tokio::task::yield_now().await;
            }
            joined
        }));
    }

    broadcaster.await.unwrap();
    for joiner in joiners {
        for (_sub, mut rx) in joiner.await.unwrap() {
            let seen: Vec<u64> = drain(&mut rx)
                .iter()
                .map(|p| std::str::from_utf8(p).unwrap().parse().unwrap())
                .collect();
            assert!(!seen.is_empty(), "joiner got no snapshot");
            assert!(
                seen.windows(2).all(|w| w[0] < w[1]),
                "older payload after a newer one: {seen:?}"
            );
        }
    }
}

#[tokio::test]
async fn test_closed_subscription_cannot_overwrite_snapshot() {
    let store = Arc::new(MemoryStore::new());
    let hub = SnapshotHub::new(MemoryHub::new(), store.clone());
    let (s1, _) = subscribe(&hub, "b1", 4).await;
    let (_s2, mut s2_rx) = subscribe(&hub, "b1", 4).await;

    s1.broadcast(Bytes::from_static(b"good")).await.unwrap();
    s1.close().unwrap();
    assert!(s1.is_closed());
    assert_eq!(
        s1.broadcast(Bytes::from_static(b"after-close")).await,
        Err(HubError::Closed)
    );

    assert_eq!(
        store.get("board:snapshot:b1").await.unwrap(),
        Some(Bytes::from_static(b"good"))
    );
    assert_eq!(drain(&mut s2_rx), vec![Bytes::from_static(b"good")]);

    let (_s3, mut s3_rx) = subscribe(&hub, "b1", 4).await;
    assert_eq!(drain(&mut s3_rx), vec![Bytes::from_static(b"good")]);
}

#[tokio::test]
async fn test_stalled_store_does_not_block_delivery() {
    let hub = SnapshotHub::new(MemoryHub::new(), Arc::new(StalledStore))
        .with_store_timeout(Duration::from_millis(50));

    let delivered = timeout(Duration::from_secs(5), async {
        let (a, _) = subscribe(&hub, "b1", 4).await;
        let (_b, mut b_rx) = subscribe(&hub, "b1", 4).await;
        a.broadcast(Bytes::from_static(b"live")).await.unwrap();
        drain(&mut b_rx)
    })
    .await
    .expect("hub calls must not outlive the store timeout");

    assert_eq!(delivered, vec![Bytes::from_static(b"live")]);
}

#[tokio::test]
async fn test_snapshot_is_per_topic() {
    let hub = SnapshotHub::new(MemoryHub::new(), Arc::new(MemoryStore::new()));
    let (s1, _) = subscribe(&hub, "b1", 4).await;
    s1.broadcast(Bytes::from_static(b"b1 state")).await.unwrap();

    let (_other, mut other_rx) = subscribe(&hub, "b2", 4).await;
    assert!(drain(&mut other_rx).is_empty());
}

#[tokio::test]
async fn test_snapshot_key_prefix() {
    let store = Arc::new(MemoryStore::new());
    let hub = SnapshotHub::with_key_prefix(MemoryHub::new(), store.clone(), "snapshot:");
    let (s1, _) = subscribe(&hub, "b1", 4).await;
    s1.broadcast(Bytes::from_static(b"x")).await.unwrap();

    assert!(store.get("snapshot:b1").await.unwrap().is_some());
    assert!(store.get("board:snapshot:b1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_failure_does_not_affect_delivery() {
    let memory = MemoryHub::new();
    let hub = SnapshotHub::new(memory.clone(), Arc::new(BrokenStore));

    let (a, mut a_rx) = subscribe(&hub, "b1", 4).await;
    let (_b, mut b_rx) = subscribe(&hub, "b1", 4).await;
    assert!(drain(&mut a_rx).is_empty());
    assert!(drain(&mut b_rx).is_empty());
    assert_eq!(hub.inner().subscriber_count("b1"), 2);

    a.broadcast(Bytes::from_static(b"live")).await.unwrap();
    assert_eq!(drain(&mut b_rx), vec![Bytes::from_static(b"live")]);

    drop(a);
    drop(_b);
    assert_eq!(memory.topic_count(), 0);
}

#[tokio::test]
async fn test_snapshot_close_passes_through() {
    let memory = MemoryHub::new();
    let hub = SnapshotHub::new(memory.clone(), Arc::new(MemoryStore::new()));
    let (sub, _) = subscribe(&hub, "b1", 4).await;
    assert_eq!(sub.topic(), "b1");

    sub.close().unwrap();
    sub.close().unwrap();
    assert_eq!(memory.topic_count(), 0);
}

#[tokio::test]
async fn test_decorators_compose() {
    let inner_store = Arc::new(MemoryStore::new());
    let outer_store = Arc::new(MemoryStore::new());
    let hub: Arc<dyn Hub> = Arc::new(SnapshotHub::with_key_prefix(
        SnapshotHub::new(MemoryHub::new(), inner_store.clone()),
        outer_store.clone(),
        "outer:",
    ));

    let (s1, _) = subscribe(hub.as_ref(), "b1", 4).await;
    s1.broadcast(Bytes::from_static(b"x")).await.unwrap();

    assert!(inner_store.get("board:snapshot:b1").await.unwrap().is_some());
    assert!(outer_store.get("outer:b1").await.unwrap().is_some());
}
