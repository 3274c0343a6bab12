use super::{CounterStore, RedisCounterStore, SledCounterStore};
use std::sync::Arc;
use tempfile::tempdir;

fn store() -> (SledCounterStore, tempfile::TempDir) {
    let dir = tempdir().expect("create tempdir");
    let store = SledCounterStore::open(dir.path().to_str().unwrap(), "pubsubStats:").unwrap();
    (store, dir)
}

#[tokio::test]
async fn increment_creates_counter_at_one() {
    let (store, _dir) = store();
    assert_eq!(store.current_value("ops").await.unwrap(), 0);
    assert_eq!(store.increment("ops").await.unwrap(), 1);
    assert_eq!(store.increment("ops").await.unwrap(), 2);
    assert_eq!(store.current_value("ops").await.unwrap(), 2);
}

#[tokio::test]
async fn decrement_to_zero_removes_counter() {
    let (store, _dir) = store();
    store.increment("ops").await.unwrap();
    assert_eq!(store.decrement("ops").await.unwrap(), 0);
    assert_eq!(store.current_value("ops").await.unwrap(), 0);
    assert!(store.list_active_topics().await.unwrap().is_empty());
}

#[tokio::test]
async fn decrement_of_absent_counter_never_stores_negative() {
    let (store, _dir) = store();
    assert!(store.decrement("ghost").await.unwrap() <= 0);
    assert_eq!(store.current_value("ghost").await.unwrap(), 0);
    assert_eq!(store.increment("ghost").await.unwrap(), 1);
}

#[tokio::test]
async fn counter_equals_net_of_mutations() {
    let (store, _dir) = store();
    for _ in 0..7 {
        store.increment("ops").await.unwrap();
    }
    for _ in 0..3 {
        store.decrement("ops").await.unwrap();
    }
    assert_eq!(store.current_value("ops").await.unwrap(), 4);
}

#[tokio::test]
async fn concurrent_increments_are_not_lost() {
    let (store, _dir) = store();
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                store.increment("ops").await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.current_value("ops").await.unwrap(), 400);
}

#[tokio::test]
async fn list_active_topics_only_reports_prefixed_positive_counters() {
    let dir = tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let store = SledCounterStore::with_db(&db, "pubsubStats:").unwrap();
    let other = SledCounterStore::with_db(&db, "otherPrefix:").unwrap();

    store.increment("ops").await.unwrap();
    store.increment("billing").await.unwrap();
    store.increment("billing").await.unwrap();
    store.increment("gone").await.unwrap();
    store.decrement("gone").await.unwrap();
    other.increment("foreign").await.unwrap();

    let mut topics = store.list_active_topics().await.unwrap();
    topics.sort();
    assert_eq!(topics, vec!["billing", "ops"]);
}

#[tokio::test]
async fn delete_counter_resets_to_zero() {
    let (store, _dir) = store();
    store.increment("ops").await.unwrap();
    store.increment("ops").await.unwrap();
    store.delete_counter("ops").await.unwrap();
    assert_eq!(store.current_value("ops").await.unwrap(), 0);
    // deleting an absent key is fine
    store.delete_counter("ops").await.unwrap();
}

/// Connects to the server named by `REDIS_URL` under a fresh key prefix.
/// Run with `REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored`.
async fn redis_store() -> RedisCounterStore {
    let url = std::env::var("REDIS_URL").expect("REDIS_URL must point at a test server");
    let client = redis::Client::open(url.as_str()).unwrap();
    let conn = client.get_multiplexed_tokio_connection().await.unwrap();
    let prefix = format!("pcastTest:{}:", uuid::Uuid::new_v4());
    RedisCounterStore::with_connection(conn, &prefix)
}

#[tokio::test]
#[ignore = "needs a Redis server at REDIS_URL"]
async fn redis_decrement_to_zero_deletes_key() {
    let store = redis_store().await;
    assert_eq!(store.increment("ops").await.unwrap(), 1);
    assert_eq!(store.increment("ops").await.unwrap(), 2);
    assert_eq!(store.decrement("ops").await.unwrap(), 1);
    assert_eq!(store.decrement("ops").await.unwrap(), 0);

    assert_eq!(store.current_value("ops").await.unwrap(), 0);
    assert!(store.list_active_topics().await.unwrap().is_empty());

    // an absent counter is never stored negative
    assert!(store.decrement("ops").await.unwrap() <= 0);
    assert_eq!(store.increment("ops").await.unwrap(), 1);
    store.delete_counter("ops").await.unwrap();
}

#[tokio::test]
#[ignore = "needs a Redis server at REDIS_URL"]
async fn redis_concurrent_mutations_net_out() {
    let store = Arc::new(redis_store().await);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                store.increment("ops").await.unwrap();
            }
            for _ in 0..5 {
                store.decrement("ops").await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.current_value("ops").await.unwrap(), 40);
    store.delete_counter("ops").await.unwrap();
}

#[tokio::test]
#[ignore = "needs a Redis server at REDIS_URL"]
async fn redis_lists_every_topic_across_scan_pages() {
    let store = redis_store().await;
    let mut expected: Vec<String> = (0..250).map(|i| format!("topic-{i:03}")).collect();
    for topic in &expected {
        store.increment(topic).await.unwrap();
    }
    store.increment("drained").await.unwrap();
    store.decrement("drained").await.unwrap();

    let mut topics = store.list_active_topics().await.unwrap();
    topics.sort();
    expected.sort();
    assert_eq!(topics, expected);

    for topic in &expected {
        store.delete_counter(topic).await.unwrap();
    }
    assert!(store.list_active_topics().await.unwrap().is_empty());
}
