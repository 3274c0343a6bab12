use super::{Event, NamespaceManager, SledTopicCatalog, Topic, TopicResolver};
use crate::client::Client;
use crate::utils::{RelayError, StoreError};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

/// Wraps the catalog with a slow, counted lookup so races are observable.
struct SlowResolver {
    catalog: SledTopicCatalog,
    lookups: AtomicUsize,
}

#[async_trait]
impl TopicResolver for SlowResolver {
    async fn resolve(&self, name: &str) -> Result<Option<Topic>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.catalog.resolve(name).await
    }
}

fn catalog(topics: &[&str]) -> (SledTopicCatalog, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let catalog = SledTopicCatalog::open(dir.path().to_str().unwrap()).unwrap();
    for topic in topics {
        catalog.register(topic).unwrap();
    }
    (catalog, dir)
}

fn manager(topics: &[&str]) -> (NamespaceManager, TempDir) {
    let (catalog, dir) = catalog(topics);
    (NamespaceManager::new(Arc::new(catalog)), dir)
}

fn client() -> (Client, mpsc::UnboundedReceiver<WsMessage>) {
    let (tx, rx) = mpsc::unbounded_channel::<WsMessage>();
    (Client::new(tx), rx)
}

#[test]
fn catalog_register_is_idempotent() {
    let (catalog, _dir) = catalog(&[]);
    let first = catalog.register("ops").unwrap();
    let second = catalog.register("ops").unwrap();
    assert_eq!(first, second);
    assert_eq!(catalog.list().unwrap().len(), 1);
    assert!(catalog.remove("ops").unwrap());
    assert!(!catalog.remove("ops").unwrap());
}

#[tokio::test]
async fn ensure_creates_namespace_once() {
    let (manager, _dir) = manager(&["ops"]);
    let a = manager.ensure("ops").await.unwrap();
    let b = manager.ensure("ops").await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(manager.namespaces_created(), 1);
    assert_eq!(manager.active_topics(), vec!["ops"]);
}

#[tokio::test]
async fn ensure_unknown_topic_registers_nothing() {
    let (manager, _dir) = manager(&["ops"]);
    let err = manager.ensure("missing").await.unwrap_err();
    assert!(matches!(err, RelayError::TopicNotFound(ref t) if t == "missing"));
    assert!(!manager.contains("missing"));
    assert!(manager.active_topics().is_empty());
    assert_eq!(manager.namespaces_created(), 0);
}

#[tokio::test]
async fn concurrent_ensure_builds_a_single_namespace() {
    let (catalog, _dir) = catalog(&["ops"]);
    let resolver = Arc::new(SlowResolver {
        catalog,
        lookups: AtomicUsize::new(0),
    });
    let manager = Arc::new(NamespaceManager::new(resolver.clone()));

    let (a, b) = tokio::join!(manager.ensure("ops"), manager.ensure("ops"));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(manager.namespaces_created(), 1);
    assert_eq!(resolver.lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_ensure_across_tasks_builds_a_single_namespace() {
    let (catalog, _dir) = catalog(&["ops"]);
    let resolver = Arc::new(SlowResolver {
        catalog,
        lookups: AtomicUsize::new(0),
    });
    let manager = Arc::new(NamespaceManager::new(resolver));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move { manager.ensure("ops").await }));
    }
    let mut namespaces = Vec::new();
    for handle in handles {
        namespaces.push(handle.await.unwrap().unwrap());
    }

    assert!(namespaces.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(manager.namespaces_created(), 1);
}

#[tokio::test]
async fn broadcast_reaches_attached_sockets_only() {
    let (manager, _dir) = manager(&["ops", "billing"]);
    let (ops_client, mut ops_rx) = client();
    let (billing_client, mut billing_rx) = client();
    manager.attach("ops", ops_client).await.unwrap();
    manager.attach("billing", billing_client).await.unwrap();

    let event = Event::new("ops", "sample.update", json!({ "name": "cpu", "value": "91" }));
    assert_eq!(manager.broadcast("ops", &event), 1);

    match ops_rx.try_recv().unwrap() {
        WsMessage::Text(text) => {
            let received: Event = serde_json::from_str(&text).unwrap();
            assert_eq!(received, event);
        }
        other => panic!("Expected a text message, got {other:?}"),
    }
    assert!(billing_rx.try_recv().is_err());
}

#[tokio::test]
async fn broadcast_without_namespace_is_dropped() {
    let (manager, _dir) = manager(&["ops"]);
    let event = Event::new("ops", "sample.add", json!({}));
    assert_eq!(manager.broadcast("ops", &event), 0);
    assert!(!manager.contains("ops"));
}

#[tokio::test]
async fn broadcast_detaches_closed_sockets() {
    let (manager, _dir) = manager(&["ops"]);
    let (open_client, _open_rx) = client();
    let (closed_client, closed_rx) = client();
    manager.attach("ops", open_client).await.unwrap();
    manager.attach("ops", closed_client).await.unwrap();
    drop(closed_rx);

    let event = Event::new("ops", "sample.remove", json!({ "name": "cpu" }));
    assert_eq!(manager.broadcast("ops", &event), 1);
    assert_eq!(manager.subscriber_count("ops"), 1);
}

#[tokio::test]
async fn retire_drops_namespace_and_is_idempotent() {
    let (manager, _dir) = manager(&["ops"]);
    let first = manager.ensure("ops").await.unwrap();
    assert!(manager.retire("ops"));
    assert!(!manager.retire("ops"));
    assert!(!manager.contains("ops"));

    // a later ensure builds a new namespace
    let second = manager.ensure("ops").await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(manager.namespaces_created(), 2);
}

#[tokio::test]
async fn retire_if_idle_keeps_busy_namespaces() {
    let (manager, _dir) = manager(&["ops"]);
    let (c, _rx) = client();
    let id = c.id.clone();
    manager.attach("ops", c).await.unwrap();

    assert!(!manager.retire_if_idle("ops"));
    assert_eq!(manager.detach("ops", &id), Some(0));
    assert!(manager.retire_if_idle("ops"));
    assert_eq!(manager.detach("ops", &id), None);
}

#[tokio::test]
async fn cancelled_ensure_leaves_no_slot() {
    let (catalog, _dir) = catalog(&["ops"]);
    let resolver = Arc::new(SlowResolver {
        catalog,
        lookups: AtomicUsize::new(0),
    });
    let manager = NamespaceManager::new(resolver);

    let outcome = tokio::time::timeout(Duration::from_millis(5), manager.ensure("ops")).await;
    assert!(outcome.is_err());
    assert_eq!(manager.registered_slots(), 0);

    // the topic is still usable afterwards
    manager.ensure("ops").await.unwrap();
    assert_eq!(manager.registered_slots(), 1);
}

#[tokio::test]
async fn failed_ensure_leaves_no_slot() {
    let (manager, _dir) = manager(&[]);
    for _ in 0..3 {
        assert!(manager.ensure("missing").await.is_err());
    }
    assert_eq!(manager.registered_slots(), 0);
}

#[tokio::test]
async fn cancelled_caller_does_not_strand_a_concurrent_one() {
    let (catalog, _dir) = catalog(&["ops"]);
    let resolver = Arc::new(SlowResolver {
        catalog,
        lookups: AtomicUsize::new(0),
    });
    let manager = Arc::new(NamespaceManager::new(resolver));

    let waiter = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.ensure("ops").await })
    };
    let _ = tokio::time::timeout(Duration::from_millis(5), manager.ensure("ops")).await;

    let handle = waiter.await.unwrap().unwrap();
    let current = manager.get("ops").expect("namespace registered");
    assert!(Arc::ptr_eq(&handle, &current));
    assert_eq!(manager.registered_slots(), 1);
}

#[tokio::test]
async fn idle_topics_lists_namespaces_without_sockets() {
    let (manager, _dir) = manager(&["ops", "billing"]);
    let (c, _rx) = client();
    manager.attach("ops", c).await.unwrap();
    manager.ensure("billing").await.unwrap();

    assert_eq!(manager.idle_topics(), vec!["billing"]);
}
