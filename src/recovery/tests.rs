use super::{RecoveryReconciler, RecoveryReport};
use crate::broker::{NamespaceManager, SledTopicCatalog};
use crate::persistence::{CounterStore, SledCounterStore};
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    counters: Arc<SledCounterStore>,
    namespaces: Arc<NamespaceManager>,
    _dir: TempDir,
}

fn fixture(topics: &[&str]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    let catalog = SledTopicCatalog::with_db(&db).unwrap();
    for topic in topics {
        catalog.register(topic).unwrap();
    }
    Fixture {
        counters: Arc::new(SledCounterStore::with_db(&db, "pubsubStats:").unwrap()),
        namespaces: Arc::new(NamespaceManager::new(Arc::new(catalog))),
        _dir: dir,
    }
}

async fn seed(counters: &SledCounterStore, topic: &str, value: usize) {
    for _ in 0..value {
        counters.increment(topic).await.unwrap();
    }
}

#[tokio::test]
async fn leftover_counter_recreates_empty_namespace() {
    let f = fixture(&["ops"]);
    seed(&f.counters, "ops", 3).await;

    let report = RecoveryReconciler::new(f.counters.clone(), f.namespaces.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.recreated, vec!["ops"]);
    assert!(f.namespaces.contains("ops"));
    assert_eq!(f.namespaces.subscriber_count("ops"), 0);
    // the counter is left as found
    assert_eq!(f.counters.current_value("ops").await.unwrap(), 3);
}

#[tokio::test]
async fn counter_for_deleted_topic_is_reported_not_touched() {
    let f = fixture(&["ops"]);
    seed(&f.counters, "ops", 1).await;
    seed(&f.counters, "retired-perspective", 2).await;

    let report = RecoveryReconciler::new(f.counters.clone(), f.namespaces.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.recreated, vec!["ops"]);
    assert_eq!(report.stale, vec!["retired-perspective"]);
    assert!(!f.namespaces.contains("retired-perspective"));
    assert_eq!(
        f.counters.current_value("retired-perspective").await.unwrap(),
        2
    );
}

#[tokio::test]
async fn empty_store_does_nothing() {
    let f = fixture(&["ops"]);
    let report = RecoveryReconciler::new(f.counters.clone(), f.namespaces.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(report, RecoveryReport::default());
    assert!(f.namespaces.active_topics().is_empty());
}

#[tokio::test]
async fn reset_mode_deletes_counters_instead() {
    let f = fixture(&["ops"]);
    seed(&f.counters, "ops", 3).await;

    let report = RecoveryReconciler::new(f.counters.clone(), f.namespaces.clone())
        .with_reset(true)
        .run()
        .await
        .unwrap();

    assert_eq!(report.reset, vec!["ops"]);
    assert!(report.recreated.is_empty());
    assert!(!f.namespaces.contains("ops"));
    assert_eq!(f.counters.current_value("ops").await.unwrap(), 0);
}

#[tokio::test]
async fn spawned_reconciliation_reports_back() {
    let f = fixture(&["ops", "billing"]);
    seed(&f.counters, "ops", 1).await;
    seed(&f.counters, "billing", 1).await;

    let report = RecoveryReconciler::new(f.counters.clone(), f.namespaces.clone())
        .spawn()
        .await
        .unwrap()
        .unwrap();

    let mut recreated = report.recreated;
    recreated.sort();
    assert_eq!(recreated, vec!["billing", "ops"]);
    assert_eq!(f.namespaces.active_topics(), vec!["billing", "ops"]);
}
