//! Counter store backed by `sled`.
//!
//! Counters live in their own tree as big-endian `i64` values. Mutations go
//! through `update_and_fetch`, which retries its closure on contention, so
//! concurrent tasks never lose an update. A counter that drops to zero is
//! removed by the same closure.

use async_trait::async_trait;
use sled::{Db, Tree};

use super::{CounterStore, counter_key};
use crate::utils::StoreError;

const COUNTER_TREE: &str = "subscriber_counters";

#[derive(Clone)]
pub struct SledCounterStore {
    tree: Tree,
    prefix: String,
}

impl SledCounterStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str, prefix: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::with_db(&db, prefix)
    }

    /// Use the counter tree of an already opened database.
    pub fn with_db(db: &Db, prefix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            tree: db.open_tree(COUNTER_TREE)?,
            prefix: prefix.to_string(),
        })
    }

    fn apply(&self, topic: &str, delta: i64) -> Result<i64, StoreError> {
        let key = counter_key(&self.prefix, topic);
        let mut result = 0;

        self.tree.update_and_fetch(key.as_bytes(), |old| {
            let current = old.and_then(decode).unwrap_or(0);
            result = current + delta;
            if result > 0 {
                Some(result.to_be_bytes().to_vec())
            } else {
                None
            }
        })?;

        Ok(result)
    }
}

fn decode(bytes: &[u8]) -> Option<i64> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some(i64::from_be_bytes(raw))
}

#[async_trait]
impl CounterStore for SledCounterStore {
    async fn increment(&self, topic: &str) -> Result<i64, StoreError> {
        self.apply(topic, 1)
    }

    async fn decrement(&self, topic: &str) -> Result<i64, StoreError> {
        self.apply(topic, -1)
    }

    async fn current_value(&self, topic: &str) -> Result<i64, StoreError> {
        let key = counter_key(&self.prefix, topic);
        match self.tree.get(key.as_bytes())? {
            Some(raw) => decode(&raw).ok_or(StoreError::Corrupt { key }),
            None => Ok(0),
        }
    }

    async fn list_active_topics(&self) -> Result<Vec<String>, StoreError> {
        let mut topics = Vec::new();
        for entry in self.tree.scan_prefix(self.prefix.as_bytes()) {
            let (key, value) = entry?;
            if decode(&value).unwrap_or(0) <= 0 {
                continue;
            }
            if let Some(name) = std::str::from_utf8(&key)
                .ok()
                .and_then(|k| k.strip_prefix(self.prefix.as_str()))
            {
                topics.push(name.to_string());
            }
        }
        Ok(topics)
    }

    async fn delete_counter(&self, topic: &str) -> Result<(), StoreError> {
        self.tree.remove(counter_key(&self.prefix, topic).as_bytes())?;
        Ok(())
    }
}

impl std::fmt::Debug for SledCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledCounterStore")
            .field("tree", &"sled::Tree")
            .field("prefix", &self.prefix)
            .finish()
    }
}
