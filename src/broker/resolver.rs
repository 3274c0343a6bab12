//! Topic lookups.
//!
//! Topics (perspectives) are defined by the persistence layer. The lifecycle
//! manager only needs to know whether a name resolves; `SledTopicCatalog`
//! keeps the registered definitions in a sled tree.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use crate::utils::StoreError;

const TOPIC_TREE: &str = "perspectives";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub name: String,
    pub registered_at: i64,
}

#[async_trait]
pub trait TopicResolver: Send + Sync {
    /// `Ok(None)` means the topic does not exist.
    async fn resolve(&self, name: &str) -> Result<Option<Topic>, StoreError>;
}

#[derive(Clone)]
pub struct SledTopicCatalog {
    tree: Tree,
}

impl SledTopicCatalog {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::with_db(&db)
    }

    pub fn with_db(db: &Db) -> Result<Self, StoreError> {
        Ok(Self {
            tree: db.open_tree(TOPIC_TREE)?,
        })
    }

    /// Registers `name`, keeping the original definition if it exists.
    pub fn register(&self, name: &str) -> Result<Topic, StoreError> {
        if let Some(raw) = self.tree.get(name.as_bytes())? {
            return Ok(serde_json::from_slice(&raw)?);
        }

        let topic = Topic {
            name: name.to_string(),
            registered_at: Utc::now().timestamp_millis(),
        };
        self.tree
            .insert(name.as_bytes(), serde_json::to_vec(&topic)?)?;
        Ok(topic)
    }

    /// Returns false if the topic was not registered.
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.tree.remove(name.as_bytes())?.is_some())
    }

    pub fn list(&self) -> Result<Vec<Topic>, StoreError> {
        let mut topics = Vec::new();
        for entry in self.tree.iter() {
            let (_, raw) = entry?;
            topics.push(serde_json::from_slice(&raw)?);
        }
        Ok(topics)
    }
}

#[async_trait]
impl TopicResolver for SledTopicCatalog {
    async fn resolve(&self, name: &str) -> Result<Option<Topic>, StoreError> {
        match self.tree.get(name.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for SledTopicCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledTopicCatalog")
            .field("tree", &"sled::Tree")
            .finish()
    }
}
