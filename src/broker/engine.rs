//! Namespace lifecycle manager
//!
//! Owns the process-local registry mapping topic name → namespace. A
//! namespace is created on the first subscriber transition and retired on
//! the last one; producers reach attached sockets through `broadcast`.
//!
//! Concurrency notes:
//! - Each registry slot is a `OnceCell`, so concurrent `ensure` calls for the
//!   same topic share one initialisation: exactly one namespace is built and
//!   every caller receives the same handle.
//! - The registry lock is never held across an `.await`. Topic resolution
//!   runs inside the cell's initialiser, outside the lock.
//! - `attach` re-checks the registry under the lock, so a socket is never
//!   attached to a namespace that was retired while it was being resolved.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::message::Event;
use super::namespace::{Namespace, NamespaceHandle};
use super::resolver::TopicResolver;
use crate::client::Client;
use crate::utils::RelayError;

type Slot = Arc<OnceCell<NamespaceHandle>>;

pub struct NamespaceManager {
    registry: Mutex<HashMap<String, Slot>>,
    resolver: Arc<dyn TopicResolver>,
    created: AtomicU64,
}

impl NamespaceManager {
    pub fn new(resolver: Arc<dyn TopicResolver>) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            resolver,
            created: AtomicU64::new(0),
        }
    }

    /// Returns the local namespace for `topic`, creating it when absent.
    ///
    /// Nothing is registered when the topic does not resolve or the call is
    /// cancelled before the namespace is built.
    pub async fn ensure(&self, topic: &str) -> Result<NamespaceHandle, RelayError> {
        let guard = SlotGuard {
            registry: &self.registry,
            topic,
            slot: self
                .registry
                .lock()
                .entry(topic.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone(),
        };

        let handle = guard
            .slot
            .get_or_try_init(|| async {
                let resolved = self.resolver.resolve(topic).await?;
                let definition =
                    resolved.ok_or_else(|| RelayError::TopicNotFound(topic.to_string()))?;
                self.created.fetch_add(1, Ordering::Relaxed);
                info!(topic = %topic, "namespace created");
                Ok::<_, RelayError>(Arc::new(Namespace::new(definition)))
            })
            .await?
            .clone();
        Ok(handle)
    }

    /// Ensures the namespace and attaches `client` to it.
    pub async fn attach(
        &self,
        topic: &str,
        client: Client,
    ) -> Result<NamespaceHandle, RelayError> {
        loop {
            let handle = self.ensure(topic).await?;

            let attached = {
                let registry = self.registry.lock();
                let current = registry.get(topic).and_then(|slot| slot.get());
                if current.is_some_and(|current| Arc::ptr_eq(current, &handle)) {
                    handle.attach(client.clone());
                    true
                } else {
                    false
                }
            };

            if attached {
                debug!(
                    topic = %topic,
                    client_id = %client.id,
                    subscribers = handle.len(),
                    "socket attached"
                );
                return Ok(handle);
            }
            // retired while we were resolving it; build a fresh one
            debug!(topic = %topic, "namespace retired during attach, retrying");
        }
    }

    /// Detaches one socket. Returns the number of sockets left, or `None`
    /// when no namespace exists for `topic`.
    pub fn detach(&self, topic: &str, client_id: &str) -> Option<usize> {
        let handle = self.get(topic)?;
        handle.detach(client_id);
        Some(handle.len())
    }

    /// Drops the local namespace for `topic`. No-op when absent.
    pub fn retire(&self, topic: &str) -> bool {
        let removed = self.registry.lock().remove(topic);
        match removed.as_ref().and_then(|slot| slot.get()) {
            Some(handle) => {
                if !handle.is_empty() {
                    warn!(
                        topic = %topic,
                        subscribers = handle.len(),
                        "retiring namespace that still has attached sockets"
                    );
                }
                info!(topic = %topic, lived_ms = handle.age_ms(), "namespace retired");
                true
            }
            None => false,
        }
    }

    /// Retires the namespace only if no local socket is attached to it.
    pub fn retire_if_idle(&self, topic: &str) -> bool {
        let mut registry = self.registry.lock();
        let lived_ms = registry
            .get(topic)
            .and_then(|slot| slot.get())
            .filter(|handle| handle.is_empty())
            .map(|handle| handle.age_ms());
        match lived_ms {
            Some(lived_ms) => {
                registry.remove(topic);
                info!(topic = %topic, lived_ms, "idle namespace retired");
                true
            }
            None => false,
        }
    }

    /// Delivers `event` to every local socket of `topic`. The event is
    /// dropped for this process when no namespace exists.
    pub fn broadcast(&self, topic: &str, event: &Event) -> usize {
        match self.get(topic) {
            Some(handle) => handle.broadcast(event),
            None => {
                debug!(topic = %topic, kind = %event.kind, "no local namespace, event dropped");
                0
            }
        }
    }

    pub fn get(&self, topic: &str) -> Option<NamespaceHandle> {
        self.registry
            .lock()
            .get(topic)
            .and_then(|slot| slot.get().cloned())
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.get(topic).is_some()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.get(topic).map(|handle| handle.len()).unwrap_or(0)
    }

    pub fn active_topics(&self) -> Vec<String> {
        let registry = self.registry.lock();
        let mut topics: Vec<String> = registry
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        topics.sort();
        topics
    }

    /// Topics whose namespace exists but has no local socket attached.
    pub fn idle_topics(&self) -> Vec<String> {
        let registry = self.registry.lock();
        registry
            .iter()
            .filter(|(_, slot)| slot.get().is_some_and(|handle| handle.is_empty()))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Total namespaces built since start.
    pub fn namespaces_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Number of registry slots, initialised or not.
    #[cfg(test)]
    pub(crate) fn registered_slots(&self) -> usize {
        self.registry.lock().len()
    }
}

/// Holds one `ensure` caller's reference to a registry slot. The last
/// caller to leave an uninitialised slot removes it, whether resolution
/// failed or the caller was cancelled.
struct SlotGuard<'a> {
    registry: &'a Mutex<HashMap<String, Slot>>,
    topic: &'a str,
    slot: Slot,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let slot = std::mem::take(&mut self.slot);
        let mut registry = self.registry.lock();
        // the registry's reference plus ours; clones are only taken under the lock
        let last_caller = Arc::strong_count(&slot) == 2;
        let stale = last_caller
            && !slot.initialized()
            && registry
                .get(self.topic)
                .is_some_and(|current| Arc::ptr_eq(current, &slot));
        if stale {
            registry.remove(self.topic);
            debug!(topic = %self.topic, "discarded unresolved namespace slot");
        }
        drop(slot);
    }
}

impl std::fmt::Debug for NamespaceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceManager")
            .field("active", &self.active_topics())
            .field("created", &self.namespaces_created())
            .finish()
    }
}
