//! Per-topic broadcast channel.
//!
//! A `Namespace` holds the sockets of this process attached to one topic.
//! Attaching the same client twice replaces the earlier handle. Callers go
//! through `NamespaceManager`, which decides when a namespace exists.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::message::Event;
use super::resolver::Topic;
use crate::client::Client;
use crate::client::pubsub_client::ClientId;

pub type NamespaceHandle = Arc<Namespace>;

#[derive(Debug)]
pub struct Namespace {
    topic: Topic,
    sockets: Mutex<HashMap<ClientId, Client>>,
    created_at: DateTime<Utc>,
}

impl Namespace {
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            sockets: Mutex::new(HashMap::new()),
            created_at: Utc::now(),
        }
    }

    /// Milliseconds since the namespace was built.
    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.created_at).num_milliseconds()
    }

    pub fn attach(&self, client: Client) {
        self.sockets.lock().insert(client.id.clone(), client);
    }

    /// Returns false if the client was not attached.
    pub fn detach(&self, client_id: &str) -> bool {
        self.sockets.lock().remove(client_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sockets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.lock().is_empty()
    }

    /// Sends `event` to every attached socket and returns how many accepted
    /// it. Sockets whose writer has gone away are detached.
    pub fn broadcast(&self, event: &Event) -> usize {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(topic = %self.topic.name, error = %e, "failed to serialize event");
                return 0;
            }
        };

        let mut sockets = self.sockets.lock();
        let mut delivered = 0;
        sockets.retain(|id, client| match client.sender.send(frame.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                debug!(topic = %self.topic.name, client_id = %id, "dropping closed socket");
                false
            }
        });
        delivered
    }
}
