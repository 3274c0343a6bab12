use std::net::IpAddr;

use chrono::{DateTime, Utc};

use crate::gate::Identity;

use super::pubsub_client::ClientId;

/// Per-socket metadata kept for the lifetime of a connection.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub client_id: ClientId,
    pub identity: Identity,
    pub address: IpAddr,
    pub topic: Option<String>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionContext {
    pub fn new(client_id: ClientId, identity: Identity, address: IpAddr, topic: Option<String>) -> Self {
        Self {
            client_id,
            identity,
            address,
            topic,
            connected_at: Utc::now(),
        }
    }

    /// Milliseconds since the socket was admitted.
    pub fn connected_for_ms(&self) -> i64 {
        (Utc::now() - self.connected_at).num_milliseconds()
    }
}
