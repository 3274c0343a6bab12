//! Subscription protocol
//!
//! Drives one socket through
//! `HandshakeCheck → Authenticating → AddressCheck → CounterIncrement →
//! NamespaceEnsure → Attached`, or to `Rejected` from any state.
//!
//! Durable state is only touched from `CounterIncrement` on, so gate
//! failures need no cleanup. A failure after the increment (unknown topic,
//! timeout) is compensated with a decrement before the socket is rejected.
//!
//! Store failures follow two policies:
//! - increments are retried a bounded number of times, then the socket is
//!   rejected;
//! - decrements are retried, then queued in `PendingDecrements` and
//!   re-applied by `run_maintenance_loop` until they succeed.
//!
//! The counter can also reach zero through another process. The same loop
//! sweeps namespaces with no local socket and retires those whose counter is
//! exhausted, such as namespaces rebuilt by reconciliation.
//!
//! Namespace decisions are taken on the value returned by the atomic
//! counter operation, never on a separate read.

pub mod pending;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, warn};

use crate::activity::ActivityRecorder;
use crate::broker::{NamespaceHandle, NamespaceManager};
use crate::client::{Client, ConnectionContext};
use crate::config::RetrySettings;
use crate::gate::{Admission, ConnectionGate, Handshake};
use crate::persistence::CounterStore;
use crate::utils::RelayError;

pub use pending::PendingDecrements;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    HandshakeCheck,
    Authenticating,
    AddressCheck,
    CounterIncrement,
    NamespaceEnsure,
    /// Subscribed and attached to a namespace.
    Attached,
    /// Admitted without a topic; nothing was counted.
    Admitted,
    Rejected,
}

/// A topic subscription whose increment has been applied.
#[derive(Debug)]
pub struct Subscription {
    pub topic: String,
    pub namespace: NamespaceHandle,
    /// Counter value returned by the increment.
    pub subscribers: i64,
}

/// An admitted socket.
#[derive(Debug)]
pub struct Connection {
    pub context: ConnectionContext,
    pub client: Client,
    pub subscription: Option<Subscription>,
}

impl Connection {
    pub fn state(&self) -> ConnectionState {
        if self.subscription.is_some() {
            ConnectionState::Attached
        } else {
            ConnectionState::Admitted
        }
    }

    pub fn topic(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.topic.as_str())
    }
}

pub struct SubscriptionService {
    gate: ConnectionGate,
    counters: Arc<dyn CounterStore>,
    namespaces: Arc<NamespaceManager>,
    activity: Arc<dyn ActivityRecorder>,
    retry: RetrySettings,
    pending: PendingDecrements,
    handshake_timeout: Duration,
}

impl SubscriptionService {
    pub fn new(
        gate: ConnectionGate,
        counters: Arc<dyn CounterStore>,
        namespaces: Arc<NamespaceManager>,
        activity: Arc<dyn ActivityRecorder>,
        retry: RetrySettings,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            gate,
            counters,
            namespaces,
            activity,
            retry,
            pending: PendingDecrements::new(),
            handshake_timeout,
        }
    }

    pub fn namespaces(&self) -> &Arc<NamespaceManager> {
        &self.namespaces
    }

    pub fn counters(&self) -> &Arc<dyn CounterStore> {
        &self.counters
    }

    pub fn pending(&self) -> &PendingDecrements {
        &self.pending
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Runs the connection protocol for `client`.
    ///
    /// On error the socket must be closed; no durable state is left behind.
    pub async fn connect(
        &self,
        handshake: &Handshake,
        client: Client,
    ) -> Result<Connection, RelayError> {
        let client_id = client.id.clone();
        match self.run_protocol(handshake, client).await {
            Ok(connection) => {
                self.activity.connected(&connection.context);
                Ok(connection)
            }
            Err(e) => {
                debug!(
                    client_id = %client_id,
                    state = ?ConnectionState::Rejected,
                    error = %e,
                    "transition"
                );
                self.activity.rejected(&client_id, handshake.address, &e);
                Err(e)
            }
        }
    }

    async fn run_protocol(
        &self,
        handshake: &Handshake,
        client: Client,
    ) -> Result<Connection, RelayError> {
        let deadline = Instant::now() + self.handshake_timeout;
        self.transition(&client.id, ConnectionState::HandshakeCheck);

        let admission = timeout_at(deadline, self.admit(&client.id, handshake))
            .await
            .map_err(|_| RelayError::HandshakeTimeout)??;

        let context = ConnectionContext::new(
            client.id.clone(),
            admission.identity,
            admission.address,
            admission.topic.clone(),
        );

        let Some(topic) = admission.topic else {
            debug!(client_id = %client.id, "admitted without a topic");
            self.transition(&client.id, ConnectionState::Admitted);
            return Ok(Connection {
                context,
                client,
                subscription: None,
            });
        };

        self.transition(&client.id, ConnectionState::CounterIncrement);
        let subscribers = self.increment(&topic).await?;

        self.transition(&client.id, ConnectionState::NamespaceEnsure);
        let attached = timeout_at(deadline, self.namespaces.attach(&topic, client.clone()))
            .await
            .map_err(|_| RelayError::HandshakeTimeout)
            .and_then(|result| result);

        let namespace = match attached {
            Ok(namespace) => namespace,
            Err(e) => {
                warn!(
                    topic = %topic,
                    error = %e,
                    "subscription failed after increment, compensating"
                );
                self.release(&topic).await;
                return Err(e);
            }
        };

        self.transition(&client.id, ConnectionState::Attached);
        info!(topic = %topic, client_id = %client.id, subscribers, "subscribed");

        Ok(Connection {
            context,
            client,
            subscription: Some(Subscription {
                topic,
                namespace,
                subscribers,
            }),
        })
    }

    async fn admit(&self, client_id: &str, handshake: &Handshake) -> Result<Admission, RelayError> {
        let session_id = self.gate.validate_handshake(handshake.cookie.as_deref())?;

        self.transition(client_id, ConnectionState::Authenticating);
        let identity = self.gate.authenticate(session_id).await?;

        self.transition(client_id, ConnectionState::AddressCheck);
        let address = self.gate.admit_address(handshake.address)?;
        let topic = self.gate.select_topic(handshake.topic.as_deref())?;

        Ok(Admission {
            identity,
            address,
            topic,
        })
    }

    /// Detaches the socket and releases its counter.
    pub async fn disconnect(&self, connection: Connection) {
        if let Some(subscription) = &connection.subscription {
            self.namespaces.detach(&subscription.topic, &connection.client.id);
            self.release(&subscription.topic).await;
        }
        self.activity.disconnected(&connection.context);
    }

    async fn increment(&self, topic: &str) -> Result<i64, RelayError> {
        let attempts = self.retry.increment_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.counters.increment(topic).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!(topic = %topic, attempt, error = %e, "increment failed, retrying");
                    sleep(self.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(RelayError::StoreUnavailable(e)),
            }
        }
    }

    /// Applies one decrement for `topic`, queueing it when the store keeps
    /// failing.
    async fn release(&self, topic: &str) {
        let attempts = self.retry.decrement_attempts.max(1);
        for attempt in 1..=attempts {
            match self.counters.decrement(topic).await {
                Ok(remaining) => {
                    self.after_decrement(topic, remaining);
                    return;
                }
                Err(e) => {
                    warn!(topic = %topic, attempt, error = %e, "decrement failed");
                    if attempt < attempts {
                        sleep(self.backoff(attempt)).await;
                    }
                }
            }
        }
        warn!(topic = %topic, "decrement queued for retry");
        self.pending.push(topic);
    }

    fn after_decrement(&self, topic: &str, remaining: i64) {
        debug!(topic = %topic, remaining, "counter decremented");
        if self.namespaces.retire_if_idle(topic) {
            return;
        }
        if remaining <= 0 && self.namespaces.contains(topic) {
            // a subscriber attached between our decrement and this check
            warn!(
                topic = %topic,
                "counter exhausted but local sockets remain, keeping namespace"
            );
        }
    }

    /// Re-applies every queued decrement once. Returns how many succeeded.
    pub async fn flush_pending(&self) -> usize {
        let mut applied = 0;
        for topic in self.pending.drain() {
            match self.counters.decrement(&topic).await {
                Ok(remaining) => {
                    applied += 1;
                    self.after_decrement(&topic, remaining);
                }
                Err(e) => {
                    warn!(topic = %topic, error = %e, "queued decrement failed again");
                    self.pending.push(&topic);
                }
            }
        }
        applied
    }

    /// Retires every namespace with no local socket whose shared counter is
    /// exhausted. Returns the retired topics.
    pub async fn sweep_idle_namespaces(&self) -> Vec<String> {
        let mut retired = Vec::new();
        for topic in self.namespaces.idle_topics() {
            match self.counters.current_value(&topic).await {
                Ok(value) if value <= 0 => {
                    // a socket attaching meanwhile makes this a no-op
                    if self.namespaces.retire_if_idle(&topic) {
                        retired.push(topic);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(topic = %topic, error = %e, "could not read counter during sweep"),
            }
        }
        retired
    }

    /// Background task re-applying queued decrements and sweeping idle
    /// namespaces until shutdown.
    pub async fn run_maintenance_loop(self: Arc<Self>) {
        let interval = Duration::from_millis(self.retry.pending_interval_ms.max(1));
        loop {
            sleep(interval).await;
            if !self.pending.is_empty() {
                let applied = self.flush_pending().await;
                info!(applied, queued = self.pending.len(), "retried pending decrements");
            }
            let retired = self.sweep_idle_namespaces().await;
            if !retired.is_empty() {
                info!(?retired, "retired namespaces with exhausted counters");
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry.backoff_ms.saturating_mul(u64::from(attempt)))
    }

    fn transition(&self, client_id: &str, state: ConnectionState) {
        debug!(client_id = %client_id, state = ?state, "transition");
    }
}
