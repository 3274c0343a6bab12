//! The `persistence` module holds the shared subscriber counters.
//!
//! A counter is a non-negative integer per topic, keyed by a fixed prefix
//! followed by the topic name. It is the only state visible across processes:
//! every namespace decision is taken on the value returned by an atomic
//! `increment`/`decrement`, never on a separate read.
//!
//! Two backends are provided:
//! - `SledCounterStore`: embedded and durable, atomic across the tasks of a
//!   single process.
//! - `RedisCounterStore`: atomic across every process sharing the server.

pub mod redis_store;
pub mod sled_store;

use async_trait::async_trait;

use crate::utils::StoreError;

pub use redis_store::RedisCounterStore;
pub use sled_store::SledCounterStore;

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add one, creating the counter at 1 when absent.
    async fn increment(&self, topic: &str) -> Result<i64, StoreError>;

    /// Atomically subtract one. The counter is removed in the same step when
    /// the result is zero or below, so a stored value is never negative.
    async fn decrement(&self, topic: &str) -> Result<i64, StoreError>;

    /// Current value; an absent counter reads as 0.
    async fn current_value(&self, topic: &str) -> Result<i64, StoreError>;

    /// Topics whose counter is positive.
    async fn list_active_topics(&self) -> Result<Vec<String>, StoreError>;

    async fn delete_counter(&self, topic: &str) -> Result<(), StoreError>;
}

/// Builds the store key for `topic`.
pub(crate) fn counter_key(prefix: &str, topic: &str) -> String {
    format!("{prefix}{topic}")
}

#[cfg(test)]
mod tests;
