//! Counter store backed by Redis, shared by every process of a deployment.
//!
//! `INCR` creates a missing key at 1. Decrement runs as a Lua script so the
//! subtraction and the removal of an exhausted counter happen atomically; a
//! plain `DECR` followed by `DEL` could erase an increment made by another
//! process in between.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Script;

use super::{CounterStore, counter_key};
use crate::utils::StoreError;

const DECREMENT_SCRIPT: &str = r#"
local value = redis.call('DECR', KEYS[1])
if value <= 0 then
    redis.call('DEL', KEYS[1])
end
return value
"#;

#[derive(Clone)]
pub struct RedisCounterStore {
    conn: MultiplexedConnection,
    prefix: String,
    decrement: Script,
}

impl RedisCounterStore {
    pub fn with_connection(conn: MultiplexedConnection, prefix: &str) -> Self {
        Self {
            conn,
            prefix: prefix.to_string(),
            decrement: Script::new(DECREMENT_SCRIPT),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, topic: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let value: i64 = redis::cmd("INCR")
            .arg(counter_key(&self.prefix, topic))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn decrement(&self, topic: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let value: i64 = self
            .decrement
            .key(counter_key(&self.prefix, topic))
            .invoke_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn current_value(&self, topic: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = redis::cmd("GET")
            .arg(counter_key(&self.prefix, topic))
            .query_async(&mut conn)
            .await?;
        Ok(value.unwrap_or(0))
    }

    async fn list_active_topics(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", self.prefix);
        let mut cursor: u64 = 0;
        let mut keys: Vec<String> = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        let mut topics = Vec::new();
        for key in keys {
            let value: Option<i64> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
            if value.unwrap_or(0) <= 0 {
                continue;
            }
            if let Some(name) = key.strip_prefix(self.prefix.as_str()) {
                topics.push(name.to_string());
            }
        }
        Ok(topics)
    }

    async fn delete_counter(&self, topic: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(counter_key(&self.prefix, topic))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("conn", &"redis::aio::MultiplexedConnection")
            .field("prefix", &self.prefix)
            .finish()
    }
}
