//! Session lookups.
//!
//! Sessions are written by the HTTP layer's session middleware as JSON
//! documents. The authenticated identity sits at `passport.user`.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use serde_json::Value;

use crate::utils::StoreError;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<Value>, StoreError>;
}

/// Who a connection belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User(String),
}

impl Identity {
    /// Extracts the identity nested in a session record. Returns `None` when
    /// the record has no usable `passport.user`.
    pub fn from_session(record: &Value) -> Option<Self> {
        let user = record.get("passport")?.get("user")?;
        let id = match user {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Object(fields) => ["id", "email", "name"]
                .iter()
                .find_map(|f| match fields.get(*f) {
                    Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                })?,
            _ => return None,
        };
        Some(Identity::User(id))
    }

    pub fn label(&self) -> &str {
        match self {
            Identity::Anonymous => "anonymous",
            Identity::User(id) => id,
        }
    }
}

/// In-process session store for development and tests.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Value>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: &str, record: Value) {
        self.sessions.lock().insert(session_id.to_string(), record);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.sessions.lock().get(session_id).cloned())
    }
}

/// Reads sessions stored as JSON strings under `prefix + id`.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: MultiplexedConnection,
    prefix: String,
}

impl RedisSessionStore {
    pub fn new(conn: MultiplexedConnection, prefix: &str) -> Self {
        Self {
            conn,
            prefix: prefix.to_string(),
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<Value>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(format!("{}{}", self.prefix, session_id))
            .query_async(&mut conn)
            .await?;

        match raw {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }
}
