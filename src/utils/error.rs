//! Error types used throughout `perspectivecast`.
//!
//! `StoreError` covers I/O failures from the counter, session and topic
//! stores. `RelayError` is the per-connection outcome: admission failures,
//! a missing topic, or an unavailable store, each with its own propagation
//! policy in the subscription protocol.

use std::net::IpAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("corrupt value stored under key `{key}`")]
    Corrupt { key: String },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("handshake carried no cookie header")]
    MissingCookie,

    #[error("cookie header carried no session id")]
    MissingSessionId,

    #[error("session is missing or carries no identity")]
    InvalidSession,

    #[error("address {0} is not whitelisted")]
    IpNotWhitelisted(IpAddr),

    #[error("handshake named no topic")]
    MissingTopic,

    #[error("topic `{0}` not found")]
    TopicNotFound(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("connection did not finish the handshake in time")]
    HandshakeTimeout,
}

impl RelayError {
    /// True for failures raised by the connection gate, before any counter
    /// was touched.
    pub fn is_admission_failure(&self) -> bool {
        matches!(
            self,
            RelayError::MissingCookie
                | RelayError::MissingSessionId
                | RelayError::InvalidSession
                | RelayError::IpNotWhitelisted(_)
                | RelayError::MissingTopic
        )
    }

    /// Short machine-friendly label used in activity records.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::MissingCookie => "missing_cookie",
            RelayError::MissingSessionId => "missing_session_id",
            RelayError::InvalidSession => "invalid_session",
            RelayError::IpNotWhitelisted(_) => "ip_not_whitelisted",
            RelayError::MissingTopic => "missing_topic",
            RelayError::TopicNotFound(_) => "topic_not_found",
            RelayError::StoreUnavailable(_) => "store_unavailable",
            RelayError::HandshakeTimeout => "handshake_timeout",
        }
    }
}
