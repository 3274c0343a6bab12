//! Admission control for inbound sockets.
//!
//! The gate exposes one method per check; the subscription protocol runs
//! them in order: the cookie must carry a session id,
//! the session must resolve to an identity (unless access tokens are not
//! required), and the peer address must fall inside the whitelist. Any
//! failure is terminal for the connection and happens before a counter is
//! touched.

pub mod cookie;
pub mod session;
pub mod whitelist;

use std::net::IpAddr;
use std::sync::Arc;

use crate::config::GateSettings;
use crate::utils::{RelayError, StoreError};

pub use session::{Identity, MemorySessionStore, RedisSessionStore, SessionStore};
pub use whitelist::{IpRange, IpWhitelist};

/// What the transport captured from the upgrade request.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub cookie: Option<String>,
    pub topic: Option<String>,
    pub address: IpAddr,
}

/// Outcome of a successful admission.
#[derive(Debug, Clone)]
pub struct Admission {
    pub identity: Identity,
    pub address: IpAddr,
    pub topic: Option<String>,
}

pub struct ConnectionGate {
    require_access_token: bool,
    require_topic: bool,
    whitelist: IpWhitelist,
    sessions: Arc<dyn SessionStore>,
}

impl ConnectionGate {
    pub fn new(
        require_access_token: bool,
        whitelist: IpWhitelist,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            require_access_token,
            require_topic: false,
            whitelist,
            sessions,
        }
    }

    pub fn from_settings(
        settings: &GateSettings,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, std::net::AddrParseError> {
        let whitelist = IpWhitelist::parse(&settings.ip_whitelist)?;
        Ok(Self::new(settings.require_access_token, whitelist, sessions)
            .with_required_topic(settings.require_topic))
    }

    pub fn with_required_topic(mut self, required: bool) -> Self {
        self.require_topic = required;
        self
    }

    /// Extracts the session id from the raw cookie header.
    pub fn validate_handshake<'a>(&self, cookie: Option<&'a str>) -> Result<&'a str, RelayError> {
        let header = cookie.ok_or(RelayError::MissingCookie)?;
        cookie::session_id(header).ok_or(RelayError::MissingSessionId)
    }

    /// Resolves the identity behind `session_id`. The session store is not
    /// consulted when access tokens are not required.
    pub async fn authenticate(&self, session_id: &str) -> Result<Identity, RelayError> {
        if !self.require_access_token {
            return Ok(Identity::Anonymous);
        }

        let record = match self.sessions.load(session_id).await {
            Ok(Some(record)) => record,
            Ok(None) | Err(StoreError::Serde(_)) => return Err(RelayError::InvalidSession),
            Err(e) => return Err(RelayError::StoreUnavailable(e)),
        };

        Identity::from_session(&record).ok_or(RelayError::InvalidSession)
    }

    pub fn admit_address(&self, address: IpAddr) -> Result<IpAddr, RelayError> {
        let address = whitelist::normalize(address);
        if self.whitelist.allows(address) {
            Ok(address)
        } else {
            Err(RelayError::IpNotWhitelisted(address))
        }
    }

    /// Normalises the requested topic. A connection without one is admitted
    /// unsubscribed unless a topic is required.
    pub fn select_topic(&self, topic: Option<&str>) -> Result<Option<String>, RelayError> {
        let topic = topic.map(str::trim).filter(|t| !t.is_empty());
        match topic {
            Some(topic) => Ok(Some(topic.to_string())),
            None if self.require_topic => Err(RelayError::MissingTopic),
            None => Ok(None),
        }
    }
}
