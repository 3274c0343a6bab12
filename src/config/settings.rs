use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub gate: GateSettings,
    pub store: StoreSettings,
    pub retry: RetrySettings,
    pub recovery: RecoverySettings,
    pub topics: TopicSettings,
    pub log: LogSettings,
}

/// Configuration settings for the server.
///
/// Defines the bind address and how long a socket may stay in the handshake.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub handshake_timeout_ms: u64,
}

/// Admission control settings.
#[derive(Debug, Deserialize, Clone)]
pub struct GateSettings {
    pub require_access_token: bool,
    /// Inclusive `[low, high]` address pairs.
    pub ip_whitelist: Vec<[String; 2]>,
    pub require_topic: bool,
}

/// Which shared store holds the subscriber counters and sessions.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sled,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub sled_path: String,
    pub redis_url: String,
    pub key_prefix: String,
    pub session_prefix: String,
}

/// Retry policy for counter mutations.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrySettings {
    pub increment_attempts: u32,
    pub decrement_attempts: u32,
    pub backoff_ms: u64,
    pub pending_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecoverySettings {
    pub reset_stale_counters: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TopicSettings {
    pub catalog: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub gate: Option<PartialGateSettings>,
    pub store: Option<PartialStoreSettings>,
    pub retry: Option<PartialRetrySettings>,
    pub recovery: Option<PartialRecoverySettings>,
    pub topics: Option<PartialTopicSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub handshake_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialGateSettings {
    pub require_access_token: Option<bool>,
    pub ip_whitelist: Option<Vec<[String; 2]>>,
    pub require_topic: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialStoreSettings {
    pub backend: Option<StoreBackend>,
    pub sled_path: Option<String>,
    pub redis_url: Option<String>,
    pub key_prefix: Option<String>,
    pub session_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialRetrySettings {
    pub increment_attempts: Option<u32>,
    pub decrement_attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub pending_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialRecoverySettings {
    pub reset_stale_counters: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialTopicSettings {
    pub catalog: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 3000,
                handshake_timeout_ms: 10_000,
            },
            gate: GateSettings {
                require_access_token: false,
                ip_whitelist: vec![
                    ["0.0.0.0".to_string(), "255.255.255.255".to_string()],
                    [
                        "::".to_string(),
                        "ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff".to_string(),
                    ],
                ],
                require_topic: false,
            },
            store: StoreSettings {
                backend: StoreBackend::Sled,
                sled_path: "perspectivecast_db".to_string(),
                redis_url: "redis://127.0.0.1:6379".to_string(),
                key_prefix: "pubsubStats:".to_string(),
                session_prefix: "sess:".to_string(),
            },
            retry: RetrySettings {
                increment_attempts: 3,
                decrement_attempts: 5,
                backoff_ms: 50,
                pending_interval_ms: 1000,
            },
            recovery: RecoverySettings {
                reset_stale_counters: false,
            },
            topics: TopicSettings {
                catalog: Vec::new(),
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `base`.
    pub fn merge_over(self, base: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let gate = self.gate.unwrap_or_default();
        let store = self.store.unwrap_or_default();
        let retry = self.retry.unwrap_or_default();
        let recovery = self.recovery.unwrap_or_default();
        let topics = self.topics.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(base.server.host),
                port: server.port.unwrap_or(base.server.port),
                handshake_timeout_ms: server
                    .handshake_timeout_ms
                    .unwrap_or(base.server.handshake_timeout_ms),
            },
            gate: GateSettings {
                require_access_token: gate
                    .require_access_token
                    .unwrap_or(base.gate.require_access_token),
                ip_whitelist: gate.ip_whitelist.unwrap_or(base.gate.ip_whitelist),
                require_topic: gate.require_topic.unwrap_or(base.gate.require_topic),
            },
            store: StoreSettings {
                backend: store.backend.unwrap_or(base.store.backend),
                sled_path: store.sled_path.unwrap_or(base.store.sled_path),
                redis_url: store.redis_url.unwrap_or(base.store.redis_url),
                key_prefix: store.key_prefix.unwrap_or(base.store.key_prefix),
                session_prefix: store.session_prefix.unwrap_or(base.store.session_prefix),
            },
            retry: RetrySettings {
                increment_attempts: retry
                    .increment_attempts
                    .unwrap_or(base.retry.increment_attempts),
                decrement_attempts: retry
                    .decrement_attempts
                    .unwrap_or(base.retry.decrement_attempts),
                backoff_ms: retry.backoff_ms.unwrap_or(base.retry.backoff_ms),
                pending_interval_ms: retry
                    .pending_interval_ms
                    .unwrap_or(base.retry.pending_interval_ms),
            },
            recovery: RecoverySettings {
                reset_stale_counters: recovery
                    .reset_stale_counters
                    .unwrap_or(base.recovery.reset_stale_counters),
            },
            topics: TopicSettings {
                catalog: topics.catalog.unwrap_or(base.topics.catalog),
            },
            log: LogSettings {
                level: log.level.unwrap_or(base.log.level),
            },
        }
    }
}
