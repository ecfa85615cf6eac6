use std::time::Duration;

use serde::Deserialize;

use crate::hub::DEFAULT_MAILBOX_CAPACITY;
use crate::hub::snapshot::DEFAULT_STORE_TIMEOUT;
use crate::persistence::DEFAULT_KEY_PREFIX;

/// Top-level configuration settings for the application.
///
/// Includes settings for the server, the hub, snapshot storage and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub hub: HubSettings,
    pub snapshot: SnapshotSettings,
    pub log: LogSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the server will bind to, how many clients
/// may be connected at once and how long a client may take to finish the
/// WebSocket handshake.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub handshake_timeout_ms: u64,
}

impl ServerSettings {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Configuration settings for the hub.
#[derive(Debug, Deserialize, Clone)]
pub struct HubSettings {
    /// Payloads a subscriber may have outstanding before broadcasts to it
    /// are dropped.
    pub mailbox_capacity: usize,
}

/// Where topic snapshots are kept.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotBackend {
    Sled,
    Redis,
    Memory,
    Disabled,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotSettings {
    pub backend: SnapshotBackend,
    /// sled database directory.
    pub path: String,
    pub redis_url: String,
    pub key_prefix: String,
    /// Bound on connecting to the store and on every get/set.
    pub timeout_ms: u64,
}

impl SnapshotSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub hub: Option<PartialHubSettings>,
    pub snapshot: Option<PartialSnapshotSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_connections: Option<usize>,
    pub handshake_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialHubSettings {
    pub mailbox_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialSnapshotSettings {
    pub backend: Option<SnapshotBackend>,
    pub path: Option<String>,
    pub redis_url: Option<String>,
    pub key_prefix: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_connections: 1000,
            handshake_timeout_ms: 10_000,
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            backend: SnapshotBackend::Sled,
            path: "snapshot_db".to_string(),
            redis_url: "redis://localhost:6379/2".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            timeout_ms: DEFAULT_STORE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            hub: HubSettings::default(),
            snapshot: SnapshotSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl PartialSettings {
    /// Fills every missing value from `Settings::default()`.
    pub fn merge_with_defaults(self) -> Settings {
        let default = Settings::default();
        let server = self.server;
        let hub = self.hub;
        let snapshot = self.snapshot;
        let log = self.log;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
                max_connections: server
                    .as_ref()
                    .and_then(|s| s.max_connections)
                    .unwrap_or(default.server.max_connections),
                handshake_timeout_ms: server
                    .as_ref()
                    .and_then(|s| s.handshake_timeout_ms)
                    .unwrap_or(default.server.handshake_timeout_ms),
            },
            hub: HubSettings {
                mailbox_capacity: hub
                    .as_ref()
                    .and_then(|h| h.mailbox_capacity)
                    .unwrap_or(default.hub.mailbox_capacity),
            },
            snapshot: SnapshotSettings {
                backend: snapshot
                    .as_ref()
                    .and_then(|s| s.backend)
                    .unwrap_or(default.snapshot.backend),
                path: snapshot
                    .as_ref()
                    .and_then(|s| s.path.clone())
                    .unwrap_or(default.snapshot.path),
                redis_url: snapshot
                    .as_ref()
                    .and_then(|s| s.redis_url.clone())
                    .unwrap_or(default.snapshot.redis_url),
                key_prefix: snapshot
                    .as_ref()
                    .and_then(|s| s.key_prefix.clone())
                    .unwrap_or(default.snapshot.key_prefix),
                timeout_ms: snapshot
                    .as_ref()
                    .and_then(|s| s.timeout_ms)
                    .unwrap_or(default.snapshot.timeout_ms),
            },
            log: LogSettings {
                level: log
                    .as_ref()
                    .and_then(|l| l.level.clone())
                    .unwrap_or(default.log.level),
            },
        }
    }
}
