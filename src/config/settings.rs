use std::collections::HashSet;
use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// Minimum accepted length of the cluster shared secret, in bytes
pub const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub node: NodeConfig,
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub logout: LogoutConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Identifier this node stamps on outgoing invalidation messages
    #[serde(default = "default_node_id")]
    pub id: String,
}

/// A statically configured cluster member
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeerConfig {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    /// Pre-shared HMAC key, identical on every node
    pub shared_secret: String,
    /// Per-attempt timeout for a peer delivery
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Jitter factor (0.0 to 1.0)
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
    /// Accepted clock distance between a message timestamp and now
    #[serde(default = "default_replay_window_ms")]
    pub replay_window_ms: u64,
    #[serde(default = "default_suspect_threshold")]
    pub suspect_threshold: u32,
    #[serde(default = "default_down_threshold")]
    pub down_threshold: u32,
    /// How often DOWN peers are probed for recovery
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    /// Path of the receiver route, identical on every node
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,
    #[serde(default = "default_dispatch_queue_capacity")]
    pub dispatch_queue_capacity: usize,
    #[serde(default = "default_max_concurrent_broadcasts")]
    pub max_concurrent_broadcasts: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessConfig {
    /// Password required by the administrative logout endpoint
    pub password: Option<String>,
    /// Comma-separated list of addresses, CIDR ranges or `*`
    pub ip_filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutConfig {
    /// Request paths whose successful responses complete a logout
    #[serde(default = "default_logout_paths")]
    pub paths: Vec<String>,
    /// Cookie carrying the session identifier
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

/// Semantic problems in an otherwise well-formed configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("cluster.shared_secret must be at least {MIN_SECRET_LEN} bytes")]
    InsecureSecret,
    #[error("cluster.suspect_threshold must be greater than zero")]
    ZeroSuspectThreshold,
    #[error("cluster.down_threshold ({down}) must exceed cluster.suspect_threshold ({suspect})")]
    ThresholdOrder { suspect: u32, down: u32 },
    #[error("cluster.max_retries must not exceed 10, got {0}")]
    TooManyRetries(u32),
    #[error("cluster.replay_window_ms must be greater than zero")]
    ZeroReplayWindow,
    #[error("cluster.request_timeout_ms must be greater than zero")]
    ZeroRequestTimeout,
    #[error("cluster.probe_interval_ms must be greater than zero")]
    ZeroProbeInterval,
    #[error("duplicate peer id '{0}'")]
    DuplicatePeer(String),
    #[error("peer id '{0}' is this node's own id")]
    SelfPeer(String),
    #[error("peer '{id}' has invalid url '{url}'")]
    InvalidPeerUrl { id: String, url: String },
    #[error("cluster.endpoint_path must start with '/', got '{0}'")]
    InvalidEndpointPath(String),
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_node_id() -> String {
    format!("node-{}", Uuid::new_v4().simple())
}

fn default_request_timeout_ms() -> u64 {
    2_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_backoff_max_ms() -> u64 {
    1_000
}

fn default_backoff_jitter() -> f64 {
    0.2
}

fn default_replay_window_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_suspect_threshold() -> u32 {
    3
}

fn default_down_threshold() -> u32 {
    10
}

fn default_probe_interval_ms() -> u64 {
    30_000
}

fn default_endpoint_path() -> String {
    "/invalidate".to_string()
}

fn default_dispatch_queue_capacity() -> usize {
    1024
}

fn default_max_concurrent_broadcasts() -> usize {
    16
}

fn default_logout_paths() -> Vec<String> {
    vec!["/logout".to_string()]
}

fn default_session_cookie() -> String {
    "JSESSIONID".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "ara-session-relay".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8082)?
            .set_default("logout.session_cookie", "JSESSIONID")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // RELAY_SERVER__PORT, RELAY_NODE__ID, RELAY_CLUSTER__SHARED_SECRET,
            // RELAY_ACCESS__IP_FILTER, RELAY_LOGOUT__PATHS=/logout,/signout, etc.
            .add_source(
                Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("logout.paths"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Reject configurations that would run but behave unsafely
    pub fn validate(&self) -> Result<(), SettingsError> {
        let cluster = &self.cluster;

        if cluster.shared_secret.len() < MIN_SECRET_LEN {
            return Err(SettingsError::InsecureSecret);
        }
        if cluster.suspect_threshold == 0 {
            return Err(SettingsError::ZeroSuspectThreshold);
        }
        if cluster.down_threshold <= cluster.suspect_threshold {
            return Err(SettingsError::ThresholdOrder {
                suspect: cluster.suspect_threshold,
                down: cluster.down_threshold,
            });
        }
        if cluster.max_retries > 10 {
            return Err(SettingsError::TooManyRetries(cluster.max_retries));
        }
        if cluster.replay_window_ms == 0 {
            return Err(SettingsError::ZeroReplayWindow);
        }
        if cluster.request_timeout_ms == 0 {
            return Err(SettingsError::ZeroRequestTimeout);
        }
        if cluster.probe_interval_ms == 0 {
            return Err(SettingsError::ZeroProbeInterval);
        }
        if !cluster.endpoint_path.starts_with('/') {
            return Err(SettingsError::InvalidEndpointPath(
                cluster.endpoint_path.clone(),
            ));
        }

        let mut seen = HashSet::new();
        for peer in &cluster.peers {
            if !seen.insert(peer.id.as_str()) {
                return Err(SettingsError::DuplicatePeer(peer.id.clone()));
            }
            if peer.id == self.node.id {
                return Err(SettingsError::SelfPeer(peer.id.clone()));
            }
            let valid_url = reqwest::Url::parse(&peer.url)
                .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
                .unwrap_or(false);
            if !valid_url {
                return Err(SettingsError::InvalidPeerUrl {
                    id: peer.id.clone(),
                    url: peer.url.clone(),
                });
            }
        }

        Ok(())
    }
}

impl ClusterConfig {
    /// Cluster settings with defaults for everything but peers and secret
    pub fn new(peers: Vec<PeerConfig>, shared_secret: impl Into<String>) -> Self {
        Self {
            peers,
            shared_secret: shared_secret.into(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_factor: default_backoff_factor(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_jitter: default_backoff_jitter(),
            replay_window_ms: default_replay_window_ms(),
            suspect_threshold: default_suspect_threshold(),
            down_threshold: default_down_threshold(),
            probe_interval_ms: default_probe_interval_ms(),
            endpoint_path: default_endpoint_path(),
            dispatch_queue_capacity: default_dispatch_queue_capacity(),
            max_concurrent_broadcasts: default_max_concurrent_broadcasts(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
        }
    }
}

impl Default for LogoutConfig {
    fn default() -> Self {
        Self {
            paths: default_logout_paths(),
            session_cookie: default_session_cookie(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
