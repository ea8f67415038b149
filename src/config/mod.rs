mod settings;

pub use settings::{
    AccessConfig, ClusterConfig, LogoutConfig, NodeConfig, OtelConfig, PeerConfig, ServerConfig,
    Settings, SettingsError, MIN_SECRET_LEN,
};
