//! Cluster membership and outbound propagation
//!
//! Peers are statically configured. The registry tracks their health,
//! the broadcaster fans invalidations out to every active peer.

mod backoff;
mod broadcaster;
mod registry;
mod transport;
mod types;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use broadcaster::{BroadcastReport, Broadcaster, PeerDelivery, PeerOutcome, RetryPolicy};
pub use registry::PeerRegistry;
pub use transport::{DeliveryError, HttpTransport, PeerTransport};
pub use types::{current_time_ms, HealthThresholds, PeerNode, PeerState};
