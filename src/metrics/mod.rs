//! Prometheus metrics for the session relay.
//!
//! - Local logout metrics (detected, duplicates, dispatch queue)
//! - Broadcast metrics (per-peer delivery outcomes, latency)
//! - Peer health metrics (state per peer, probes)
//! - Receiver metrics (outcome of every inbound invalidation)

mod helpers;

pub use helpers::{encode_metrics, BroadcastMetrics, LogoutMetrics, PeerMetrics, ReceiverMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "ara_relay";

lazy_static! {
    // ============================================================================
    // Local Logout Metrics
    // ============================================================================

    /// Local logouts by result (invalidated, already_invalid, unknown)
    pub static ref LOGOUTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_logouts_total", METRIC_PREFIX),
        "Local logout events by result",
        &["result"]
    ).unwrap();

    /// Logout events dropped because the dispatch queue was full
    pub static ref DISPATCH_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_dispatch_dropped_total", METRIC_PREFIX),
        "Logout events dropped because the broadcast queue was full"
    ).unwrap();

    /// Broadcasts currently running
    pub static ref BROADCASTS_IN_FLIGHT: IntGauge = register_int_gauge!(
        format!("{}_broadcasts_in_flight", METRIC_PREFIX),
        "Number of broadcasts currently in progress"
    ).unwrap();

    // ============================================================================
    // Broadcast Metrics
    // ============================================================================

    /// Total broadcasts started
    pub static ref BROADCASTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcasts_total", METRIC_PREFIX),
        "Total invalidation broadcasts started"
    ).unwrap();

    /// Per-peer delivery outcomes
    pub static ref PEER_DELIVERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_peer_deliveries_total", METRIC_PREFIX),
        "Per-peer delivery outcomes",
        &["outcome"]
    ).unwrap();

    /// Individual delivery attempts that were retried
    pub static ref DELIVERY_RETRIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_delivery_retries_total", METRIC_PREFIX),
        "Delivery attempts retried after a transient failure"
    ).unwrap();

    /// Wall time of a whole broadcast
    pub static ref BROADCAST_DURATION: Histogram = register_histogram!(
        format!("{}_broadcast_duration_seconds", METRIC_PREFIX),
        "Time to complete a broadcast to all active peers",
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    // ============================================================================
    // Peer Health Metrics
    // ============================================================================

    /// Peer state (0=healthy, 1=suspect, 2=down)
    pub static ref PEER_STATE: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_peer_state", METRIC_PREFIX),
        "Peer health state (0=healthy, 1=suspect, 2=down)",
        &["peer"]
    ).unwrap();

    /// Probe results for DOWN peers
    pub static ref PEER_PROBES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_peer_probes_total", METRIC_PREFIX),
        "Probes sent to DOWN peers by result",
        &["result"]
    ).unwrap();

    // ============================================================================
    // Receiver Metrics
    // ============================================================================

    /// Inbound invalidations by outcome
    pub static ref RECEIVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_received_total", METRIC_PREFIX),
        "Inbound invalidation messages by outcome",
        &["outcome"]
    ).unwrap();

    /// Entries held by the replay cache
    pub static ref REPLAY_CACHE_SIZE: IntGauge = register_int_gauge!(
        format!("{}_replay_cache_size", METRIC_PREFIX),
        "Number of (origin, nonce) pairs retained for replay detection"
    ).unwrap();
}
