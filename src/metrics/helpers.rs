//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::cluster::PeerState;

use super::{
    BROADCASTS_IN_FLIGHT, BROADCASTS_TOTAL, BROADCAST_DURATION, DELIVERY_RETRIES_TOTAL,
    DISPATCH_DROPPED_TOTAL, LOGOUTS_TOTAL, PEER_DELIVERIES_TOTAL, PEER_PROBES_TOTAL, PEER_STATE,
    RECEIVED_TOTAL, REPLAY_CACHE_SIZE,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording local logout metrics
pub struct LogoutMetrics;

impl LogoutMetrics {
    pub fn record_invalidated() {
        LOGOUTS_TOTAL.with_label_values(&["invalidated"]).inc();
    }

    pub fn record_already_invalid() {
        LOGOUTS_TOTAL.with_label_values(&["already_invalid"]).inc();
    }

    pub fn record_unknown() {
        LOGOUTS_TOTAL.with_label_values(&["unknown"]).inc();
    }

    pub fn record_dispatch_dropped() {
        DISPATCH_DROPPED_TOTAL.inc();
    }
}

/// Helper struct for recording broadcast metrics
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    pub fn record_started() {
        BROADCASTS_TOTAL.inc();
        BROADCASTS_IN_FLIGHT.inc();
    }

    pub fn record_finished(duration_secs: f64) {
        BROADCASTS_IN_FLIGHT.dec();
        BROADCAST_DURATION.observe(duration_secs);
    }

    pub fn record_delivered() {
        PEER_DELIVERIES_TOTAL.with_label_values(&["delivered"]).inc();
    }

    pub fn record_failed() {
        PEER_DELIVERIES_TOTAL.with_label_values(&["failed"]).inc();
    }

    pub fn record_skipped_down() {
        PEER_DELIVERIES_TOTAL.with_label_values(&["skipped_down"]).inc();
    }

    pub fn record_retry() {
        DELIVERY_RETRIES_TOTAL.inc();
    }
}

/// Helper struct for peer health metrics
pub struct PeerMetrics;

impl PeerMetrics {
    pub fn set_state(peer_id: &str, state: PeerState) {
        PEER_STATE.with_label_values(&[peer_id]).set(state as i64);
    }

    pub fn record_probe(success: bool) {
        let result = if success { "success" } else { "failure" };
        PEER_PROBES_TOTAL.with_label_values(&[result]).inc();
    }
}

/// Helper struct for receiver metrics
pub struct ReceiverMetrics;

impl ReceiverMetrics {
    pub fn record_outcome(outcome: &str) {
        RECEIVED_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn set_replay_cache_size(size: usize) {
        REPLAY_CACHE_SIZE.set(size as i64);
    }
}
