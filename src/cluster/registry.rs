//! Static peer registry with per-peer health tracking
//!
//! Health fields are plain atomics per peer, so updates contend only on the
//! peer being updated and no lock is held across a broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};

use crate::config::{ClusterConfig, PeerConfig};
use crate::metrics::PeerMetrics;

use super::types::{current_time_ms, HealthThresholds, PeerNode, PeerState};

/// Sentinel for "never happened" in timestamp atomics
const NEVER: i64 = i64::MIN;

struct PeerEntry {
    id: String,
    base_url: String,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    last_attempt: AtomicI64,
    last_success: AtomicI64,
}

impl PeerEntry {
    fn new(config: &PeerConfig) -> Self {
        Self {
            id: config.id.clone(),
            base_url: config.url.trim_end_matches('/').to_string(),
            state: AtomicU8::new(PeerState::Healthy as u8),
            consecutive_failures: AtomicU32::new(0),
            last_attempt: AtomicI64::new(NEVER),
            last_success: AtomicI64::new(NEVER),
        }
    }

    fn state(&self) -> PeerState {
        PeerState::from(self.state.load(Ordering::Acquire))
    }

    fn snapshot(&self) -> PeerNode {
        let timestamp = |value: i64| (value != NEVER).then_some(value);
        PeerNode {
            id: self.id.clone(),
            base_url: self.base_url.clone(),
            state: self.state(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Acquire),
            last_attempt: timestamp(self.last_attempt.load(Ordering::Acquire)),
            last_success: timestamp(self.last_success.load(Ordering::Acquire)),
        }
    }
}

/// Configured cluster peers and their health.
///
/// Membership is fixed at construction; peers are never removed.
pub struct PeerRegistry {
    peers: Vec<PeerEntry>,
    index: HashMap<String, usize>,
    thresholds: HealthThresholds,
}

impl PeerRegistry {
    pub fn new(peers: &[PeerConfig], thresholds: HealthThresholds) -> Self {
        let peers: Vec<PeerEntry> = peers.iter().map(PeerEntry::new).collect();
        let index = peers
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.id.clone(), i))
            .collect();

        for entry in &peers {
            PeerMetrics::set_state(&entry.id, PeerState::Healthy);
        }

        Self {
            peers,
            index,
            thresholds,
        }
    }

    pub fn from_config(config: &ClusterConfig) -> Self {
        Self::new(
            &config.peers,
            HealthThresholds {
                suspect_threshold: config.suspect_threshold,
                down_threshold: config.down_threshold,
            },
        )
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn thresholds(&self) -> HealthThresholds {
        self.thresholds
    }

    fn entry(&self, peer_id: &str) -> Option<&PeerEntry> {
        self.index.get(peer_id).map(|&i| &self.peers[i])
    }

    /// Position of a peer in configuration order
    pub fn position(&self, peer_id: &str) -> Option<usize> {
        self.index.get(peer_id).copied()
    }

    pub fn get(&self, peer_id: &str) -> Option<PeerNode> {
        self.entry(peer_id).map(PeerEntry::snapshot)
    }

    /// All peers in configuration order
    pub fn list_all(&self) -> Vec<PeerNode> {
        self.peers.iter().map(PeerEntry::snapshot).collect()
    }

    /// HEALTHY and SUSPECT peers in configuration order
    pub fn list_active(&self) -> Vec<PeerNode> {
        self.peers
            .iter()
            .filter(|entry| entry.state().is_active())
            .map(PeerEntry::snapshot)
            .collect()
    }

    /// DOWN peers, the probe task's work list
    pub fn list_down(&self) -> Vec<PeerNode> {
        self.peers
            .iter()
            .filter(|entry| entry.state() == PeerState::Down)
            .map(PeerEntry::snapshot)
            .collect()
    }

    /// Record a delivered broadcast. Returns the peer's new state.
    pub fn record_success(&self, peer_id: &str) -> Option<PeerState> {
        let entry = self.entry(peer_id)?;
        let now = current_time_ms();

        entry.last_attempt.store(now, Ordering::Release);
        entry.last_success.store(now, Ordering::Release);
        entry.consecutive_failures.store(0, Ordering::Release);
        let previous = PeerState::from(entry.state.swap(PeerState::Healthy as u8, Ordering::AcqRel));

        if previous != PeerState::Healthy {
            tracing::info!(
                peer_id = %entry.id,
                from = %previous,
                "Peer recovered to healthy"
            );
            PeerMetrics::set_state(&entry.id, PeerState::Healthy);
        }

        Some(PeerState::Healthy)
    }

    /// Record a broadcast that exhausted its attempts. Returns the peer's new state.
    pub fn record_failure(&self, peer_id: &str) -> Option<PeerState> {
        let entry = self.entry(peer_id)?;

        entry.last_attempt.store(current_time_ms(), Ordering::Release);
        let failures = entry
            .consecutive_failures
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1);

        // States only escalate on failure; fetch_max keeps concurrent updates monotone
        let target = self.thresholds.state_for(failures);
        let previous = PeerState::from(entry.state.fetch_max(target as u8, Ordering::AcqRel));
        let current = previous.max(target);

        if current != previous {
            match current {
                PeerState::Down => tracing::warn!(
                    peer_id = %entry.id,
                    failures = failures,
                    "Peer marked down, excluded from broadcasts"
                ),
                _ => tracing::warn!(
                    peer_id = %entry.id,
                    failures = failures,
                    "Peer marked suspect"
                ),
            }
            PeerMetrics::set_state(&entry.id, current);
        }

        Some(current)
    }

    /// Record a successful probe of a DOWN peer.
    ///
    /// The peer returns to SUSPECT with its failure count at the suspect
    /// threshold, so it needs a real delivery to become HEALTHY again.
    pub fn record_probe_success(&self, peer_id: &str) -> Option<PeerState> {
        let entry = self.entry(peer_id)?;
        let now = current_time_ms();
        entry.last_attempt.store(now, Ordering::Release);

        let recovered = entry
            .state
            .compare_exchange(
                PeerState::Down as u8,
                PeerState::Suspect as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if recovered {
            entry.last_success.store(now, Ordering::Release);
            entry
                .consecutive_failures
                .store(self.thresholds.suspect_threshold, Ordering::Release);
            tracing::info!(peer_id = %entry.id, "Probe succeeded, peer back to suspect");
            PeerMetrics::set_state(&entry.id, PeerState::Suspect);
        }

        Some(entry.state())
    }

    /// Record a failed probe. The peer stays DOWN.
    pub fn record_probe_failure(&self, peer_id: &str) {
        if let Some(entry) = self.entry(peer_id) {
            entry.last_attempt.store(current_time_ms(), Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(suspect: u32, down: u32) -> PeerRegistry {
        let peers = vec![
            PeerConfig {
                id: "node-b".to_string(),
                url: "http://10.0.0.2:8082/".to_string(),
            },
            PeerConfig {
                id: "node-c".to_string(),
                url: "http://10.0.0.3:8082".to_string(),
            },
        ];
        PeerRegistry::new(
            &peers,
            HealthThresholds {
                suspect_threshold: suspect,
                down_threshold: down,
            },
        )
    }

    #[test]
    fn test_initial_state() {
        let registry = registry(3, 10);
        assert_eq!(registry.len(), 2);

        let active = registry.list_active();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].id, "node-b");
        assert_eq!(active[0].base_url, "http://10.0.0.2:8082");
        assert_eq!(active[0].state, PeerState::Healthy);
        assert_eq!(active[0].last_attempt, None);
        assert_eq!(active[0].last_success, None);
    }

    #[test]
    fn test_failures_escalate_to_suspect_then_down() {
        let registry = registry(3, 10);

        for _ in 0..2 {
            assert_eq!(registry.record_failure("node-b"), Some(PeerState::Healthy));
        }
        assert_eq!(registry.record_failure("node-b"), Some(PeerState::Suspect));
        assert_eq!(registry.list_active().len(), 2);

        for _ in 3..9 {
            assert_eq!(registry.record_failure("node-b"), Some(PeerState::Suspect));
        }
        assert_eq!(registry.record_failure("node-b"), Some(PeerState::Down));

        let active = registry.list_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "node-c");
        assert_eq!(registry.list_down()[0].id, "node-b");
        assert_eq!(registry.get("node-b").unwrap().consecutive_failures, 10);
        assert!(registry.get("node-b").unwrap().last_attempt.is_some());
    }

    #[test]
    fn test_success_resets_to_healthy() {
        let registry = registry(1, 2);
        registry.record_failure("node-b");
        assert_eq!(registry.get("node-b").unwrap().state, PeerState::Suspect);

        assert_eq!(registry.record_success("node-b"), Some(PeerState::Healthy));
        let peer = registry.get("node-b").unwrap();
        assert_eq!(peer.state, PeerState::Healthy);
        assert_eq!(peer.consecutive_failures, 0);
        assert!(peer.last_success.is_some());
    }

    #[test]
    fn test_probe_recovers_down_peer_to_suspect() {
        let registry = registry(3, 5);
        for _ in 0..5 {
            registry.record_failure("node-b");
        }
        assert_eq!(registry.get("node-b").unwrap().state, PeerState::Down);

        registry.record_probe_failure("node-b");
        assert_eq!(registry.get("node-b").unwrap().state, PeerState::Down);

        assert_eq!(registry.record_probe_success("node-b"), Some(PeerState::Suspect));
        let peer = registry.get("node-b").unwrap();
        assert_eq!(peer.consecutive_failures, 3);
        assert!(peer.state.is_active());

        // Two more failures put it back down
        registry.record_failure("node-b");
        assert_eq!(registry.record_failure("node-b"), Some(PeerState::Down));
    }

    #[test]
    fn test_probe_success_ignores_non_down_peer() {
        let registry = registry(3, 10);
        assert_eq!(registry.record_probe_success("node-b"), Some(PeerState::Healthy));
        assert_eq!(registry.get("node-b").unwrap().consecutive_failures, 0);
    }

    #[test]
    fn test_unknown_peer() {
        let registry = registry(3, 10);
        assert_eq!(registry.record_success("node-x"), None);
        assert_eq!(registry.record_failure("node-x"), None);
        assert!(registry.get("node-x").is_none());
        assert_eq!(registry.position("node-c"), Some(1));
    }
}
