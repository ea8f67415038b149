//! Concurrent fan-out of invalidation messages to active peers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;

use crate::config::ClusterConfig;
use crate::message::{encode, InvalidationMessage};
use crate::metrics::BroadcastMetrics;
use crate::session::truncate_session_id;

use super::backoff::{BackoffConfig, ExponentialBackoff};
use super::registry::PeerRegistry;
use super::transport::{DeliveryError, PeerTransport};
use super::types::PeerNode;

/// Timeout and retry behaviour for one peer delivery
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Bound on each individual attempt
    pub request_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: BackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(2),
            max_retries: 2,
            backoff: BackoffConfig::default(),
        }
    }
}

impl From<&ClusterConfig> for RetryPolicy {
    fn from(config: &ClusterConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            max_retries: config.max_retries,
            backoff: BackoffConfig::from(config),
        }
    }
}

/// Terminal result of sending one message to one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, error: DeliveryError },
    /// Peer was DOWN when the broadcast started
    SkippedDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDelivery {
    pub peer_id: String,
    pub outcome: PeerOutcome,
}

/// Per-peer outcomes of one broadcast, in configuration order
#[derive(Debug, Clone, Default)]
pub struct BroadcastReport {
    pub deliveries: Vec<PeerDelivery>,
}

impl BroadcastReport {
    pub fn delivered(&self) -> usize {
        self.count(|o| matches!(o, PeerOutcome::Delivered { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PeerOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, PeerOutcome::SkippedDown))
    }

    pub fn outcome_for(&self, peer_id: &str) -> Option<&PeerOutcome> {
        self.deliveries
            .iter()
            .find(|d| d.peer_id == peer_id)
            .map(|d| &d.outcome)
    }

    fn count(&self, predicate: impl Fn(&PeerOutcome) -> bool) -> usize {
        self.deliveries.iter().filter(|d| predicate(&d.outcome)).count()
    }
}

/// Sends invalidation messages to every active peer concurrently.
///
/// Each peer has a single-permit lane, so at most one request is
/// outstanding per peer regardless of how many broadcasts overlap.
pub struct Broadcaster {
    registry: Arc<PeerRegistry>,
    transport: Arc<dyn PeerTransport>,
    policy: RetryPolicy,
    lanes: HashMap<String, Arc<Semaphore>>,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<PeerRegistry>,
        transport: Arc<dyn PeerTransport>,
        policy: RetryPolicy,
    ) -> Self {
        let lanes = registry
            .list_all()
            .into_iter()
            .map(|peer| (peer.id, Arc::new(Semaphore::new(1))))
            .collect();

        Self {
            registry,
            transport,
            policy,
            lanes,
        }
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Deliver a message to all HEALTHY and SUSPECT peers.
    ///
    /// Each peer's health is updated exactly once, after its terminal
    /// outcome is known. Never fails: problems only show up in the report.
    #[tracing::instrument(
        name = "cluster.broadcast",
        skip(self, message),
        fields(session_id = %truncate_session_id(&message.session_id), nonce = %message.nonce)
    )]
    pub async fn broadcast(&self, message: &InvalidationMessage) -> BroadcastReport {
        let started = Instant::now();
        BroadcastMetrics::record_started();

        let body = encode(message);
        let mut deliveries: Vec<(usize, PeerDelivery)> = Vec::with_capacity(self.registry.len());
        let mut futures = FuturesUnordered::new();

        for (index, peer) in self.registry.list_all().into_iter().enumerate() {
            if !peer.state.is_active() {
                BroadcastMetrics::record_skipped_down();
                deliveries.push((
                    index,
                    PeerDelivery {
                        peer_id: peer.id,
                        outcome: PeerOutcome::SkippedDown,
                    },
                ));
                continue;
            }

            let body = body.clone();
            futures.push(async move {
                let outcome = self.deliver_to_peer(&peer, body).await;
                (
                    index,
                    PeerDelivery {
                        peer_id: peer.id,
                        outcome,
                    },
                )
            });
        }

        while let Some(delivery) = futures.next().await {
            deliveries.push(delivery);
        }
        deliveries.sort_by_key(|(index, _)| *index);

        let report = BroadcastReport {
            deliveries: deliveries.into_iter().map(|(_, d)| d).collect(),
        };

        BroadcastMetrics::record_finished(started.elapsed().as_secs_f64());
        tracing::info!(
            delivered = report.delivered(),
            failed = report.failed(),
            skipped = report.skipped(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Broadcast finished"
        );

        report
    }

    async fn deliver_to_peer(&self, peer: &PeerNode, body: Bytes) -> PeerOutcome {
        // Lanes are never closed, so acquire only fails if that changes
        let lane = self.lanes.get(&peer.id).cloned();
        let _permit = match &lane {
            Some(lane) => lane.acquire().await.ok(),
            None => None,
        };

        let max_attempts = self.policy.max_retries.saturating_add(1);
        let mut backoff = ExponentialBackoff::with_config(self.policy.backoff.clone());
        let mut attempts = 0;

        let outcome = loop {
            attempts += 1;

            let result = match tokio::time::timeout(
                self.policy.request_timeout,
                self.transport.deliver(peer, body.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout(self.policy.request_timeout)),
            };

            match result {
                Ok(()) => break PeerOutcome::Delivered { attempts },
                Err(error) if error.is_retryable() && attempts < max_attempts => {
                    let delay = backoff.next_delay();
                    tracing::debug!(
                        peer_id = %peer.id,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Delivery failed, retrying"
                    );
                    BroadcastMetrics::record_retry();
                    tokio::time::sleep(delay).await;
                }
                Err(error) => break PeerOutcome::Failed { attempts, error },
            }
        };

        match &outcome {
            PeerOutcome::Delivered { .. } => {
                BroadcastMetrics::record_delivered();
                self.registry.record_success(&peer.id);
            }
            PeerOutcome::Failed { attempts, error } => {
                BroadcastMetrics::record_failed();
                match error {
                    DeliveryError::Rejected { .. } => tracing::error!(
                        peer_id = %peer.id,
                        attempts = attempts,
                        error = %error,
                        "Peer rejected invalidation"
                    ),
                    _ => tracing::warn!(
                        peer_id = %peer.id,
                        attempts = attempts,
                        error = %error,
                        "Delivery to peer failed"
                    ),
                }
                self.registry.record_failure(&peer.id);
            }
            PeerOutcome::SkippedDown => {}
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::cluster::types::{HealthThresholds, PeerState};
    use crate::config::PeerConfig;
    use crate::signer::Signer;

    /// Scripted transport: each peer id maps to a behaviour
    #[derive(Default)]
    struct FakeTransport {
        behaviours: Mutex<HashMap<String, Behaviour>>,
        calls: Mutex<HashMap<String, u32>>,
        in_flight: AtomicU32,
        max_in_flight: AtomicU32,
    }

    #[derive(Clone)]
    enum Behaviour {
        Accept,
        FailTimes(u32),
        Reject,
        Hang,
    }

    impl FakeTransport {
        fn set(&self, peer_id: &str, behaviour: Behaviour) {
            self.behaviours
                .lock()
                .unwrap()
                .insert(peer_id.to_string(), behaviour);
        }

        fn calls(&self, peer_id: &str) -> u32 {
            self.calls.lock().unwrap().get(peer_id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl PeerTransport for FakeTransport {
        async fn deliver(&self, peer: &PeerNode, _body: Bytes) -> Result<(), DeliveryError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                let count = calls.entry(peer.id.clone()).or_insert(0);
                *count += 1;
                *count
            };
            let behaviour = self
                .behaviours
                .lock()
                .unwrap()
                .get(&peer.id)
                .cloned()
                .unwrap_or(Behaviour::Accept);

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match behaviour {
                Behaviour::Accept => Ok(()),
                Behaviour::FailTimes(n) if call <= n => Err(DeliveryError::ServerError(503)),
                Behaviour::FailTimes(_) => Ok(()),
                Behaviour::Reject => Err(DeliveryError::Rejected {
                    status: 401,
                    reason: "REJECTED_SIGNATURE".to_string(),
                }),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
            }
        }

        async fn probe(&self, _peer: &PeerNode) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    fn setup(peers: &[&str]) -> (Broadcaster, Arc<FakeTransport>) {
        let configs: Vec<PeerConfig> = peers
            .iter()
            .map(|id| PeerConfig {
                id: id.to_string(),
                url: format!("http://{id}.internal"),
            })
            .collect();
        let registry = Arc::new(PeerRegistry::new(&configs, HealthThresholds::default()));
        let transport = Arc::new(FakeTransport::default());
        let policy = RetryPolicy {
            request_timeout: Duration::from_millis(50),
            max_retries: 2,
            backoff: BackoffConfig {
                initial_delay_ms: 1,
                max_delay_ms: 5,
                multiplier: 2.0,
                jitter_factor: 0.0,
            },
        };
        (
            Broadcaster::new(registry, transport.clone(), policy),
            transport,
        )
    }

    fn message() -> InvalidationMessage {
        InvalidationMessage::create("S123", "node-a", &Signer::new("0123456789abcdef")).unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_all_active_peers() {
        let (broadcaster, transport) = setup(&["node-b", "node-c", "node-d"]);

        let report = broadcaster.broadcast(&message()).await;
        assert_eq!(report.delivered(), 3);
        let order: Vec<&str> = report.deliveries.iter().map(|d| d.peer_id.as_str()).collect();
        assert_eq!(order, vec!["node-b", "node-c", "node-d"]);
        assert_eq!(transport.calls("node-c"), 1);
        assert!(transport.max_in_flight.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let (broadcaster, transport) = setup(&["node-b"]);
        transport.set("node-b", Behaviour::FailTimes(2));

        let report = broadcaster.broadcast(&message()).await;
        assert_eq!(
            report.outcome_for("node-b"),
            Some(&PeerOutcome::Delivered { attempts: 3 })
        );
        let peer = broadcaster.registry().get("node-b").unwrap();
        assert_eq!(peer.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_count_one_failure() {
        let (broadcaster, transport) = setup(&["node-b", "node-c"]);
        transport.set("node-b", Behaviour::FailTimes(10));

        let report = broadcaster.broadcast(&message()).await;
        assert_eq!(report.failed(), 1);
        assert_eq!(report.delivered(), 1);
        assert_eq!(transport.calls("node-b"), 3);
        assert_eq!(
            broadcaster.registry().get("node-b").unwrap().consecutive_failures,
            1
        );
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let (broadcaster, transport) = setup(&["node-b"]);
        transport.set("node-b", Behaviour::Reject);

        let report = broadcaster.broadcast(&message()).await;
        assert!(matches!(
            report.outcome_for("node-b"),
            Some(PeerOutcome::Failed { attempts: 1, .. })
        ));
        assert_eq!(transport.calls("node-b"), 1);
    }

    #[tokio::test]
    async fn test_hanging_peer_times_out() {
        let (broadcaster, transport) = setup(&["node-b", "node-c"]);
        transport.set("node-b", Behaviour::Hang);

        let started = Instant::now();
        let report = broadcaster.broadcast(&message()).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            report.outcome_for("node-b"),
            Some(PeerOutcome::Failed {
                attempts: 3,
                error: DeliveryError::Timeout(_)
            })
        ));
        assert!(matches!(
            report.outcome_for("node-c"),
            Some(PeerOutcome::Delivered { .. })
        ));
    }

    #[tokio::test]
    async fn test_down_peer_is_skipped() {
        let (broadcaster, transport) = setup(&["node-b", "node-c"]);
        for _ in 0..10 {
            broadcaster.registry().record_failure("node-b");
        }
        assert_eq!(
            broadcaster.registry().get("node-b").unwrap().state,
            PeerState::Down
        );

        let report = broadcaster.broadcast(&message()).await;
        assert_eq!(report.outcome_for("node-b"), Some(&PeerOutcome::SkippedDown));
        assert_eq!(report.skipped(), 1);
        assert_eq!(transport.calls("node-b"), 0);
    }

    #[tokio::test]
    async fn test_overlapping_broadcasts_share_peer_lane() {
        let (broadcaster, transport) = setup(&["node-b"]);
        let broadcaster = Arc::new(broadcaster);
        let msg = message();

        let (a, b) = tokio::join!(broadcaster.broadcast(&msg), broadcaster.broadcast(&msg));
        assert_eq!(a.delivered() + b.delivered(), 2);
        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    }
}
