use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::cluster::{PeerRegistry, PeerTransport};
use crate::metrics::PeerMetrics;

/// Background task probing DOWN peers so they can rejoin broadcasts
pub struct PeerProbeTask {
    registry: Arc<PeerRegistry>,
    transport: Arc<dyn PeerTransport>,
    interval: Duration,
    probe_timeout: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl PeerProbeTask {
    pub fn new(
        registry: Arc<PeerRegistry>,
        transport: Arc<dyn PeerTransport>,
        interval: Duration,
        probe_timeout: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            registry,
            transport,
            interval,
            probe_timeout,
            shutdown,
        }
    }

    /// Run the probe loop until shutdown
    pub async fn run(mut self) {
        let mut probe_timer = tokio::time::interval(self.interval);

        // Skip immediate first tick
        probe_timer.tick().await;

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            peers = self.registry.len(),
            "Peer probe task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Peer probe task received shutdown signal");
                    break;
                }
                _ = probe_timer.tick() => {
                    self.probe_down_peers().await;
                }
            }
        }

        tracing::info!("Peer probe task stopped");
    }

    /// Probe every DOWN peer once, concurrently. Returns how many recovered.
    pub async fn probe_down_peers(&self) -> usize {
        let down = self.registry.list_down();
        if down.is_empty() {
            return 0;
        }

        let probes = down.iter().map(|peer| async move {
            let result = match timeout(self.probe_timeout, self.transport.probe(peer)).await {
                Ok(result) => result.is_ok(),
                Err(_) => false,
            };
            PeerMetrics::record_probe(result);

            if result {
                self.registry.record_probe_success(&peer.id);
            } else {
                tracing::debug!(peer_id = %peer.id, "Probe failed, peer stays down");
                self.registry.record_probe_failure(&peer.id);
            }
            result
        });

        let recovered = join_all(probes).await.into_iter().filter(|ok| *ok).count();

        tracing::debug!(
            probed = down.len(),
            recovered = recovered,
            "Peer probe round completed"
        );

        recovered
    }
}
