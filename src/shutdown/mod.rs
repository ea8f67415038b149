//! Graceful shutdown of the relay's background work.
//!
//! 1. Signals background tasks (broadcast worker, peer probe) to stop
//! 2. Waits for queued and in-flight broadcasts, bounded by a drain timeout

use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for pending broadcasts (default: 5 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Coordinates stopping the relay's background tasks
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(shutdown_tx: broadcast::Sender<()>, config: ShutdownConfig) -> Self {
        Self {
            shutdown_tx,
            config,
        }
    }

    /// Execute the shutdown sequence.
    ///
    /// `broadcast_worker` is the worker's task handle; `other_tasks` are
    /// stopped but not waited on beyond the same timeout.
    #[tracing::instrument(name = "graceful_shutdown", skip_all)]
    pub async fn execute(
        &self,
        broadcast_worker: JoinHandle<()>,
        other_tasks: Vec<JoinHandle<()>>,
    ) -> ShutdownResult {
        let start = Instant::now();

        tracing::info!("Phase 1: Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 2: Draining pending broadcasts");
        let broadcasts_drained = match timeout(self.config.drain_timeout, broadcast_worker).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Broadcast worker panicked");
                false
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.drain_timeout.as_millis() as u64,
                    "Broadcast drain timeout, pending invalidations may not reach peers"
                );
                false
            }
        };

        let remaining = self.config.drain_timeout.saturating_sub(start.elapsed());
        let tasks_stopped = timeout(remaining, futures::future::join_all(other_tasks))
            .await
            .is_ok();

        let result = ShutdownResult {
            broadcasts_drained,
            tasks_stopped,
            duration: start.elapsed(),
        };

        tracing::info!(
            broadcasts_drained = result.broadcasts_drained,
            tasks_stopped = result.tasks_stopped,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether every queued broadcast finished in time
    pub broadcasts_drained: bool,
    /// Whether the other background tasks stopped in time
    pub tasks_stopped: bool,
    /// Total time taken for shutdown
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signals_and_waits() {
        let (tx, mut rx) = broadcast::channel(1);
        let mut probe_rx = tx.subscribe();

        let worker = tokio::spawn(async move {
            let _ = rx.recv().await;
        });
        let probe = tokio::spawn(async move {
            let _ = probe_rx.recv().await;
        });

        let result = GracefulShutdown::new(tx).execute(worker, vec![probe]).await;
        assert!(result.broadcasts_drained);
        assert!(result.tasks_stopped);
    }

    #[tokio::test]
    async fn test_shutdown_times_out_on_stuck_worker() {
        let (tx, _rx) = broadcast::channel(1);
        let worker = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let shutdown = GracefulShutdown::with_config(
            tx,
            ShutdownConfig {
                drain_timeout: Duration::from_millis(50),
            },
        );
        let result = shutdown.execute(worker, Vec::new()).await;
        assert!(!result.broadcasts_drained);
        assert!(result.tasks_stopped);
    }

    #[test]
    fn test_shutdown_config_defaults() {
        assert_eq!(ShutdownConfig::default().drain_timeout, Duration::from_secs(5));
    }
}
