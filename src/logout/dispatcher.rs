//! Hand-off from the request path to background broadcasting

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Semaphore};

use crate::cluster::Broadcaster;
use crate::message::InvalidationMessage;
use crate::metrics::LogoutMetrics;
use crate::session::truncate_session_id;

/// Request-side handle: queues messages without ever waiting
#[derive(Clone)]
pub struct BroadcastDispatcher {
    sender: mpsc::Sender<InvalidationMessage>,
}

impl BroadcastDispatcher {
    /// Create the dispatcher and the worker that drains its queue
    pub fn new(
        broadcaster: Arc<Broadcaster>,
        queue_capacity: usize,
        max_concurrent_broadcasts: usize,
    ) -> (Self, BroadcastWorker) {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let max_concurrent = max_concurrent_broadcasts.max(1);

        let worker = BroadcastWorker {
            receiver,
            broadcaster,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        };
        (Self { sender }, worker)
    }

    /// Queue a message for broadcast. Returns `false` if it was dropped.
    pub fn dispatch(&self, message: InvalidationMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                LogoutMetrics::record_dispatch_dropped();
                tracing::warn!(
                    session_id = %truncate_session_id(&message.session_id),
                    "Broadcast queue full, invalidation not propagated"
                );
                false
            }
            Err(TrySendError::Closed(message)) => {
                tracing::warn!(
                    session_id = %truncate_session_id(&message.session_id),
                    "Broadcast worker stopped, invalidation not propagated"
                );
                false
            }
        }
    }
}

/// Background task running broadcasts with bounded concurrency
pub struct BroadcastWorker {
    receiver: mpsc::Receiver<InvalidationMessage>,
    broadcaster: Arc<Broadcaster>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl BroadcastWorker {
    /// Run until shutdown, then finish queued and in-flight broadcasts
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            max_concurrent = self.max_concurrent,
            "Broadcast worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Broadcast worker received shutdown signal");
                    break;
                }
                message = self.receiver.recv() => match message {
                    Some(message) => self.spawn_broadcast(message).await,
                    None => break,
                }
            }
        }

        // Stop accepting, then drain what was already queued
        self.receiver.close();
        let mut drained = 0;
        while let Some(message) = self.receiver.recv().await {
            self.spawn_broadcast(message).await;
            drained += 1;
        }

        // All permits back means no broadcast is still running
        let _ = self.permits.acquire_many(self.max_concurrent as u32).await;

        tracing::info!(drained = drained, "Broadcast worker stopped");
    }

    async fn spawn_broadcast(&self, message: InvalidationMessage) {
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let broadcaster = self.broadcaster.clone();
        tokio::spawn(async move {
            broadcaster.broadcast(&message).await;
            drop(permit);
        });
    }
}
