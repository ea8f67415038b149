use std::sync::Arc;

use thiserror::Error;

use crate::cluster::current_time_ms;
use crate::message::{decode, InvalidationMessage};
use crate::metrics::ReceiverMetrics;
use crate::session::{truncate_session_id, SessionStore, SessionStoreError};
use crate::signer::Signer;

use super::replay::{ReplayCache, ReplayCheck};
use super::ReceiveOutcome;

/// Unexpected local failure while applying a valid message
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Store(#[from] SessionStoreError),
}

/// Verifies inbound invalidations and applies them to the local store.
///
/// Never makes outbound calls: receipt of a message cannot trigger
/// another broadcast.
pub struct ReceiverEndpoint {
    signer: Signer,
    store: Arc<dyn SessionStore>,
    replay: ReplayCache,
    window_ms: u64,
}

impl ReceiverEndpoint {
    pub fn new(signer: Signer, store: Arc<dyn SessionStore>, replay_window_ms: u64) -> Self {
        Self {
            signer,
            store,
            replay: ReplayCache::new(replay_window_ms),
            window_ms: replay_window_ms,
        }
    }

    pub fn replay_cache(&self) -> &ReplayCache {
        &self.replay
    }

    /// Handle raw wire bytes received from a peer
    pub fn receive(&self, bytes: &[u8]) -> Result<ReceiveOutcome, ReceiveError> {
        self.receive_at(bytes, current_time_ms())
    }

    /// [`ReceiverEndpoint::receive`] with an explicit clock
    pub fn receive_at(&self, bytes: &[u8], now_ms: i64) -> Result<ReceiveOutcome, ReceiveError> {
        let result = self.process(bytes, now_ms);
        match &result {
            Ok(outcome) => ReceiverMetrics::record_outcome(&outcome.reason_code().to_lowercase()),
            Err(_) => ReceiverMetrics::record_outcome("error"),
        }
        result
    }

    fn process(&self, bytes: &[u8], now_ms: i64) -> Result<ReceiveOutcome, ReceiveError> {
        let message = match decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, len = bytes.len(), "Rejected malformed invalidation");
                return Ok(ReceiveOutcome::RejectedMalformed);
            }
        };

        if !message.verify(&self.signer) {
            tracing::error!(
                origin = %message.origin_node_id,
                nonce = %message.nonce,
                "Rejected invalidation with bad signature"
            );
            return Ok(ReceiveOutcome::RejectedSignature);
        }

        if now_ms.abs_diff(message.timestamp_ms) > self.window_ms {
            tracing::warn!(
                origin = %message.origin_node_id,
                timestamp_ms = message.timestamp_ms,
                now_ms = now_ms,
                "Rejected stale invalidation"
            );
            return Ok(ReceiveOutcome::RejectedStale);
        }

        match self.replay.check_and_insert(&message, now_ms) {
            ReplayCheck::Replay => {
                tracing::warn!(
                    origin = %message.origin_node_id,
                    nonce = %message.nonce,
                    "Rejected replayed invalidation"
                );
                Ok(ReceiveOutcome::RejectedReplay)
            }
            ReplayCheck::Redelivery(first) => {
                let outcome = match self.store.invalidate(&message.session_id)? {
                    true => ReceiveOutcome::Accepted,
                    false => first.unwrap_or(ReceiveOutcome::Accepted),
                };
                tracing::debug!(
                    origin = %message.origin_node_id,
                    nonce = %message.nonce,
                    outcome = %outcome,
                    "Redelivered invalidation"
                );
                Ok(outcome)
            }
            ReplayCheck::New => match self.apply(&message) {
                Ok(outcome) => {
                    self.replay.record_outcome(&message, outcome);
                    Ok(outcome)
                }
                Err(e) => {
                    // Let the sender's retry be processed from scratch
                    self.replay.forget(&message);
                    Err(e)
                }
            },
        }
    }

    fn apply(&self, message: &InvalidationMessage) -> Result<ReceiveOutcome, ReceiveError> {
        let session = truncate_session_id(&message.session_id);

        if self.store.invalidate(&message.session_id)? {
            tracing::info!(
                session_id = %session,
                origin = %message.origin_node_id,
                "Session invalidated by peer"
            );
            return Ok(ReceiveOutcome::Accepted);
        }

        // Already invalid locally still counts as applied
        match self.store.find_by_id(&message.session_id)? {
            Some(_) => Ok(ReceiveOutcome::Accepted),
            None => {
                tracing::debug!(
                    session_id = %session,
                    origin = %message.origin_node_id,
                    "Invalidation for session not held locally"
                );
                Ok(ReceiveOutcome::LocalSessionNotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{encode, Nonce};
    use crate::session::MemorySessionStore;

    const SECRET: &str = "0123456789abcdef";
    const WINDOW: u64 = 300_000;

    fn endpoint() -> (ReceiverEndpoint, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let endpoint = ReceiverEndpoint::new(Signer::new(SECRET), store.clone(), WINDOW);
        (endpoint, store)
    }

    fn wire(session_id: &str, timestamp_ms: i64, nonce: u8, secret: &str) -> Vec<u8> {
        let message = InvalidationMessage::create_at(
            session_id,
            "node-a",
            timestamp_ms,
            Nonce::from_bytes([nonce; 16]),
            &Signer::new(secret),
        )
        .unwrap();
        encode(&message).to_vec()
    }

    #[test]
    fn test_valid_message_invalidates_session() {
        let (endpoint, store) = endpoint();
        store.create("S123", Some("alice"));
        let now = current_time_ms();

        let outcome = endpoint.receive_at(&wire("S123", now, 1, SECRET), now).unwrap();
        assert_eq!(outcome, ReceiveOutcome::Accepted);
        assert!(!store.is_valid("S123"));
    }

    #[test]
    fn test_unknown_session_is_not_an_error() {
        let (endpoint, _store) = endpoint();
        let now = current_time_ms();

        let outcome = endpoint.receive_at(&wire("S999", now, 1, SECRET), now).unwrap();
        assert_eq!(outcome, ReceiveOutcome::LocalSessionNotFound);
        assert_eq!(outcome.status_code(), axum::http::StatusCode::OK);
    }

    #[test]
    fn test_redelivery_is_idempotent() {
        let (endpoint, store) = endpoint();
        store.create("S123", None);
        let now = current_time_ms();
        let bytes = wire("S123", now, 1, SECRET);

        assert_eq!(endpoint.receive_at(&bytes, now).unwrap(), ReceiveOutcome::Accepted);
        assert!(!store.is_valid("S123"));
        assert_eq!(endpoint.receive_at(&bytes, now + 10).unwrap(), ReceiveOutcome::Accepted);
        assert!(!store.is_valid("S123"));
    }

    #[test]
    fn test_reused_nonce_is_replay() {
        let (endpoint, store) = endpoint();
        store.create("S123", None);
        store.create("S456", None);
        let now = current_time_ms();

        endpoint.receive_at(&wire("S123", now, 7, SECRET), now).unwrap();
        let outcome = endpoint.receive_at(&wire("S456", now, 7, SECRET), now).unwrap();
        assert_eq!(outcome, ReceiveOutcome::RejectedReplay);
        assert!(store.is_valid("S456"));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let (endpoint, store) = endpoint();
        store.create("S123", None);
        let now = current_time_ms();

        let outcome = endpoint
            .receive_at(&wire("S123", now, 1, "another-secret-value"), now)
            .unwrap();
        assert_eq!(outcome, ReceiveOutcome::RejectedSignature);
        assert!(store.is_valid("S123"));
        assert!(endpoint.replay_cache().is_empty());
    }

    #[test]
    fn test_timestamps_outside_window_are_stale() {
        let (endpoint, store) = endpoint();
        store.create("S123", None);
        let now = current_time_ms();

        let old = endpoint
            .receive_at(&wire("S123", now - WINDOW as i64 - 1, 1, SECRET), now)
            .unwrap();
        assert_eq!(old, ReceiveOutcome::RejectedStale);

        let future = endpoint
            .receive_at(&wire("S123", now + WINDOW as i64 + 1, 2, SECRET), now)
            .unwrap();
        assert_eq!(future, ReceiveOutcome::RejectedStale);

        let edge = endpoint
            .receive_at(&wire("S123", now - WINDOW as i64, 3, SECRET), now)
            .unwrap();
        assert_eq!(edge, ReceiveOutcome::Accepted);
    }

    #[test]
    fn test_truncated_message_is_malformed() {
        let (endpoint, store) = endpoint();
        store.create("S123", None);
        let now = current_time_ms();
        let bytes = wire("S123", now, 1, SECRET);

        let outcome = endpoint.receive_at(&bytes[..bytes.len() - 40], now).unwrap();
        assert_eq!(outcome, ReceiveOutcome::RejectedMalformed);
        assert!(store.is_valid("S123"));
    }

    struct BrokenStore;

    impl SessionStore for BrokenStore {
        fn find_by_id(
            &self,
            _session_id: &str,
        ) -> Result<Option<crate::session::SessionHandle>, SessionStoreError> {
            Err(SessionStoreError::Unavailable("offline".into()))
        }

        fn invalidate(&self, _session_id: &str) -> Result<bool, SessionStoreError> {
            Err(SessionStoreError::Unavailable("offline".into()))
        }

        fn sessions(&self) -> Result<Vec<crate::session::SessionHandle>, SessionStoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_store_failure_is_surfaced_and_not_cached() {
        let endpoint = ReceiverEndpoint::new(Signer::new(SECRET), Arc::new(BrokenStore), WINDOW);
        let now = current_time_ms();

        assert!(endpoint.receive_at(&wire("S123", now, 1, SECRET), now).is_err());
        assert!(endpoint.replay_cache().is_empty());
    }
}
