use std::sync::Arc;

use crate::message::InvalidationMessage;
use crate::metrics::LogoutMetrics;
use crate::session::{truncate_session_id, SessionStore, SessionStoreError};
use crate::signer::Signer;

use super::dispatcher::BroadcastDispatcher;

/// What a local logout did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// Session was valid and is now invalid locally
    Invalidated {
        /// Whether an invalidation message was queued for the cluster
        broadcast_queued: bool,
    },
    /// Session exists but was already invalid; nothing is sent
    AlreadyInvalidated,
    /// No such session on this node; nothing is sent
    Unknown,
}

/// Turns a completed local logout into local invalidation plus a
/// background broadcast.
///
/// Runs on the request path: invalidation is a single store call and the
/// broadcast is only queued, never awaited.
pub struct LogoutDetector {
    node_id: String,
    signer: Signer,
    store: Arc<dyn SessionStore>,
    dispatcher: BroadcastDispatcher,
}

impl LogoutDetector {
    pub fn new(
        node_id: impl Into<String>,
        signer: Signer,
        store: Arc<dyn SessionStore>,
        dispatcher: BroadcastDispatcher,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            signer,
            store,
            dispatcher,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Handle a logout of `session_id` recognized on this node.
    ///
    /// Store failures are returned to the caller since they change what
    /// the user sees. Broadcast problems never are.
    pub fn on_logout(&self, session_id: &str) -> Result<LogoutOutcome, SessionStoreError> {
        let session = truncate_session_id(session_id);

        // Only the caller that flips the session to invalid broadcasts
        if !self.store.invalidate(session_id)? {
            return match self.store.find_by_id(session_id)? {
                Some(_) => {
                    LogoutMetrics::record_already_invalid();
                    tracing::debug!(session_id = %session, "Logout for already invalid session");
                    Ok(LogoutOutcome::AlreadyInvalidated)
                }
                None => {
                    LogoutMetrics::record_unknown();
                    tracing::debug!(session_id = %session, "Logout for unknown session");
                    Ok(LogoutOutcome::Unknown)
                }
            };
        }

        LogoutMetrics::record_invalidated();

        let broadcast_queued =
            match InvalidationMessage::create(session_id, self.node_id.as_str(), &self.signer) {
                Ok(message) => self.dispatcher.dispatch(message),
                Err(e) => {
                    tracing::error!(
                        session_id = %session,
                        error = %e,
                        "Cannot build invalidation message, logout stays local"
                    );
                    false
                }
            };

        tracing::info!(
            session_id = %session,
            broadcast_queued = broadcast_queued,
            "Session logged out"
        );

        Ok(LogoutOutcome::Invalidated { broadcast_queued })
    }

    /// Log out every valid session of `principal`. Returns how many were invalidated.
    pub fn on_principal_logout(&self, principal: &str) -> Result<usize, SessionStoreError> {
        let sessions = self.store.sessions()?;
        let mut invalidated = 0;

        for handle in sessions
            .iter()
            .filter(|h| h.valid && h.principal.as_deref() == Some(principal))
        {
            if let LogoutOutcome::Invalidated { .. } = self.on_logout(&handle.id)? {
                invalidated += 1;
            }
        }

        tracing::info!(
            principal = %principal,
            invalidated = invalidated,
            "Principal logged out"
        );

        Ok(invalidated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cluster::{Broadcaster, HttpTransport, PeerRegistry, RetryPolicy};
    use crate::session::MemorySessionStore;

    use super::super::dispatcher::BroadcastWorker;

    fn detector(queue: usize) -> (LogoutDetector, Arc<MemorySessionStore>, BroadcastWorker) {
        let store = Arc::new(MemorySessionStore::new());
        let registry = Arc::new(PeerRegistry::new(&[], Default::default()));
        let transport =
            Arc::new(HttpTransport::new("/invalidate", Duration::from_millis(100)).unwrap());
        let broadcaster = Arc::new(Broadcaster::new(registry, transport, RetryPolicy::default()));
        let (dispatcher, worker) = BroadcastDispatcher::new(broadcaster, queue, 1);

        let detector = LogoutDetector::new(
            "node-a",
            Signer::new("0123456789abcdef"),
            store.clone(),
            dispatcher,
        );
        (detector, store, worker)
    }

    #[test]
    fn test_logout_invalidates_and_queues_once() {
        let (detector, store, _worker) = detector(8);
        store.create("S123", Some("alice"));

        assert_eq!(
            detector.on_logout("S123").unwrap(),
            LogoutOutcome::Invalidated {
                broadcast_queued: true
            }
        );
        assert!(!store.is_valid("S123"));

        assert_eq!(
            detector.on_logout("S123").unwrap(),
            LogoutOutcome::AlreadyInvalidated
        );
        assert_eq!(detector.on_logout("S999").unwrap(), LogoutOutcome::Unknown);
    }

    #[test]
    fn test_full_queue_still_invalidates_locally() {
        let (detector, store, _worker) = detector(1);
        store.create("S1", None);
        store.create("S2", None);

        detector.on_logout("S1").unwrap();
        assert_eq!(
            detector.on_logout("S2").unwrap(),
            LogoutOutcome::Invalidated {
                broadcast_queued: false
            }
        );
        assert!(!store.is_valid("S2"));
    }

    #[test]
    fn test_principal_logout_only_touches_matching_sessions() {
        let (detector, store, _worker) = detector(8);
        store.create("S1", Some("alice"));
        store.create("S2", Some("alice"));
        store.create("S3", Some("bob"));
        store.create("S4", None);

        assert_eq!(detector.on_principal_logout("alice").unwrap(), 2);
        assert!(!store.is_valid("S1"));
        assert!(!store.is_valid("S2"));
        assert!(store.is_valid("S3"));
        assert!(store.is_valid("S4"));
        assert_eq!(detector.on_principal_logout("alice").unwrap(), 0);
    }
}
