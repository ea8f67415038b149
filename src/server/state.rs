use std::sync::Arc;
use std::time::Instant;

use crate::access::AccessPolicy;
use crate::cluster::{Broadcaster, HttpTransport, PeerRegistry, PeerTransport, RetryPolicy};
use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::logout::{BroadcastDispatcher, BroadcastWorker, LogoutDetector};
use crate::receiver::ReceiverEndpoint;
use crate::session::SessionStore;
use crate::signer::Signer;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn SessionStore>,
    pub registry: Arc<PeerRegistry>,
    pub transport: Arc<dyn PeerTransport>,
    pub receiver: Arc<ReceiverEndpoint>,
    pub detector: Arc<LogoutDetector>,
    pub access: Arc<AccessPolicy>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire up the relay around a host session store.
    ///
    /// Returns the worker that must be spawned for queued broadcasts to
    /// actually be sent.
    pub fn new(
        settings: Settings,
        store: Arc<dyn SessionStore>,
        transport: Arc<dyn PeerTransport>,
    ) -> (Self, BroadcastWorker) {
        let cluster = &settings.cluster;
        let signer = Signer::new(&cluster.shared_secret);

        let registry = Arc::new(PeerRegistry::from_config(cluster));
        let broadcaster = Arc::new(Broadcaster::new(
            registry.clone(),
            transport.clone(),
            RetryPolicy::from(cluster),
        ));
        let (dispatcher, worker) = BroadcastDispatcher::new(
            broadcaster,
            cluster.dispatch_queue_capacity,
            cluster.max_concurrent_broadcasts,
        );

        let receiver = Arc::new(ReceiverEndpoint::new(
            signer.clone(),
            store.clone(),
            cluster.replay_window_ms,
        ));
        let detector = Arc::new(LogoutDetector::new(
            settings.node.id.clone(),
            signer,
            store.clone(),
            dispatcher,
        ));
        let access = Arc::new(AccessPolicy::from_config(&settings.access));

        let state = Self {
            settings: Arc::new(settings),
            store,
            registry,
            transport,
            receiver,
            detector,
            access,
            start_time: Instant::now(),
        };
        (state, worker)
    }

    /// [`AppState::new`] with the HTTP peer transport
    pub fn with_http_transport(
        settings: Settings,
        store: Arc<dyn SessionStore>,
    ) -> Result<(Self, BroadcastWorker)> {
        let transport = HttpTransport::new(
            settings.cluster.endpoint_path.clone(),
            settings.cluster.request_timeout(),
        )
        .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::new(settings, store, Arc::new(transport)))
    }
}
