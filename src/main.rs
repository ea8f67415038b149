use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use ara_session_relay::config::Settings;
use ara_session_relay::server::{create_app, AppState};
use ara_session_relay::session::MemorySessionStore;
use ara_session_relay::shutdown::GracefulShutdown;
use ara_session_relay::tasks::PeerProbeTask;
use ara_session_relay::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    let _telemetry = init_telemetry(&settings.otel, &settings.node.id)?;
    tracing::info!(node_id = %settings.node.id, "Configuration loaded");

    settings.validate()?;

    // Standalone deployments keep sessions in process; embedding hosts
    // supply their own SessionStore
    let store = Arc::new(MemorySessionStore::new());
    let (state, broadcast_worker) = AppState::with_http_transport(settings.clone(), store)?;
    tracing::info!(
        peers = state.registry.len(),
        endpoint_path = %settings.cluster.endpoint_path,
        "Application state initialized"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start broadcast worker in background
    let worker_handle = tokio::spawn(broadcast_worker.run(shutdown_tx.subscribe()));

    // Start peer probe task in background
    let probe_task = PeerProbeTask::new(
        state.registry.clone(),
        state.transport.clone(),
        settings.cluster.probe_interval(),
        settings.cluster.request_timeout(),
        shutdown_tx.subscribe(),
    );
    let probe_handle = tokio::spawn(probe_task.run());

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal_handler())
    .await?;

    // Stop background tasks and drain pending broadcasts
    GracefulShutdown::new(shutdown_tx)
        .execute(worker_handle, vec![probe_handle])
        .await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
