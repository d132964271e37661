use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tracing::info;

use super::{
    services::{automation_status, execute_immediate, get_job, health, schedule_maintenance},
    state::AppState,
};
use crate::collaborators::{NoopContentUpdater, NoopPerformanceRecorder, NoopPositionManager};
use crate::config::Config;
use crate::observability::Metrics;
use crate::scheduler::MaintenanceScheduler;
use crate::store::FjallStore;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/maintenance", post(schedule_maintenance))
        .route("/maintenance/immediate", post(execute_immediate))
        .route("/maintenance/jobs/{job_id}", get(get_job))
        .route("/maintenance/status", get(automation_status))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn run(address: SocketAddr) -> Result<(), AnyError> {
    info!("Loading configuration");
    let config = Config::load().map_err(|e| format!("Failed to load config: {e}"))?;

    info!(path = %config.server.store_path.display(), "Opening fjall store");
    let store = Arc::new(
        FjallStore::open(&config.server.store_path)
            .map_err(|e| format!("Failed to open store: {e}"))?,
    );

    let metrics = Arc::new(Metrics::new());

    // Platform-facing collaborators are wired by the embedding deployment;
    // the standalone server runs with pass-through implementations.
    let scheduler = MaintenanceScheduler::new(
        store.clone(),
        store.clone(),
        Arc::new(NoopContentUpdater),
        Arc::new(NoopPositionManager),
        Arc::new(NoopPerformanceRecorder),
        config.scheduler.clone(),
        config.conflict.clone(),
        config.selection.clone(),
        metrics.clone(),
    );
    scheduler.start().await;

    let state = AppState::new(config, scheduler.clone(), store, metrics);
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "Rotabox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
