//! Application startup and lifecycle management.

use crate::config::SubscriptionConfig;
use crate::models::{SweepKind, SweepReport};
use crate::services::{
    get_metrics, init_metrics, InMemorySubscriptionRepository, LogNotifier, SubscriptionManager,
    SubscriptionService,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: SubscriptionConfig,
    pub service: Arc<dyn SubscriptionService>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.health_check().await {
        Ok(()) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": state.config.service_name,
                    "version": state.config.service_version
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - repository unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": state.config.service_name,
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.health_check().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Trigger for an external scheduler (cron, k8s CronJob).
async fn sweep_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<SweepReport>, AppError> {
    let kind = SweepKind::from_slug(&kind)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Unknown sweep: {}", kind)))?;

    tracing::info!(sweep = %kind, "Sweep triggered");
    let report = state.service.run_sweep(kind).await?;
    Ok(Json(report))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/internal/sweeps/:kind", post(sweep_handler))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application backed by the in-process repository.
    pub async fn build(config: SubscriptionConfig) -> Result<Self, AppError> {
        config.billing.validate()?;

        let service = SubscriptionManager::new(
            Arc::new(InMemorySubscriptionRepository::new()),
            Arc::new(LogNotifier),
            config.billing.clone(),
        );

        Self::build_with(config, Arc::new(service)).await
    }

    /// Build the application around an already-wired service.
    pub async fn build_with(
        config: SubscriptionConfig,
        service: Arc<dyn SubscriptionService>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let address = config.common.bind_address();
        let http_listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!(error = %e, addr = %address, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Subscription service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state: AppState { config, service },
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn service(&self) -> Arc<dyn SubscriptionService> {
        self.state.service.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let http_router = router(self.state.clone());

        tracing::info!(
            service = %self.state.config.service_name,
            version = %self.state.config.service_version,
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, http_router)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "HTTP server error");
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
