use crate::clients::ClientInfo;
use crate::metrics::MetricsSnapshot;
use crate::service::GuardService;
use crate::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use upgrade_common::{LifecycleState, WireMessage};
use uuid::Uuid;

#[derive(Clone)]
pub struct AdminState {
    pub service: Arc<GuardService>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    instance_id: Uuid,
    lifecycle: LifecycleState,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/clients", get(clients_handler))
        .route("/control", post(control_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_admin_server(port: u16, state: AdminState) -> Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting Admin API on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        crate::error::GuardError::Network(format!("Failed to bind admin port {}: {}", port, e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::GuardError::Network(format!("Admin server failed: {}", e)))?;

    Ok(())
}

async fn health_handler(State(state): State<AdminState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        instance_id: state.service.instance_id(),
        lifecycle: state.service.state(),
    })
}

async fn metrics_handler(State(state): State<AdminState>) -> Json<MetricsSnapshot> {
    Json(state.service.metrics().snapshot())
}

async fn clients_handler(State(state): State<AdminState>) -> Json<Vec<ClientInfo>> {
    Json(state.service.clients().list().await)
}

/// Deliver a wire control message to the instance.
///
/// The body is decoded by hand so that malformed JSON yields a plain 400
/// while well-formed messages of unknown type are accepted and ignored.
async fn control_handler(State(state): State<AdminState>, body: Bytes) -> Response {
    let message = match serde_json::from_slice::<WireMessage>(&body) {
        Ok(message) => message,
        Err(e) => {
            debug!("Rejecting malformed control message: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("malformed control message: {}", e),
                }),
            )
                .into_response();
        }
    };

    let kind = message.kind();
    match state.service.control().deliver(message).await {
        Ok(Some(status)) => (StatusCode::OK, Json(status)).into_response(),
        Ok(None) if kind == "SKIP_WAITING" => StatusCode::ACCEPTED.into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!("Control message {} not delivered: {}", kind, e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
