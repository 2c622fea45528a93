//! Runner HTTP API

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use loginlab_common::{DispatchAck, DispatchRequest};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::RunnerError;
use crate::worker::Worker;

#[derive(Clone)]
pub struct RunnerState {
    pub worker: Worker,
}

impl IntoResponse for RunnerError {
    fn into_response(self) -> Response {
        let status = match &self {
            RunnerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RunnerError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            other => {
                error!(error = %other, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: RunnerState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/execute", post(execute_handler))
        .route("/jobs/:run_id/cancel", post(cancel_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the runner server
pub async fn serve(addr: SocketAddr, state: RunnerState) -> anyhow::Result<()> {
    info!("Runner listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn health_handler(State(state): State<RunnerState>) -> impl IntoResponse {
    Json(json!({ "ok": true, "active_jobs": state.worker.active_jobs() }))
}

async fn execute_handler(
    State(state): State<RunnerState>,
    body: Result<Json<DispatchRequest>, JsonRejection>,
) -> Result<Json<DispatchAck>, RunnerError> {
    let Json(request) = body.map_err(|e| RunnerError::InvalidRequest(e.body_text()))?;

    for (field, value) in [
        ("run_id", &request.run_id),
        ("scenario_id", &request.scenario_id),
        ("base_url", &request.base_url),
    ] {
        if value.trim().is_empty() {
            return Err(RunnerError::InvalidRequest(format!("{} is required", field)));
        }
    }

    let run_id = request.run_id.clone();
    if state.worker.submit(request)? {
        info!(run_id = %run_id, "Job queued");
    }

    Ok(Json(DispatchAck {
        accepted: true,
        run_id,
    }))
}

async fn cancel_handler(
    State(state): State<RunnerState>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    Json(json!({ "cancelled": state.worker.cancel(&run_id) }))
}
