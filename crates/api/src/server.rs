//! Control plane HTTP API

use crate::dispatch::Dispatcher;
use crate::registry::RunRegistry;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use loginlab_common::{
    diff_values, DispatchRequest, Error, IncrementalUpdate, ListRunsResponse, Run, RunDiffReport,
    RunUpdate, ScenariosResponse, SubmitRunRequest, TerminalComplete, DEFAULT_SCENARIO_ID,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Most diff entries returned by one comparison
pub const MAX_DIFF_ENTRIES: usize = 500;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<RunRegistry>,
    pub dispatcher: Dispatcher,
    /// Sent with every job as its deadline
    pub job_deadline_secs: u64,
}

/// Error response with a JSON `{error}` body
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::UnknownScenario(_) | Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            other => {
                error!(error = %other, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the router
pub fn router(state: ApiState) -> Router {
    let artifacts = ServeDir::new(state.registry.artifacts().root());

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/scenarios", get(scenarios_handler))
        .route(
            "/runs",
            get(list_runs_handler)
                .post(submit_run_handler)
                .delete(clear_runs_handler),
        )
        .route("/runs/:id", get(get_run_handler))
        .route("/runs/:id/update", post(update_run_handler))
        .route("/runs/:id/complete", post(complete_run_handler))
        .route("/runs/:a/diff/:b", get(diff_runs_handler))
        .nest_service("/artifacts", artifacts)
        .fallback(not_found_handler)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the API server
pub async fn serve(addr: SocketAddr, state: ApiState) -> anyhow::Result<()> {
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn scenarios_handler(State(state): State<ApiState>) -> Json<ScenariosResponse> {
    Json(ScenariosResponse {
        scenarios: state.registry.catalog().all().to_vec(),
    })
}

async fn submit_run_handler(
    State(state): State<ApiState>,
    Json(req): Json<SubmitRunRequest>,
) -> ApiResult<Run> {
    let scenario_id = req
        .scenario_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SCENARIO_ID.to_string());

    let run = state.registry.create(&scenario_id, req.tests)?;
    let base_url = state.registry.catalog().require(&run.scenario_id)?.target_base_url.clone();

    let request = DispatchRequest {
        run_id: run.id.clone(),
        scenario_id: run.scenario_id.clone(),
        base_url,
        tests: run.selected_tests.clone(),
        deadline_secs: Some(state.job_deadline_secs),
    };
    if let Err(e) = state.dispatcher.submit(request) {
        warn!(run_id = %run.id, error = %e, "Could not queue dispatch");
        state.registry.fail_dispatch(&run.id, &e.to_string())?;
    }

    Ok(Json(run))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

async fn list_runs_handler(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Json<ListRunsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Json(ListRunsResponse {
        runs: state.registry.list(limit),
    })
}

async fn get_run_handler(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<Run> {
    Ok(Json(state.registry.fetch(&id).await?))
}

async fn update_run_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(update): Json<IncrementalUpdate>,
) -> ApiResult<Run> {
    Ok(Json(state.registry.apply(&id, RunUpdate::Incremental(update))?))
}

async fn complete_run_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(complete): Json<TerminalComplete>,
) -> ApiResult<Run> {
    Ok(Json(state.registry.apply(&id, RunUpdate::Terminal(complete))?))
}

async fn clear_runs_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let report = state.registry.clear().await;
    Json(json!({
        "message": format!("Cleared {} runs", report.runs_removed),
        "runs_removed": report.runs_removed,
        "dirs_deleted": report.dirs_deleted,
        "errors": report.errors,
    }))
}

async fn diff_runs_handler(
    State(state): State<ApiState>,
    Path((a, b)): Path<(String, String)>,
) -> ApiResult<RunDiffReport> {
    let run_a = state.registry.get(&a)?;
    let run_b = state.registry.get(&b)?;

    let left = serde_json::to_value(&run_a.details).map_err(Error::from)?;
    let right = serde_json::to_value(&run_b.details).map_err(Error::from)?;

    let mut diffs = diff_values(&left, &right);
    let diff_count = diffs.len();
    diffs.truncate(MAX_DIFF_ENTRIES);

    Ok(Json(RunDiffReport {
        run_a: a,
        run_b: b,
        diff_count,
        diffs,
    }))
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}
