//! Local HTTP API used by the flow editor.
//! Flow start/stop, element picking, action recording, extraction previews and a
//! run event feed.

pub mod ws;

use crate::controller::{ControllerStatus, RunReport};
use crate::error::FlowError;
use crate::flow::FlowNode;
use crate::picker::PickedSelector;
use crate::recording::{Recording, RecordingInfo};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub type ApiState = Arc<AppState>;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

/// API key authentication middleware.
/// Skips authentication for GET /api/health so clients can check the server is up.
async fn api_key_auth(
    State(expected_key): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if request.uri().path() == "/api/health" {
        return Ok(next.run(request).await);
    }
    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok());
    match provided {
        Some(k) if k == expected_key => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

fn api_error(e: FlowError) -> (StatusCode, String) {
    let status = if e.is_conflict() {
        StatusCode::CONFLICT
    } else if e.is_invalid_input() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        serde_json::json!({
            "error": e.code(),
            "message": e.to_string(),
        })
        .to_string(),
    )
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Flow runs
        .route("/api/flow/start", post(start_flow))
        .route("/api/flow/stop", post(stop_flow))
        .route("/api/flow/status", get(flow_status))
        .route("/api/flow/variables", get(flow_variables))
        // Element picker and extraction preview
        .route("/api/picker/start", post(start_picker))
        .route("/api/extract/preview", post(preview_extraction))
        // Action recording
        .route("/api/recording/start", post(start_recording))
        .route("/api/recording/stop", post(stop_recording))
        // WebSocket (run events)
        .route("/api/ws", get(ws::ws_handler))
        // Utility
        .route("/api/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct StartFlowRequest {
    pub nodes: Vec<FlowNode>,
}

async fn start_flow(
    State(state): State<ApiState>,
    Json(req): Json<StartFlowRequest>,
) -> ApiResult<RunReport> {
    state
        .controller
        .start_flow(req.nodes)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn stop_flow(State(state): State<ApiState>) -> Json<Value> {
    state.controller.stop_flow().await;
    Json(serde_json::json!({ "stopped": true }))
}

async fn flow_status(State(state): State<ApiState>) -> Json<ControllerStatus> {
    Json(state.controller.status().await)
}

async fn flow_variables(State(state): State<ApiState>) -> Json<HashMap<String, Value>> {
    Json(state.controller.variables())
}

async fn start_picker(State(state): State<ApiState>) -> ApiResult<PickedSelector> {
    state
        .controller
        .start_element_picker()
        .await
        .map(Json)
        .map_err(api_error)
}

async fn start_recording(State(state): State<ApiState>) -> ApiResult<RecordingInfo> {
    state
        .controller
        .start_recording()
        .await
        .map(Json)
        .map_err(api_error)
}

async fn stop_recording(State(state): State<ApiState>) -> ApiResult<Recording> {
    state
        .controller
        .stop_recording()
        .await
        .map(Json)
        .map_err(api_error)
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub properties: Value,
}

async fn preview_extraction(
    State(state): State<ApiState>,
    Json(req): Json<PreviewRequest>,
) -> ApiResult<Value> {
    let value = state
        .controller
        .preview_extraction(req.properties)
        .await
        .map_err(api_error)?;
    Ok(Json(serde_json::json!({ "value": value })))
}

pub fn app(state: ApiState, api_key: Option<String>) -> Router {
    use tower::limit::ConcurrencyLimitLayer;
    let base_router = router(state);
    if let Some(key) = api_key {
        base_router.route_layer(middleware::from_fn_with_state(key, api_key_auth))
    } else {
        base_router
    }
    .layer(ConcurrencyLimitLayer::new(32))
    .layer(
        tower_http::cors::CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::HeaderName::from_static("x-api-key"),
            ]),
    )
}

pub async fn run_server(state: ApiState, port: u16, api_key: Option<String>) -> Result<(), String> {
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .map_err(|e| format!("Failed to bind API port {}: {}", port, e))?;
    let app = app(state, api_key);
    tracing::info!("Flow API listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}
