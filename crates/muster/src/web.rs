//! Web endpoints for Muster.
//!
//! Thin JSON surface over the rig: read-only views for the dashboard
//! and the mutating operator actions. No business logic lives here
//! beyond input collection and error-to-status mapping; rendering is
//! the browser's problem.

use crate::error::RigError;
use crate::local::CaptureMode;
use crate::registry::DeviceName;
use crate::rig::Rig;
use crate::tracker::Scope;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

/// Shared state for web handlers
#[derive(Clone)]
pub struct WebState {
    pub rig: Arc<Rig>,
    pub started_at: Instant,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(session_state))
        .route("/devices", get(devices))
        .route("/processes", get(processes))
        .route("/log", get(action_log))
        .route("/overwrite-check", get(overwrite_check))
        .route("/session", post(start_session))
        .route("/session/end", post(end_session))
        .route("/block", post(new_block))
        .route("/record/{device}", post(start_recording))
        .route("/record-all", post(start_all))
        .route("/preview/{device}", post(start_preview))
        .route("/kill/{target}", post(kill))
        .route("/remote/{device}/start", post(remote_start))
        .route("/remote/{device}/stop", post(remote_stop))
        .route("/remote/{device}/test", post(remote_test))
        .route("/remote/{device}/kill-all", post(remote_kill_all))
        .with_state(state)
}

/// Rig error with its HTTP mapping.
struct ApiError(RigError);

impl From<RigError> for ApiError {
    fn from(e: RigError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RigError::Conflict(_) => StatusCode::CONFLICT,
            RigError::ProcessNotFound(_) | RigError::UnknownDevice(_) => StatusCode::NOT_FOUND,
            RigError::Termination { .. }
            | RigError::RemoteStart { .. }
            | RigError::RemoteStop { .. }
            | RigError::Unreachable { .. } => StatusCode::BAD_GATEWAY,
            RigError::Io(_) | RigError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Deserialize)]
struct ActorBody {
    user: String,
    #[serde(default)]
    notes: String,
}

#[derive(Deserialize)]
struct StartSessionBody {
    user: String,
    folder: String,
    #[serde(default)]
    notes: String,
}

#[derive(Deserialize)]
struct ScopeQuery {
    scope: Option<String>,
    rpi_type: Option<String>,
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct OverwriteQuery {
    #[serde(default)]
    overwrite: bool,
}

async fn health(State(state): State<WebState>) -> Json<serde_json::Value> {
    let stats = state.rig.tracker_stats();
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "session_active": state.rig.active_session().is_some(),
        "processes": {
            "starting": stats.reserved,
            "running": stats.running,
        }
    }))
}

async fn session_state(State(state): State<WebState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "session": state.rig.active_session(),
        "block": state.rig.active_block(),
    }))
}

async fn devices(State(state): State<WebState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "devices": state.rig.registry().devices(),
        "idle": state.rig.idle_devices(),
    }))
}

async fn processes(
    State(state): State<WebState>,
    Query(query): Query<ScopeQuery>,
) -> Json<serde_json::Value> {
    let scope = match query.scope.as_deref() {
        Some("local") => Scope::Local,
        Some("remote") => Scope::Remote(query.rpi_type),
        _ => Scope::All,
    };
    Json(serde_json::json!({ "processes": state.rig.processes(scope) }))
}

async fn action_log(
    State(state): State<WebState>,
    Query(page): Query<PageQuery>,
) -> Json<serde_json::Value> {
    let entries = state.rig.recent_log(page.offset, page.limit.unwrap_or(50));
    Json(serde_json::json!({ "entries": entries }))
}

async fn overwrite_check(State(state): State<WebState>) -> ApiResult<Json<serde_json::Value>> {
    let devices = state.rig.overwrite_check()?;
    Ok(Json(serde_json::json!({ "devices": devices })))
}

async fn start_session(
    State(state): State<WebState>,
    Json(body): Json<StartSessionBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let session = state
        .rig
        .start_session(&body.user, &body.folder, &body.notes)?;
    Ok(Json(serde_json::json!({ "session": session })))
}

async fn end_session(
    State(state): State<WebState>,
    Json(body): Json<ActorBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let session = state.rig.end_session(&body.user)?;
    Ok(Json(serde_json::json!({ "session": session })))
}

async fn new_block(
    State(state): State<WebState>,
    Json(body): Json<ActorBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let block = state.rig.new_block(&body.user, &body.notes)?;
    Ok(Json(serde_json::json!({ "block": block })))
}

async fn start_recording(
    State(state): State<WebState>,
    Path(device): Path<String>,
    Query(query): Query<OverwriteQuery>,
    Json(body): Json<ActorBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let handle = state
        .rig
        .start_camera(
            &body.user,
            &DeviceName::new(device),
            CaptureMode::Record,
            query.overwrite,
        )
        .await?;
    Ok(Json(serde_json::json!({ "process": handle })))
}

async fn start_preview(
    State(state): State<WebState>,
    Path(device): Path<String>,
    Json(body): Json<ActorBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let handle = state
        .rig
        .start_camera(
            &body.user,
            &DeviceName::new(device),
            CaptureMode::Preview,
            false,
        )
        .await?;
    Ok(Json(serde_json::json!({ "process": handle })))
}

async fn start_all(
    State(state): State<WebState>,
    Query(query): Query<OverwriteQuery>,
    Json(body): Json<ActorBody>,
) -> Json<serde_json::Value> {
    let outcomes = state.rig.start_all_cameras(&body.user, query.overwrite).await;
    let report: Vec<serde_json::Value> = outcomes
        .iter()
        .map(|o| match &o.result {
            Ok(handle) => serde_json::json!({
                "device": o.device,
                "ok": true,
                "process": handle,
            }),
            Err(e) => serde_json::json!({
                "device": o.device,
                "ok": false,
                "error": e.to_string(),
                "kind": e.kind(),
            }),
        })
        .collect();
    Json(serde_json::json!({ "outcomes": report }))
}

async fn kill(
    State(state): State<WebState>,
    Path(target): Path<String>,
    Json(body): Json<ActorBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state.rig.kill(&body.user, &target).await?;
    Ok(Json(serde_json::json!({ "killed": target })))
}

async fn remote_start(
    State(state): State<WebState>,
    Path(device): Path<String>,
    Json(body): Json<ActorBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let handle = state
        .rig
        .start_controller(&body.user, &DeviceName::new(device))
        .await?;
    Ok(Json(serde_json::json!({ "process": handle })))
}

async fn remote_stop(
    State(state): State<WebState>,
    Path(device): Path<String>,
    Json(body): Json<ActorBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state.rig.kill(&body.user, &device).await?;
    Ok(Json(serde_json::json!({ "killed": device })))
}

async fn remote_test(
    State(state): State<WebState>,
    Path(device): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let reachability = state.rig.test_connection(&DeviceName::new(device)).await?;
    Ok(Json(serde_json::json!({ "connection": reachability })))
}

async fn remote_kill_all(
    State(state): State<WebState>,
    Path(device): Path<String>,
    Json(body): Json<ActorBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .rig
        .stop_all_remote(&body.user, &DeviceName::new(device.clone()))
        .await?;
    Ok(Json(serde_json::json!({ "killed_all": device })))
}
