use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use runflow_artifact_store::ArtifactError;
use runflow_core_types::{ArtifactKey, EngineError, ErrorKind, RunId, StepId};

use crate::config::{Settings, StartingUrlMode};
use crate::retrieval::BrandDocInput;
use crate::server::state::AppState;

/// Engine errors rendered as HTTP responses with a structured body.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::RunNotFound => StatusCode::NOT_FOUND,
            ErrorKind::RunBusy | ErrorKind::ApprovalRequired => StatusCode::CONFLICT,
            ErrorKind::PlanValidation | ErrorKind::UnknownInstruction => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorKind::SsrfBlocked => StatusCode::BAD_REQUEST,
            ErrorKind::SessionUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": self.0.kind,
            "detail": self.0.detail,
        }));
        (status, body).into_response()
    }
}

#[derive(Deserialize)]
pub struct TaskIn {
    pub task: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    4
}

#[derive(Deserialize)]
pub struct BrandKitIndexIn {
    pub docs: Vec<BrandDocInput>,
    #[serde(default)]
    pub embedding_dimension: Option<usize>,
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "provider": "heuristic",
        "starting_url_mode": format!("{:?}", state.settings.starting_url_mode).to_lowercase(),
        "demo_starting_url": &state.settings.demo_starting_url,
        "artifacts_url": "/artifacts",
    }))
}

pub async fn brandkit_index(
    State(state): State<AppState>,
    Json(payload): Json<BrandKitIndexIn>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dimension = payload
        .embedding_dimension
        .unwrap_or(state.settings.embedding_dimension);
    let indexed = state
        .index
        .index(state.embedder.as_ref(), payload.docs, dimension)
        .await?;
    Ok(Json(json!({ "ok": true, "indexed": indexed })))
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<TaskIn>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Context retrieval is best-effort; an empty brand kit is not an error.
    let ctx = match state.retrieval.top_k(&payload.task, payload.top_k).await {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!(%err, "retrieval failed, planning without context");
            Vec::new()
        }
    };

    let draft = state.planner.plan(&payload.task, &ctx).await?;
    let plan = state
        .validator
        .validate(&draft)
        .map_err(EngineError::from)?;

    let starting_url = resolve_starting_url(&state.settings, plan.starting_url.as_deref());
    let run_id = state
        .engine
        .create_run(&payload.task, plan.clone(), &starting_url)
        .await?;
    info!(run = %run_id, steps = plan.len(), "task accepted");

    Ok(Json(json!({
        "run_id": run_id,
        "plan": plan,
        "starting_url": starting_url,
        "ctx": ctx,
    })))
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (snapshot, logs) = state.engine.get_run(&RunId(run_id)).await?;
    Ok(Json(json!({ "run": snapshot, "logs": logs })))
}

pub async fn execute_next_step(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let report = state.engine.execute_next_step(&RunId(run_id)).await?;
    Ok(Json(json!(report)))
}

pub async fn approve(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = state.engine.approve(&RunId(run_id)).await?;
    Ok(Json(json!({ "run": snapshot })))
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let run = RunId(run_id);
    state.engine.close_session(&run).await?;
    Ok(Json(json!({ "ok": true, "run_id": run })))
}

pub async fn artifact(
    State(state): State<AppState>,
    Path((run_id, step_id, label)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let key = ArtifactKey::new(RunId(run_id), StepId(step_id), label);
    match state.artifacts.get(&key).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response()),
        Err(ArtifactError::NotFound) => Err(EngineError::new(
            ErrorKind::RunNotFound,
            format!("artifact {key} not found"),
        )
        .into()),
        Err(err) => Err(EngineError::from(err).into()),
    }
}

/// Pick the run's starting URL per the configured policy. The planner's URL
/// is only trusted as far as the mode allows; the SSRF guard still vets the
/// final choice at dispatch time.
pub fn resolve_starting_url(settings: &Settings, planner_url: Option<&str>) -> String {
    let sanitized = planner_url.and_then(|raw| {
        let url = Url::parse(raw.trim()).ok()?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return None;
        }
        Some(url)
    });

    match settings.starting_url_mode {
        StartingUrlMode::Demo => settings.demo_starting_url.clone(),
        StartingUrlMode::Plan => sanitized
            .filter(|url| {
                url.host_str().is_some_and(|host| {
                    settings
                        .allowed_starting_hosts
                        .iter()
                        .any(|allowed| allowed.eq_ignore_ascii_case(host))
                })
            })
            .map(|url| url.to_string())
            .unwrap_or_else(|| settings.demo_starting_url.clone()),
        StartingUrlMode::AnyPublic => sanitized
            .map(|url| url.to_string())
            .unwrap_or_else(|| settings.demo_starting_url.clone()),
    }
}
