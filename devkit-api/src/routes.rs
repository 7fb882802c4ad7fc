//! HTTP route handlers.

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use devkit::core::readiness::readiness;
use devkit::core::types::{HealthSnapshot, ModuleManifest, ModuleRun, Readiness, RunResult};
use devkit::core::validation::{ManifestDraft, RunRequest};
use devkit::error::DevkitError;
use devkit::io::context::DevkitContext;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::ApiError;
use crate::middleware::{rate_limit, require_api_key};
use crate::state::AppState;

pub const SERVICE_NAME: &str = "hla-compass-devkit-api";

/// Build the route table. Mutating routes are authenticated first, then rate limited.
pub fn router(state: AppState) -> Router<AppState> {
    let mutating = Router::new()
        .route("/v1/devkit/modules", post(register_module))
        .route("/v1/devkit/modules/{module_id}", delete(delete_module))
        .route("/v1/module-runs", post(start_run))
        .route_layer(from_fn_with_state(state.clone(), rate_limit))
        .route_layer(from_fn_with_state(state, require_api_key));

    Router::new()
        .route("/", get(index))
        .route("/docs/openapi.json", get(openapi_document))
        .route("/v1/system/ready", get(system_ready))
        .route("/v1/system/health", get(system_health))
        .route("/v1/modules", get(list_modules))
        .route("/v1/module-runs/{run_id}", get(get_run))
        .route("/v1/module-runs/{run_id}/result", get(get_run_result))
        .merge(mutating)
}

/// Run a state operation on the blocking pool; store calls take file locks.
async fn blocking<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&DevkitContext) -> devkit::error::Result<T> + Send + 'static,
{
    let ctx = state.ctx.clone();
    tokio::task::spawn_blocking(move || op(&ctx))
        .await
        .map_err(|err| ApiError::Internal(format!("state task failed: {err}")))?
        .map_err(ApiError::from)
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| DevkitError::Validation(rejection.body_text()).into())
}

async fn index() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "docs": "/docs",
        "openapi": "/docs/openapi.json",
    }))
}

/// GET /docs/openapi.json - the configured document, or a built-in route listing.
async fn openapi_document(State(state): State<AppState>) -> Response {
    let path = state.ctx.config().openapi_path.clone();
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "openapi file unavailable, serving built-in document");
            Json(builtin_openapi()).into_response()
        }
    }
}

fn builtin_openapi() -> Value {
    let op = |summary: &str| json!({ "summary": summary, "responses": { "200": { "description": "OK" } } });
    json!({
        "openapi": "3.1.0",
        "info": { "title": "HLA-Compass Devkit API", "version": env!("CARGO_PKG_VERSION") },
        "paths": {
            "/": { "get": op("Service index") },
            "/v1/system/ready": { "get": op("Readiness of downstream services") },
            "/v1/system/health": { "get": op("Readiness plus state counts") },
            "/v1/modules": { "get": op("List registered modules") },
            "/v1/devkit/modules": { "post": op("Register or replace a module manifest") },
            "/v1/devkit/modules/{module_id}": { "delete": op("Delete a module manifest") },
            "/v1/module-runs": { "post": op("Start a mocked module run") },
            "/v1/module-runs/{run_id}": { "get": op("Fetch a run") },
            "/v1/module-runs/{run_id}/result": { "get": op("Fetch a run result") },
        },
    })
}

#[derive(Serialize)]
struct ReadyResponse {
    status: Readiness,
    timestamp: i64,
    services: HealthSnapshot,
}

#[derive(Serialize)]
struct HealthResponse {
    #[serde(flatten)]
    ready: ReadyResponse,
    modules: usize,
    runs: usize,
}

async fn ready_response(state: &AppState) -> ReadyResponse {
    let services = state.ctx.health().await;
    ReadyResponse {
        status: readiness(&services),
        timestamp: chrono::Utc::now().timestamp(),
        services,
    }
}

/// GET /v1/system/ready
async fn system_ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    Json(ready_response(&state).await)
}

/// GET /v1/system/health - readiness plus state document sizes.
async fn system_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let ready = ready_response(&state).await;
    let (modules, runs) = blocking(&state, |ctx| {
        Ok((ctx.registry().list()?.len(), ctx.runs().count()?))
    })
    .await?;
    Ok(Json(HealthResponse {
        ready,
        modules,
        runs,
    }))
}

#[derive(Serialize)]
struct ModuleList {
    items: Vec<ModuleManifest>,
}

async fn list_modules(State(state): State<AppState>) -> Result<Json<ModuleList>, ApiError> {
    let items = blocking(&state, |ctx| ctx.registry().list()).await?;
    Ok(Json(ModuleList { items }))
}

#[derive(Serialize)]
struct Registered {
    status: &'static str,
    module: ModuleManifest,
}

/// POST /v1/devkit/modules
async fn register_module(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Registered>, ApiError> {
    let draft = ManifestDraft::from_value(json_body(body)?)?;
    let module = blocking(&state, move |ctx| ctx.registry().register(draft)).await?;
    Ok(Json(Registered {
        status: "registered",
        module,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Deleted {
    status: &'static str,
    module_id: String,
}

/// DELETE /v1/devkit/modules/{module_id}
async fn delete_module(
    State(state): State<AppState>,
    Path(module_id): Path<String>,
) -> Result<Json<Deleted>, ApiError> {
    let id = module_id.clone();
    blocking(&state, move |ctx| ctx.registry().delete(&id)).await?;
    Ok(Json(Deleted {
        status: "deleted",
        module_id,
    }))
}

/// POST /v1/module-runs
async fn start_run(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ModuleRun>, ApiError> {
    let request = RunRequest::from_value(json_body(body)?)?;
    let run = blocking(&state, move |ctx| ctx.runs().start(ctx.registry(), request)).await?;
    Ok(Json(run))
}

/// GET /v1/module-runs/{run_id}
async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<ModuleRun>, ApiError> {
    let run = blocking(&state, move |ctx| ctx.runs().get(&run_id)).await?;
    Ok(Json(run))
}

/// GET /v1/module-runs/{run_id}/result
async fn get_run_result(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunResult>, ApiError> {
    let result = blocking(&state, move |ctx| ctx.runs().result(&run_id)).await?;
    Ok(Json(result))
}
