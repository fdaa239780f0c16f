//! HTTP JSON surface: one `axum` route per Engine operation
//! plus `/status`, `/doctor`, `/jobs`. Bearer-token check is a single
//! `tower` middleware layer reading the configured auth token; CORS is
//! permissive via `tower-http`.

use crate::adapters::Direction;
use crate::engine::Engine;
use crate::error::{CkbError, ErrorKind};
use crate::repo_state::RepoState;
use crate::types::{RepoStateMode, StableId};
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

impl IntoResponse for CkbError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::IndexStale => StatusCode::CONFLICT,
            ErrorKind::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Cancelled => StatusCode::BAD_REQUEST,
            ErrorKind::Busy => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.kind().as_str(), "message": self.to_string()}))).into_response()
    }
}

fn parse_stable_id(s: &str) -> Result<StableId, CkbError> {
    StableId::new(s).map_err(CkbError::from)
}

async fn bound_repo_state(state: &AppState) -> Result<(RepoState, RepoStateMode), CkbError> {
    let repo_state = RepoState::compute(&state.engine.config().repo_path)?;
    state.engine.prepare_adapters(&repo_state).await;
    Ok((repo_state, RepoStateMode::Head))
}

#[derive(Debug, Deserialize)]
struct QueryParams {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    module: Option<String>,
    #[serde(default)]
    depth: Option<u8>,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    include_tests: Option<bool>,
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    head: Option<String>,
    #[serde(default)]
    include_ownership: Option<bool>,
    #[serde(default)]
    include_blame: Option<bool>,
    #[serde(default)]
    include_history: Option<bool>,
    #[serde(default)]
    threshold: Option<f32>,
    #[serde(default)]
    max_paths: Option<usize>,
    #[serde(default)]
    min_confidence: Option<f32>,
    #[serde(default)]
    include_unexported: Option<bool>,
    #[serde(default)]
    exclude_test_only: Option<bool>,
}

async fn get_symbol(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, mode) = bound_repo_state(&state).await?;
    let result = crate::engine::operations::symbols::get_symbol(&state.engine, &repo_state, mode, &parse_stable_id(&id)?).await?;
    Ok(Json(result))
}

async fn search_symbols(State(state): State<AppState>, Query(q): Query<QueryParams>, AxumPath(query): AxumPath<String>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, mode) = bound_repo_state(&state).await?;
    let result = crate::engine::operations::symbols::search_symbols(&state.engine, &repo_state, mode, &query, q.limit.unwrap_or(25)).await?;
    Ok(Json(result))
}

async fn find_references(State(state): State<AppState>, Query(q): Query<QueryParams>, AxumPath(id): AxumPath<String>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, mode) = bound_repo_state(&state).await?;
    let result = crate::engine::operations::symbols::find_references(
        &state.engine,
        &repo_state,
        mode,
        &parse_stable_id(&id)?,
        q.include_tests.unwrap_or(false),
        q.limit.unwrap_or(200),
    )
    .await?;
    Ok(Json(result))
}

async fn get_call_graph(State(state): State<AppState>, Query(q): Query<QueryParams>, AxumPath(id): AxumPath<String>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, mode) = bound_repo_state(&state).await?;
    let direction = match q.direction.as_deref() {
        Some("callers") => Direction::Callers,
        Some("callees") => Direction::Callees,
        _ => Direction::Both,
    };
    let result = crate::engine::operations::call_graph::get_call_graph(&state.engine, &repo_state, mode, &parse_stable_id(&id)?, direction, q.depth.unwrap_or(1)).await?;
    Ok(Json(result))
}

async fn trace_usage(State(state): State<AppState>, Query(q): Query<QueryParams>, AxumPath(id): AxumPath<String>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, mode) = bound_repo_state(&state).await?;
    let result = crate::engine::operations::call_graph::trace_usage(&state.engine, &repo_state, mode, &parse_stable_id(&id)?, q.max_paths.unwrap_or(5), q.depth.unwrap_or(5)).await?;
    Ok(Json(result))
}

async fn analyze_impact(State(state): State<AppState>, Query(q): Query<QueryParams>, AxumPath(id): AxumPath<String>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, mode) = bound_repo_state(&state).await?;
    let result = crate::engine::operations::impact::analyze_impact(&state.engine, &repo_state, mode, &parse_stable_id(&id)?, q.depth.unwrap_or(2), q.include_tests.unwrap_or(false)).await?;
    Ok(Json(result))
}

async fn analyze_change_set(State(state): State<AppState>, Query(q): Query<QueryParams>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, mode) = bound_repo_state(&state).await?;
    let base = q.base.ok_or_else(|| CkbError::InvalidArgument("base is required".into()))?;
    let head = q.head.ok_or_else(|| CkbError::InvalidArgument("head is required".into()))?;
    let result = crate::engine::operations::impact::analyze_change_set(
        &state.engine,
        &repo_state,
        mode,
        &base,
        &head,
        q.depth.unwrap_or(2),
        q.include_tests.unwrap_or(false),
        false,
    )
    .await?;
    Ok(Json(result))
}

async fn summarize_pr(State(state): State<AppState>, Query(q): Query<QueryParams>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, mode) = bound_repo_state(&state).await?;
    let base = q.base.ok_or_else(|| CkbError::InvalidArgument("base is required".into()))?;
    let head = q.head.ok_or_else(|| CkbError::InvalidArgument("head is required".into()))?;
    let result = crate::engine::operations::impact::summarize_pr(&state.engine, &repo_state, mode, &base, &head, q.include_ownership.unwrap_or(false)).await?;
    Ok(Json(result))
}

async fn list_entrypoints(State(state): State<AppState>, Query(q): Query<QueryParams>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, mode) = bound_repo_state(&state).await?;
    let result = crate::engine::operations::entrypoints::list_entrypoints(&state.engine, &repo_state, mode, q.module.as_deref(), q.limit.unwrap_or(50)).await?;
    Ok(Json(result))
}

async fn find_dead_code(State(state): State<AppState>, Query(q): Query<QueryParams>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, mode) = bound_repo_state(&state).await?;
    let result = crate::engine::operations::dead_code::find_dead_code(
        &state.engine,
        &repo_state,
        mode,
        q.include_unexported.unwrap_or(false),
        q.min_confidence.unwrap_or(0.5),
        &[],
        q.exclude_test_only.unwrap_or(false),
        q.limit.unwrap_or(100),
    )
    .await?;
    Ok(Json(result))
}

async fn justify_symbol(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, mode) = bound_repo_state(&state).await?;
    let result = crate::engine::operations::dead_code::justify_symbol(&state.engine, &repo_state, mode, &parse_stable_id(&id)?).await?;
    Ok(Json(result))
}

async fn get_ownership(State(state): State<AppState>, Query(q): Query<QueryParams>, AxumPath(path): AxumPath<String>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, mode) = bound_repo_state(&state).await?;
    let result = crate::engine::operations::ownership::get_ownership(&state.engine, &repo_state, mode, &path, q.include_blame.unwrap_or(false), q.include_history.unwrap_or(false)).await?;
    Ok(Json(result))
}

async fn get_ownership_drift(State(state): State<AppState>, Query(q): Query<QueryParams>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, mode) = bound_repo_state(&state).await?;
    let result = crate::engine::operations::ownership::get_ownership_drift(&state.engine, &repo_state, mode, q.scope.as_deref(), q.threshold.unwrap_or(0.5), q.limit.unwrap_or(50)).await?;
    Ok(Json(result))
}

async fn status(State(state): State<AppState>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, mode) = bound_repo_state(&state).await?;
    Ok(Json(state.engine.get_status(&repo_state, mode)))
}

async fn doctor(State(state): State<AppState>) -> Result<impl IntoResponse, CkbError> {
    let (repo_state, _mode) = bound_repo_state(&state).await?;
    Ok(Json(state.engine.doctor(&repo_state).await))
}

async fn jobs_list(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.jobs_list(None, None))
}

async fn trigger_reindex(State(state): State<AppState>) -> Result<impl IntoResponse, CkbError> {
    let repo_path = state.engine.config().repo_path.clone();
    let id = crate::engine::operations::reindex::trigger_reindex(&state.engine, &repo_path, RepoStateMode::Head)?;
    Ok(Json(json!({"jobId": id})))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn auth_middleware(State(state): State<AppState>, headers: HeaderMap, request: axum::extract::Request, next: Next) -> Result<axum::response::Response, CkbError> {
    let Some(expected) = state.engine.config().privacy.auth_token.as_deref() else {
        return Ok(next.run(request).await);
    };
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match provided {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => Err(CkbError::PermissionDenied("missing or invalid bearer token".to_string())),
    }
}

pub fn router(engine: Arc<Engine>) -> Router {
    let state = AppState { engine };
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/doctor", get(doctor))
        .route("/jobs", get(jobs_list))
        .route("/reindex", post(trigger_reindex))
        .route("/symbols/:stable_id", get(get_symbol))
        .route("/symbols/search/:query", get(search_symbols))
        .route("/references/:stable_id", get(find_references))
        .route("/call-graph/:stable_id", get(get_call_graph))
        .route("/trace-usage/:stable_id", get(trace_usage))
        .route("/impact/:stable_id", get(analyze_impact))
        .route("/change-set", get(analyze_change_set))
        .route("/pr-summary", get(summarize_pr))
        .route("/entrypoints", get(list_entrypoints))
        .route("/dead-code", get(find_dead_code))
        .route("/justify/:stable_id", get(justify_symbol))
        .route("/ownership/:path", get(get_ownership))
        .route("/ownership-drift", get(get_ownership_drift))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

/// Bind and serve the HTTP surface on `config.daemon.{host,port}`.
pub async fn serve(engine: Arc<Engine>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", engine.config().daemon.host, engine.config().daemon.port);
    let app = router(engine);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "CKB HTTP surface listening");
    axum::serve(listener, app).await?;
    Ok(())
}
