use crate::error::{ApiError, ApiResult};
use crate::runner::{
    spawn_index_job, spawn_parse_and_index_job, spawn_parse_job, with_timeout, IndexSpec,
    ParseSpec, QUERY_TIMEOUT,
};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use repolens_core::RepoLensError;
use repolens_vector::VectorIndex as _;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

fn default_branch() -> String {
    "main".to_string()
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub repo_url: Option<String>,
    pub repo_path: Option<PathBuf>,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    pub collection: Option<String>,
    pub graph_path: Option<PathBuf>,
    #[serde(default)]
    pub recreate: bool,
}

#[derive(Debug, Deserialize)]
pub struct ParseAndIndexRequest {
    pub repo_url: Option<String>,
    pub repo_path: Option<PathBuf>,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub collection: Option<String>,
    #[serde(default)]
    pub recreate: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    pub collection: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    pub collection: Option<String>,
    #[serde(default)]
    pub include_full_graph: bool,
}

impl ParseRequest {
    fn into_spec(self) -> Result<ParseSpec, RepoLensError> {
        if self.repo_url.is_none() && self.repo_path.is_none() {
            return Err(RepoLensError::InvalidInput(
                "either repo_url or repo_path must be provided".to_string(),
            ));
        }
        Ok(ParseSpec {
            repo_url: self.repo_url,
            repo_path: self.repo_path,
            branch: self.branch,
            output_path: self.output_path,
        })
    }
}

fn accepted(job_id: String) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "job_id": job_id,
        "status": "processing",
    }))
}

pub async fn parse(
    State(state): State<AppState>,
    Json(request): Json<ParseRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let spec = request.into_spec().map_err(ApiError)?;
    Ok(accepted(spawn_parse_job(&state, spec)))
}

pub async fn index(
    State(state): State<AppState>,
    Json(request): Json<IndexRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let spec = IndexSpec {
        collection: request
            .collection
            .unwrap_or_else(|| state.settings.collection.clone()),
        graph_path: request.graph_path,
        recreate: request.recreate,
    };
    Ok(accepted(spawn_index_job(&state, spec)))
}

pub async fn parse_and_index(
    State(state): State<AppState>,
    Json(request): Json<ParseAndIndexRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let parse_spec = ParseRequest {
        repo_url: request.repo_url,
        repo_path: request.repo_path,
        branch: request.branch,
        output_path: None,
    }
    .into_spec()
    .map_err(ApiError)?;
    let index_spec = IndexSpec {
        collection: request
            .collection
            .unwrap_or_else(|| state.settings.collection.clone()),
        graph_path: None,
        recreate: request.recreate,
    };
    Ok(accepted(spawn_parse_and_index_job(&state, parse_spec, index_spec)))
}

/// Query endpoints never surface transport errors: failures come back as
/// `200 {success: false, error}` so callers see one shape either way.
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Response {
    let collection = request
        .collection
        .unwrap_or_else(|| state.settings.collection.clone());
    let result = with_timeout(
        "query",
        QUERY_TIMEOUT,
        state.engine.search(&request.query, request.top_k, &collection),
    )
    .await;

    match result {
        Ok(output) => Json(json!({
            "success": true,
            "results": output.results,
            "query": output.query,
            "total_results": output.total_results,
        }))
        .into_response(),
        Err(e) => Json(ApiError(e).envelope()).into_response(),
    }
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Response {
    let collection = request
        .collection
        .unwrap_or_else(|| state.settings.collection.clone());
    let result = with_timeout(
        "query",
        QUERY_TIMEOUT,
        state
            .engine
            .analyze(&request.query, request.top_k, &collection),
    )
    .await;

    match result {
        Ok(output) => {
            let mut body = serde_json::to_value(&output).unwrap_or_else(|_| json!({}));
            body["success"] = json!(true);
            if request.include_full_graph {
                // Full graph is opt-in; it can dwarf the answer itself.
                let graph = state.graph.read().await;
                let nodes: Vec<_> = graph.nodes().cloned().collect();
                body["graph"] = json!({
                    "nodes": nodes,
                    "edges": graph.edges(),
                });
            }
            Json(body).into_response()
        }
        Err(e) => Json(ApiError(e).envelope()).into_response(),
    }
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    match state.registry.get(&job_id) {
        Some(job) => Ok(Json(serde_json::to_value(&job).map_err(RepoLensError::from)?)),
        None => Err(ApiError(RepoLensError::NotFound(format!(
            "job {} not found",
            job_id
        )))),
    }
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<serde_json::Value> {
    let summary = state.registry.summary();
    Json(json!({
        "total": summary.total,
        "active": summary.active,
        "completed": summary.completed,
        "failed": summary.failed,
        "jobs": summary.jobs,
    }))
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    // A still-running job gets a cancellation request first; its worker
    // stops at the next phase boundary.
    state.registry.request_cancel(&job_id);
    if state.registry.delete(&job_id) {
        Ok(Json(json!({"ok": true, "job_id": job_id})))
    } else {
        Err(ApiError(RepoLensError::NotFound(format!(
            "job {} not found",
            job_id
        ))))
    }
}

pub async fn list_collections(State(state): State<AppState>) -> Response {
    match state.index.list_collections().await {
        Ok(collections) => Json(json!({
            "success": true,
            "total_collections": collections.len(),
            "collections": collections,
        }))
        .into_response(),
        Err(e) => {
            let error = ApiError(e);
            (error.status(), Json(error.envelope())).into_response()
        }
    }
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "active_jobs": state.registry.active_count(),
            "environment": {
                "qdrant_url": state.settings.qdrant_url,
                "collection": state.settings.collection,
                "model_name": state.settings.model_name,
                "data_dir": state.settings.data_dir,
            },
        })),
    )
}
