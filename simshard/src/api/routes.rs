use std::path::PathBuf;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::server::AppState;
use crate::error::Error;
use crate::query::{DocHit, QueryOptions};
use crate::shard::{MAX_DATE, MIN_DATE};

#[derive(Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub radius: Option<f32>,
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default = "default_end")]
    pub end: String,
    #[serde(default = "default_true")]
    pub rerank_by_doc: bool,
}

fn default_start() -> String {
    MIN_DATE.to_string()
}

fn default_end() -> String {
    MAX_DATE.to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub docs: Vec<DocHit>,
    pub timed_out: bool,
    pub latency_ms: u64,
}

#[derive(Deserialize)]
pub struct AddShardRequest {
    pub path: PathBuf,
}

#[derive(Serialize)]
pub struct AddShardResponse {
    pub added: bool,
    pub shards: usize,
}

#[derive(Serialize)]
pub struct ShardListResponse {
    pub shards: Vec<String>,
}

fn error_response(e: Error) -> (StatusCode, String) {
    let status = match &e {
        Error::InvalidQuery(_) | Error::InvalidInput(_) | Error::InvalidName(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::Vectorizer(_) | Error::Http(_) => StatusCode::BAD_GATEWAY,
        Error::ShardAlreadyOnline(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// POST /query - answer a text query
pub async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let opts = QueryOptions {
        k: req.k.unwrap_or(state.defaults.k),
        radius: req.radius.unwrap_or(state.defaults.radius),
        start: req.start,
        end: req.end,
        rerank_by_doc: req.rerank_by_doc,
        deadline: state.defaults.deadline_ms.map(Duration::from_millis),
    };
    let payload = state
        .processor
        .query_corpus(&req.query, &opts)
        .await
        .map_err(error_response)?;

    Ok(Json(QueryResponse {
        docs: payload.docs.clone(),
        timed_out: payload.timed_out,
        latency_ms: start.elapsed().as_millis() as u64,
    }))
}

/// POST /shards - deploy a new shard
pub async fn add_shard(
    State(state): State<AppState>,
    Json(req): Json<AddShardRequest>,
) -> Result<Json<AddShardResponse>, (StatusCode, String)> {
    let added = state
        .processor
        .add_shard(&req.path)
        .await
        .map_err(error_response)?;
    let shards = state.processor.manager().len().await;
    Ok(Json(AddShardResponse { added, shards }))
}

/// GET /shards - list deployed shards
pub async fn list_shards(State(state): State<AppState>) -> Json<ShardListResponse> {
    Json(ShardListResponse {
        shards: state.processor.shard_report().await,
    })
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// Defaults the API applies when a request leaves a knob out.
#[derive(Debug, Clone)]
pub struct SearchDefaults {
    pub k: usize,
    pub radius: f32,
    pub deadline_ms: Option<u64>,
}

impl SearchDefaults {
    pub fn from_config(search: &crate::config::SearchConfig) -> Self {
        Self {
            k: search.default_k,
            radius: search.default_radius,
            deadline_ms: search.deadline_ms,
        }
    }
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            k: crate::query::DEFAULT_K,
            radius: crate::query::DEFAULT_RADIUS,
            deadline_ms: None,
        }
    }
}
