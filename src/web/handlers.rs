use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::core::{AppError, PostView, Result};
use crate::state::AppState;
use crate::status::StatusSnapshot;

const RECENT_POST_LIMIT: usize = 20;

#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub message: String,
}

// Fields are optional so that an absent field reports as a 400 validation
// error rather than a body-deserialization rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreatePostRequest {
    pub name: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartWorkloadRequest {
    #[serde(rename = "writesPerSecond")]
    pub writes_per_second: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub q: String,
}

pub async fn healthcheck() -> Json<ApiMessage> {
    Json(ApiMessage {
        message: "ok".to_string(),
    })
}

pub async fn create_post(
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<ApiMessage>)> {
    let name = payload
        .name
        .ok_or_else(|| AppError::validation("name is required"))?;
    let content = payload
        .content
        .ok_or_else(|| AppError::validation("content is required"))?;

    state.coordinator.create_post(&name, &content).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiMessage {
            message: "post created".to_string(),
        }),
    ))
}

pub async fn list_posts(State(state): State<AppState>) -> Json<Vec<PostView>> {
    Json(state.store.recent_posts(RECENT_POST_LIMIT).await)
}

pub async fn search_posts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<PostView>> {
    Json(state.store.search_posts(&query.q).await)
}

pub async fn start_workload(
    State(state): State<AppState>,
    Json(payload): Json<StartWorkloadRequest>,
) -> Result<Json<ApiMessage>> {
    let rate = payload
        .writes_per_second
        .ok_or_else(|| AppError::validation("writesPerSecond is required"))?;

    state.workload.start(rate).await?;

    Ok(Json(ApiMessage {
        message: format!("workload started at {rate} writes/sec"),
    }))
}

pub async fn stop_workload(State(state): State<AppState>) -> Result<Json<ApiMessage>> {
    state.workload.stop().await?;

    Ok(Json(ApiMessage {
        message: "workload stopped".to_string(),
    }))
}

pub async fn workload_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.aggregator.snapshot().await)
}
