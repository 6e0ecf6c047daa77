use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use inbox_domain::SyncStatus;
use serde::{Deserialize, Serialize};

use super::{ApiResult, SharedState};

#[derive(Debug, Serialize)]
pub struct SyncStarted {
    status: &'static str,
    message: &'static str,
    run: SyncStatus,
}

pub async fn start_sync(State(state): State<SharedState>) -> ApiResult<(StatusCode, Json<SyncStarted>)> {
    state.credentials.require().await?;
    let run = state.sync.start().await;
    Ok((
        StatusCode::ACCEPTED,
        Json(SyncStarted {
            status: "Sync started",
            message: "Email synchronization is running in the background.",
            run,
        }),
    ))
}

pub async fn sync_status(State(state): State<SharedState>) -> Json<SyncStatus> {
    Json(state.sync.status().await)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    query: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    answer: String,
}

pub async fn chat(
    State(state): State<SharedState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let answer = state.answers.answer(&req.query).await?;
    Ok(Json(ChatResponse { answer }))
}

#[derive(Debug, Serialize)]
pub struct HighlightsResponse {
    highlights: String,
}

pub async fn highlights(State(state): State<SharedState>) -> ApiResult<Json<HighlightsResponse>> {
    let highlights = state.answers.important_emails().await?;
    Ok(Json(HighlightsResponse { highlights }))
}
