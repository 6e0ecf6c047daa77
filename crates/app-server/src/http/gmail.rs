use axum::extract::{Path, Query, State};
use axum::Json;
use inbox_domain::{EmailDocument, MailProfile, MessageRef, OutgoingEmail, SentMessage};
use serde::Deserialize;
use tracing::info;

use super::{ApiResult, SharedState};

const DEFAULT_LIST_RESULTS: usize = 10;

pub async fn profile(State(state): State<SharedState>) -> ApiResult<Json<MailProfile>> {
    Ok(Json(state.mail.profile().await?))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    max_results: Option<usize>,
}

pub async fn list(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<MessageRef>>> {
    let max = params.max_results.unwrap_or(DEFAULT_LIST_RESULTS);
    info!(max, "listing recent emails");
    Ok(Json(state.mail.list(None, max).await?))
}

pub async fn details(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<EmailDocument>> {
    Ok(Json(state.mail.fetch_details(&id).await?))
}

pub async fn send(
    State(state): State<SharedState>,
    Json(email): Json<OutgoingEmail>,
) -> ApiResult<Json<SentMessage>> {
    Ok(Json(state.mail.send(&email).await?))
}
