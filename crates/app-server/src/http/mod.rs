mod assistant;
mod auth;
mod gmail;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use inbox_error::{ErrorResponse, InboxError};
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::state::AppState;

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/v1/auth/login", get(auth::login))
        .route("/api/v1/auth/callback", get(auth::callback))
        .route("/api/v1/auth/status", get(auth::status))
        .route("/api/v1/sync", post(assistant::start_sync))
        .route("/api/v1/sync/status", get(assistant::sync_status))
        .route("/api/v1/chat", post(assistant::chat))
        .route("/api/v1/highlights", get(assistant::highlights))
        .route("/api/v1/gmail/profile", get(gmail::profile))
        .route("/api/v1/gmail/list", get(gmail::list))
        .route("/api/v1/gmail/details/:id", get(gmail::details))
        .route("/api/v1/gmail/send", post(gmail::send))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to the InboxAI Server!" }))
}

/// Renders an [`InboxError`] as its status code and [`ErrorResponse`] body.
#[derive(Debug)]
pub struct ApiError(pub InboxError);

impl From<InboxError> for ApiError {
    fn from(e: InboxError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse::from(&self.0);
        if status.is_server_error() {
            error!(%status, "request failed: {}", body.to_compact());
        } else {
            warn!(%status, "request rejected: {}", body.to_compact());
        }
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
