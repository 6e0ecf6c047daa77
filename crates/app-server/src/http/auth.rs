use axum::extract::{Query, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use inbox_error::InboxError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ApiResult, SharedState};
use crate::session::SESSION_COOKIE;

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    auth_url: String,
}

pub async fn login(State(state): State<SharedState>) -> ApiResult<Json<LoginResponse>> {
    let auth_url = state.oauth.authorization_url()?;
    Ok(Json(LoginResponse { auth_url }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

/// Stores the exchanged credentials and sends the browser to the frontend.
/// A session cookie is attached when the mailbox address can be looked up.
pub async fn callback(
    State(state): State<SharedState>,
    Query(params): Query<CallbackParams>,
) -> ApiResult<Response> {
    if let Some(error) = params.error {
        return Err(InboxError::invalid_input(format!("oauth error: {error}")).into());
    }
    let code = params
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| InboxError::invalid_input("missing oauth code"))?;

    let record = state.oauth.exchange_code(&code).await?;
    state.credentials.save(&record).await?;
    info!("mailbox connected");

    let redirect = Redirect::to(&state.frontend_url);
    let email = match state.mail.profile().await {
        Ok(p) => p.email_address,
        Err(e) => {
            warn!(%e, "profile lookup failed, redirecting without session");
            return Ok(redirect.into_response());
        }
    };

    let token = state.sessions.sign(&email)?;
    let cookie = session_cookie(&token, state.sessions.ttl().num_seconds(), state.secure_cookies);
    Ok(([(SET_COOKIE, cookie)], redirect).into_response())
}

fn session_cookie(token: &str, max_age: i64, secure: bool) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

pub async fn status(State(state): State<SharedState>, headers: HeaderMap) -> Json<StatusResponse> {
    if !state.credentials.is_connected().await {
        return Json(StatusResponse {
            status: "not_connected",
            email: None,
        });
    }
    let email = cookie_value(&headers, SESSION_COOKIE)
        .and_then(|token| state.sessions.verify(token).ok())
        .map(|claims| claims.email);
    Json(StatusResponse {
        status: "connected",
        email,
    })
}
