use inbox_error::InboxError;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

const ERROR_BODY_PREVIEW: usize = 300;

/// Maps a non-success response onto the error taxonomy.
pub(crate) async fn check_status(resp: Response, service: &str) -> Result<Response, InboxError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
    let msg = format!("{service} returned {status}: {preview}");

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => InboxError::rate_limited(msg),
        // Gmail throttles with 403 and a rateLimitExceeded reason.
        _ if is_throttled(&body) => InboxError::rate_limited(msg),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => InboxError::auth(msg),
        StatusCode::NOT_FOUND => InboxError::not_found(msg),
        _ => InboxError::api(msg),
    })
}

fn is_throttled(body: &str) -> bool {
    body.contains("RESOURCE_EXHAUSTED")
        || body.contains("rateLimitExceeded")
        || body.contains("userRateLimitExceeded")
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    resp: Response,
    service: &str,
) -> Result<T, InboxError> {
    let resp = check_status(resp, service).await?;
    resp.json::<T>()
        .await
        .map_err(|e| InboxError::parse(format!("{service} response: {e}")))
}

pub(crate) fn transport_error(service: &str, e: reqwest::Error) -> InboxError {
    InboxError::network(format!("{service} request failed: {e}"))
}
