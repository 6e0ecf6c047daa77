use async_trait::async_trait;
use chrono::{Duration, Utc};
use inbox_domain::{CredentialRecord, OAuthPort};
use inbox_error::InboxError;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl,
    RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use tracing::info;

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

pub const GMAIL_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.compose",
    "https://www.googleapis.com/auth/userinfo.email",
    "openid",
];

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub scopes: Vec<String>,
}

impl GoogleOAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            auth_uri: GOOGLE_AUTH_URI.to_string(),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            scopes: GMAIL_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Google's authorization code flow on top of the `oauth2` crate.
pub struct GoogleOAuthClient {
    config: GoogleOAuthConfig,
}

impl GoogleOAuthClient {
    pub fn new(config: GoogleOAuthConfig) -> Self {
        Self { config }
    }

    /// Client credentials travel in the form body, as Google documents.
    fn client(
        &self,
        client_id: &str,
        client_secret: &str,
        token_uri: &str,
    ) -> Result<BasicClient, InboxError> {
        let auth_url = AuthUrl::new(self.config.auth_uri.clone())
            .map_err(|e| InboxError::internal(format!("auth uri: {e}")))?;
        let token_url = TokenUrl::new(token_uri.to_string())
            .map_err(|e| InboxError::internal(format!("token uri {token_uri}: {e}")))?;
        Ok(BasicClient::new(
            ClientId::new(client_id.to_string()),
            Some(ClientSecret::new(client_secret.to_string())),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody))
    }

    fn redirecting_client(&self) -> Result<BasicClient, InboxError> {
        let redirect = RedirectUrl::new(self.config.redirect_uri.clone())
            .map_err(|e| InboxError::internal(format!("redirect uri: {e}")))?;
        Ok(self
            .client(
                &self.config.client_id,
                &self.config.client_secret,
                &self.config.token_uri,
            )?
            .set_redirect_uri(redirect))
    }
}

fn token_error<RE>(e: RequestTokenError<RE, BasicErrorResponse>) -> InboxError
where
    RE: std::error::Error + 'static,
{
    match e {
        RequestTokenError::ServerResponse(resp) => {
            let detail = resp
                .error_description()
                .map(|d| format!(": {d}"))
                .unwrap_or_default();
            InboxError::auth(format!("google oauth rejected the grant: {}{detail}", resp.error()))
        }
        RequestTokenError::Request(e) => {
            InboxError::network(format!("google oauth request failed: {e}"))
        }
        RequestTokenError::Parse(e, _) => {
            InboxError::parse(format!("google oauth response: {e}"))
        }
        RequestTokenError::Other(msg) => InboxError::auth(format!("google oauth: {msg}")),
    }
}

/// Overlays a token response on `base`, keeping its refresh token and
/// scopes when Google leaves them out.
fn apply_token(token: &BasicTokenResponse, base: CredentialRecord) -> CredentialRecord {
    let CredentialRecord {
        refresh_token,
        client_id,
        client_secret,
        scopes,
        token_uri,
        ..
    } = base;
    CredentialRecord {
        access_token: token.access_token().secret().clone(),
        refresh_token: token
            .refresh_token()
            .map(|t| t.secret().clone())
            .or(refresh_token),
        client_id,
        client_secret,
        scopes: token
            .scopes()
            .map(|granted| granted.iter().map(|s| s.as_str().to_owned()).collect())
            .unwrap_or(scopes),
        expiry: token
            .expires_in()
            .and_then(|d| Duration::from_std(d).ok())
            .map(|d| Utc::now() + d),
        token_uri,
    }
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

#[async_trait]
impl OAuthPort for GoogleOAuthClient {
    fn authorization_url(&self) -> Result<String, InboxError> {
        let (url, _state) = self
            .redirecting_client()?
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.config.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .add_extra_param("include_granted_scopes", "true")
            .add_extra_param("prompt", "consent")
            .url();
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<CredentialRecord, InboxError> {
        if code.trim().is_empty() {
            return Err(InboxError::invalid_input("authorization code is empty"));
        }
        let token = self
            .redirecting_client()?
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(token_error)?;
        info!(has_refresh = token.refresh_token().is_some(), "exchanged authorization code");

        let base = CredentialRecord {
            access_token: String::new(),
            refresh_token: None,
            client_id: self.config.client_id.clone(),
            client_secret: self.config.client_secret.clone(),
            scopes: self.config.scopes.clone(),
            expiry: None,
            token_uri: self.config.token_uri.clone(),
        };
        Ok(apply_token(&token, base))
    }

    /// Refreshes against the client and token endpoint stored in `record`.
    async fn refresh(&self, record: &CredentialRecord) -> Result<CredentialRecord, InboxError> {
        let refresh_token = record
            .refresh_token
            .as_deref()
            .ok_or_else(|| InboxError::not_connected("no refresh token stored"))?;
        let client = self.client(
            or_default(&record.client_id, &self.config.client_id),
            or_default(&record.client_secret, &self.config.client_secret),
            or_default(&record.token_uri, &self.config.token_uri),
        )?;
        let token = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(token_error)?;
        info!(rotated = token.refresh_token().is_some(), "refreshed access token");
        Ok(apply_token(&token, record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Url;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn client() -> (MockServer, GoogleOAuthClient) {
        let server = MockServer::start().await;
        let mut config = GoogleOAuthConfig::new("cid", "secret", "http://localhost:8000/cb");
        config.token_uri = format!("{}/token", server.uri());
        (server, GoogleOAuthClient::new(config))
    }

    fn stored(server: &MockServer, refresh: Option<&str>) -> CredentialRecord {
        CredentialRecord {
            access_token: "old".to_string(),
            refresh_token: refresh.map(str::to_string),
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["openid".to_string()],
            expiry: None,
            token_uri: format!("{}/token", server.uri()),
        }
    }

    #[test]
    fn authorization_url_requests_offline_consent() {
        let c = GoogleOAuthClient::new(GoogleOAuthConfig::new("cid", "s", "http://localhost/cb"));
        let url = Url::parse(&c.authorization_url().unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert!(url.as_str().starts_with(GOOGLE_AUTH_URI));
        assert_eq!(params["client_id"], "cid");
        assert_eq!(params["redirect_uri"], "http://localhost/cb");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["response_type"], "code");
        assert!(params["scope"].contains("gmail.modify"));
        assert!(params["scope"].contains("openid"));
    }

    #[tokio::test]
    async fn exchange_builds_record_with_expiry() {
        let (server, c) = client().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("client_secret=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 3599,
                "scope": "openid https://www.googleapis.com/auth/gmail.modify",
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let rec = c.exchange_code("abc").await.unwrap();
        assert_eq!(rec.access_token, "at");
        assert_eq!(rec.refresh_token.as_deref(), Some("rt"));
        assert_eq!(rec.client_id, "cid");
        assert_eq!(rec.scopes.len(), 2);
        assert!(rec.is_valid());
        assert!(rec.token_uri.ends_with("/token"));
    }

    #[tokio::test]
    async fn refresh_keeps_refresh_token_when_not_rotated() {
        let (server, c) = client().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let rec = c.refresh(&stored(&server, Some("rt-old"))).await.unwrap();
        assert_eq!(rec.access_token, "fresh");
        assert_eq!(rec.refresh_token.as_deref(), Some("rt-old"));
        assert_eq!(rec.scopes, vec!["openid".to_string()]);
    }

    #[tokio::test]
    async fn refresh_uses_the_records_own_client_and_endpoint() {
        let (server, _) = client().await;
        let elsewhere = GoogleOAuthClient::new(GoogleOAuthConfig::new(
            "other-cid",
            "other-secret",
            "http://localhost/cb",
        ));
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("client_id=rec-cid"))
            .and(body_string_contains("client_secret=rec-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let record = CredentialRecord {
            client_id: "rec-cid".to_string(),
            client_secret: "rec-secret".to_string(),
            ..stored(&server, Some("rt"))
        };
        let rec = elsewhere.refresh(&record).await.unwrap();
        assert_eq!(rec.access_token, "fresh");
        assert_eq!(rec.client_id, "rec-cid");
        assert_eq!(rec.token_uri, record.token_uri);
    }

    #[tokio::test]
    async fn rejected_grant_is_auth_error() {
        let (server, c) = client().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let err = c.refresh(&stored(&server, Some("revoked"))).await.unwrap_err();
        assert!(matches!(err, InboxError::Auth(_)));
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn refresh_without_token_is_not_connected() {
        let (server, c) = client().await;
        let err = c.refresh(&stored(&server, None)).await.unwrap_err();
        assert!(matches!(err, InboxError::NotConnected(_)));
    }

    #[tokio::test]
    async fn empty_code_is_rejected_before_any_request() {
        let (_server, c) = client().await;
        let err = c.exchange_code("  ").await.unwrap_err();
        assert!(matches!(err, InboxError::InvalidInput(_)));
    }
}
