use std::sync::Arc;

use async_trait::async_trait;
use inbox_domain::{AccessTokenSource, CredentialRecord, CredentialRepository, OAuthPort};
use inbox_error::InboxError;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Loads the stored credential record and refreshes it on demand.
pub struct CredentialManager {
    repo: Arc<dyn CredentialRepository>,
    oauth: Arc<dyn OAuthPort>,
    refresh_lock: Mutex<()>,
}

impl CredentialManager {
    pub fn new(repo: Arc<dyn CredentialRepository>, oauth: Arc<dyn OAuthPort>) -> Self {
        Self {
            repo,
            oauth,
            refresh_lock: Mutex::new(()),
        }
    }

    pub async fn save(&self, record: &CredentialRecord) -> Result<(), InboxError> {
        self.repo.save(record).await?;
        info!(scopes = record.scopes.len(), "credentials stored");
        Ok(())
    }

    /// `Ok(None)` when nothing is stored. An expired record is refreshed and
    /// persisted before it is returned; an expired record that cannot be
    /// refreshed is `NotConnected`.
    pub async fn load(&self) -> Result<Option<CredentialRecord>, InboxError> {
        let _guard = self.refresh_lock.lock().await;

        let Some(record) = self.repo.load().await? else {
            return Ok(None);
        };

        if !record.is_expired() {
            return Ok(Some(record));
        }

        if !record.can_refresh() {
            warn!("access token expired and no refresh token stored");
            return Err(InboxError::not_connected(
                "access token expired and no refresh token is available",
            ));
        }

        let refreshed = self
            .oauth
            .refresh(&record)
            .await
            .map_err(|e| match e {
                InboxError::Auth(_) => e,
                other => InboxError::auth(format!("token refresh failed: {other}")),
            })?;
        self.repo.save(&refreshed).await?;
        info!(expiry = ?refreshed.expiry, "access token refreshed");
        Ok(Some(refreshed))
    }

    pub async fn require(&self) -> Result<CredentialRecord, InboxError> {
        self.load()
            .await?
            .ok_or_else(|| InboxError::not_connected("no Google credentials stored, authenticate first"))
    }

    pub async fn is_connected(&self) -> bool {
        match self.load().await {
            Ok(Some(record)) => record.is_valid(),
            Ok(None) => false,
            Err(e) => {
                warn!(%e, "credential check failed");
                false
            }
        }
    }
}

#[async_trait]
impl AccessTokenSource for CredentialManager {
    async fn access_token(&self) -> Result<String, InboxError> {
        Ok(self.require().await?.access_token)
    }
}
