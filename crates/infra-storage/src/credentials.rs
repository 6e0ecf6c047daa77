use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use inbox_domain::{CredentialRecord, CredentialRepository};
use inbox_error::InboxError;
use tracing::debug;

use crate::fs::atomic_write;

/// Stores the credential record as a flat JSON file.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialRepository for FileCredentialStore {
    async fn load(&self) -> Result<Option<CredentialRecord>, InboxError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no credential file");
                return Ok(None);
            }
            Err(e) => {
                return Err(InboxError::internal(format!(
                    "read {}: {e}",
                    self.path.display()
                )))
            }
        };

        let record: CredentialRecord = serde_json::from_slice(&raw).map_err(|e| {
            InboxError::parse(format!("credential file {}: {e}", self.path.display()))
        })?;
        Ok(Some(record))
    }

    async fn save(&self, record: &CredentialRecord) -> Result<(), InboxError> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| InboxError::internal(format!("serialize credentials: {e}")))?;
        atomic_write(&self.path, &json).await?;
        debug!(path = %self.path.display(), "credentials saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn sample() -> CredentialRecord {
        CredentialRecord {
            access_token: "ya29.access".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            scopes: vec!["openid".to_string()],
            expiry: Utc.with_ymd_and_hms(2031, 5, 1, 12, 0, 0).single(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
        }
    }

    #[tokio::test]
    async fn missing_file_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("tokens.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_returns_same_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested/tokens.json"));

        store.save(&sample()).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, Some(sample()));
        assert!(!dir.path().join("nested/tokens.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_uses_flat_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileCredentialStore::new(&path);
        store.save(&sample()).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        for key in [
            "access_token",
            "refresh_token",
            "client_id",
            "client_secret",
            "scopes",
            "expiry",
            "token_uri",
        ] {
            assert!(raw.get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = FileCredentialStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, InboxError::Parse(_)));
    }
}
