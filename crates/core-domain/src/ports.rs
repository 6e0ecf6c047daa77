use async_trait::async_trait;
use inbox_error::InboxError;

use crate::entities::{
    CredentialRecord, EmailDocument, MailProfile, MessageRef, OutgoingEmail, ScoredRecord,
    SentMessage, VectorRecord,
};

/// Durable storage for the single credential record of this deployment.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn load(&self) -> Result<Option<CredentialRecord>, InboxError>;

    async fn save(&self, record: &CredentialRecord) -> Result<(), InboxError>;
}

#[async_trait]
pub trait OAuthPort: Send + Sync {
    fn authorization_url(&self) -> Result<String, InboxError>;

    async fn exchange_code(&self, code: &str) -> Result<CredentialRecord, InboxError>;

    /// Returns the refreshed record; the refresh token is carried over when
    /// the provider does not rotate it.
    async fn refresh(&self, record: &CredentialRecord) -> Result<CredentialRecord, InboxError>;
}

#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, InboxError>;
}

#[async_trait]
pub trait MailPort: Send + Sync {
    async fn profile(&self) -> Result<MailProfile, InboxError>;

    async fn list(&self, query: Option<&str>, limit: usize)
        -> Result<Vec<MessageRef>, InboxError>;

    async fn fetch_details(&self, id: &str) -> Result<EmailDocument, InboxError>;

    async fn send(&self, email: &OutgoingEmail) -> Result<SentMessage, InboxError>;
}

#[async_trait]
pub trait EmbeddingPort: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, InboxError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, InboxError>;
}

#[async_trait]
pub trait VectorIndexPort: Send + Sync {
    /// Insert or replace records by id.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), InboxError>;

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredRecord>, InboxError>;

    async fn count(&self) -> Result<usize, InboxError>;
}

#[async_trait]
pub trait LanguageModelPort: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, InboxError>;
}
