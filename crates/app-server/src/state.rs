use std::sync::Arc;

use inbox_assistant::{AnswerPipeline, CredentialManager, MailService, SyncService, VectorStore};
use inbox_domain::OAuthPort;
use inbox_error::InboxError;
use inbox_google::{
    GeminiChat, GeminiConfig, GeminiEmbedder, GmailApiAdapter, GoogleOAuthClient,
    GoogleOAuthConfig,
};
use inbox_storage::{FileCredentialStore, PersistentVectorIndex, DEFAULT_COLLECTION};
use tracing::info;

use crate::config::AppConfig;
use crate::session::SessionSigner;

pub struct AppState {
    pub credentials: Arc<CredentialManager>,
    pub oauth: Arc<dyn OAuthPort>,
    pub mail: Arc<MailService>,
    pub sync: Arc<SyncService>,
    pub answers: Arc<AnswerPipeline>,
    pub sessions: SessionSigner,
    pub frontend_url: String,
    pub secure_cookies: bool,
}

impl AppState {
    pub async fn from_config(config: &AppConfig) -> Result<Self, InboxError> {
        let repo = Arc::new(FileCredentialStore::new(config.token_path()));
        info!(path = %repo.path().display(), "credential store");
        let oauth: Arc<dyn OAuthPort> = Arc::new(GoogleOAuthClient::new(GoogleOAuthConfig::new(
            &config.google_client_id,
            &config.google_client_secret,
            &config.google_redirect_uri,
        )));
        let credentials = Arc::new(CredentialManager::new(repo, oauth.clone()));
        let mail = Arc::new(MailService::new(Arc::new(GmailApiAdapter::new(
            credentials.clone(),
        ))));

        let index = PersistentVectorIndex::open(config.index_dir(), DEFAULT_COLLECTION).await?;
        let index_collection = index.collection().to_string();
        let gemini = GeminiConfig::new(&config.gemini_api_key);
        let store = Arc::new(VectorStore::new(
            Arc::new(GeminiEmbedder::new(gemini.clone())),
            Arc::new(index),
        ));
        info!(
            collection = %index_collection,
            documents = store.count().await?,
            dir = %config.index_dir().display(),
            "vector index ready"
        );

        let sync = Arc::new(SyncService::new(
            mail.clone(),
            store.clone(),
            config.sync.clone(),
        ));
        let answers = Arc::new(AnswerPipeline::new(store, Arc::new(GeminiChat::new(gemini))));

        Ok(Self {
            credentials,
            oauth,
            mail,
            sync,
            answers,
            sessions: SessionSigner::new(&config.secret_key),
            frontend_url: config.frontend_url.clone(),
            secure_cookies: config.production,
        })
    }
}
