use async_trait::async_trait;
use inbox_domain::{EmbeddingPort, LanguageModelPort};
use inbox_error::InboxError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::http::{read_json, transport_error};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

const SERVICE: &str = "gemini";
const MAX_BATCH_EMBED: usize = 100;
const DEFAULT_TEMPERATURE: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f64,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url)
    }
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Embedding>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Embedding,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

async fn post_json<B: Serialize + ?Sized, T: for<'de> Deserialize<'de>>(
    http: &reqwest::Client,
    config: &GeminiConfig,
    url: String,
    body: &B,
) -> Result<T, InboxError> {
    let resp = http
        .post(url)
        .header("x-goog-api-key", &config.api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(SERVICE, e))?;
    read_json(resp, SERVICE).await
}

/// Embeddings via `batchEmbedContents` (documents) and `embedContent` (queries).
pub struct GeminiEmbedder {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiEmbedder {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn request<'a>(&self, text: &'a str, task_type: &'static str) -> EmbedRequest<'a> {
        EmbedRequest {
            model: format!("models/{}", self.config.embedding_model),
            content: Content {
                parts: [Part { text }],
            },
            task_type,
        }
    }
}

#[async_trait]
impl EmbeddingPort for GeminiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, InboxError> {
        let url = self
            .config
            .endpoint(&self.config.embedding_model, "batchEmbedContents");
        let mut out = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(MAX_BATCH_EMBED) {
            let body = BatchEmbedRequest {
                requests: chunk
                    .iter()
                    .map(|t| self.request(t, "RETRIEVAL_DOCUMENT"))
                    .collect(),
            };
            let resp: BatchEmbedResponse =
                post_json(&self.http, &self.config, url.clone(), &body).await?;
            if resp.embeddings.len() != chunk.len() {
                return Err(InboxError::api(format!(
                    "gemini returned {} embeddings for {} texts",
                    resp.embeddings.len(),
                    chunk.len()
                )));
            }
            out.extend(resp.embeddings.into_iter().map(|e| e.values));
        }

        debug!(count = out.len(), "embedded documents");
        Ok(out)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, InboxError> {
        let url = self
            .config
            .endpoint(&self.config.embedding_model, "embedContent");
        let body = self.request(text, "RETRIEVAL_QUERY");
        let resp: EmbedResponse = post_json(&self.http, &self.config, url, &body).await?;
        Ok(resp.embedding.values)
    }
}

pub struct GeminiChat {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiChat {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LanguageModelPort for GeminiChat {
    async fn complete(&self, prompt: &str) -> Result<String, InboxError> {
        let url = self.config.endpoint(&self.config.chat_model, "generateContent");
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.config.temperature },
        });
        let resp: GenerateResponse = post_json(&self.http, &self.config, url, &body).await?;

        let text: String = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or_else(|| InboxError::api("gemini returned no candidates"))?
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        debug!(chars = text.len(), "generated completion");
        Ok(text)
    }
}
