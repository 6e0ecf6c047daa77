use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use inbox_assistant::{
    SyncOptions, UpsertOptions, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_FETCH_LIMIT,
};

pub const DEFAULT_BIND: &str = "0.0.0.0:8000";
pub const DEFAULT_DATA_DIR: &str = "storage";
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173/connected";
pub const TOKEN_FILE: &str = "tokens.json";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_redirect_uri: String,
    pub gemini_api_key: String,
    pub secret_key: String,
    pub production: bool,
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
    pub frontend_url: String,
    pub sync: SyncOptions,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes `std::env`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| format!("{key} env var not set"));

        let gemini_api_key = get("GEMINI_API_KEY")
            .or_else(|| get("GOOGLE_API_KEY"))
            .ok_or_else(|| "GEMINI_API_KEY (or GOOGLE_API_KEY) env var not set".to_string())?;

        let bind_raw = get("INBOXAI_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_raw
            .parse()
            .map_err(|e| format!("invalid INBOXAI_BIND '{bind_raw}': {e}"))?;

        let fetch_limit = parse_or(&get, "SYNC_FETCH_LIMIT", DEFAULT_FETCH_LIMIT)?;
        let batch_size = parse_or(&get, "EMBED_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 {
            return Err("EMBED_BATCH_SIZE must be at least 1".to_string());
        }
        let batch_delay = parse_or(&get, "EMBED_BATCH_DELAY_SECS", DEFAULT_BATCH_DELAY.as_secs())?;

        Ok(Self {
            google_client_id: require("GOOGLE_CLIENT_ID")?,
            google_client_secret: require("GOOGLE_CLIENT_SECRET")?,
            google_redirect_uri: require("GOOGLE_REDIRECT_URI")?,
            gemini_api_key,
            secret_key: require("SECRET_KEY")?,
            production: get("APP_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production")),
            data_dir: PathBuf::from(get("INBOXAI_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            bind,
            frontend_url: get("FRONTEND_REDIRECT_URL")
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            sync: SyncOptions {
                fetch_limit,
                upsert: UpsertOptions {
                    batch_size,
                    batch_delay: Duration::from_secs(batch_delay),
                    ..Default::default()
                },
            },
        })
    }

    pub fn token_path(&self) -> PathBuf {
        self.data_dir.join(TOKEN_FILE)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("vector_index")
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("invalid {key} '{raw}': {e}")),
        None => Ok(default),
    }
}
