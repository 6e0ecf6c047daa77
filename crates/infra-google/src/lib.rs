mod gemini;
mod gmail;
mod http;
mod mime;
mod oauth;

pub use gemini::{
    GeminiChat, GeminiConfig, GeminiEmbedder, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL,
    GEMINI_API_BASE,
};
pub use gmail::{GmailApiAdapter, GMAIL_API_BASE};
pub use oauth::{GoogleOAuthClient, GoogleOAuthConfig, GMAIL_SCOPES, GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI};
