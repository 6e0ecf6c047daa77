mod answer;
mod credentials;
mod mail;
pub mod prompt;
mod sync;
mod vector;

pub use answer::{
    AnswerPipeline, ANSWER_TOP_K, HIGHLIGHTS_TOP_K, IMPORTANT_QUERY, NO_IMPORTANT_EMAILS,
    NO_RELEVANT_EMAILS,
};
pub use credentials::CredentialManager;
pub use mail::MailService;
pub use sync::{SyncOptions, SyncReport, SyncService, DEFAULT_FETCH_LIMIT};
pub use vector::{
    UpsertOptions, UpsertReport, VectorStore, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE,
    INITIAL_BACKOFF, MAX_RATE_LIMIT_RETRIES,
};
