mod credentials;
mod fs;
mod vector_index;

pub use credentials::FileCredentialStore;
pub use vector_index::{cosine_similarity, PersistentVectorIndex, DEFAULT_COLLECTION};
