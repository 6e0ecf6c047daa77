use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use inbox_domain::{ScoredRecord, VectorIndexPort, VectorRecord};
use inbox_error::InboxError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::fs::atomic_write;

pub const DEFAULT_COLLECTION: &str = "inbox_ai_emails";

#[derive(Serialize, Deserialize)]
struct Snapshot {
    collection: String,
    records: Vec<VectorRecord>,
}

/// Vector index keyed by mail id, written through to a JSON file per collection.
pub struct PersistentVectorIndex {
    collection: String,
    path: Option<PathBuf>,
    records: RwLock<BTreeMap<String, VectorRecord>>,
}

impl PersistentVectorIndex {
    pub async fn open(dir: impl AsRef<Path>, collection: &str) -> Result<Self, InboxError> {
        let path = dir.as_ref().join(format!("{collection}.json"));
        let records = match tokio::fs::read(&path).await {
            Ok(raw) => {
                let snapshot: Snapshot = serde_json::from_slice(&raw).map_err(|e| {
                    InboxError::parse(format!("vector index {}: {e}", path.display()))
                })?;
                snapshot
                    .records
                    .into_iter()
                    .map(|r| (r.id.clone(), r))
                    .collect()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(InboxError::internal(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };

        info!(collection, count = records.len(), path = %path.display(), "vector index opened");
        Ok(Self {
            collection: collection.to_string(),
            path: Some(path),
            records: RwLock::new(records),
        })
    }

    /// Index that never touches disk.
    pub fn in_memory(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            path: None,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn get(&self, id: &str) -> Option<VectorRecord> {
        self.records.read().await.get(id).cloned()
    }

    async fn persist(&self, records: &BTreeMap<String, VectorRecord>) -> Result<(), InboxError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = Snapshot {
            collection: self.collection.clone(),
            records: records.values().cloned().collect(),
        };
        let json = serde_json::to_vec(&snapshot)
            .map_err(|e| InboxError::internal(format!("serialize vector index: {e}")))?;
        atomic_write(path, &json).await?;
        debug!(collection = %self.collection, count = records.len(), "vector index persisted");
        Ok(())
    }
}

#[async_trait]
impl VectorIndexPort for PersistentVectorIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), InboxError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut guard = self.records.write().await;
        let mut next = guard.clone();
        for record in records {
            next.insert(record.id.clone(), record);
        }
        // Memory only changes once the snapshot is on disk.
        self.persist(&next).await?;
        *guard = next;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredRecord>, InboxError> {
        if k == 0 || embedding.is_empty() {
            return Ok(vec![]);
        }

        let guard = self.records.read().await;
        let mut hits: Vec<ScoredRecord> = guard
            .values()
            .filter_map(|record| {
                if record.embedding.len() != embedding.len() {
                    warn!(id = %record.id, "embedding dimension mismatch, skipping");
                    return None;
                }
                Some(ScoredRecord {
                    score: cosine_similarity(&record.embedding, embedding),
                    record: record.clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize, InboxError> {
        Ok(self.records.read().await.len())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
