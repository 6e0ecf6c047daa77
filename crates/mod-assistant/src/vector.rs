use std::sync::Arc;
use std::time::Duration;

use inbox_domain::{EmailDocument, EmbeddingPort, RetrievedDocument, VectorIndexPort, VectorRecord};
use inbox_error::InboxError;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::prompt::document_text;

pub const DEFAULT_BATCH_SIZE: usize = 20;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(2);
pub const MAX_RATE_LIMIT_RETRIES: u32 = 3;
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct UpsertOptions {
    pub batch_size: usize,
    /// Pause after each successful batch except the last.
    pub batch_delay: Duration,
    pub max_retries: u32,
    /// First rate-limit backoff; doubles on every further retry.
    pub initial_backoff: Duration,
}

impl Default for UpsertOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            max_retries: MAX_RATE_LIMIT_RETRIES,
            initial_backoff: INITIAL_BACKOFF,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpsertReport {
    pub batches: usize,
    pub upserted: usize,
    pub dropped_batches: usize,
    pub dropped_ids: Vec<String>,
}

pub struct VectorStore {
    embedder: Arc<dyn EmbeddingPort>,
    index: Arc<dyn VectorIndexPort>,
}

impl VectorStore {
    pub fn new(embedder: Arc<dyn EmbeddingPort>, index: Arc<dyn VectorIndexPort>) -> Self {
        Self { embedder, index }
    }

    pub async fn count(&self) -> Result<usize, InboxError> {
        self.index.count().await
    }

    /// Embeds and stores `docs` in batches of `opts.batch_size`. A batch that is
    /// still rate limited after `opts.max_retries` retries is dropped; any other
    /// error aborts the run.
    pub async fn upsert(
        &self,
        docs: &[EmailDocument],
        opts: &UpsertOptions,
    ) -> Result<UpsertReport, InboxError> {
        if opts.batch_size == 0 {
            return Err(InboxError::invalid_input("batch size must be at least 1"));
        }

        let mut report = UpsertReport::default();
        let total = docs.len().div_ceil(opts.batch_size);

        for (i, chunk) in docs.chunks(opts.batch_size).enumerate() {
            report.batches += 1;
            match self.upsert_with_retry(chunk, opts).await {
                Ok(n) => {
                    report.upserted += n;
                    debug!(batch = i + 1, total, size = n, "batch upserted");
                    if i + 1 < total && !opts.batch_delay.is_zero() {
                        tokio::time::sleep(opts.batch_delay).await;
                    }
                }
                Err(e) if e.is_rate_limited() => {
                    warn!(
                        batch = i + 1,
                        total,
                        size = chunk.len(),
                        %e,
                        "batch still rate limited after retries, dropping"
                    );
                    report.dropped_batches += 1;
                    report
                        .dropped_ids
                        .extend(chunk.iter().map(|d| d.id.clone()));
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            batches = report.batches,
            upserted = report.upserted,
            dropped = report.dropped_batches,
            "upsert finished"
        );
        Ok(report)
    }

    async fn upsert_with_retry(
        &self,
        chunk: &[EmailDocument],
        opts: &UpsertOptions,
    ) -> Result<usize, InboxError> {
        let mut backoff = opts.initial_backoff;
        let mut retries = 0;
        loop {
            match self.upsert_batch(chunk).await {
                Ok(n) => return Ok(n),
                Err(e) if e.is_rate_limited() && retries < opts.max_retries => {
                    retries += 1;
                    warn!(
                        retry = retries,
                        backoff_secs = backoff.as_secs(),
                        "rate limited while embedding, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn upsert_batch(&self, chunk: &[EmailDocument]) -> Result<usize, InboxError> {
        let texts: Vec<String> = chunk.iter().map(document_text).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;
        if embeddings.len() != chunk.len() {
            return Err(InboxError::api(format!(
                "embedding provider returned {} vectors for {} documents",
                embeddings.len(),
                chunk.len()
            )));
        }

        let records: Vec<VectorRecord> = chunk
            .iter()
            .zip(texts)
            .zip(embeddings)
            .map(|((doc, content), embedding)| VectorRecord {
                id: doc.id.clone(),
                embedding,
                content,
                metadata: doc.metadata(),
            })
            .collect();

        let n = records.len();
        self.index.upsert(records).await?;
        Ok(n)
    }

    /// Nearest documents to `text`, best first. Blank text or `k == 0` yields
    /// nothing without calling the embedding provider.
    pub async fn query_similar(
        &self,
        text: &str,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, InboxError> {
        let text = text.trim();
        if text.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let embedding = self.embedder.embed_query(text).await?;
        let hits = self.index.query(&embedding, k).await?;
        debug!(k, hits = hits.len(), "similarity query");
        Ok(hits.into_iter().map(RetrievedDocument::from).collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use inbox_storage::PersistentVectorIndex;
    use tokio::time::Instant;

    use super::*;

    /// Embeds text as a small bag-of-letters vector. Scripted calls fail with
    /// rate limiting.
    #[derive(Default)]
    pub(crate) struct FakeEmbedder {
        pub(crate) script: Mutex<VecDeque<bool>>,
        pub(crate) document_calls: AtomicUsize,
        pub(crate) query_calls: AtomicUsize,
    }

    impl FakeEmbedder {
        pub(crate) fn rate_limited_on(pattern: &[bool]) -> Self {
            Self {
                script: Mutex::new(pattern.iter().copied().collect()),
                ..Default::default()
            }
        }
    }

    pub(crate) fn letters(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 26];
        for c in text.to_lowercase().chars().filter(char::is_ascii_lowercase) {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
        v
    }

    #[async_trait]
    impl EmbeddingPort for FakeEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, InboxError> {
            self.document_calls.fetch_add(1, Ordering::SeqCst);
            if self.script.lock().unwrap().pop_front().unwrap_or(false) {
                return Err(InboxError::rate_limited("429 Too Many Requests"));
            }
            Ok(texts.iter().map(|t| letters(t)).collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, InboxError> {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            Ok(letters(text))
        }
    }

    pub(crate) fn email(id: &str, subject: &str, body: &str) -> EmailDocument {
        EmailDocument {
            id: id.to_string(),
            thread_id: format!("t-{id}"),
            history_id: None,
            sender: "carol@example.com".to_string(),
            recipients: vec![],
            subject: subject.to_string(),
            timestamp: None,
            body_text: Some(body.to_string()),
            body_html: None,
            labels: vec![],
            snippet: None,
        }
    }

    fn emails(n: usize) -> Vec<EmailDocument> {
        (0..n)
            .map(|i| email(&format!("m{i}"), "subject", "body"))
            .collect()
    }

    fn store(embedder: Arc<FakeEmbedder>) -> (VectorStore, Arc<PersistentVectorIndex>) {
        let index = Arc::new(PersistentVectorIndex::in_memory("test"));
        (VectorStore::new(embedder, index.clone()), index)
    }

    fn no_delay() -> UpsertOptions {
        UpsertOptions {
            batch_size: 3,
            batch_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn batches_equal_ceil_of_n_over_b() {
        for (n, b, expected) in [(7usize, 3usize, 3usize), (6, 3, 2), (1, 5, 1), (0, 4, 0)] {
            let embedder = Arc::new(FakeEmbedder::default());
            let (store, index) = store(embedder.clone());
            let opts = UpsertOptions {
                batch_size: b,
                ..no_delay()
            };

            let report = store.upsert(&emails(n), &opts).await.unwrap();

            assert_eq!(report.batches, expected);
            assert_eq!(embedder.document_calls.load(Ordering::SeqCst), expected);
            assert_eq!(report.upserted, n);
            assert_eq!(index.count().await.unwrap(), n);
            for i in 0..n {
                assert!(index.get(&format!("m{i}")).await.is_some());
            }
        }
    }

    #[tokio::test]
    async fn reupserting_same_id_keeps_one_entry() {
        let (store, index) = store(Arc::new(FakeEmbedder::default()));
        let opts = no_delay();

        store
            .upsert(&[email("dup", "first", "alpha")], &opts)
            .await
            .unwrap();
        store
            .upsert(&[email("dup", "second", "beta")], &opts)
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        assert_eq!(index.get("dup").await.unwrap().metadata.subject, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_batch_succeeds_on_third_attempt() {
        let embedder = Arc::new(FakeEmbedder::rate_limited_on(&[true, true, false]));
        let (store, index) = store(embedder.clone());

        let start = Instant::now();
        let report = store.upsert(&emails(3), &no_delay()).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert_eq!(embedder.document_calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.dropped_batches, 0);
        assert_eq!(index.count().await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fourth_rate_limit_drops_batch_and_continues() {
        let embedder = Arc::new(FakeEmbedder::rate_limited_on(&[true, true, true, true]));
        let (store, index) = store(embedder.clone());

        let start = Instant::now();
        let report = store.upsert(&emails(5), &no_delay()).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(10 + 20 + 40));
        assert_eq!(embedder.document_calls.load(Ordering::SeqCst), 5);
        assert_eq!(report.batches, 2);
        assert_eq!(report.dropped_batches, 1);
        assert_eq!(report.dropped_ids, vec!["m0", "m1", "m2"]);
        assert_eq!(report.upserted, 2);
        assert_eq!(index.count().await.unwrap(), 2);
        assert!(index.get("m3").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_only_between_successful_batches() {
        let (store, _) = store(Arc::new(FakeEmbedder::default()));
        let opts = UpsertOptions {
            batch_size: 2,
            batch_delay: Duration::from_secs(2),
            ..Default::default()
        };

        let start = Instant::now();
        store.upsert(&emails(5), &opts).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let (store, _) = store(Arc::new(FakeEmbedder::default()));
        let opts = UpsertOptions {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            store.upsert(&emails(1), &opts).await.unwrap_err(),
            InboxError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let embedder = Arc::new(FakeEmbedder::default());
        let (store, _) = store(embedder.clone());
        store
            .upsert(&[email("m1", "lunch", "pizza")], &no_delay())
            .await
            .unwrap();

        assert!(store.query_similar("", 5).await.unwrap().is_empty());
        assert!(store.query_similar("   ", 5).await.unwrap().is_empty());
        assert!(store.query_similar("pizza", 0).await.unwrap().is_empty());
        assert_eq!(embedder.query_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn query_returns_closest_first() {
        let (store, _) = store(Arc::new(FakeEmbedder::default()));
        store
            .upsert(
                &[
                    email("zzz", "zzz", "zzzz zzzz"),
                    email("abc", "abc", "abc abc abc"),
                ],
                &no_delay(),
            )
            .await
            .unwrap();

        let hits = store.query_similar("abc", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "abc");
        assert_eq!(hits[0].metadata.thread_id, "t-abc");
    }
}
