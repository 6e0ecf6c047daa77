use std::sync::Arc;

use chrono::Utc;
use inbox_domain::{SyncState, SyncStatus};
use inbox_error::InboxError;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::mail::MailService;
use crate::vector::{UpsertOptions, UpsertReport, VectorStore};

pub const DEFAULT_FETCH_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub fetch_limit: usize,
    pub upsert: UpsertOptions,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch_limit: DEFAULT_FETCH_LIMIT,
            upsert: UpsertOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub fetched: usize,
    pub upsert: UpsertReport,
}

/// Background ingestion of recent mail into the vector store, one run at a time.
pub struct SyncService {
    mail: Arc<MailService>,
    store: Arc<VectorStore>,
    options: SyncOptions,
    status: RwLock<SyncStatus>,
}

impl SyncService {
    pub fn new(mail: Arc<MailService>, store: Arc<VectorStore>, options: SyncOptions) -> Self {
        Self {
            mail,
            store,
            options,
            status: RwLock::new(SyncStatus::default()),
        }
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Spawns a sync run and returns its initial status. While a run is in
    /// progress the running status is returned and nothing new is spawned.
    pub async fn start(self: &Arc<Self>) -> SyncStatus {
        let mut status = self.status.write().await;
        if status.state == SyncState::Running {
            info!(run_id = status.run_id, state = %status.state, "sync already running");
            return status.clone();
        }

        let run_id = status.run_id + 1;
        *status = SyncStatus {
            run_id,
            state: SyncState::Running,
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        let snapshot = status.clone();
        drop(status);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_tracked(run_id).await;
        });

        info!(run_id, "sync started");
        snapshot
    }

    async fn run_tracked(&self, run_id: u64) {
        let result = self.run_once().await;

        let mut status = self.status.write().await;
        if status.run_id != run_id {
            return;
        }
        status.finished_at = Some(Utc::now());
        match result {
            Ok(report) => {
                status.state = SyncState::Completed;
                status.fetched = report.fetched;
                status.upserted = report.upsert.upserted;
                status.dropped_batches = report.upsert.dropped_batches;
                info!(
                    run_id,
                    fetched = report.fetched,
                    upserted = report.upsert.upserted,
                    "sync completed"
                );
            }
            Err(e) => {
                error!(run_id, %e, "sync task failed");
                status.state = SyncState::Failed;
                status.error = Some(e.to_string());
            }
        }
    }

    pub async fn run_once(&self) -> Result<SyncReport, InboxError> {
        info!(limit = self.options.fetch_limit, "starting sync");
        let emails = self.mail.fetch_recent(self.options.fetch_limit).await?;
        if emails.is_empty() {
            info!("no emails found to sync");
            return Ok(SyncReport {
                fetched: 0,
                upsert: UpsertReport::default(),
            });
        }

        info!(count = emails.len(), "upserting emails into vector store");
        let upsert = self.store.upsert(&emails, &self.options.upsert).await?;
        Ok(SyncReport {
            fetched: emails.len(),
            upsert,
        })
    }
}
