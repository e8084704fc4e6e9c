//! Pull every server record into the local cache.

use crate::cache::{CacheError, LocalCache, ReconcileOutcome};
use crate::http_client::HttpClient;
use crate::repository::repository_for;
use crate::SdkError;
use async_trait::async_trait;
use keeper_core::DataRecord;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Anything that can enumerate the current user's records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn list_records(&self) -> Result<Vec<DataRecord>, SdkError>;
}

#[async_trait]
impl RecordSource for HttpClient {
    async fn list_records(&self) -> Result<Vec<DataRecord>, SdkError> {
        HttpClient::list_records(self).await
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to list records: {0}")]
    Source(#[from] SdkError),
    #[error("failed to cache `{name}`: {source}")]
    Cache {
        name: String,
        #[source]
        source: CacheError,
    },
    #[error("sync cancelled")]
    Cancelled,
    #[error("reconcile task failed: {0}")]
    Join(#[from] JoinError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub replaced: usize,
    pub unchanged: usize,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.created + self.replaced + self.unchanged
    }

    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Created => self.created += 1,
            ReconcileOutcome::Replaced => self.replaced += 1,
            ReconcileOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// Reconcile every record `source` lists into `cache` under `login`.
///
/// Records are applied concurrently. All started tasks are awaited; the first
/// failure observed is returned and records already applied stay applied.
pub async fn sync_all<S>(
    source: &S,
    cache: &LocalCache,
    login: &str,
    cancel: &CancellationToken,
) -> Result<SyncReport, SyncError>
where
    S: RecordSource + ?Sized,
{
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    let records = tokio::select! {
        _ = cancel.cancelled() => return Err(SyncError::Cancelled),
        listed = source.list_records() => listed?,
    };
    let total = records.len();
    if total == 0 {
        info!(login, "no records to sync");
        return Ok(SyncReport::default());
    }

    let mut tasks = JoinSet::new();
    for record in records {
        if cancel.is_cancelled() {
            break;
        }
        let repository = repository_for(record.data_type, cache.clone(), login);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            repository
                .add(&record)
                .await
                .map_err(|source| SyncError::Cache {
                    name: record.name.clone(),
                    source,
                })
        });
    }
    let spawned = tasks.len();

    let mut report = SyncReport::default();
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined.map_err(SyncError::from).and_then(|result| result) {
            Ok(outcome) => report.record(outcome),
            Err(err) => {
                warn!(%err, "record sync failed");
                first_error.get_or_insert(err);
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }
    if spawned < total {
        return Err(SyncError::Cancelled);
    }
    info!(
        login,
        created = report.created,
        replaced = report.replaced,
        unchanged = report.unchanged,
        "sync complete"
    );
    Ok(report)
}
