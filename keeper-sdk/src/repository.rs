use crate::cache::{CacheError, LocalCache, ReconcileOutcome};
use async_trait::async_trait;
use keeper_core::{DataRecord, DataType, verify};

/// Typed entry point into the local cache.
///
/// Each data type gets its own repository so type-specific checks run
/// before a record is written locally.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    fn data_type(&self) -> DataType;

    async fn add(&self, record: &DataRecord) -> Result<ReconcileOutcome, CacheError>;
}

/// Credential pairs.
#[derive(Debug, Clone)]
pub struct PassRepository {
    cache: LocalCache,
    login: String,
}

impl PassRepository {
    pub fn new(cache: LocalCache, login: impl Into<String>) -> Self {
        Self {
            cache,
            login: login.into(),
        }
    }
}

#[async_trait]
impl RecordRepository for PassRepository {
    fn data_type(&self) -> DataType {
        DataType::Pass
    }

    async fn add(&self, record: &DataRecord) -> Result<ReconcileOutcome, CacheError> {
        check(self.data_type(), record)?;
        self.cache.reconcile(&self.login, record).await
    }
}

/// Free-form notes.
#[derive(Debug, Clone)]
pub struct TextRepository {
    cache: LocalCache,
    login: String,
}

impl TextRepository {
    pub fn new(cache: LocalCache, login: impl Into<String>) -> Self {
        Self {
            cache,
            login: login.into(),
        }
    }
}

#[async_trait]
impl RecordRepository for TextRepository {
    fn data_type(&self) -> DataType {
        DataType::Text
    }

    async fn add(&self, record: &DataRecord) -> Result<ReconcileOutcome, CacheError> {
        check(self.data_type(), record)?;
        self.cache.reconcile(&self.login, record).await
    }
}

/// Pick the repository responsible for `data_type`.
pub fn repository_for(
    data_type: DataType,
    cache: LocalCache,
    login: impl Into<String>,
) -> Box<dyn RecordRepository> {
    match data_type {
        DataType::Pass => Box::new(PassRepository::new(cache, login)),
        DataType::Text => Box::new(TextRepository::new(cache, login)),
    }
}

fn check(expected: DataType, record: &DataRecord) -> Result<(), CacheError> {
    if record.data_type != expected {
        return Err(CacheError::WrongType {
            name: record.name.clone(),
            expected,
            found: record.data_type,
        });
    }
    if expected.carries_checksum() && !verify(record.data.as_bytes(), &record.checksum) {
        return Err(CacheError::Integrity {
            name: record.name.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn routes_by_type() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());
        let repo = repository_for(DataType::Text, cache.clone(), "alice");
        assert_eq!(repo.data_type(), DataType::Text);

        let note = DataRecord::draft(DataType::Text, "todo", "milk:eggs");
        assert_eq!(repo.add(&note).await.unwrap(), ReconcileOutcome::Created);
        assert!(
            cache
                .load("alice", "todo", DataType::Text)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn rejects_foreign_types() {
        let dir = TempDir::new().unwrap();
        let repo = PassRepository::new(LocalCache::new(dir.path()), "alice");
        let note = DataRecord::draft(DataType::Text, "todo", "milk:eggs");
        let err = repo.add(&note).await.unwrap_err();
        assert!(matches!(err, CacheError::WrongType { .. }), "{err}");
    }

    #[tokio::test]
    async fn refuses_records_with_a_stale_checksum() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(dir.path());
        let repo = PassRepository::new(cache.clone(), "alice");
        let mut record = DataRecord::draft(DataType::Pass, "mail", "me:secret");
        record.data = "me:tampered".into();

        let err = repo.add(&record).await.unwrap_err();
        assert!(matches!(err, CacheError::Integrity { .. }), "{err}");
        assert!(
            cache
                .load("alice", "mail", DataType::Pass)
                .await
                .unwrap()
                .is_none()
        );
    }
}
