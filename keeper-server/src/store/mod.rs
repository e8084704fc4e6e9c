//! Authoritative storage for accounts and records.

mod memory;
mod sqlite;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use keeper_core::{DataRecord, User};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;
pub type SharedStore = Arc<dyn RecordStore>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("login already registered")]
    DuplicateLogin,
    #[error("record name `{0}` is already in use")]
    DuplicateName(String),
    #[error("not found")]
    NotFound,
    #[error("no records")]
    NoData,
    #[error("storage error: {0}")]
    Backend(String),
}

/// Keyed store of users and their records.
///
/// Every record operation is scoped to `user_id`. An update only touches the
/// row matching both the record id and the owner, so one user can never
/// overwrite another user's record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateLogin`] when the login is taken.
    async fn create_user(&self, login: &str, password_hash: &str) -> StoreResult<u64>;

    async fn get_user(&self, login: &str) -> StoreResult<User>;

    /// Inserts a record when `record.id == 0` and updates the `(id, user_id)`
    /// row otherwise. An insert whose name already exists for the user
    /// replaces that row in place and keeps its id.
    async fn put_record(&self, record: &DataRecord, user_id: u64) -> StoreResult<DataRecord>;

    async fn get_record(&self, name: &str, user_id: u64) -> StoreResult<DataRecord>;

    /// Records ordered by name; [`StoreError::NoData`] when the user has none.
    async fn list_records(&self, user_id: u64) -> StoreResult<Vec<DataRecord>>;
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sqlite,
    Memory,
}

impl StoreKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "" => Ok(Self::Sqlite),
            "memory" | "inmemory" => Ok(Self::Memory),
            other => Err(format!("unknown store kind `{other}`")),
        }
    }
}

/// Opens the backend selected by `kind`. `database_url` is ignored for the
/// in-memory store.
pub async fn open(kind: StoreKind, database_url: &str) -> StoreResult<SharedStore> {
    match kind {
        StoreKind::Sqlite => Ok(Arc::new(SqliteStore::open(database_url).await?)),
        StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

fn to_db_id(id: u64) -> StoreResult<i64> {
    i64::try_from(id).map_err(|_| StoreError::Backend(format!("id {id} out of range")))
}

fn from_db_id(id: i64) -> StoreResult<u64> {
    u64::try_from(id).map_err(|_| StoreError::Backend(format!("negative id {id}")))
}
