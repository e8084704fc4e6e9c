//! On-disk mirror of a user's records.
//!
//! Layout: `<root>/<login>/<name><ext>`, one JSON document per record.
//! Both segments go through [`encode_segment`], which is injective and
//! never relies on letter case, so distinct logins and names never share
//! a path even on case-insensitive filesystems.

use keeper_core::{DataRecord, DataType};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error at {path}: {source}", path = .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt cache entry {path}: {source}", path = .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode record `{name}`: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("record `{name}` is {found}, expected {expected}")]
    WrongType {
        name: String,
        expected: DataType,
        found: DataType,
    },
    #[error("record `{name}` does not match its checksum")]
    Integrity { name: String },
    #[error("cache entry {path} holds `{cached}`, not `{incoming}`", path = .path.display())]
    NameMismatch {
        path: PathBuf,
        cached: String,
        incoming: String,
    },
}

/// What [`LocalCache::reconcile`] did with an incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Replaced,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn user_dir(&self, login: &str) -> PathBuf {
        self.root.join(encode_segment(login))
    }

    /// Create the per-user directory if it does not exist yet.
    pub async fn create_user_dir(&self, login: &str) -> Result<PathBuf, CacheError> {
        let dir = self.user_dir(login);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| CacheError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(dir)
    }

    pub fn entry_path(&self, login: &str, name: &str, data_type: DataType) -> PathBuf {
        let file = format!("{}{}", encode_segment(name), data_type.cache_extension());
        self.user_dir(login).join(file)
    }

    /// Read a cached record, `None` when nothing is cached under that name.
    pub async fn load(
        &self,
        login: &str,
        name: &str,
        data_type: DataType,
    ) -> Result<Option<DataRecord>, CacheError> {
        read_entry(&self.entry_path(login, name, data_type)).await
    }

    /// Apply an incoming record to the cache.
    ///
    /// A missing entry is written. An existing entry is only overwritten when
    /// it is a local draft (id 0) and the incoming record carries a server id.
    pub async fn reconcile(
        &self,
        login: &str,
        record: &DataRecord,
    ) -> Result<ReconcileOutcome, CacheError> {
        let path = self.entry_path(login, &record.name, record.data_type);
        let outcome = match read_entry(&path).await? {
            Some(local) if local.name != record.name => {
                return Err(CacheError::NameMismatch {
                    path,
                    cached: local.name,
                    incoming: record.name.clone(),
                });
            }
            None => ReconcileOutcome::Created,
            Some(local) if record.id != 0 && local.id == 0 => ReconcileOutcome::Replaced,
            Some(_) => return Ok(ReconcileOutcome::Unchanged),
        };
        write_entry(&path, record).await?;
        debug!(
            name = %record.name,
            id = record.id,
            ?outcome,
            "cache entry written"
        );
        Ok(outcome)
    }
}

async fn read_entry(path: &Path) -> Result<Option<DataRecord>, CacheError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| CacheError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_entry(path: &Path, record: &DataRecord) -> Result<(), CacheError> {
    let io_err = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    let bytes = serde_json::to_vec_pretty(record).map_err(|source| CacheError::Encode {
        name: record.name.clone(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
    file.write_all(&bytes).await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    Ok(())
}

/// Maps a login or record name to a single path segment.
///
/// Lowercase ASCII letters, digits and `-` pass through. Every other byte,
/// `_` and uppercase letters included, becomes `_xx` (lowercase hex). The
/// empty string maps to a lone `_`, which no escape sequence produces.
fn encode_segment(input: &str) -> String {
    if input.is_empty() {
        return "_".to_string();
    }
    let mut segment = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' => segment.push(char::from(byte)),
            _ => {
                segment.push('_');
                segment.push_str(&hex::encode([byte]));
            }
        }
    }
    segment
}
