use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::fingerprint;
use crate::errors::{Error, Result};

/// Separator between sub-fields of a record payload (`login:password`).
pub const FIELD_DELIMITER: char = ':';

/// Returns true when `data` holds at least one field beyond the first.
pub fn has_subfields(data: &str) -> bool {
    data.split(FIELD_DELIMITER).count() > 1
}

/// Kind of payload a record carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    /// Credential pair.
    Pass,
    /// Free-form text note.
    Text,
}

impl DataType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Text => "TEXT",
        }
    }

    /// Whether writes of this type must present a checksum matching `data`.
    pub const fn carries_checksum(self) -> bool {
        match self {
            Self::Pass | Self::Text => true,
        }
    }

    /// File extension used for local cache entries.
    pub const fn cache_extension(self) -> &'static str {
        match self {
            Self::Pass | Self::Text => ".json",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" | "password" => Ok(Self::Pass),
            "text" => Ok(Self::Text),
            other => Err(Error::UnknownDataType(other.to_string())),
        }
    }
}

/// A named, typed, checksummed unit of user data.
///
/// `id == 0` marks a draft that has not been assigned an identity by the
/// server yet. The owner is never part of the wire format; it is resolved
/// from the bearer token on the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataRecord {
    #[serde(default)]
    pub id: u64,
    pub uploaded_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub checksum: String,
    pub data: String,
    #[serde(default)]
    pub filepath: String,
    pub name: String,
    #[serde(skip)]
    pub user_id: u64,
    #[serde(default)]
    pub blocked: bool,
}

impl DataRecord {
    /// Builds an unsaved record with a freshly computed checksum.
    pub fn draft(data_type: DataType, name: impl Into<String>, data: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            id: 0,
            uploaded_at: Utc::now(),
            data_type,
            checksum: fingerprint(data.as_bytes()),
            data,
            filepath: String::new(),
            name: name.into(),
            user_id: 0,
            blocked: false,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.id == 0
    }
}

/// Body of `POST /api/user/records`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordRequest {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: u64,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub name: String,
    pub data: String,
    pub checksum: String,
}

impl RecordRequest {
    pub fn new(data_type: DataType, name: impl Into<String>, data: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            id: 0,
            data_type,
            name: name.into(),
            checksum: fingerprint(data.as_bytes()),
            data,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// The record the client keeps locally when the server cannot be reached.
    pub fn to_draft(&self) -> DataRecord {
        DataRecord {
            id: self.id,
            uploaded_at: Utc::now(),
            data_type: self.data_type,
            checksum: self.checksum.clone(),
            data: self.data.clone(),
            filepath: String::new(),
            name: self.name.clone(),
            user_id: 0,
            blocked: false,
        }
    }
}

impl From<&DataRecord> for RecordRequest {
    fn from(record: &DataRecord) -> Self {
        Self {
            id: record.id,
            data_type: record.data_type,
            name: record.name.clone(),
            data: record.data.clone(),
            checksum: record.checksum.clone(),
        }
    }
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// Registered account as seen by the store.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub login: String,
    pub password_hash: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

/// Body of the register and login endpoints.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.login.trim().is_empty() {
            return Err(Error::EmptyField { field: "login" });
        }
        if self.password.is_empty() {
            return Err(Error::EmptyField { field: "password" });
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub token: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
}
