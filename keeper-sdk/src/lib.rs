//! Client-side building blocks for the keeper vault.
//!
//! [`HttpClient`] talks to the server, [`SessionStore`] keeps the login
//! between CLI invocations, [`LocalCache`] mirrors records on disk and
//! [`sync::sync_all`] reconciles the server's records into that mirror.

pub mod cache;
pub mod http_client;
pub mod repository;
pub mod session;
pub mod sync;

use thiserror::Error;

pub use cache::{CacheError, LocalCache, ReconcileOutcome};
pub use http_client::HttpClient;
pub use repository::{PassRepository, RecordRepository, TextRepository, repository_for};
pub use session::{Session, SessionError, SessionStore};
pub use sync::{RecordSource, SyncError, SyncReport, sync_all};

pub type Result<T> = std::result::Result<T, SdkError>;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl SdkError {
    /// True when the request never got an answer from the server.
    pub fn is_unreachable(&self) -> bool {
        match self {
            SdkError::Transport(err) => err.is_connect() || err.is_timeout() || err.is_request(),
            _ => false,
        }
    }
}
