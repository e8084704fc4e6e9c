//! Request validation and ownership rules sitting between HTTP and the store.

use std::sync::Arc;

use chrono::Utc;
use keeper_core::{
    Credentials, DataRecord, FIELD_DELIMITER, RecordRequest, TokenResponse, fingerprint,
    has_subfields, verify,
};
use tracing::{debug, info};

use crate::auth::TokenService;
use crate::error::AppError;
use crate::password::CredentialHasher;
use crate::store::{SharedStore, StoreError};

/// Name taken by the listing route (`/api/user/records/list`); a record
/// stored under it could never be fetched by name.
pub const RESERVED_RECORD_NAME: &str = "list";

#[derive(Clone)]
pub struct RecordService {
    store: SharedStore,
}

impl RecordService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Validates and persists a record for `user_id`.
    ///
    /// Nothing reaches the store unless the payload is structurally valid
    /// and, for checksum-bearing types, its checksum matches the data.
    pub async fn put(&self, user_id: u64, request: RecordRequest) -> Result<DataRecord, AppError> {
        if request.name.trim().is_empty() {
            return Err(AppError::bad_request("record name must not be empty"));
        }
        if request.name == RESERVED_RECORD_NAME {
            return Err(AppError::bad_request(format!(
                "record name `{RESERVED_RECORD_NAME}` is reserved"
            )));
        }
        if !has_subfields(&request.data) {
            return Err(AppError::bad_request(format!(
                "data must contain at least two `{FIELD_DELIMITER}`-separated fields"
            )));
        }
        if request.data_type.carries_checksum()
            && !verify(request.data.as_bytes(), &request.checksum)
        {
            debug!(name = %request.name, "checksum mismatch");
            return Err(AppError::bad_request("corrupted data"));
        }

        let record = DataRecord {
            id: request.id,
            uploaded_at: Utc::now(),
            data_type: request.data_type,
            checksum: fingerprint(request.data.as_bytes()),
            data: request.data,
            filepath: String::new(),
            name: request.name,
            user_id,
            blocked: false,
        };
        let stored = self.store.put_record(&record, user_id).await?;
        info!(record_id = stored.id, "record stored");
        Ok(stored)
    }

    pub async fn get(&self, user_id: u64, name: &str) -> Result<DataRecord, AppError> {
        Ok(self.store.get_record(name, user_id).await?)
    }

    /// All records of `user_id`; empty when the user has none.
    pub async fn list(&self, user_id: u64) -> Result<Vec<DataRecord>, AppError> {
        match self.store.list_records(user_id).await {
            Ok(records) => Ok(records),
            Err(StoreError::NoData) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Clone)]
pub struct AccountService {
    store: SharedStore,
    tokens: Arc<TokenService>,
    hasher: Arc<dyn CredentialHasher>,
}

impl AccountService {
    pub fn new(
        store: SharedStore,
        tokens: Arc<TokenService>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        Self {
            store,
            tokens,
            hasher,
        }
    }

    pub async fn register(&self, credentials: Credentials) -> Result<TokenResponse, AppError> {
        credentials.validate()?;
        let hasher = Arc::clone(&self.hasher);
        let password = credentials.password;
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| AppError::internal(err.to_string()))??;
        let user_id = self.store.create_user(&credentials.login, &hash).await?;
        info!(user_id, "user registered");
        self.token_for(user_id)
    }

    pub async fn login(&self, credentials: Credentials) -> Result<TokenResponse, AppError> {
        let user = match self.store.get_user(&credentials.login).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(invalid_credentials()),
            Err(err) => return Err(err.into()),
        };
        let hasher = Arc::clone(&self.hasher);
        let password = credentials.password;
        let stored_hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash))
            .await
            .map_err(|err| AppError::internal(err.to_string()))??;
        if !matches {
            return Err(invalid_credentials());
        }
        debug!(user_id = user.id, "user logged in");
        self.token_for(user.id)
    }

    fn token_for(&self, user_id: u64) -> Result<TokenResponse, AppError> {
        let issued = self.tokens.issue(user_id)?;
        Ok(TokenResponse {
            token: issued.token,
            expires_in: issued.expires_in,
        })
    }
}

fn invalid_credentials() -> AppError {
    AppError::unauthorized("invalid login or password")
}
