use std::sync::Arc;

use crate::auth::TokenService;
use crate::password::CredentialHasher;
use crate::service::{AccountService, RecordService};
use crate::store::SharedStore;

pub type SharedTokens = Arc<TokenService>;
pub type SharedHasher = Arc<dyn CredentialHasher>;

#[derive(Clone)]
pub struct AppState {
    pub records: RecordService,
    pub accounts: AccountService,
    pub tokens: SharedTokens,
}

impl AppState {
    pub fn new(store: SharedStore, tokens: SharedTokens, hasher: SharedHasher) -> Self {
        Self {
            records: RecordService::new(store.clone()),
            accounts: AccountService::new(store, tokens.clone(), hasher),
            tokens,
        }
    }
}
