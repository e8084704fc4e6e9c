use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use keeper_core::{DataRecord, User};

use super::{RecordStore, StoreError, StoreResult};

/// Process-local store for development and tests. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    next_user_id: u64,
    // (user_id, name) -> record; ordered so listing is sorted by name.
    records: BTreeMap<(u64, String), DataRecord>,
    next_record_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

impl Inner {
    fn owner_exists(&self, user_id: u64) -> bool {
        self.users.values().any(|user| user.id == user_id)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> StoreResult<u64> {
        let mut inner = self.lock()?;
        if inner.users.contains_key(login) {
            return Err(StoreError::DuplicateLogin);
        }
        inner.next_user_id += 1;
        let id = inner.next_user_id;
        inner.users.insert(
            login.to_string(),
            User {
                id,
                login: login.to_string(),
                password_hash: password_hash.to_string(),
            },
        );
        Ok(id)
    }

    async fn get_user(&self, login: &str) -> StoreResult<User> {
        self.lock()?
            .users
            .get(login)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn put_record(&self, record: &DataRecord, user_id: u64) -> StoreResult<DataRecord> {
        let mut inner = self.lock()?;
        if !inner.owner_exists(user_id) {
            return Err(StoreError::Backend(format!("unknown owner {user_id}")));
        }
        let mut stored = record.clone();
        stored.user_id = user_id;

        if record.id == 0 {
            let key = (user_id, record.name.clone());
            let existing_id = inner.records.get(&key).map(|existing| existing.id);
            stored.id = match existing_id {
                Some(id) => id,
                None => {
                    inner.next_record_id += 1;
                    inner.next_record_id
                }
            };
            inner.records.insert(key, stored.clone());
            return Ok(stored);
        }

        let old_key = inner
            .records
            .iter()
            .find(|((owner, _), existing)| *owner == user_id && existing.id == record.id)
            .map(|(key, _)| key.clone())
            .ok_or(StoreError::NotFound)?;
        let new_key = (user_id, record.name.clone());
        if new_key != old_key && inner.records.contains_key(&new_key) {
            return Err(StoreError::DuplicateName(record.name.clone()));
        }
        inner.records.remove(&old_key);
        inner.records.insert(new_key, stored.clone());
        Ok(stored)
    }

    async fn get_record(&self, name: &str, user_id: u64) -> StoreResult<DataRecord> {
        self.lock()?
            .records
            .get(&(user_id, name.to_string()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_records(&self, user_id: u64) -> StoreResult<Vec<DataRecord>> {
        let records: Vec<DataRecord> = self
            .lock()?
            .records
            .range((user_id, String::new())..)
            .take_while(|((owner, _), _)| *owner == user_id)
            .map(|(_, record)| record.clone())
            .collect();
        if records.is_empty() {
            return Err(StoreError::NoData);
        }
        Ok(records)
    }
}
