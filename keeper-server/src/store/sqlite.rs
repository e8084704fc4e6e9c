use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keeper_core::{DataRecord, DataType, User};
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use tracing::debug;

use super::{RecordStore, StoreError, StoreResult, from_db_id, to_db_id};

const RECORD_COLUMNS: &str =
    "id, user_id, name, data_type, checksum, data, filepath, blocked, uploaded_at";

/// SQLite-backed store. Cheap to clone (the pool is reference counted).
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (or creates) the database at `url` and runs pending migrations.
    ///
    /// WAL and foreign keys are set on the connection rather than in a
    /// migration because SQLite refuses to switch journal mode inside a
    /// transaction.
    pub async fn open(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(backend)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(backend)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| StoreError::Backend(format!("migration failed: {err}")))?;
        debug!(%url, "sqlite store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_or_replace(&self, record: &DataRecord, owner: i64) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO records (user_id, name, data_type, checksum, data, filepath, blocked, uploaded_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (user_id, name) DO UPDATE SET \
                 data_type = excluded.data_type, \
                 checksum = excluded.checksum, \
                 data = excluded.data, \
                 filepath = excluded.filepath, \
                 blocked = excluded.blocked, \
                 uploaded_at = excluded.uploaded_at \
             RETURNING id",
        )
        .bind(owner)
        .bind(&record.name)
        .bind(record.data_type.as_str())
        .bind(&record.checksum)
        .bind(&record.data)
        .bind(&record.filepath)
        .bind(record.blocked)
        .bind(record.uploaded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }

    async fn update_owned(&self, record: &DataRecord, owner: i64) -> StoreResult<i64> {
        let id = to_db_id(record.id)?;
        let result = sqlx::query(
            "UPDATE records SET name = ?, data_type = ?, checksum = ?, data = ?, filepath = ?, \
                 blocked = ?, uploaded_at = ? \
             WHERE id = ? AND user_id = ?",
        )
        .bind(&record.name)
        .bind(record.data_type.as_str())
        .bind(&record.checksum)
        .bind(&record.data)
        .bind(&record.filepath)
        .bind(record.blocked)
        .bind(record.uploaded_at)
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::DuplicateName(record.name.clone())
            } else {
                backend(err)
            }
        })?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(id)
    }

    async fn fetch_by_id(&self, id: i64) -> StoreResult<DataRecord> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;
        record_from_row(&row)
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> StoreResult<u64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (login, password_hash) VALUES (?, ?) RETURNING id",
        )
        .bind(login)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::DuplicateLogin
            } else {
                backend(err)
            }
        })?;
        from_db_id(id)
    }

    async fn get_user(&self, login: &str) -> StoreResult<User> {
        let row = sqlx::query("SELECT id, login, password_hash FROM users WHERE login = ?")
            .bind(login)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;
        Ok(User {
            id: from_db_id(row.try_get("id").map_err(backend)?)?,
            login: row.try_get("login").map_err(backend)?,
            password_hash: row.try_get("password_hash").map_err(backend)?,
        })
    }

    async fn put_record(&self, record: &DataRecord, user_id: u64) -> StoreResult<DataRecord> {
        let owner = to_db_id(user_id)?;
        let id = if record.id == 0 {
            self.insert_or_replace(record, owner).await?
        } else {
            self.update_owned(record, owner).await?
        };
        self.fetch_by_id(id).await
    }

    async fn get_record(&self, name: &str, user_id: u64) -> StoreResult<DataRecord> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE user_id = ? AND name = ?");
        let row = sqlx::query(&sql)
            .bind(to_db_id(user_id)?)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;
        record_from_row(&row)
    }

    async fn list_records(&self, user_id: u64) -> StoreResult<Vec<DataRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE user_id = ? ORDER BY name");
        let rows = sqlx::query(&sql)
            .bind(to_db_id(user_id)?)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        if rows.is_empty() {
            return Err(StoreError::NoData);
        }
        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &SqliteRow) -> StoreResult<DataRecord> {
    let data_type: String = row.try_get("data_type").map_err(backend)?;
    let uploaded_at: DateTime<Utc> = row.try_get("uploaded_at").map_err(backend)?;
    Ok(DataRecord {
        id: from_db_id(row.try_get("id").map_err(backend)?)?,
        uploaded_at,
        data_type: DataType::from_str(&data_type)
            .map_err(|err| StoreError::Backend(err.to_string()))?,
        checksum: row.try_get("checksum").map_err(backend)?,
        data: row.try_get("data").map_err(backend)?,
        filepath: row.try_get("filepath").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        user_id: from_db_id(row.try_get("user_id").map_err(backend)?)?,
        blocked: row.try_get("blocked").map_err(backend)?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}
