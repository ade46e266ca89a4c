use std::marker::PhantomData;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqlitePoolOptions, SqliteRow},
    Row, SqlitePool,
};
use thiserror::Error;
use uuid::Uuid;

use crm_core::types::{Collection, CrmSnapshot, Customer, Deal, Employee, Record, Stored, Task};
use crm_core::validation::{decode_document, ValidationError};

/// Keys a partial update may not overwrite.
const IMMUTABLE_KEYS: [&str; 2] = ["id", "created_at"];

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    pub fn customers(&self) -> CollectionRepository<Customer> {
        CollectionRepository::new(self.pool.clone())
    }

    pub fn deals(&self) -> CollectionRepository<Deal> {
        CollectionRepository::new(self.pool.clone())
    }

    pub fn employees(&self) -> CollectionRepository<Employee> {
        CollectionRepository::new(self.pool.clone())
    }

    pub fn tasks(&self) -> CollectionRepository<Task> {
        CollectionRepository::new(self.pool.clone())
    }

    /// Reads every collection. Documents are not read under a shared transaction.
    pub async fn snapshot(&self) -> Result<CrmSnapshot, RepositoryError> {
        Ok(CrmSnapshot {
            customers: self.customers().list().await?,
            deals: self.deals().list().await?,
            employees: self.employees().list().await?,
            tasks: self.tasks().list().await?,
        })
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
}

/// Errors raised by collection repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("a {collection} document with this {field} already exists")]
    Duplicate {
        collection: Collection,
        field: &'static str,
    },
    #[error("{collection} document '{id}' already exists")]
    IdTaken { collection: Collection, id: String },
    #[error("{collection} document '{id}' not found")]
    NotFound { collection: Collection, id: String },
    #[error("stored {collection} document '{id}' is corrupt: {source}")]
    Decode {
        collection: Collection,
        id: String,
        source: serde_json::Error,
    },
    #[error("failed to encode {collection} document: {source}")]
    Encode {
        collection: Collection,
        source: serde_json::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Typed access to one collection of the `documents` table.
pub struct CollectionRepository<T> {
    pool: SqlitePool,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for CollectionRepository<T> {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

impl<T> CollectionRepository<T> {
    fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            _record: PhantomData,
        }
    }
}

impl<T: Record> CollectionRepository<T> {
    fn collection(&self) -> &'static str {
        T::COLLECTION.as_str()
    }

    /// Validates and stores a new document, generating a UUID when the id is blank.
    pub async fn insert(
        &self,
        mut record: T,
        now: DateTime<Utc>,
    ) -> Result<Stored<T>, RepositoryError> {
        if record.id().trim().is_empty() {
            record.set_id(Uuid::new_v4().to_string());
        }
        record.on_create(now);
        record.normalize();
        record.validate()?;
        self.ensure_unique(&record).await?;

        let body = encode(&record)?;
        let stamp = to_rfc3339(now);
        let result = sqlx::query(
            "INSERT INTO documents (collection, id, body_json, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(self.collection())
        .bind(record.id())
        .bind(&body)
        .bind(&stamp)
        .bind(&stamp)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(Stored {
                record,
                created_at: now,
                updated_at: now,
            }),
            Err(sqlx::Error::Database(db_err))
                if matches!(db_err.code().as_deref(), Some("1555" | "2067")) =>
            {
                Err(RepositoryError::IdTaken {
                    collection: T::COLLECTION,
                    id: record.id().to_string(),
                })
            }
            Err(err) => Err(RepositoryError::Database(err)),
        }
    }

    /// Loads a single document.
    pub async fn get(&self, id: &str) -> Result<Option<Stored<T>>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, body_json, created_at, updated_at FROM documents \
             WHERE collection = ? AND id = ?",
        )
        .bind(self.collection())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(decode_row).transpose()
    }

    /// Loads every document of the collection, oldest first.
    pub async fn list(&self) -> Result<Vec<Stored<T>>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, body_json, created_at, updated_at FROM documents \
             WHERE collection = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(self.collection())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode_row).collect()
    }

    pub async fn count(&self) -> Result<u64, RepositoryError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM documents WHERE collection = ?")
                .bind(self.collection())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    /// Merges `patch` over the stored document's top-level keys and writes the result.
    ///
    /// `id` and `created_at` keep their stored values.
    pub async fn merge_update(
        &self,
        id: &str,
        patch: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Stored<T>, RepositoryError> {
        let row = sqlx::query(
            "SELECT body_json, created_at FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(self.collection())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound {
            collection: T::COLLECTION,
            id: id.to_string(),
        })?;

        let body: String = row.try_get("body_json")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let mut document: Map<String, Value> =
            serde_json::from_str(&body).map_err(|source| RepositoryError::Decode {
                collection: T::COLLECTION,
                id: id.to_string(),
                source,
            })?;
        for (key, value) in patch {
            if !IMMUTABLE_KEYS.contains(&key.as_str()) {
                document.insert(key, value);
            }
        }

        let mut record: T = decode_document(Value::Object(document))?;
        record.set_id(id.to_string());
        record.normalize();
        record.validate()?;
        self.ensure_unique(&record).await?;

        let result = sqlx::query(
            "UPDATE documents SET body_json = ?, updated_at = ? WHERE collection = ? AND id = ?",
        )
        .bind(encode(&record)?)
        .bind(to_rfc3339(now))
        .bind(self.collection())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound {
                collection: T::COLLECTION,
                id: id.to_string(),
            });
        }

        Ok(Stored {
            record,
            created_at,
            updated_at: now,
        })
    }

    /// Overwrites a single top-level field in place, leaving the rest of the body untouched.
    ///
    /// Returns `false` when the document does not exist. The caller is responsible for
    /// passing a value that keeps the document valid.
    pub async fn set_field(
        &self,
        id: &str,
        field: &str,
        value: &Value,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE documents SET body_json = json_set(body_json, ?, json(?)), updated_at = ? \
             WHERE collection = ? AND id = ?",
        )
        .bind(format!("$.{field}"))
        .bind(value.to_string())
        .bind(to_rfc3339(now))
        .bind(self.collection())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a document, returning `false` when it was absent.
    pub async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(self.collection())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ensure_unique(&self, record: &T) -> Result<(), RepositoryError> {
        let Some((field, value)) = record.unique_key() else {
            return Ok(());
        };
        let clash: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM documents \
             WHERE collection = ? AND id <> ? AND lower(json_extract(body_json, ?)) = lower(?) \
             LIMIT 1",
        )
        .bind(self.collection())
        .bind(record.id())
        .bind(format!("$.{field}"))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        match clash {
            Some(_) => Err(RepositoryError::Duplicate {
                collection: T::COLLECTION,
                field,
            }),
            None => Ok(()),
        }
    }
}

fn decode_row<T: Record>(row: &SqliteRow) -> Result<Stored<T>, RepositoryError> {
    let id: String = row.try_get("id")?;
    let body: String = row.try_get("body_json")?;
    let mut record: T = serde_json::from_str(&body).map_err(|source| RepositoryError::Decode {
        collection: T::COLLECTION,
        id: id.clone(),
        source,
    })?;
    record.set_id(id);
    Ok(Stored {
        record,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn encode<T: Record>(record: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(record).map_err(|source| RepositoryError::Encode {
        collection: T::COLLECTION,
        source,
    })
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
