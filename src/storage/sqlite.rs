//! SQLite storage implementation.
//!
//! This module provides a SQLite-based implementation of the `ProfileStorage` trait.
//! It uses rusqlite for database access.

use std::sync::Mutex;

use super::{ProfileStorage, StorageError, StorageResult};
use crate::models::Profile;
use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS profiles (
    id             INTEGER PRIMARY KEY,
    name           TEXT NOT NULL,
    destination    TEXT,
    language       TEXT,
    local_language TEXT,
    keywords       TEXT,
    event          TEXT,
    package        TEXT,
    match_key      TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_profiles_match_key ON profiles(match_key);
";

const SELECT_COLUMNS: &str =
    "SELECT id, name, destination, language, local_language, keywords, event, package FROM profiles";

/// SQLite-based profile storage.
///
/// # Schema
/// A single `profiles` table with one column per profile field plus a
/// `match_key` column carrying a unique index for deduplication.
pub struct SqliteStorage {
    /// Path to the SQLite database file
    db_path: String,

    /// Open connection, set by `initialize`
    connection: Mutex<Option<Connection>>,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance.
    ///
    /// The database is opened lazily by [`ProfileStorage::initialize`].
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file (`:memory:` for a throwaway database)
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            connection: Mutex::new(None),
        }
    }

    /// Open an existing database without creating the schema.
    ///
    /// Use this to add profiles to a database built earlier; queries fail with
    /// `StorageError::QueryError` if the `profiles` table does not exist.
    ///
    /// # Errors
    /// Returns `StorageError::ConnectionError` if the file cannot be opened
    pub fn open(db_path: impl Into<String>) -> StorageResult<Self> {
        let db_path = db_path.into();
        let connection = Connection::open(&db_path).map_err(|e| {
            StorageError::ConnectionError(format!("cannot open {}: {}", db_path, e))
        })?;
        Ok(Self {
            db_path,
            connection: Mutex::new(Some(connection)),
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Run `f` with the open connection.
    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> StorageResult<T> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| StorageError::ConnectionError("connection lock poisoned".to_string()))?;
        let connection = guard.as_ref().ok_or_else(|| {
            StorageError::ConnectionError(format!(
                "database {} is not initialized",
                self.db_path
            ))
        })?;
        f(connection).map_err(|e| StorageError::QueryError(e.to_string()))
    }

    fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<Profile> {
        Ok(Profile {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            destination: row.get(2)?,
            language: row.get(3)?,
            local_language: row.get(4)?,
            keywords: row.get(5)?,
            event: row.get(6)?,
            package: row.get(7)?,
        })
    }
}

#[async_trait]
impl ProfileStorage for SqliteStorage {
    async fn initialize(&mut self) -> StorageResult<()> {
        let connection = Connection::open(&self.db_path).map_err(|e| {
            StorageError::ConnectionError(format!("cannot open {}: {}", self.db_path, e))
        })?;
        connection
            .execute_batch(SCHEMA)
            .map_err(|e| StorageError::SchemaError(e.to_string()))?;
        debug!("SQLite storage ready at {}", self.db_path);

        let mut guard = self
            .connection
            .lock()
            .map_err(|_| StorageError::ConnectionError("connection lock poisoned".to_string()))?;
        *guard = Some(connection);
        Ok(())
    }

    async fn insert_profile(&mut self, profile: &Profile) -> StorageResult<i64> {
        let key = profile.match_key();
        if self.exists_by_key(&key).await? {
            return Err(StorageError::DuplicateEntry(format!(
                "'{}' already stored",
                profile.name
            )));
        }
        self.with_connection(|conn| {
            let inserted = conn.execute(
                "INSERT INTO profiles
                    (id, name, destination, language, local_language, keywords, event, package, match_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    profile.id,
                    profile.name,
                    profile.destination,
                    profile.language,
                    profile.local_language,
                    profile.keywords,
                    profile.event,
                    profile.package,
                    key,
                ],
            );
            match inserted {
                Ok(_) => Ok(Ok(conn.last_insert_rowid())),
                // Primary key or match_key collision
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    Ok(Err(StorageError::DuplicateEntry(format!(
                        "'{}' conflicts with a stored profile",
                        profile.name
                    ))))
                }
                Err(e) => Err(e),
            }
        })?
    }

    async fn exists_by_key(&self, match_key: &str) -> StorageResult<bool> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT 1 FROM profiles WHERE match_key = ?1 LIMIT 1",
                [match_key],
                |_| Ok(()),
            )
            .optional()
            .map(|hit| hit.is_some())
        })
    }

    async fn get_all_profiles(&self) -> StorageResult<Vec<Profile>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY id", SELECT_COLUMNS))?;
            let rows = stmt.query_map([], Self::row_to_profile)?;
            let profiles = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(profiles)
        })
    }

    async fn get_profile_by_id(&self, id: i64) -> StorageResult<Profile> {
        let found = self.with_connection(|conn| {
            conn.query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                [id],
                Self::row_to_profile,
            )
            .optional()
        })?;
        found.ok_or_else(|| StorageError::NotFound(format!("Profile {} not found", id)))
    }

    async fn count_profiles(&self) -> StorageResult<usize> {
        self.with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get::<_, i64>(0))
        })
        .map(|count| count as usize)
    }
}
