//! Character store trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use tokio::sync::watch;

use super::error::StoreError;
use super::schema;
use super::types::StoreSummary;
use crate::model::{CachedCharacter, Species, Status};

const SELECT_COLUMNS: &str =
    "SELECT id, name, status, species, file_path, is_loading, updated_at FROM characters";

/// Trait for character store operations.
///
/// Object-safe so it can be shared as `Arc<dyn CharacterStore>` between the
/// sync routine and the presenter.
#[async_trait]
pub trait CharacterStore: Send + Sync {
    /// One-shot read of every cached character, in insertion order.
    async fn get_all(&self) -> Result<Vec<CachedCharacter>, StoreError>;

    /// Look up a single cached character.
    #[cfg(test)]
    async fn get(&self, id: &str) -> Result<Option<CachedCharacter>, StoreError>;

    /// Insert or update rows keyed by id, in a single transaction.
    ///
    /// An existing row keeps its position in the listing.
    async fn upsert_batch(&self, rows: &[CachedCharacter]) -> Result<(), StoreError>;

    /// Set the loading flag on the given ids. Unknown ids are ignored.
    ///
    /// Returns the number of rows touched.
    async fn set_loading(&self, ids: &[String], is_loading: bool) -> Result<u64, StoreError>;

    /// Counts for status reporting.
    async fn summary(&self) -> Result<StoreSummary, StoreError>;

    /// Live view of the full list. The receiver is marked changed after
    /// every write.
    fn subscribe(&self) -> watch::Receiver<Vec<CachedCharacter>>;
}

/// SQLite implementation of the character store.
pub struct SqliteCharacterStore {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    /// Path to the database file (for error messages).
    path: PathBuf,
    live: watch::Sender<Vec<CachedCharacter>>,
}

impl std::fmt::Debug for SqliteCharacterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCharacterStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteCharacterStore {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone).map_err(|e| StoreError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StoreError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StoreError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StoreError>(conn)
        })
        .await??;

        Self::from_connection(conn, path)
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, path: PathBuf) -> Result<Self, StoreError> {
        let initial = query_all(&conn)?;
        let (live, _) = watch::channel(initial);
        Ok(Self {
            conn: Mutex::new(conn),
            path,
            live,
        })
    }

    /// Close the underlying connection, surfacing any error SQLite reports.
    pub fn close(self) -> Result<(), StoreError> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|e| StoreError::Query(e.to_string()))?;
        conn.close().map_err(|(_, e)| StoreError::query(e))?;
        tracing::debug!(path = %self.path.display(), "Character store closed");
        Ok(())
    }

    /// Get the path to the database file.
    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of live subscriptions currently held.
    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.live.receiver_count()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    /// Re-read the full list and push it to subscribers.
    fn publish(&self) -> Result<(), StoreError> {
        let rows = {
            let conn = self.lock()?;
            query_all(&conn)?
        };
        tracing::trace!(rows = rows.len(), "Publishing character list");
        self.live.send_replace(rows);
        Ok(())
    }
}

#[async_trait]
impl CharacterStore for SqliteCharacterStore {
    async fn get_all(&self) -> Result<Vec<CachedCharacter>, StoreError> {
        let conn = self.lock()?;
        query_all(&conn)
    }

    #[cfg(test)]
    async fn get(&self, id: &str) -> Result<Option<CachedCharacter>, StoreError> {
        use rusqlite::OptionalExtension;

        let conn = self.lock()?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            [id],
            row_to_character,
        )
        .optional()
        .map_err(StoreError::query)
    }

    async fn upsert_batch(&self, rows: &[CachedCharacter]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        {
            let conn = self.lock()?;

            conn.execute("BEGIN TRANSACTION", [])
                .map_err(StoreError::query)?;

            let result = (|| {
                let mut stmt = conn
                    .prepare_cached(
                        r#"
                        INSERT INTO characters (id, name, status, species, file_path, is_loading, updated_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                        ON CONFLICT(id) DO UPDATE SET
                            name = excluded.name,
                            status = excluded.status,
                            species = excluded.species,
                            file_path = excluded.file_path,
                            is_loading = excluded.is_loading,
                            updated_at = excluded.updated_at
                        "#,
                    )
                    .map_err(StoreError::query)?;

                for row in rows {
                    stmt.execute(rusqlite::params![
                        &row.id,
                        &row.name,
                        row.status.as_str(),
                        row.species.as_str(),
                        &row.file_path,
                        row.is_loading,
                        row.updated_at.timestamp(),
                    ])
                    .map_err(StoreError::query)?;
                }

                Ok::<_, StoreError>(())
            })();

            match result {
                Ok(()) => {
                    conn.execute("COMMIT", []).map_err(StoreError::query)?;
                }
                Err(e) => {
                    let _ = conn.execute("ROLLBACK", []);
                    return Err(e);
                }
            }
        }

        self.publish()
    }

    async fn set_loading(&self, ids: &[String], is_loading: bool) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let touched = {
            let conn = self.lock()?;

            conn.execute("BEGIN TRANSACTION", [])
                .map_err(StoreError::query)?;

            let result = (|| {
                let mut stmt = conn
                    .prepare_cached("UPDATE characters SET is_loading = ?1 WHERE id = ?2")
                    .map_err(StoreError::query)?;

                let mut touched = 0u64;
                for id in ids {
                    touched += stmt
                        .execute(rusqlite::params![is_loading, id])
                        .map_err(StoreError::query)? as u64;
                }

                Ok::<_, StoreError>(touched)
            })();

            match result {
                Ok(touched) => {
                    conn.execute("COMMIT", []).map_err(StoreError::query)?;
                    touched
                }
                Err(e) => {
                    let _ = conn.execute("ROLLBACK", []);
                    return Err(e);
                }
            }
        };

        if touched > 0 {
            self.publish()?;
        }
        Ok(touched)
    }

    async fn summary(&self) -> Result<StoreSummary, StoreError> {
        let conn = self.lock()?;

        let (total, loading, last_updated): (i64, i64, Option<i64>) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(is_loading), 0), MAX(updated_at) FROM characters",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(StoreError::query)?;

        Ok(StoreSummary {
            total: total as u64,
            loading: loading as u64,
            last_updated: last_updated.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        })
    }

    fn subscribe(&self) -> watch::Receiver<Vec<CachedCharacter>> {
        self.live.subscribe()
    }
}

fn query_all(conn: &Connection) -> Result<Vec<CachedCharacter>, StoreError> {
    let mut stmt = conn
        .prepare_cached(&format!("{SELECT_COLUMNS} ORDER BY rowid"))
        .map_err(StoreError::query)?;

    let rows = stmt
        .query_map([], row_to_character)
        .map_err(StoreError::query)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::query)?;

    Ok(rows)
}

/// Convert a database row to a CachedCharacter.
fn row_to_character(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedCharacter> {
    let status: String = row.get(2)?;
    let species: String = row.get(3)?;
    let updated_at: i64 = row.get(6)?;

    Ok(CachedCharacter {
        id: row.get(0)?,
        name: row.get(1)?,
        file_path: row.get(4)?,
        updated_at: Utc
            .timestamp_opt(updated_at, 0)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH),
        status: Status::from_str(&status).unwrap_or(Status::Unknown),
        species: Species::from_str(&species).unwrap_or(Species::Human),
        is_loading: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, name: &str) -> CachedCharacter {
        CachedCharacter {
            id: id.to_string(),
            name: name.to_string(),
            file_path: format!("/data/images2/{id}.jpg"),
            updated_at: Utc::now(),
            status: Status::Alive,
            species: Species::Human,
            is_loading: false,
        }
    }

    #[tokio::test]
    async fn test_open_creates_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("characters.db");
        let db = SqliteCharacterStore::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), path);
        db.close().unwrap();
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("characters.db");

        let db = SqliteCharacterStore::open(&path).await.unwrap();
        db.upsert_batch(&[row("a", "Rick")]).await.unwrap();
        db.close().unwrap();

        let db = SqliteCharacterStore::open(&path).await.unwrap();
        let all = db.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Rick");
        assert_eq!(db.subscribe().borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = SqliteCharacterStore::open_in_memory().unwrap();
        let mut rick = row("a", "Rick");
        rick.species = Species::MythologicalCreature;
        rick.status = Status::Dead;
        db.upsert_batch(&[rick.clone()]).await.unwrap();

        let stored = db.get("a").await.unwrap().unwrap();
        assert_eq!(stored.name, "Rick");
        assert_eq!(stored.status, Status::Dead);
        assert_eq!(stored.species, Species::MythologicalCreature);
        assert_eq!(stored.file_path, "/data/images2/a.jpg");
        assert_eq!(stored.updated_at.timestamp(), rick.updated_at.timestamp());
        assert!(db.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_updates_in_place() {
        let db = SqliteCharacterStore::open_in_memory().unwrap();
        db.upsert_batch(&[row("a", "Rick"), row("b", "Morty")])
            .await
            .unwrap();

        let mut renamed = row("a", "Rick Sanchez");
        renamed.is_loading = true;
        db.upsert_batch(&[renamed]).await.unwrap();

        let all = db.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        // Existing row keeps its position
        assert_eq!(all[0].id, "a");
        assert_eq!(all[0].name, "Rick Sanchez");
        assert!(all[0].is_loading);
        assert_eq!(all[1].id, "b");
    }

    #[tokio::test]
    async fn test_upsert_batch_empty() {
        let db = SqliteCharacterStore::open_in_memory().unwrap();
        let rx = db.subscribe();
        db.upsert_batch(&[]).await.unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_set_loading_only_touches_known_ids() {
        let db = SqliteCharacterStore::open_in_memory().unwrap();
        db.upsert_batch(&[row("a", "Rick"), row("b", "Morty")])
            .await
            .unwrap();

        let touched = db
            .set_loading(&["a".to_string(), "zzz".to_string()], true)
            .await
            .unwrap();
        assert_eq!(touched, 1);
        assert!(db.get("a").await.unwrap().unwrap().is_loading);
        assert!(!db.get("b").await.unwrap().unwrap().is_loading);

        let touched = db.set_loading(&["a".to_string()], false).await.unwrap();
        assert_eq!(touched, 1);
        assert!(!db.get("a").await.unwrap().unwrap().is_loading);
    }

    #[tokio::test]
    async fn test_set_loading_empty() {
        let db = SqliteCharacterStore::open_in_memory().unwrap();
        assert_eq!(db.set_loading(&[], true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_sees_writes() {
        let db = SqliteCharacterStore::open_in_memory().unwrap();
        let mut rx = db.subscribe();
        assert!(rx.borrow_and_update().is_empty());

        db.upsert_batch(&[row("a", "Rick")]).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);

        db.set_loading(&["a".to_string()], true).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update()[0].is_loading);
    }

    #[tokio::test]
    async fn test_get_summary() {
        let db = SqliteCharacterStore::open_in_memory().unwrap();
        let summary = db.summary().await.unwrap();
        assert_eq!(summary, StoreSummary::default());

        db.upsert_batch(&[row("a", "Rick"), row("b", "Morty"), row("c", "Summer")])
            .await
            .unwrap();
        db.set_loading(&["b".to_string()], true).await.unwrap();

        let summary = db.summary().await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.loading, 1);
        assert!(summary.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_unknown_enum_values_fall_back() {
        let db = SqliteCharacterStore::open_in_memory().unwrap();
        {
            let conn = db.lock().unwrap();
            conn.execute(
                "INSERT INTO characters (id, name, status, species, file_path, is_loading, updated_at) VALUES ('x', 'X', 'ZOMBIE', 'PLANT', '', 0, 0)",
                [],
            )
            .unwrap();
        }
        let stored = db.get("x").await.unwrap().unwrap();
        assert_eq!(stored.status, Status::Unknown);
        assert_eq!(stored.species, Species::Human);
        assert_eq!(stored.updated_at, DateTime::UNIX_EPOCH);
    }
}
