//! Character table layout, versioned through `PRAGMA user_version`.

use rusqlite::Connection;

use super::error::StoreError;

/// `MIGRATIONS[n]` upgrades a database from version `n` to `n + 1`.
const MIGRATIONS: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS characters (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    status TEXT NOT NULL,
    species TEXT NOT NULL,
    file_path TEXT NOT NULL,
    is_loading INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_characters_loading ON characters(is_loading);
"#];

pub const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32, StoreError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the character table up to [`SCHEMA_VERSION`]. Each step and its
/// version bump commit together; a newer database is refused.
pub(crate) fn migrate(conn: &Connection) -> Result<(), StoreError> {
    apply(conn, MIGRATIONS)
}

fn apply(conn: &Connection, steps: &[&str]) -> Result<(), StoreError> {
    let expected = steps.len() as i32;
    let found = get_schema_version(conn)?;
    if found > expected {
        return Err(StoreError::UnsupportedSchemaVersion { found, expected });
    }

    for (from, ddl) in steps.iter().enumerate().skip(found.max(0) as usize) {
        let to = from as i32 + 1;
        conn.execute_batch(&format!(
            "BEGIN;\n{ddl}\nPRAGMA user_version = {to};\nCOMMIT;"
        ))
        .inspect_err(|_| {
            let _ = conn.execute_batch("ROLLBACK");
        })?;
        tracing::debug!(version = to, "Applied character schema migration");
    }

    Ok(())
}
