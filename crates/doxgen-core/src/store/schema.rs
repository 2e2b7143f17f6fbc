//! SQLite schema DDL and migration framework for the incremental cache.

use rusqlite::Connection;

use crate::errors::DoxResult;

/// Current schema version. Migrations run from whatever the DB currently
/// reports up to this value.
pub const SCHEMA_VERSION: i32 = 3;

/// Baseline DDL, safe to replay on an already-initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS cache_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS file_cache (
        path TEXT PRIMARY KEY,
        content_hash TEXT NOT NULL,
        processed_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
];

/// Prepare a freshly opened connection: pragmas, baseline tables, pending
/// migrations.
pub fn init_schema(conn: &Connection) -> DoxResult<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    for stmt in SCHEMA_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    migrate_schema(conn)
}

// ─── Migration framework ────────────────────────────────────────────────────

/// Run all pending migrations up to [`SCHEMA_VERSION`]. Each step runs in a
/// SAVEPOINT so a failure rolls back only that step.
pub fn migrate_schema(conn: &Connection) -> DoxResult<()> {
    let mut current_version = get_schema_version(conn);

    while current_version < SCHEMA_VERSION {
        let next_version = current_version + 1;
        conn.execute_batch("SAVEPOINT doxgen_migrate_step;")?;

        let step_result = (|| -> DoxResult<()> {
            match next_version {
                1 => migrate_to_v1(conn)?,
                2 => migrate_to_v2(conn)?,
                3 => migrate_to_v3(conn)?,
                _ => {}
            }
            set_schema_version(conn, next_version)?;
            conn.execute_batch("RELEASE SAVEPOINT doxgen_migrate_step;")?;
            Ok(())
        })();

        match step_result {
            Ok(()) => {
                tracing::debug!(from = current_version, to = next_version, "cache schema migrated");
                current_version = next_version;
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK TO SAVEPOINT doxgen_migrate_step;");
                let _ = conn.execute_batch("RELEASE SAVEPOINT doxgen_migrate_step;");
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Stored schema version; 0 when absent or unparseable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM cache_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> DoxResult<()> {
    conn.execute(
        "INSERT INTO cache_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

// ─── Individual migration steps ─────────────────────────────────────────────

/// v0 -> v1: baseline, created by `SCHEMA_STATEMENTS`.
fn migrate_to_v1(_conn: &Connection) -> DoxResult<()> {
    Ok(())
}

/// v1 -> v2: add `idx_file_cache_hash`.
fn migrate_to_v2(conn: &Connection) -> DoxResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_file_cache_hash ON file_cache(content_hash);",
    )?;
    Ok(())
}

/// v2 -> v3: `has_artifact` flag; files without elements are cached with 0.
fn migrate_to_v3(conn: &Connection) -> DoxResult<()> {
    conn.execute_batch(
        "ALTER TABLE file_cache ADD COLUMN has_artifact INTEGER NOT NULL DEFAULT 1;",
    )?;
    Ok(())
}
