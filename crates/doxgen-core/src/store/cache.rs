//! Incremental cache: per-file content fingerprints persisted in SQLite.
//!
//! Lookups are served from an in-memory mirror; every mutation is written
//! through to `<root>/.doxgen/cache.db`. The store is never allowed to fail a
//! run: a corrupt database file is replaced, and when the store cannot be
//! opened or written the cache keeps working from memory alone.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::Serialize;

use super::schema;
use crate::config::CacheConfig;
use crate::errors::{DoxError, DoxResult};
use crate::indexer::filesystem::compute_content_hash;
use crate::render::page_path;

/// Stored state of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub content_hash: String,
    pub processed_at: DateTime<Utc>,
    /// False for files recorded without a module page.
    pub has_artifact: bool,
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// `None` once the store is unavailable.
    conn: Option<Connection>,
}

pub struct IncrementalCache {
    project_root: PathBuf,
    canonical_root: PathBuf,
    output_dir: PathBuf,
    store_path: PathBuf,
    state: Mutex<CacheState>,
}

impl IncrementalCache {
    /// Open (or create) the project store and load its entries.
    pub fn open(config: &CacheConfig, project_root: &Path, output_dir: &Path) -> Self {
        let store_path = config.store_path(project_root);
        let (conn, entries) = match open_store(&store_path) {
            Ok((conn, entries)) => (Some(conn), entries),
            Err(first) => {
                tracing::warn!(
                    store = %store_path.display(),
                    error = %first,
                    "cache store unreadable, recreating"
                );
                remove_store_files(&store_path);
                match open_store(&store_path) {
                    Ok((conn, entries)) => (Some(conn), entries),
                    Err(e) => {
                        tracing::warn!(
                            store = %store_path.display(),
                            error = %e,
                            "cache store unavailable, continuing with in-memory cache"
                        );
                        (None, HashMap::new())
                    }
                }
            }
        };
        tracing::debug!(entries = entries.len(), persistent = conn.is_some(), "cache opened");

        Self {
            project_root: project_root.to_path_buf(),
            canonical_root: canonical(project_root),
            output_dir: output_dir.to_path_buf(),
            store_path,
            state: Mutex::new(CacheState { entries, conn }),
        }
    }

    /// Whether `path` must be processed again.
    ///
    /// True when there is no entry, when the current content fingerprint
    /// differs from the stored one, or when the file's output page is missing.
    /// Entries recorded without a page skip the last check. Always hashes the
    /// file afresh.
    pub fn needs_update(&self, path: &Path) -> bool {
        let current = match compute_content_hash(path) {
            Ok(hash) => hash,
            Err(_) => return true,
        };
        self.needs_update_with(path, &current)
    }

    /// [`needs_update`](Self::needs_update) against an already computed
    /// fingerprint.
    pub fn needs_update_with(&self, path: &Path, fingerprint: &str) -> bool {
        let key = self.key_for(path);
        let expects_artifact = match self.state.lock().entries.get(&key) {
            Some(entry) if entry.content_hash == fingerprint => entry.has_artifact,
            _ => return true,
        };
        expects_artifact && !self.artifact_path(path).exists()
    }

    /// Record the file's current content as processed.
    pub fn mark_processed(&self, path: &Path) -> DoxResult<()> {
        let fingerprint = compute_content_hash(path)
            .map_err(|e| DoxError::Cache(format!("cannot fingerprint {}: {e}", path.display())))?;
        self.mark_processed_as(path, &fingerprint)
    }

    /// Record `fingerprint` as the processed state of `path`.
    pub fn mark_processed_as(&self, path: &Path, fingerprint: &str) -> DoxResult<()> {
        self.record(path, fingerprint, true)
    }

    /// Record `fingerprint` for a file that yields no module page.
    pub fn mark_empty_as(&self, path: &Path, fingerprint: &str) -> DoxResult<()> {
        self.record(path, fingerprint, false)
    }

    fn record(&self, path: &Path, fingerprint: &str, has_artifact: bool) -> DoxResult<()> {
        let key = self.key_for(path);
        let entry = CacheEntry {
            content_hash: fingerprint.to_string(),
            processed_at: Utc::now(),
            has_artifact,
        };
        let mut state = self.state.lock();
        let write = state.conn.as_ref().map(|conn| {
            conn.execute(
                "INSERT INTO file_cache(path, content_hash, processed_at, has_artifact) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(path) DO UPDATE SET \
                 content_hash = excluded.content_hash, processed_at = excluded.processed_at, \
                 has_artifact = excluded.has_artifact;",
                params![key, entry.content_hash, entry.processed_at, entry.has_artifact],
            )
        });
        self.degrade_on_error(&mut state, write);
        state.entries.insert(key, entry);
        Ok(())
    }

    /// Remove every entry.
    pub fn clear(&self) -> DoxResult<()> {
        let mut state = self.state.lock();
        let write = state
            .conn
            .as_ref()
            .map(|conn| conn.execute("DELETE FROM file_cache;", []));
        self.degrade_on_error(&mut state, write);
        state.entries.clear();
        tracing::info!(store = %self.store_path.display(), "cache cleared");
        Ok(())
    }

    /// Remove the entry for one file. Returns whether one existed.
    pub fn forget(&self, path: &Path) -> DoxResult<bool> {
        let key = self.key_for(path);
        let mut state = self.state.lock();
        let write = state
            .conn
            .as_ref()
            .map(|conn| conn.execute("DELETE FROM file_cache WHERE path = ?1;", params![key]));
        self.degrade_on_error(&mut state, write);
        Ok(state.entries.remove(&key).is_some())
    }

    pub fn entry(&self, path: &Path) -> Option<CacheEntry> {
        self.state.lock().entries.get(&self.key_for(path)).cloned()
    }

    pub fn tracked_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// False once the cache has fallen back to memory only.
    pub fn is_persistent(&self) -> bool {
        self.state.lock().conn.is_some()
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Expected module page for a source file:
    /// `<output>/docs/api/<relative path>.md`.
    pub fn artifact_path(&self, path: &Path) -> PathBuf {
        artifact_path(&self.output_dir, Path::new(""), &self.relative(path))
    }

    /// Entries are keyed by the canonical path relative to the project root,
    /// or the canonical absolute path for files outside it.
    fn key_for(&self, path: &Path) -> String {
        self.relative(path).to_string_lossy().replace('\\', "/")
    }

    fn relative(&self, path: &Path) -> PathBuf {
        let resolved = canonical(path);
        if let Ok(rel) = resolved.strip_prefix(&self.canonical_root) {
            return rel.to_path_buf();
        }
        match path.strip_prefix(&self.project_root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => resolved,
        }
    }

    /// Drop the connection after the first failed write; later mutations only
    /// touch memory.
    fn degrade_on_error(&self, state: &mut CacheState, write: Option<rusqlite::Result<usize>>) {
        if let Some(Err(e)) = write {
            tracing::warn!(
                store = %self.store_path.display(),
                error = %e,
                "cache store write failed, continuing with in-memory cache"
            );
            state.conn = None;
        }
    }
}

/// Module page path for `source` (relative to `source_root`) under `output`.
pub fn artifact_path(output: &Path, source_root: &Path, source: &Path) -> PathBuf {
    let rel = source.strip_prefix(source_root).unwrap_or(source);
    output.join("docs").join(page_path(rel))
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn open_store(path: &Path) -> DoxResult<(Connection, HashMap<String, CacheEntry>)> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    schema::init_schema(&conn)?;
    let entries = load_entries(&conn)?;
    Ok((conn, entries))
}

fn load_entries(conn: &Connection) -> DoxResult<HashMap<String, CacheEntry>> {
    let mut stmt =
        conn.prepare("SELECT path, content_hash, processed_at, has_artifact FROM file_cache;")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<DateTime<Utc>>>(2).ok().flatten(),
            row.get::<_, bool>(3)?,
        ))
    })?;
    let mut entries = HashMap::new();
    for row in rows {
        let (path, content_hash, processed_at, has_artifact) = row?;
        entries.insert(
            path,
            CacheEntry {
                content_hash,
                processed_at: processed_at.unwrap_or_else(Utc::now),
                has_artifact,
            },
        );
    }
    Ok(entries)
}

fn remove_store_files(path: &Path) {
    let _ = std::fs::remove_file(path);
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(sidecar));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        output: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("project");
        let output = dir.path().join("site");
        fs::create_dir_all(root.join("src")).unwrap();
        Fixture {
            _dir: dir,
            root,
            output,
        }
    }

    fn open(fx: &Fixture) -> IncrementalCache {
        IncrementalCache::open(&CacheConfig::default(), &fx.root, &fx.output)
    }

    fn write_artifact(cache: &IncrementalCache, source: &Path) {
        let artifact = cache.artifact_path(source);
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        fs::write(artifact, "# page").unwrap();
    }

    #[test]
    fn test_unknown_file_needs_update() {
        let fx = fixture();
        let file = fx.root.join("src/app.py");
        fs::write(&file, "x = 1\n").unwrap();
        let cache = open(&fx);
        assert!(cache.needs_update(&file));
        assert!(cache.is_persistent());
    }

    #[test]
    fn test_marked_file_is_fresh_until_content_changes() {
        let fx = fixture();
        let file = fx.root.join("src/app.py");
        fs::write(&file, "x = 1\n").unwrap();
        let cache = open(&fx);
        write_artifact(&cache, &file);
        cache.mark_processed(&file).unwrap();
        assert!(!cache.needs_update(&file));

        fs::write(&file, "x = 2\n").unwrap();
        assert!(cache.needs_update(&file));
    }

    #[test]
    fn test_missing_artifact_forces_update() {
        let fx = fixture();
        let file = fx.root.join("src/app.py");
        fs::write(&file, "x = 1\n").unwrap();
        let cache = open(&fx);
        write_artifact(&cache, &file);
        cache.mark_processed(&file).unwrap();
        fs::remove_file(cache.artifact_path(&file)).unwrap();
        assert!(cache.needs_update(&file));
    }

    #[test]
    fn test_entries_survive_reopen() {
        let fx = fixture();
        let file = fx.root.join("src/app.py");
        fs::write(&file, "x = 1\n").unwrap();
        {
            let cache = open(&fx);
            write_artifact(&cache, &file);
            cache.mark_processed(&file).unwrap();
        }
        let reopened = open(&fx);
        assert_eq!(reopened.tracked_count(), 1);
        assert!(!reopened.needs_update(&file));
        assert_eq!(
            reopened.entry(&file).unwrap().content_hash,
            compute_content_hash(&file).unwrap()
        );
    }

    #[test]
    fn test_forget_and_clear() {
        let fx = fixture();
        let a = fx.root.join("src/a.py");
        let b = fx.root.join("src/b.py");
        fs::write(&a, "a = 1\n").unwrap();
        fs::write(&b, "b = 1\n").unwrap();
        let cache = open(&fx);
        write_artifact(&cache, &a);
        write_artifact(&cache, &b);
        cache.mark_processed(&a).unwrap();
        cache.mark_processed(&b).unwrap();

        assert!(cache.forget(&a).unwrap());
        assert!(!cache.forget(&a).unwrap());
        assert!(cache.needs_update(&a));
        assert!(!cache.needs_update(&b));

        cache.clear().unwrap();
        assert_eq!(cache.tracked_count(), 0);
        assert_eq!(open(&fx).tracked_count(), 0);
    }

    #[test]
    fn test_corrupt_store_is_replaced() {
        let fx = fixture();
        let store = CacheConfig::default().store_path(&fx.root);
        fs::create_dir_all(store.parent().unwrap()).unwrap();
        fs::write(&store, b"this is not a sqlite database at all, not even close").unwrap();

        let cache = open(&fx);
        assert!(cache.is_persistent());
        assert_eq!(cache.tracked_count(), 0);
    }

    #[test]
    fn test_unwritable_store_falls_back_to_memory() {
        let fx = fixture();
        // a directory where the database file should be cannot be opened or removed
        let store = CacheConfig::default().store_path(&fx.root);
        fs::create_dir_all(store.join("blocker")).unwrap();

        let file = fx.root.join("src/app.py");
        fs::write(&file, "x = 1\n").unwrap();
        let cache = open(&fx);
        assert!(!cache.is_persistent());
        write_artifact(&cache, &file);
        cache.mark_processed(&file).unwrap();
        assert!(!cache.needs_update(&file));
    }

    #[test]
    fn test_artifact_path_mirrors_source_tree() {
        let fx = fixture();
        let cache = open(&fx);
        let path = cache.artifact_path(&fx.root.join("src/app/api.py"));
        assert!(path.ends_with("docs/api/src/app/api.py.md"), "{}", path.display());
        assert_ne!(
            cache.artifact_path(&fx.root.join("src/util.c")),
            cache.artifact_path(&fx.root.join("src/util.h"))
        );
    }

    #[test]
    fn test_empty_file_is_fresh_without_artifact() {
        let fx = fixture();
        let file = fx.root.join("src/empty.py");
        fs::write(&file, "").unwrap();
        let fingerprint = compute_content_hash(&file).unwrap();
        {
            let cache = open(&fx);
            cache.mark_empty_as(&file, &fingerprint).unwrap();
            assert!(!cache.artifact_path(&file).exists());
            assert!(!cache.needs_update_with(&file, &fingerprint));
        }

        let reopened = open(&fx);
        assert!(!reopened.entry(&file).unwrap().has_artifact);
        assert!(!reopened.needs_update(&file));
        fs::write(&file, "def late():\n    pass\n").unwrap();
        assert!(reopened.needs_update(&file));
    }
}
