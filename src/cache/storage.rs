//! SQLite-backed persistence for the query cache
//!
//! Small responses live inline in the database; responses over the inline
//! threshold are written to sharded blob files next to it.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CacheError;

/// Schema version - bump to drop and rebuild the cache
const SCHEMA_VERSION: i32 = 2;

/// Responses larger than this are stored as external blobs
const INLINE_THRESHOLD: usize = 16 * 1024;

type Result<T> = std::result::Result<T, CacheError>;

/// Persisted cache entry
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub data: Vec<u8>,
    /// Unix timestamp (seconds) when the data was fetched
    pub fetched_at: i64,
}

/// SQLite-backed cache storage
pub struct CacheStorage {
    conn: Connection,
    blobs_dir: PathBuf,
}

impl CacheStorage {
    /// Open or create storage at the default XDG cache location
    pub fn open() -> Result<Self> {
        Self::open_at(&Self::cache_dir()?)
    }

    /// Cache directory (`~/.cache/grcctl` on Linux)
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_base = dirs::cache_dir().ok_or(CacheError::NoHome)?;
        Ok(cache_base.join("grcctl"))
    }

    /// Open storage in a specific directory
    pub fn open_at(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create cache dir: {}", e)))?;

        let db_path = cache_dir.join("queries.db");
        let blobs_dir = cache_dir.join("blobs");
        std::fs::create_dir_all(&blobs_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create blobs dir: {}", e)))?;

        let conn = Connection::open(&db_path)?;

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Cache schema version changed ({} -> {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            Self::nuke(&db_path, &blobs_dir)?;
            return Self::open_at(cache_dir);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS query_entries (
                storage_key TEXT PRIMARY KEY NOT NULL,
                scope TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                data TEXT,
                blob_path TEXT,
                fetched_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_query_expires ON query_entries(expires_at);
            CREATE INDEX IF NOT EXISTS idx_query_scope_endpoint ON query_entries(scope, endpoint);
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self { conn, blobs_dir })
    }

    /// Get an unexpired entry
    pub fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        let now = Utc::now().timestamp();

        let row: Option<(Option<String>, Option<String>, i64)> = self
            .conn
            .query_row(
                "SELECT data, blob_path, fetched_at FROM query_entries
                 WHERE storage_key = ?1 AND expires_at > ?2",
                params![key, now],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            Some((Some(data), None, fetched_at)) => Ok(Some(StoredEntry {
                data: data.into_bytes(),
                fetched_at,
            })),
            Some((None, Some(blob_path), fetched_at)) => {
                match std::fs::read(self.blobs_dir.join(&blob_path)) {
                    Ok(data) => Ok(Some(StoredEntry { data, fetched_at })),
                    Err(e) => {
                        log::warn!("Failed to read cache blob {}: {}", blob_path, e);
                        self.delete_by_key(key)?;
                        Ok(None)
                    }
                }
            }
            _ => Ok(None),
        }
    }

    /// Store an entry that expires after `ttl`
    pub fn put(
        &self,
        key: &str,
        data: &[u8],
        scope: &str,
        endpoint: &str,
        ttl: Duration,
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        let expires = now + ttl.as_secs() as i64;

        if data.len() <= INLINE_THRESHOLD {
            self.conn.execute(
                "INSERT OR REPLACE INTO query_entries
                 (storage_key, scope, endpoint, data, blob_path, fetched_at, expires_at, size_bytes)
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7)",
                params![
                    key,
                    scope,
                    endpoint,
                    String::from_utf8_lossy(data).into_owned(),
                    now,
                    expires,
                    data.len()
                ],
            )?;
        } else {
            let blob_path = self.write_blob(key, data)?;
            self.conn.execute(
                "INSERT OR REPLACE INTO query_entries
                 (storage_key, scope, endpoint, data, blob_path, fetched_at, expires_at, size_bytes)
                 VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6, ?7)",
                params![key, scope, endpoint, blob_path, now, expires, data.len()],
            )?;
        }
        Ok(())
    }

    /// Extend an entry's lifetime after it was read
    pub fn touch(&self, key: &str, ttl: Duration) -> Result<()> {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        self.conn.execute(
            "UPDATE query_entries SET expires_at = ?2 WHERE storage_key = ?1",
            params![key, expires],
        )?;
        Ok(())
    }

    /// Delete one entry
    pub fn delete_by_key(&self, key: &str) -> Result<bool> {
        let blob: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT blob_path FROM query_entries WHERE storage_key = ?1",
                [key],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(Some(blob_path)) = blob {
            self.remove_blob(&blob_path);
        }

        let deleted = self
            .conn
            .execute("DELETE FROM query_entries WHERE storage_key = ?1", [key])?;
        Ok(deleted > 0)
    }

    /// Delete every entry for `scope` whose endpoint is `prefix` or below it.
    ///
    /// Used to invalidate cached reads after a mutation, e.g.
    /// `delete_by_prefix(host, "/api/risks")` drops the risk list, filtered
    /// lists, and individual risk records.
    pub fn delete_by_prefix(&self, scope: &str, prefix: &str) -> Result<usize> {
        let below = format!("{}/", prefix.trim_end_matches('/'));

        let mut stmt = self.conn.prepare(
            "SELECT blob_path FROM query_entries
             WHERE scope = ?1 AND blob_path IS NOT NULL
               AND (endpoint = ?2 OR substr(endpoint, 1, length(?3)) = ?3)",
        )?;
        let blobs: Vec<String> = stmt
            .query_map(params![scope, prefix, below], |r| r.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        for blob_path in &blobs {
            self.remove_blob(blob_path);
        }

        let deleted = self.conn.execute(
            "DELETE FROM query_entries
             WHERE scope = ?1 AND (endpoint = ?2 OR substr(endpoint, 1, length(?3)) = ?3)",
            params![scope, prefix, below],
        )?;
        Ok(deleted)
    }

    /// Delete every entry belonging to one API host
    pub fn clear_scope(&self, scope: &str) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            "SELECT blob_path FROM query_entries WHERE scope = ?1 AND blob_path IS NOT NULL",
        )?;
        let blobs: Vec<String> = stmt
            .query_map([scope], |r| r.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        for blob_path in &blobs {
            self.remove_blob(blob_path);
        }

        let deleted = self
            .conn
            .execute("DELETE FROM query_entries WHERE scope = ?1", [scope])?;
        Ok(deleted)
    }

    /// Clear all entries
    pub fn clear_all(&self) -> Result<ClearStats> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM query_entries", [], |r| r.get(0))?;

        self.conn.execute("DELETE FROM query_entries", [])?;

        if self.blobs_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.blobs_dir) {
                log::warn!("Failed to clear blobs directory: {}", e);
            }
            std::fs::create_dir_all(&self.blobs_dir)
                .map_err(|e| CacheError::Io(format!("Failed to recreate blobs dir: {}", e)))?;
        }

        Ok(ClearStats {
            entries_removed: count as usize,
        })
    }

    /// Cache statistics
    pub fn stats(&self) -> Result<CacheStats> {
        let now = Utc::now().timestamp();

        let (total, valid, size): (i64, i64, i64) = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN expires_at > ?1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(size_bytes), 0)
             FROM query_entries",
            [now],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;

        let (oldest, newest): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(fetched_at), MAX(fetched_at) FROM query_entries WHERE expires_at > ?1",
            [now],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        Ok(CacheStats {
            total_entries: total as usize,
            valid_entries: valid as usize,
            expired_entries: (total - valid) as usize,
            total_size_bytes: size as usize,
            oldest_entry: oldest,
            newest_entry: newest,
        })
    }

    /// Write a blob file, sharded by the first two characters of the key
    fn write_blob(&self, key: &str, data: &[u8]) -> Result<String> {
        let shard = &key[..2.min(key.len())];
        let shard_dir = self.blobs_dir.join(shard);
        std::fs::create_dir_all(&shard_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create shard dir: {}", e)))?;

        let filename = format!("{}.json", key);
        std::fs::write(shard_dir.join(&filename), data)
            .map_err(|e| CacheError::Io(format!("Failed to write blob: {}", e)))?;

        Ok(format!("{}/{}", shard, filename))
    }

    fn remove_blob(&self, blob_path: &str) {
        if let Err(e) = std::fs::remove_file(self.blobs_dir.join(blob_path)) {
            log::debug!("Could not remove cache blob {}: {}", blob_path, e);
        }
    }

    /// Delete the database and all blobs
    fn nuke(db_path: &Path, blobs_dir: &Path) -> Result<()> {
        if db_path.exists() {
            std::fs::remove_file(db_path)
                .map_err(|e| CacheError::Io(format!("Failed to remove cache DB: {}", e)))?;
        }
        if blobs_dir.exists() {
            std::fs::remove_dir_all(blobs_dir)
                .map_err(|e| CacheError::Io(format!("Failed to remove blobs dir: {}", e)))?;
        }
        Ok(())
    }
}

/// Result of clearing the cache
#[derive(Debug)]
pub struct ClearStats {
    pub entries_removed: usize,
}

/// Cache statistics
#[derive(Debug)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub total_size_bytes: usize,
    pub oldest_entry: Option<i64>,
    pub newest_entry: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCOPE: &str = "http://localhost:5000/";

    fn test_storage() -> (CacheStorage, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = CacheStorage::open_at(dir.path()).unwrap();
        (storage, dir)
    }

    fn minute() -> Duration {
        Duration::from_secs(60)
    }

    #[test]
    fn test_put_get_inline() {
        let (storage, _dir) = test_storage();
        storage
            .put("k1", b"[{\"id\":1}]", SCOPE, "/api/risks", minute())
            .unwrap();

        let entry = storage.get("k1").unwrap().unwrap();
        assert_eq!(entry.data, b"[{\"id\":1}]".to_vec());
        assert!(entry.fetched_at > 0);
    }

    #[test]
    fn test_put_get_blob() {
        let (storage, dir) = test_storage();
        let data = vec![b'x'; 40_000];
        storage.put("ab12", &data, SCOPE, "/api/audits", minute()).unwrap();

        assert_eq!(storage.get("ab12").unwrap().unwrap().data, data);
        assert!(dir.path().join("blobs").join("ab").join("ab12.json").exists());
    }

    #[test]
    fn test_expired_entry_is_hidden() {
        let (storage, _dir) = test_storage();
        storage
            .put("k1", b"[]", SCOPE, "/api/risks", Duration::ZERO)
            .unwrap();
        assert!(storage.get("k1").unwrap().is_none());
    }

    #[test]
    fn test_missing_blob_drops_entry() {
        let (storage, dir) = test_storage();
        let data = vec![b'y'; 40_000];
        storage.put("cd34", &data, SCOPE, "/api/risks", minute()).unwrap();
        std::fs::remove_file(dir.path().join("blobs").join("cd").join("cd34.json")).unwrap();

        assert!(storage.get("cd34").unwrap().is_none());
        assert_eq!(storage.stats().unwrap().total_entries, 0);
    }

    #[test]
    fn test_delete_by_prefix() {
        let (storage, _dir) = test_storage();
        storage.put("a", b"1", SCOPE, "/api/risks", minute()).unwrap();
        storage.put("b", b"2", SCOPE, "/api/risks/4", minute()).unwrap();
        storage.put("c", b"3", SCOPE, "/api/risks-archive", minute()).unwrap();
        storage.put("d", b"4", SCOPE, "/api/controls", minute()).unwrap();
        storage
            .put("e", b"5", "https://other.example.com/", "/api/risks", minute())
            .unwrap();

        let deleted = storage.delete_by_prefix(SCOPE, "/api/risks").unwrap();
        assert_eq!(deleted, 2);
        assert!(storage.get("a").unwrap().is_none());
        assert!(storage.get("b").unwrap().is_none());
        assert!(storage.get("c").unwrap().is_some());
        assert!(storage.get("d").unwrap().is_some());
        assert!(storage.get("e").unwrap().is_some());
    }

    #[test]
    fn test_clear_scope_keeps_other_hosts() {
        let (storage, _dir) = test_storage();
        storage.put("a", b"1", SCOPE, "/api/risks", minute()).unwrap();
        storage.put("b", b"2", SCOPE, "/api/controls", minute()).unwrap();
        storage
            .put("c", b"3", "https://other.example.com/", "/api/risks", minute())
            .unwrap();

        assert_eq!(storage.clear_scope(SCOPE).unwrap(), 2);
        assert!(storage.get("c").unwrap().is_some());
    }

    #[test]
    fn test_touch_extends_expiry() {
        let (storage, _dir) = test_storage();
        storage.put("k", b"1", SCOPE, "/api/risks", Duration::ZERO).unwrap();
        storage.touch("k", minute()).unwrap();
        assert!(storage.get("k").unwrap().is_some());
    }

    #[test]
    fn test_clear_all_and_stats() {
        let (storage, _dir) = test_storage();
        storage.put("k1", b"d1", SCOPE, "/api/risks", minute()).unwrap();
        storage.put("k2", b"d2", SCOPE, "/api/controls", minute()).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.valid_entries, 2);
        assert_eq!(stats.total_size_bytes, 4);
        assert!(stats.oldest_entry.is_some());

        assert_eq!(storage.clear_all().unwrap().entries_removed, 2);
        assert!(storage.get("k1").unwrap().is_none());
        assert_eq!(storage.stats().unwrap().total_entries, 0);
    }
}
