//! Per-repository content-hash cache driving incremental indexing.
//!
//! The cache file is written only by [`FileHashCache::save`], which the
//! indexer calls after the vector store accepted the job's chunks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHash {
    pub path: String,
    /// BLAKE3 hex digest of the file bytes.
    pub hash: String,
    pub last_indexed: DateTime<Utc>,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_files: usize,
    pub total_chunks: usize,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    repo_path: String,
    hashes: HashMap<String, FileHash>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct CacheState {
    hashes: HashMap<String, FileHash>,
    updated_at: DateTime<Utc>,
}

/// Thread-safe view of one repository's cache file.
#[derive(Debug)]
pub struct FileHashCache {
    repo_path: String,
    path: PathBuf,
    state: RwLock<CacheState>,
}

/// Cache file location for `repo_path` inside `cache_dir`.
#[must_use]
pub fn cache_file_path(cache_dir: &Path, repo_path: &str) -> PathBuf {
    let digest = blake3::hash(repo_path.as_bytes()).to_hex();
    cache_dir.join(format!("file-hashes-{}.json", &digest[..16]))
}

/// BLAKE3 hex digest of the file at `path`.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub fn hash_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

/// BLAKE3 hex digest of `bytes`.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

impl FileHashCache {
    /// Load the cache for `repo_path`, or start empty when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing cache file cannot be read or parsed.
    pub fn load(cache_dir: &Path, repo_path: &str) -> Result<Self> {
        let path = cache_file_path(cache_dir, repo_path);
        if !path.exists() {
            tracing::debug!(repo = repo_path, "no hash cache on disk, starting empty");
            return Ok(Self::empty(cache_dir, repo_path));
        }

        let data = std::fs::read_to_string(&path)?;
        let file: CacheFile = serde_json::from_str(&data)?;
        tracing::debug!(repo = repo_path, files = file.hashes.len(), "hash cache loaded");
        Ok(Self {
            repo_path: repo_path.to_owned(),
            path,
            state: RwLock::new(CacheState {
                hashes: file.hashes,
                updated_at: file.updated_at,
            }),
        })
    }

    /// Empty cache bound to the same file; used for forced reindexing.
    #[must_use]
    pub fn empty(cache_dir: &Path, repo_path: &str) -> Self {
        Self {
            repo_path: repo_path.to_owned(),
            path: cache_file_path(cache_dir, repo_path),
            state: RwLock::new(CacheState {
                hashes: HashMap::new(),
                updated_at: Utc::now(),
            }),
        }
    }

    #[must_use]
    pub fn repo_path(&self) -> &str {
        &self.repo_path
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// True when `file` has no entry or its bytes changed since the entry
    /// was recorded. Hashing happens before the lock is taken.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn needs_reindex(&self, file: &Path) -> Result<bool> {
        let current = hash_file(file)?;
        Ok(!self.is_current(file, &current))
    }

    /// True when the entry for `file` was recorded with exactly `hash`.
    #[must_use]
    pub fn is_current(&self, file: &Path, hash: &str) -> bool {
        let key = file.to_string_lossy();
        self.read()
            .hashes
            .get(key.as_ref())
            .is_some_and(|cached| cached.hash == hash)
    }

    /// Record the current hash of `file`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn update(&self, file: &Path, chunk_count: usize) -> Result<()> {
        let hash = hash_file(file)?;
        self.record(file, hash, chunk_count);
        Ok(())
    }

    /// Record `hash` for `file` without touching the file again. The hash
    /// must come from the same bytes the chunks were built from.
    pub fn record(&self, file: &Path, hash: String, chunk_count: usize) {
        let key = file.to_string_lossy().into_owned();
        let entry = FileHash {
            path: key.clone(),
            hash,
            last_indexed: Utc::now(),
            chunk_count,
        };
        self.write().hashes.insert(key, entry);
    }

    pub fn remove(&self, file: &str) -> Option<FileHash> {
        self.write().hashes.remove(file)
    }

    /// Cached file paths.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.read().hashes.keys().cloned().collect()
    }

    #[must_use]
    pub fn get(&self, file: &str) -> Option<FileHash> {
        self.read().hashes.get(file).cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().hashes.is_empty()
    }

    /// Persist the whole map as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self) -> Result<()> {
        let file = {
            let mut state = self.write();
            state.updated_at = Utc::now();
            CacheFile {
                repo_path: self.repo_path.clone(),
                hashes: state.hashes.clone(),
                updated_at: state.updated_at,
            }
        };

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, data)?;
        tracing::debug!(
            repo = %self.repo_path,
            files = file.hashes.len(),
            path = %self.path.display(),
            "hash cache saved"
        );
        Ok(())
    }

    /// Delete the cache file and forget all entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let mut state = self.write();
        state.hashes.clear();
        state.updated_at = Utc::now();
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.read();
        CacheStats {
            total_files: state.hashes.len(),
            total_chunks: state.hashes.values().map(|h| h.chunk_count).sum(),
            updated_at: state.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use proptest::prelude::*;

    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn cache_file_name_is_keyed_by_repo_digest() {
        let a = cache_file_path(Path::new("/c"), "/repo/a");
        let b = cache_file_path(Path::new("/c"), "/repo/b");
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("file-hashes-"));
        assert_eq!(name.len(), "file-hashes-".len() + 16 + ".json".len());
    }

    #[test]
    fn new_and_changed_files_need_reindex() {
        let repo = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let file = write(repo.path(), "a.go", "package a");

        let cache = FileHashCache::load(cache_dir.path(), "/repo").unwrap();
        assert!(cache.is_empty());
        assert!(cache.needs_reindex(&file).unwrap());

        cache.update(&file, 3).unwrap();
        assert!(!cache.needs_reindex(&file).unwrap());

        fs::write(&file, "package b").unwrap();
        assert!(cache.needs_reindex(&file).unwrap());
    }

    #[test]
    fn save_then_load_round_trips() {
        let repo = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let a = write(repo.path(), "a.go", "package a");
        let b = write(repo.path(), "b.go", "package b");

        let cache = FileHashCache::load(cache_dir.path(), "/repo").unwrap();
        cache.update(&a, 2).unwrap();
        cache.update(&b, 5).unwrap();
        cache.save().unwrap();

        let reloaded = FileHashCache::load(cache_dir.path(), "/repo").unwrap();
        let key = a.to_string_lossy();
        assert_eq!(reloaded.get(&key), cache.get(&key));
        let mut entries = reloaded.entries();
        entries.sort();
        let mut expected = cache.entries();
        expected.sort();
        assert_eq!(entries, expected);

        let stats = reloaded.stats();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_chunks, 7);
        assert!(!reloaded.needs_reindex(&a).unwrap());
    }

    #[test]
    fn unsaved_updates_do_not_reach_disk() {
        let repo = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let a = write(repo.path(), "a.go", "package a");

        let cache = FileHashCache::load(cache_dir.path(), "/repo").unwrap();
        cache.update(&a, 1).unwrap();

        let fresh = FileHashCache::load(cache_dir.path(), "/repo").unwrap();
        assert!(fresh.needs_reindex(&a).unwrap());
    }

    #[test]
    fn clear_removes_file_and_entries() {
        let repo = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let a = write(repo.path(), "a.go", "package a");

        let cache = FileHashCache::load(cache_dir.path(), "/repo").unwrap();
        cache.update(&a, 1).unwrap();
        cache.save().unwrap();
        assert!(cache.path().exists());

        cache.clear().unwrap();
        assert!(!cache.path().exists());
        assert!(cache.is_empty());
        // clearing twice is fine
        cache.clear().unwrap();
    }

    #[test]
    fn remove_drops_entry() {
        let repo = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let a = write(repo.path(), "a.go", "package a");
        let cache = FileHashCache::empty(cache_dir.path(), "/repo");
        cache.update(&a, 1).unwrap();
        assert!(cache.remove(&a.to_string_lossy()).is_some());
        assert!(cache.is_empty());
    }

    #[test]
    fn recorded_hash_is_the_one_given() {
        let repo = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let file = write(repo.path(), "a.go", "package a");

        let cache = FileHashCache::empty(cache_dir.path(), "/repo");
        let seen = hash_bytes(b"package old");
        cache.record(&file, seen.clone(), 2);

        assert!(cache.is_current(&file, &seen));
        assert!(cache.needs_reindex(&file).unwrap());
        let entry = cache.get(&file.to_string_lossy()).unwrap();
        assert_eq!(entry.hash, seen);
        assert_eq!(entry.chunk_count, 2);
    }

    #[test]
    fn corrupt_cache_file_is_an_error() {
        let cache_dir = tempfile::tempdir().unwrap();
        let path = cache_file_path(cache_dir.path(), "/repo");
        fs::write(&path, "{ not json").unwrap();
        assert!(FileHashCache::load(cache_dir.path(), "/repo").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn any_byte_change_is_detected(
            original in proptest::collection::vec(any::<u8>(), 0..256),
            edited in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let repo = tempfile::tempdir().unwrap();
            let cache_dir = tempfile::tempdir().unwrap();
            let file = repo.path().join("f.go");
            fs::write(&file, &original).unwrap();

            let cache = FileHashCache::empty(cache_dir.path(), "/repo");
            cache.update(&file, 1).unwrap();
            prop_assert!(!cache.needs_reindex(&file).unwrap());

            fs::write(&file, &edited).unwrap();
            prop_assert_eq!(cache.needs_reindex(&file).unwrap(), original != edited);
        }
    }
}
