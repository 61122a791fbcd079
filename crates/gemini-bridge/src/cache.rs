//! Persistent cache of engine analyses.
//!
//! Avoids re-running an identical analysis when neither the request nor the
//! files behind it have changed. Entries live one per file under
//! `<state_dir>/cache/`, named by a SHA-256 [`CacheKey`] over the prompt,
//! operation, working directory, and per-file identity (path, size, mtime,
//! digest of the first [`CONTENT_SAMPLE_BYTES`]).
//!
//! Reads honour the TTL but never delete; [`AnalysisCache::cleanup`] is the
//! only thing that removes entries, and it uses its own retention window.
//! Writes go through a temp file and an atomic rename so concurrent hook
//! processes never observe a half-written entry.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::hook::input::Operation;

/// Bytes of each file folded into its content digest.
pub const CONTENT_SAMPLE_BYTES: u64 = 1024;

/// Extension of cache entry files.
const ENTRY_EXTENSION: &str = "json";

/// Deterministic cache key for one analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for analyzing `files` with `prompt`.
    ///
    /// Reads file metadata and the first [`CONTENT_SAMPLE_BYTES`] of each
    /// file, so an edit that keeps the path changes the key. Missing files
    /// contribute a fixed marker.
    pub fn derive(operation: Operation, files: &[PathBuf], working_dir: &Path, prompt: &str) -> Self {
        let mut hasher = Sha256::new();
        update_field(&mut hasher, operation.as_str().as_bytes());
        update_field(&mut hasher, working_dir.to_string_lossy().as_bytes());
        update_field(&mut hasher, prompt.as_bytes());
        for path in files {
            update_field(&mut hasher, file_fingerprint(path).as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Length-prefixed so adjacent fields can't run together.
fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// `path|size|mtime_nanos|prefix_sha256`, or `path|missing`.
fn file_fingerprint(path: &Path) -> String {
    let Ok(meta) = fs::metadata(path) else {
        return format!("{}|missing", path.display());
    };
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let digest = if meta.is_file() {
        prefix_digest(path).unwrap_or_else(|_| "unreadable".to_string())
    } else {
        "dir".to_string()
    };
    format!("{}|{}|{mtime}|{digest}", path.display(), meta.len())
}

fn prefix_digest(path: &Path) -> io::Result<String> {
    let mut sample = Vec::with_capacity(CONTENT_SAMPLE_BYTES as usize);
    File::open(path)?
        .take(CONTENT_SAMPLE_BYTES)
        .read_to_end(&mut sample)?;
    Ok(format!("{:x}", Sha256::digest(&sample)))
}

/// On-disk representation of one cached analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    /// Unix seconds at write time.
    created_at: u64,
    operation: String,
    text: String,
}

/// Directory-backed analysis cache.
#[derive(Debug, Clone)]
pub struct AnalysisCache {
    dir: PathBuf,
    ttl: Duration,
}

impl AnalysisCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXTENSION}", key.as_str()))
    }

    /// Look up a cached analysis younger than the TTL.
    ///
    /// Expired entries are reported as misses and left in place.
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let path = self.entry_path(key);
        let contents = fs::read_to_string(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&contents) {
            Ok(e) => e,
            Err(e) => {
                warn!("Ignoring corrupt cache entry {}: {e}", path.display());
                return None;
            }
        };
        let age = Duration::from_secs(unix_now().saturating_sub(entry.created_at));
        if age < self.ttl {
            debug!("Cache hit {} (age {}s)", key.as_str(), age.as_secs());
            Some(entry.text)
        } else {
            debug!("Cache entry {} expired (age {}s)", key.as_str(), age.as_secs());
            None
        }
    }

    /// Store an analysis under `key`, replacing any previous entry atomically.
    pub fn put(&self, key: &CacheKey, operation: Operation, text: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let entry = CacheEntry {
            created_at: unix_now(),
            operation: operation.as_str().to_string(),
            text: text.to_string(),
        };
        let json = serde_json::to_vec(&entry).map_err(io::Error::other)?;
        write_atomic(&self.dir, &self.entry_path(key), &json)
    }

    /// Remove entries whose files are older than `max_age`. Returns the
    /// number removed. A missing cache directory is not an error.
    pub fn cleanup(&self, max_age: Duration) -> io::Result<usize> {
        remove_older_than(&self.dir, max_age, |path| {
            path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
                || is_stale_temp(path)
        })
    }
}

/// Write `bytes` to `target` via a temp file in `dir` and a rename.
pub(crate) fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

fn is_stale_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(".tmp-"))
}

/// Delete regular files in `dir` accepted by `filter` whose modification
/// time is more than `max_age` ago.
pub(crate) fn remove_older_than(
    dir: &Path,
    max_age: Duration,
    filter: impl Fn(&Path) -> bool,
) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() || !filter(&path) {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age > max_age {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                // Another process may have swept it first.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {e}", path.display()),
            }
        }
    }
    Ok(removed)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn key_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let f = write(dir.path(), "a.rs", "fn main() {}");
        let k1 = CacheKey::derive(Operation::ReadFile, &[f.clone()], dir.path(), "read it");
        let k2 = CacheKey::derive(Operation::ReadFile, &[f], dir.path(), "read it");
        assert_eq!(k1, k2);
        assert_eq!(k1.as_str().len(), 64);
    }

    #[test]
    fn key_changes_with_each_component() {
        let dir = tempfile::tempdir().unwrap();
        let f = write(dir.path(), "a.rs", "fn main() {}");
        let files = vec![f.clone()];
        let base = CacheKey::derive(Operation::RunTask, &files, dir.path(), "analyze");

        assert_ne!(base, CacheKey::derive(Operation::RunTask, &files, dir.path(), "review"));
        assert_ne!(base, CacheKey::derive(Operation::RunTask, &files, Path::new("/other"), "analyze"));
        assert_ne!(base, CacheKey::derive(Operation::GlobPattern, &files, dir.path(), "analyze"));

        // Same path and length, different content.
        fs::write(&f, "fn main() {!").unwrap();
        assert_ne!(base, CacheKey::derive(Operation::RunTask, &files, dir.path(), "analyze"));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let files: Vec<PathBuf> = Vec::new();
        let a = CacheKey::derive(Operation::RunTask, &files, Path::new("/ab"), "c");
        let b = CacheKey::derive(Operation::RunTask, &files, Path::new("/a"), "bc");
        assert_ne!(a, b);
    }

    #[test]
    fn missing_files_still_produce_a_key() {
        let k = CacheKey::derive(
            Operation::ReadFile,
            &[PathBuf::from("/no/such/file.rs")],
            Path::new("/no"),
            "p",
        );
        assert_eq!(k.as_str().len(), 64);
    }

    #[test]
    fn put_then_get_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnalysisCache::new(dir.path().join("cache"), Duration::from_secs(60));
        let key = CacheKey("k1".into());
        assert!(cache.get(&key).is_none());
        cache.put(&key, Operation::ReadFile, "analysis text").unwrap();
        assert_eq!(cache.get(&key).as_deref(), Some("analysis text"));
    }

    #[test]
    fn expired_entry_is_a_miss_but_not_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnalysisCache::new(dir.path(), Duration::ZERO);
        let key = CacheKey("k2".into());
        cache.put(&key, Operation::ReadFile, "old").unwrap();
        assert!(cache.get(&key).is_none());
        assert!(cache.entry_path(&key).exists());
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnalysisCache::new(dir.path(), Duration::from_secs(60));
        write(dir.path(), "bad.json", "{{{");
        assert!(cache.get(&CacheKey("bad".into())).is_none());
    }

    #[test]
    fn cleanup_uses_retention_not_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnalysisCache::new(dir.path(), Duration::from_secs(3600));
        cache.put(&CacheKey("a".into()), Operation::ReadFile, "x").unwrap();
        write(dir.path(), "notes.txt", "keep me");

        assert_eq!(cache.cleanup(Duration::from_secs(3600)).unwrap(), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.cleanup(Duration::from_millis(1)).unwrap(), 1);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn cleanup_of_missing_dir_is_ok() {
        let cache = AnalysisCache::new("/definitely/not/here", Duration::from_secs(1));
        assert_eq!(cache.cleanup(Duration::ZERO).unwrap(), 0);
    }
}
