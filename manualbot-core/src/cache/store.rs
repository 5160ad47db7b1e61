//! File-backed cache store with lazy TTL expiry and write-recency retention

use crate::cache::{
    clock::{Clock, SystemClock},
    config::CacheConfig,
    entry::{CacheEntry, SourceRef},
    key::fingerprint,
    types::{CacheCounters, CacheStats},
};
use crate::error::{CacheError, Result};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, info, warn};

const ENTRY_EXTENSION: &str = "json";
const TMP_EXTENSION: &str = "json.tmp";

/// On-disk answer cache keyed by question fingerprint
///
/// This implementation provides:
/// - One JSON file per entry, named `<fingerprint>.json`
/// - Lazy TTL expiry: expired files are deleted when a lookup finds them
/// - Retention by entry count, evicting the least recently written files
/// - Hit/miss counters behind a mutex, reset by [`CacheStore::clear_all`]
///
/// The directory is assumed to belong to a single process. Nothing locks the
/// read-then-delete sequences for expiry and eviction against other processes.
pub struct CacheStore {
    /// Cache configuration
    config: CacheConfig,

    /// Request counters
    counters: Mutex<CacheCounters>,

    /// Time source for timestamps, expiry and file mtimes
    clock: Arc<dyn Clock>,
}

/// Result of reading one entry file
enum ReadOutcome {
    Missing,
    Found(CacheEntry),
}

impl CacheStore {
    /// Open (and create if needed) a cache directory
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Open a cache that reads time from `clock`
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.cache_dir).map_err(|e| CacheError::io(&config.cache_dir, e))?;

        info!(
            "Cache initialized at {:?} (ttl: {:?}, max_entries: {})",
            config.cache_dir, config.ttl, config.max_entries
        );

        Ok(Self {
            config,
            counters: Mutex::new(CacheCounters::default()),
            clock,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Path of the file holding `key`
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.config
            .cache_dir
            .join(format!("{}.{}", key, ENTRY_EXTENSION))
    }

    /// Look up a cached answer
    ///
    /// Every call counts as one request and exactly one hit or miss. Expired
    /// and corrupt files are deleted and reported as misses.
    pub fn lookup(&self, question: &str) -> Option<CacheEntry> {
        let key = fingerprint(question);
        let path = self.entry_path(&key);

        let found = match self.read_entry(&path, &key) {
            Ok(ReadOutcome::Missing) => {
                debug!("Cache miss: {}", preview(question));
                None
            }
            Ok(ReadOutcome::Found(entry)) => {
                if entry.is_expired(self.clock.now(), self.config.ttl) {
                    debug!("Cache entry expired: {}", preview(question));
                    self.remove_file(&path);
                    None
                } else {
                    debug!("Cache hit: {}", preview(question));
                    Some(entry)
                }
            }
            Err(e @ CacheError::Corrupt { .. }) => {
                warn!("Discarding unreadable cache entry: {}", e);
                self.remove_file(&path);
                None
            }
            Err(e) => {
                warn!("Cache read failed, treating as miss: {}", e);
                None
            }
        };

        let mut counters = self.lock_counters();
        match found {
            Some(_) => counters.record_hit(),
            None => counters.record_miss(),
        }

        found
    }

    /// Store an answer, replacing any entry for the same normalized question
    ///
    /// Retention is enforced after the write; eviction problems are logged
    /// and do not fail the store.
    pub fn store(&self, question: &str, answer: &str, sources: Vec<SourceRef>) -> Result<()> {
        let key = fingerprint(question);
        let path = self.entry_path(&key);
        let now = self.clock.now();

        let entry = CacheEntry::new(key, question, answer, sources, now);
        let data = serde_json::to_string_pretty(&entry)?;

        let tmp_path = path.with_extension(TMP_EXTENSION);
        if let Err(e) = write_then_rename(&tmp_path, &path, data.as_bytes(), SystemTime::from(now)) {
            self.remove_file(&tmp_path);
            return Err(e);
        }

        debug!("Cache stored: {}", preview(question));

        if let Err(e) = self.enforce_retention() {
            warn!("Cache retention pass failed: {}", e);
        }

        Ok(())
    }

    /// Whether an entry file exists for `question` (no counters, no expiry check)
    pub fn contains(&self, question: &str) -> bool {
        self.entry_path(&fingerprint(question)).is_file()
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        let counters = *self.lock_counters();
        let (entry_count, size_bytes): (usize, u64) = match self.list_entries() {
            Ok(entries) => (
                entries.len(),
                entries.iter().map(|(_, meta)| meta.len()).sum(),
            ),
            Err(e) => {
                warn!("Could not list cache directory: {}", e);
                (0, 0)
            }
        };

        CacheStats::from_counters(counters, entry_count, size_bytes)
    }

    /// Number of entry files on disk
    pub fn len(&self) -> usize {
        self.list_entries().map(|e| e.len()).unwrap_or(0)
    }

    /// Check if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total size of entry files in bytes
    pub fn size_bytes(&self) -> u64 {
        self.list_entries()
            .map(|entries| entries.iter().map(|(_, meta)| meta.len()).sum())
            .unwrap_or(0)
    }

    /// Delete every entry and reset the counters
    ///
    /// Leftover `.json.tmp` files from interrupted writes are removed too but
    /// are not counted as entries.
    pub fn clear_all(&self) -> Result<usize> {
        let entries = self.list_entries()?;
        let mut removed = 0;

        for path in self.list_leftover_writes()? {
            self.remove_file(&path);
        }

        for (path, _) in &entries {
            match fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(path, e)),
            }
        }

        *self.lock_counters() = CacheCounters::default();

        info!("Cleared {} entries from cache", removed);
        Ok(removed)
    }

    /// Internal: read and validate one entry file
    fn read_entry(&self, path: &Path, key: &str) -> Result<ReadOutcome> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ReadOutcome::Missing),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(CacheError::Corrupt {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(CacheError::io(path, e)),
        };

        let entry: CacheEntry = serde_json::from_str(&data).map_err(|e| CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if entry.cache_key != key {
            return Err(CacheError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("cache_key {} does not match file name", entry.cache_key),
            });
        }

        Ok(ReadOutcome::Found(entry))
    }

    /// Internal: delete oldest-written entries beyond `max_entries`
    fn enforce_retention(&self) -> Result<()> {
        let mut entries = self.list_entries()?;
        if entries.len() <= self.config.max_entries {
            return Ok(());
        }

        entries.sort_by(|(a_path, a_meta), (b_path, b_meta)| {
            let a_time = a_meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let b_time = b_meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            a_time.cmp(&b_time).then_with(|| a_path.cmp(b_path))
        });

        let excess = entries.len() - self.config.max_entries;
        for (path, _) in entries.iter().take(excess) {
            debug!("Evicting cache entry due to max_entries limit: {:?}", path.file_name());
            self.remove_file(path);
        }

        Ok(())
    }

    /// Internal: entry files with their metadata
    fn list_entries(&self) -> Result<Vec<(PathBuf, fs::Metadata)>> {
        let dir = &self.config.cache_dir;
        let read_dir = fs::read_dir(dir).map_err(|e| CacheError::io(dir, e))?;

        let mut entries = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| CacheError::io(dir, e))?;
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let meta = match item.metadata() {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                // Removed between listing and stat
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(CacheError::io(&path, e)),
            };
            entries.push((path, meta));
        }

        Ok(entries)
    }

    /// Internal: temporary files left behind by interrupted writes
    fn list_leftover_writes(&self) -> Result<Vec<PathBuf>> {
        let dir = &self.config.cache_dir;
        let read_dir = fs::read_dir(dir).map_err(|e| CacheError::io(dir, e))?;
        let suffix = format!(".{}", TMP_EXTENSION);

        let mut paths = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| CacheError::io(dir, e))?;
            let is_tmp = item
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(&suffix));
            if is_tmp && item.file_type().map(|t| t.is_file()).unwrap_or(false) {
                paths.push(item.path());
            }
        }

        Ok(paths)
    }

    /// Internal: delete a file, ignoring one that is already gone
    fn remove_file(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to delete cache file {:?}: {}", path, e);
            }
        }
    }

    fn lock_counters(&self) -> std::sync::MutexGuard<'_, CacheCounters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Write `data` to `tmp_path` with mtime `modified`, then move it to `path`
fn write_then_rename(tmp_path: &Path, path: &Path, data: &[u8], modified: SystemTime) -> Result<()> {
    {
        let mut file = File::create(tmp_path).map_err(|e| CacheError::io(tmp_path, e))?;
        file.write_all(data).map_err(|e| CacheError::io(tmp_path, e))?;
        file.set_modified(modified)
            .map_err(|e| CacheError::io(tmp_path, e))?;
    }
    fs::rename(tmp_path, path).map_err(|e| CacheError::io(path, e))
}

/// First 50 characters of a question, for log lines
fn preview(question: &str) -> String {
    let mut short: String = question.chars().take(50).collect();
    if question.chars().count() > 50 {
        short.push_str("...");
    }
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::time::Duration;
    use tempfile::TempDir;

    fn open(dir: &TempDir, max_entries: usize) -> (CacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        ));
        let config = CacheConfig::builder()
            .cache_dir(dir.path())
            .ttl(Duration::from_secs(86_400))
            .max_entries(max_entries)
            .build();
        let store = CacheStore::with_clock(config, clock.clone()).unwrap();
        (store, clock)
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("data").join("cache");
        let config = CacheConfig::builder().cache_dir(&nested).build();

        CacheStore::new(config).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::builder()
            .cache_dir(dir.path())
            .max_entries(0)
            .build();
        assert!(matches!(CacheStore::new(config), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_basic_store_and_lookup() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open(&dir, 10);

        let sources = vec![SourceRef::new("c9300.pdf", Some(12), "VLAN configuration...")];
        store
            .store("How do I create a VLAN?", "Use `vlan <id>`.", sources.clone())
            .unwrap();

        let entry = store.lookup("How do I create a VLAN?").unwrap();
        assert_eq!(entry.answer, "Use `vlan <id>`.");
        assert_eq!(entry.sources, sources);
        assert_eq!(entry.question, "How do I create a VLAN?");

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_cache_miss() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open(&dir, 10);

        assert!(store.lookup("nonexistent").is_none());

        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_requests, 1);
    }

    #[test]
    fn test_file_named_by_fingerprint() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open(&dir, 10);

        store.store("show version", "It prints the OS version.", vec![]).unwrap();

        let path = dir.path().join(format!("{}.json", fingerprint("SHOW VERSION")));
        assert!(path.is_file());
        assert!(store.contains("  Show Version "));
    }

    #[test]
    fn test_non_ascii_is_written_verbatim() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open(&dir, 10);

        store.store("VRRPの設定手順は？", "vrrp コマンドを使います。", vec![]).unwrap();

        let raw = fs::read_to_string(store.entry_path(&fingerprint("VRRPの設定手順は？"))).unwrap();
        assert!(raw.contains("vrrp コマンドを使います。"));
    }

    #[test]
    fn test_ttl_expiration_deletes_file() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = open(&dir, 10);

        store.store("key question", "answer", vec![]).unwrap();
        clock.advance(ChronoDuration::seconds(86_401));

        assert!(store.lookup("key question").is_none());
        assert!(!store.contains("key question"));
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_corrupt_entry_is_discarded() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open(&dir, 10);

        let path = store.entry_path(&fingerprint("broken"));
        fs::write(&path, "{ not json").unwrap();

        assert!(store.lookup("broken").is_none());
        assert!(!path.exists());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_incomplete_entry_is_discarded() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open(&dir, 10);

        let key = fingerprint("partial");
        let path = store.entry_path(&key);
        fs::write(
            &path,
            format!(r#"{{"question": "partial", "timestamp": 1.0, "cache_key": "{}"}}"#, key),
        )
        .unwrap();

        assert!(store.lookup("partial").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_mismatched_key_is_discarded() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open(&dir, 10);

        store.store("first", "one", vec![]).unwrap();
        let first = store.entry_path(&fingerprint("first"));
        let second = store.entry_path(&fingerprint("second"));
        fs::copy(&first, &second).unwrap();

        assert!(store.lookup("second").is_none());
        assert!(!second.exists());
        assert!(store.lookup("first").is_some());
    }

    #[test]
    fn test_retention_evicts_oldest_written() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = open(&dir, 3);

        for q in ["q1", "q2", "q3", "q4"] {
            store.store(q, "a", vec![]).unwrap();
            clock.advance(ChronoDuration::seconds(1));
        }

        assert_eq!(store.len(), 3);
        assert!(!store.contains("q1"));
        assert!(store.contains("q2"));
        assert!(store.contains("q4"));
    }

    #[test]
    fn test_restore_refreshes_recency() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = open(&dir, 2);

        store.store("q1", "a", vec![]).unwrap();
        clock.advance(ChronoDuration::seconds(1));
        store.store("q2", "a", vec![]).unwrap();
        clock.advance(ChronoDuration::seconds(1));
        // Re-storing q1 makes q2 the oldest write
        store.store("q1", "b", vec![]).unwrap();
        clock.advance(ChronoDuration::seconds(1));
        store.store("q3", "a", vec![]).unwrap();

        assert!(store.contains("q1"));
        assert!(!store.contains("q2"));
        assert!(store.contains("q3"));
    }

    #[test]
    fn test_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open(&dir, 1);

        fs::write(dir.path().join("README.txt"), "not an entry").unwrap();
        store.store("q1", "a", vec![]).unwrap();

        assert_eq!(store.len(), 1);
        assert!(dir.path().join("README.txt").exists());
    }

    #[test]
    fn test_clear_all() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open(&dir, 10);

        store.store("q1", "a", vec![]).unwrap();
        store.store("q2", "a", vec![]).unwrap();
        store.lookup("q1");
        store.lookup("q3");

        assert_eq!(store.clear_all().unwrap(), 2);

        let stats = store.stats();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_all_removes_leftover_writes() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open(&dir, 10);

        store.store("q1", "a", vec![]).unwrap();
        let leftover = dir.path().join("abc.json.tmp");
        fs::write(&leftover, "{ half written").unwrap();
        fs::write(dir.path().join("notes.tmp"), "not ours").unwrap();

        assert_eq!(store.clear_all().unwrap(), 1);
        assert!(!leftover.exists());
        assert!(dir.path().join("notes.tmp").exists());
    }

    #[test]
    fn test_failed_store_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open(&dir, 10);

        // A directory in the entry's place makes the final rename fail
        let path = store.entry_path(&fingerprint("blocked"));
        fs::create_dir(&path).unwrap();

        let err = store.store("blocked", "a", vec![]).unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }));
        assert!(!path.with_extension(TMP_EXTENSION).exists());
        assert!(path.is_dir());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_size_bytes() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open(&dir, 10);
        assert_eq!(store.size_bytes(), 0);

        store.store("q1", "an answer", vec![]).unwrap();
        let size = store.size_bytes();
        assert!(size > 0);
        assert_eq!(store.stats().size_bytes, size);
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short"), "short");
        let long = "あ".repeat(60);
        let short = preview(&long);
        assert_eq!(short.chars().count(), 53);
        assert!(short.ends_with("..."));
    }
}
