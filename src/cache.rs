//! # Article cache
//! TTL-bounded store of classified articles keyed by content fingerprint.
//!
//! Expiry is enforced lazily on every read: an entry past `expires_at` is
//! never returned, whether or not a sweep has physically removed it yet.
//! Sweeps run explicitly (`sweep`) and every `sweep_every` writes.
//!
//! Writers for the same id race safely: the entry with the latest
//! `fetched_at` wins, and stores only ever publish fully-built entries.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};

use crate::article::Article;

/// Default TTL: 2 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(2 * 3600);
/// Writes between on-write sweeps.
pub const DEFAULT_SWEEP_EVERY: u64 = 64;

/// A cached article plus its absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub article: Article,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

/// Key-value backend with whole-entry publish semantics.
pub trait CacheStore: Send + Sync {
    fn load(&self, id: &str) -> Option<CacheEntry>;
    fn store(&self, entry: CacheEntry) -> io::Result<()>;
    fn remove(&self, id: &str) -> io::Result<()>;
    fn entries(&self) -> Vec<CacheEntry>;
}

/// In-process map behind a `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, id: &str) -> Option<CacheEntry> {
        let guard = self.inner.read().unwrap_or_else(|p| p.into_inner());
        guard.get(id).cloned()
    }

    fn store(&self, entry: CacheEntry) -> io::Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
        guard.insert(entry.article.id.clone(), entry);
        Ok(())
    }

    fn remove(&self, id: &str) -> io::Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
        guard.remove(id);
        Ok(())
    }

    fn entries(&self) -> Vec<CacheEntry> {
        let guard = self.inner.read().unwrap_or_else(|p| p.into_inner());
        guard.values().cloned().collect()
    }
}

/// One JSON file per id. Files are written to `*.tmp` and renamed into place,
/// so a reader sees either the previous entry or the new one.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

fn read_entry(path: &Path) -> Option<CacheEntry> {
    let s = fs::read_to_string(path).ok()?;
    serde_json::from_str(&s).ok()
}

impl CacheStore for FileStore {
    fn load(&self, id: &str) -> Option<CacheEntry> {
        read_entry(&self.path_for(id))
    }

    fn store(&self, entry: CacheEntry) -> io::Result<()> {
        let path = self.path_for(&entry.article.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec(&entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut f = fs::File::create(&tmp)?;
        f.write_all(&json)?;
        f.sync_all()?;
        fs::rename(tmp, path)
    }

    fn remove(&self, id: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(id)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn entries(&self) -> Vec<CacheEntry> {
        let Ok(dir) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        dir.flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
            .filter_map(|p| read_entry(&p))
            .collect()
    }
}

/// Outcome of a `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Replaced,
    /// A live entry with a newer `fetched_at` was kept.
    KeptExisting,
}

/// TTL semantics on top of any `CacheStore`.
pub struct ArticleCache {
    store: Box<dyn CacheStore>,
    ttl: Duration,
    sweep_every: u64,
    writes: AtomicU64,
    // Serializes read-compare-write in `put`; readers never take it.
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for ArticleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArticleCache")
            .field("ttl", &self.ttl)
            .field("sweep_every", &self.sweep_every)
            .finish_non_exhaustive()
    }
}

impl ArticleCache {
    pub fn new(store: impl CacheStore + 'static, ttl: Duration) -> Self {
        Self {
            store: Box::new(store),
            ttl,
            sweep_every: DEFAULT_SWEEP_EVERY,
            writes: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// In-memory cache with the given TTL.
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(MemoryStore::new(), ttl)
    }

    pub fn with_sweep_every(mut self, n: u64) -> Self {
        self.sweep_every = n.max(1);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store with the cache's default TTL.
    pub fn put(&self, article: Article, now: DateTime<Utc>) -> io::Result<PutOutcome> {
        self.put_with_ttl(article, self.ttl, now)
    }

    /// Store or overwrite by id. Among live entries the latest `fetched_at` wins.
    pub fn put_with_ttl(
        &self,
        article: Article,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> io::Result<PutOutcome> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let outcome = {
            let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
            let outcome = match self.store.load(&article.id) {
                Some(existing) if existing.is_live(now) => {
                    if existing.article.fetched_at > article.fetched_at {
                        PutOutcome::KeptExisting
                    } else {
                        PutOutcome::Replaced
                    }
                }
                _ => PutOutcome::Inserted,
            };
            if outcome != PutOutcome::KeptExisting {
                self.store.store(CacheEntry {
                    article,
                    expires_at,
                })?;
            }
            outcome
        };

        let n = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.sweep_every == 0 {
            self.sweep(now);
        }
        Ok(outcome)
    }

    /// Live entry for `id`, or a miss.
    pub fn get(&self, id: &str, now: DateTime<Utc>) -> Option<Article> {
        self.store
            .load(id)
            .filter(|e| e.is_live(now))
            .map(|e| e.article)
    }

    /// All live entries published at or after `since`. Order is unspecified.
    pub fn get_all(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> Vec<Article> {
        self.store
            .entries()
            .into_iter()
            .filter(|e| e.is_live(now) && e.article.published_at >= since)
            .map(|e| e.article)
            .collect()
    }

    /// Physically remove expired entries. Returns how many were dropped.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut removed = 0usize;
        let mut live = 0usize;
        for e in self.store.entries() {
            if e.is_live(now) {
                live += 1;
                continue;
            }
            match self.store.remove(&e.article.id) {
                Ok(()) => removed += 1,
                Err(err) => {
                    tracing::warn!(target: "cache", error = %err, id = %e.article.id, "sweep remove failed")
                }
            }
        }
        counter!("cache_swept_total").increment(removed as u64);
        gauge!("cache_entries").set(live as f64);
        if removed > 0 {
            tracing::debug!(target: "cache", removed, live, "cache sweep");
        }
        removed
    }

    /// Number of entries a reader could currently observe.
    pub fn len_live(&self, now: DateTime<Utc>) -> usize {
        self.store
            .entries()
            .iter()
            .filter(|e| e.is_live(now))
            .count()
    }

    /// Number of entries physically held, expired or not.
    pub fn len_stored(&self) -> usize {
        self.store.entries().len()
    }
}
