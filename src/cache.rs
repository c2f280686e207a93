//! TTL + popularity cache shared by search and detail lookups.
//!
//! Entries live under two key namespaces (`search_*` and `details_*`) inside
//! one store. Expiry is lazy: an entry is deleted on the read that discovers
//! it is stale, never by a background sweep. When the entry ceiling is hit,
//! the least-valuable fifth is evicted, ranked by ascending
//! `(hit_count, timestamp)` — least-accessed first, oldest among equals
//! second. Lookups follow a long-tail popularity distribution, so pure
//! recency eviction would keep dropping popular-but-quiet entries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LactError;

/// Upstream content changes rarely relative to query volume; staleness is
/// traded for request-volume reduction.
pub(crate) const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub(crate) const MAX_ENTRIES: usize = 256;
const EVICTION_DIVISOR: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CacheEntry {
    pub(crate) data: serde_json::Value,
    pub(crate) timestamp: u64,
    pub(crate) expires_at: u64,
    pub(crate) hit_count: u64,
}

/// Abstract key→entry store; the manager owns all policy (TTL, eviction,
/// hit counting), stores only hold bytes.
///
/// Cache operations never suspend, so the trait is synchronous.
pub(crate) trait CacheStore: Send + Sync {
    fn load(&self, key: &str) -> Option<CacheEntry>;
    fn store(&self, key: &str, entry: CacheEntry);
    fn remove(&self, key: &str);
    fn clear(&self);
    fn keys(&self) -> Vec<String>;
    fn len(&self) -> usize;
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &str) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    fn store(&self, key: &str, entry: CacheEntry) {
        self.lock().insert(key.to_string(), entry);
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// JSON-file-backed store so repeat CLI invocations reuse earlier lookups.
///
/// The whole map is rewritten on every mutation via a temp-file rename;
/// concurrent writers are last-writer-wins, which is safe because entries
/// are always reconstructible from upstream.
pub(crate) struct DiskStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl DiskStore {
    pub(crate) fn open(path: impl Into<PathBuf>) -> Result<Self, LactError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, CacheEntry>>(&raw) {
                Ok(map) => map,
                Err(err) => {
                    warn!(%err, path = %path.display(), "cache file unreadable; starting empty");
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub(crate) fn default_path() -> PathBuf {
        match dirs::cache_dir() {
            Some(dir) => dir.join("lactamed").join("cache.json"),
            None => std::env::temp_dir().join("lactamed").join("cache.json"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, entries: &HashMap<String, CacheEntry>) {
        if let Err(err) = self.try_persist(entries) {
            warn!(%err, path = %self.path.display(), "failed to persist cache file");
        }
    }

    fn try_persist(&self, entries: &HashMap<String, CacheEntry>) -> Result<(), LactError> {
        let Some(dir) = self.path.parent() else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;

        let tmp = self.path.with_extension(format!("tmp.{}", std::process::id()));
        std::fs::write(&tmp, serde_json::to_vec(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CacheStore for DiskStore {
    fn load(&self, key: &str) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    fn store(&self, key: &str, entry: CacheEntry) {
        let mut entries = self.lock();
        entries.insert(key.to_string(), entry);
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }

    fn clear(&self) {
        let mut entries = self.lock();
        entries.clear();
        self.persist(&entries);
    }

    fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

fn system_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub(crate) struct CacheManager {
    store: Arc<dyn CacheStore>,
    capacity: usize,
    default_ttl: Duration,
    now_ms: Box<dyn Fn() -> u64 + Send + Sync>,
}

impl CacheManager {
    pub(crate) fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_config(store, MAX_ENTRIES, DEFAULT_TTL, system_now_ms)
    }

    /// Clock injection keeps expiry and eviction ordering testable without
    /// real sleeps.
    pub(crate) fn with_config(
        store: Arc<dyn CacheStore>,
        capacity: usize,
        default_ttl: Duration,
        now_ms: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            store,
            capacity,
            default_ttl,
            now_ms: Box::new(now_ms),
        }
    }

    /// Wraps `data` in a fresh entry. Triggers the capacity check first, so
    /// the store never grows past its ceiling.
    pub(crate) fn set<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        ttl: Option<Duration>,
    ) -> Result<(), LactError> {
        if self.store.len() >= self.capacity {
            self.evict_least_valuable();
        }

        let now = (self.now_ms)();
        let ttl_ms = ttl.unwrap_or(self.default_ttl).as_millis() as u64;
        self.store.store(
            key,
            CacheEntry {
                data: serde_json::to_value(data)?,
                timestamp: now,
                expires_at: now.saturating_add(ttl_ms),
                hit_count: 0,
            },
        );
        Ok(())
    }

    /// Returns the cached value, counting the hit. Expired entries are
    /// deleted on this read and reported as a miss.
    pub(crate) fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut entry = self.store.load(key)?;
        if (self.now_ms)() > entry.expires_at {
            self.store.remove(key);
            return None;
        }

        entry.hit_count += 1;
        let data = entry.data.clone();
        self.store.store(key, entry);

        match serde_json::from_value(data) {
            Ok(value) => Some(value),
            Err(err) => {
                // A shape change in the stored payload is treated as a miss;
                // refetching rebuilds the entry.
                warn!(%err, key, "cached payload no longer deserializes; dropping entry");
                self.store.remove(key);
                None
            }
        }
    }

    pub(crate) fn delete(&self, key: &str) {
        self.store.remove(key);
    }

    pub(crate) fn clear_all(&self) {
        self.store.clear();
    }

    fn evict_least_valuable(&self) {
        let mut ranked: Vec<(String, u64, u64)> = self
            .store
            .keys()
            .into_iter()
            .filter_map(|key| {
                self.store
                    .load(&key)
                    .map(|entry| (key, entry.hit_count, entry.timestamp))
            })
            .collect();

        ranked.sort_by(|a, b| (a.1, a.2).cmp(&(b.1, b.2)));

        let victims = (ranked.len() / EVICTION_DIVISOR).max(1);
        for (key, _, _) in ranked.into_iter().take(victims) {
            self.store.remove(&key);
        }
    }
}
