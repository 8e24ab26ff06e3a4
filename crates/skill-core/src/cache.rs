//! Time-bounded memoization of scan results.
//!
//! Entries expire lazily: a stale entry is evicted by the read that finds it,
//! never by a background sweep. The cache is unbounded; `len()` and
//! `purge_expired()` let long-lived callers keep growth in check.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::types::ScanResult;

/// Default entry lifetime (30 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Time source for expiry checks.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.start + offset
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: ScanResult,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct ScanCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl Default for ScanCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ScanCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            default_ttl,
        }
    }

    /// Composite key; distinct identities get distinct partitions.
    pub fn key(normalized_repo: &str, subpath: Option<&str>, identity_id: Option<&str>) -> String {
        format!(
            "{}::{}::{}",
            normalized_repo,
            subpath.unwrap_or(""),
            identity_id.unwrap_or("")
        )
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the stored value, evicting it if its TTL has elapsed.
    pub fn get(&self, key: &str) -> Option<ScanResult> {
        let now = self.clock.now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: ScanResult, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        self.entries()
            .insert(key.into(), CacheEntry { value, expires_at });
    }

    /// `set` with the default TTL.
    pub fn insert(&self, key: impl Into<String>, value: ScanResult) {
        self.set(key, value, self.default_ttl);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(repo: &str) -> ScanResult {
        ScanResult {
            normalized_repo: repo.to_string(),
            effective_subpath: None,
            items: Vec::new(),
        }
    }

    fn cache_with_clock() -> (ScanCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (ScanCache::with_clock(DEFAULT_TTL, clock.clone()), clock)
    }

    #[test]
    fn key_is_deterministic_and_partitions_identities() {
        let a = ScanCache::key("o/r", Some("skills"), None);
        assert_eq!(a, "o/r::skills::");
        assert_eq!(a, ScanCache::key("o/r", Some("skills"), None));
        assert_ne!(a, ScanCache::key("o/r", Some("skills"), Some("work")));
        assert_ne!(a, ScanCache::key("o/r", None, None));
    }

    #[test]
    fn get_returns_fresh_entry() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", result("o/r"), Duration::from_millis(50));
        clock.advance(Duration::from_millis(40));
        assert_eq!(cache.get("k").map(|r| r.normalized_repo), Some("o/r".to_string()));
    }

    #[test]
    fn stale_entry_is_evicted_on_read() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", result("o/r"), Duration::from_millis(50));
        clock.advance(Duration::from_millis(60));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn insert_uses_default_ttl() {
        let (cache, clock) = cache_with_clock();
        cache.insert("k", result("o/r"));
        clock.advance(DEFAULT_TTL - Duration::from_secs(1));
        assert!(cache.get("k").is_some());
        clock.advance(Duration::from_secs(1));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = ScanCache::default();
        cache.insert("a", result("o/a"));
        cache.insert("b", result("o/b"));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn purge_expired_keeps_fresh_entries() {
        let (cache, clock) = cache_with_clock();
        cache.set("short", result("o/s"), Duration::from_millis(10));
        cache.set("long", result("o/l"), Duration::from_secs(10));
        clock.advance(Duration::from_millis(20));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("long").is_some());
    }

    #[test]
    fn real_clock_expires_after_ttl() {
        let cache = ScanCache::default();
        cache.set("k", result("o/r"), Duration::from_millis(50));
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }
}
