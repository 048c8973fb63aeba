// Expiring cache used by the geocoding layer
// Entries live for a fixed window; time comes from an injected clock so expiry is testable

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    // Saturates at the latest representable instant
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        let next = chrono::Duration::from_std(by)
            .ok()
            .and_then(|by| now.checked_add_signed(by))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        *now = next;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

impl<C: Clock> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        self.as_ref().now()
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub expired_count: AtomicUsize,
    pub eviction_count: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStatsReport {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub expired_count: usize,
    pub eviction_count: usize,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub default_ttl_seconds: u64,
    pub max_items: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 300,
            max_items: 1024,
        }
    }
}

struct CacheEntry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (now - self.inserted_at).to_std() {
            Ok(elapsed) => elapsed >= self.ttl,
            // clock moved backwards
            Err(_) => false,
        }
    }
}

pub struct ExpiringCache<V, C = SystemClock> {
    entries: DashMap<String, CacheEntry<V>>,
    config: CacheConfig,
    clock: C,
    stats: CacheStats,
}

impl<V: Clone> ExpiringCache<V, SystemClock> {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<V: Clone, C: Clock> ExpiringCache<V, C> {
    pub fn with_clock(config: CacheConfig, clock: C) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            clock,
            stats: CacheStats::default(),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.config.default_ttl_seconds)
    }

    // Live value for `key`; an expired entry is dropped and counts as a miss
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let lookup = self
            .entries
            .get(key)
            .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));

        match lookup {
            Some(Some(value)) => {
                self.stats.hit_count.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache hit");
                Some(value)
            }
            Some(None) => {
                if self.entries.remove_if(key, |_, e| e.is_expired(now)).is_some() {
                    self.stats.expired_count.fetch_add(1, Ordering::Relaxed);
                }
                self.stats.miss_count.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache entry expired");
                None
            }
            None => {
                self.stats.miss_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    // Stores `value`; `ttl` of None uses the configured default. Returns false if rejected.
    pub fn put(&self, key: &str, value: V, ttl: Option<Duration>) -> bool {
        if self.config.max_items == 0 {
            return false;
        }

        if !self.entries.contains_key(key) && self.entries.len() >= self.config.max_items {
            self.purge_expired();
            if self.entries.len() >= self.config.max_items {
                self.evict_oldest();
            }
        }

        let entry = CacheEntry {
            value,
            inserted_at: self.clock.now(),
            ttl: ttl.unwrap_or_else(|| self.default_ttl()),
        };
        self.entries.insert(key.to_string(), entry);
        true
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        self.stats.expired_count.fetch_add(purged, Ordering::Relaxed);
        purged
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            if self.entries.remove(&key).is_some() {
                self.stats.eviction_count.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "evicted oldest cache entry");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            items_count: self.entries.len(),
            hit_count: self.stats.hit_count.load(Ordering::Relaxed),
            miss_count: self.stats.miss_count.load(Ordering::Relaxed),
            expired_count: self.stats.expired_count.load(Ordering::Relaxed),
            eviction_count: self.stats.eviction_count.load(Ordering::Relaxed),
        }
    }
}
