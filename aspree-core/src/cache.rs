//! Process-wide TTL cache with hit-rate accounting.
//!
//! Values are JSON, keyed by strings that embed the merchant id whenever the
//! cached value is merchant-specific (catalog pages, search results,
//! analytics aggregates) so one tenant can never be served another's cached
//! rows. Eviction is lazy on read plus a full sweep every
//! [`SWEEP_EVERY_INSERTIONS`] insertions.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

use aspree_api::types::ids::MerchantId;
use serde_json::Value;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
/// Shorter lifetime for rendered artifacts.
pub const ARTIFACT_TTL: Duration = Duration::from_secs(60);
/// Sweep cadence, counted in insertions.
const SWEEP_EVERY_INSERTIONS: u64 = 64;

struct Entry {
    value: Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

pub struct Cache {
    entries: Mutex<HashMap<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
}

impl Cache {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
        }
    }

    /// A key for a merchant-specific cached value.
    pub fn merchant_key(merchant_id: &MerchantId, what: &str) -> String {
        format!("{merchant_id}:{what}")
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_expired) => {
                entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.into(),
            Entry {
                value,
                inserted_at: now,
                ttl,
            },
        );

        let n = self.insertions.fetch_add(1, Ordering::Relaxed) + 1;
        if n % SWEEP_EVERY_INSERTIONS == 0 {
            entries.retain(|_k, entry| !entry.is_expired(now));
        }
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Drop every entry under a key prefix. Writes that change a merchant's
    /// data call this with the merchant's key prefix.
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.entries
            .lock()
            .unwrap()
            .retain(|key, _entry| !key.starts_with(prefix));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn hit_and_miss_accounting() {
        let cache = Cache::new();
        assert_eq!(cache.get("nope"), None);
        cache.insert("k", json!({"v": 1}), DEFAULT_TTL);
        assert_eq!(cache.get("k"), Some(json!({"v": 1})));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert!((cache.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let cache = Cache::new();
        cache.insert("k", json!(1), Duration::ZERO);
        assert_eq!(cache.get("k"), None);
        // The expired entry was evicted lazily on read.
        assert!(cache.is_empty());
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let cache = Cache::new();
        cache.insert("dead", json!(1), Duration::ZERO);
        // Insertions up to the sweep threshold trigger a full sweep.
        for i in 0..SWEEP_EVERY_INSERTIONS {
            cache.insert(format!("live-{i}"), json!(i), DEFAULT_TTL);
        }
        let entries = cache.entries.lock().unwrap();
        assert!(!entries.contains_key("dead"));
    }

    #[test]
    fn prefix_invalidation_is_tenant_local() {
        let cache = Cache::new();
        let mid_a = MerchantId::generate();
        let mid_b = MerchantId::generate();
        cache.insert(
            Cache::merchant_key(&mid_a, "catalog"),
            json!(["a"]),
            DEFAULT_TTL,
        );
        cache.insert(
            Cache::merchant_key(&mid_b, "catalog"),
            json!(["b"]),
            DEFAULT_TTL,
        );

        cache.invalidate_prefix(&format!("{mid_a}:"));
        assert_eq!(
            cache.get(&Cache::merchant_key(&mid_a, "catalog")),
            None
        );
        assert_eq!(
            cache.get(&Cache::merchant_key(&mid_b, "catalog")),
            Some(json!(["b"]))
        );
    }
}
