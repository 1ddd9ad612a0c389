//! In-memory search cache keyed by quantized location and cuisine type.
//!
//! Coordinates are rounded to 3 decimals (~100 m), so nearby requests for
//! the same cuisine share one entry. Entries expire after the TTL (1 hour by
//! default) and are never evicted proactively: a stale entry is ignored on
//! read and overwritten on the next miss.

use super::types::Candidate;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

pub const DEFAULT_TTL_SECS: i64 = 60 * 60;

/// Quantized (location, cuisine) lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    lat_milli: i64,
    lng_milli: i64,
    cuisine: String,
}

impl CacheKey {
    pub fn new(lat: f64, lng: f64, cuisine: &str) -> Self {
        Self {
            lat_milli: (lat * 1000.0).round() as i64,
            lng_milli: (lng * 1000.0).round() as i64,
            cuisine: cuisine.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    candidates: Vec<Candidate>,
    created_at: DateTime<Utc>,
}

/// The search cache. Readers share the lock; a put replaces the whole entry.
pub struct SearchCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECS))
    }
}

impl SearchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(50)),
            ttl,
        }
    }

    /// Look up a key. Returns None if missing or expired.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<Candidate>> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<Vec<Candidate>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key)?;

        if now - entry.created_at >= self.ttl {
            return None; // expired
        }
        Some(entry.candidates.clone())
    }

    /// Store candidates under a key, replacing any previous entry.
    pub fn put(&self, key: CacheKey, candidates: Vec<Candidate>) {
        self.put_at(key, candidates, Utc::now());
    }

    pub fn put_at(&self, key: CacheKey, candidates: Vec<Candidate>, now: DateTime<Utc>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key,
            CacheEntry {
                candidates,
                created_at: now,
            },
        );
    }

    /// Number of entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::places::types::Photo;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::thread;

    fn candidate(name: &str) -> Candidate {
        Candidate {
            name: name.into(),
            rating: 4.2,
            address: "台北市信義區".into(),
            place_id: format!("id-{name}"),
            price_level: Some(1),
            average_price: "約 NT$100-300".into(),
            distance: "120m".into(),
            distance_m: 120.0,
            cuisine_type: "中式料理".into(),
            photo: Photo::Unresolved(format!("ref-{name}")),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_cache_put_get() {
        let cache = SearchCache::default();
        let key = CacheKey::new(25.0330, 121.5654, "中式料理");
        cache.put_at(key.clone(), vec![candidate("a"), candidate("b")], t0());

        let hit = cache.get_at(&key, t0()).unwrap();
        assert_eq!(hit.len(), 2);
        assert_eq!(hit[0].name, "a");
        assert_eq!(hit[1].photo, Photo::Unresolved("ref-b".into()));
    }

    #[test]
    fn test_cache_miss() {
        let cache = SearchCache::default();
        assert!(cache.get(&CacheKey::new(0.0, 0.0, "")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_expiry() {
        let cache = SearchCache::default();
        let key = CacheKey::new(25.0330, 121.5654, "咖啡廳");
        cache.put_at(key.clone(), vec![candidate("a")], t0());

        assert!(cache.get_at(&key, t0() + Duration::minutes(59)).is_some());
        assert!(cache.get_at(&key, t0() + Duration::minutes(60)).is_none());
        assert!(cache.get_at(&key, t0() + Duration::minutes(61)).is_none());
        // stale entries stay until overwritten
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_overwrite_refreshes_timestamp() {
        let cache = SearchCache::default();
        let key = CacheKey::new(25.0330, 121.5654, "");
        cache.put_at(key.clone(), vec![candidate("old")], t0());

        let later = t0() + Duration::minutes(90);
        assert!(cache.get_at(&key, later).is_none());
        cache.put_at(key.clone(), vec![candidate("new")], later);

        let hit = cache.get_at(&key, later + Duration::minutes(30)).unwrap();
        assert_eq!(hit[0].name, "new");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_key_quantization() {
        let a = CacheKey::new(25.03301, 121.56541, "中式料理");
        let b = CacheKey::new(25.03299, 121.56539, "中式料理");
        assert_eq!(a, b);

        let cache = SearchCache::default();
        cache.put_at(a, vec![candidate("x")], t0());
        assert!(cache.get_at(&b, t0()).is_some());
    }

    #[test]
    fn test_key_distinguishes_cuisine_and_distance() {
        let base = CacheKey::new(25.0330, 121.5654, "中式料理");
        assert_ne!(base, CacheKey::new(25.0330, 121.5654, "日式料理"));
        assert_ne!(base, CacheKey::new(25.0340, 121.5654, "中式料理"));
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let cache = Arc::new(SearchCache::default());
        let key = CacheKey::new(25.0330, 121.5654, "火鍋");
        cache.put(key.clone(), vec![candidate("a"), candidate("b"), candidate("c")]);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        if i % 2 == 0 {
                            let n = if i % 4 == 0 { 3 } else { 5 };
                            cache.put(key.clone(), (0..n).map(|j| candidate(&j.to_string())).collect());
                        } else {
                            let hit = cache.get(&key).unwrap();
                            // whole entries only, never a partial list
                            assert!(hit.len() == 3 || hit.len() == 5);
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }
}
