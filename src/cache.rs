//! Keyed cache for computed aggregations.
//!
//! Keys follow `"<kind>:<args…>"` (for example `qty:apple:7`). An entry is
//! only served while it was computed against the live day; the bound is
//! enforced with least-recently-used eviction on insert.

use std::collections::HashMap;
use std::sync::Mutex;

/// A cached aggregation result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AggregateValue {
    /// Integer-valued aggregations (quantity, day counts, run lengths).
    Int(i64),
    /// Real-valued aggregations (revenue, prices).
    Float(f64),
}

/// A value plus the day it was computed on.
#[derive(Clone, Copy, Debug)]
pub struct CachedAggregation {
    value: AggregateValue,
    computed_at_day_id: i32,
}

impl CachedAggregation {
    /// Wraps a value computed against `day_id`.
    pub fn new(value: AggregateValue, computed_at_day_id: i32) -> Self {
        CachedAggregation {
            value,
            computed_at_day_id,
        }
    }

    /// Valid only while the day it was computed on is still current.
    pub fn is_valid(&self, current_day_id: i32) -> bool {
        self.computed_at_day_id == current_day_id
    }

    /// The cached value.
    pub fn value(&self) -> AggregateValue {
        self.value
    }
}

struct Slot {
    cached: CachedAggregation,
    last_used: u64,
}

struct CacheInner {
    entries: HashMap<String, Slot>,
    tick: u64,
}

/// Bounded, internally synchronized aggregation cache.
pub struct ProductCache {
    inner: Mutex<CacheInner>,
    max_entries: usize,
}

impl ProductCache {
    /// A cache holding at most `max_entries` results.
    pub fn new(max_entries: usize) -> Self {
        ProductCache {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                tick: 0,
            }),
            max_entries,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns the cached value for `key` iff it is still valid against the
    /// current day. A hit refreshes recency.
    pub fn get(&self, key: &str, current_day_id: i32) -> Option<AggregateValue> {
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;
        let slot = inner.entries.get_mut(key)?;
        if !slot.cached.is_valid(current_day_id) {
            return None;
        }
        slot.last_used = tick;
        Some(slot.cached.value())
    }

    /// Inserts or overwrites `key`, evicting the least recently used entry
    /// when the cache is at capacity.
    pub fn put(&self, key: &str, cached: CachedAggregation) {
        if self.max_entries == 0 {
            return;
        }
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_entries {
            if let Some(victim) = inner
                .entries
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(k, _)| k.clone())
            {
                log::trace!("Evicting cache entry '{}'", victim);
                inner.entries.remove(&victim);
            }
        }

        inner.entries.insert(
            key.to_string(),
            Slot {
                cached,
                last_used: tick,
            },
        );
    }

    /// Drops every entry that mentions `product` in one of its key argument
    /// segments. Called after an event for that product arrives.
    pub fn invalidate_product(&self, product: &str) {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|key, _| !key.split(':').skip(1).any(|segment| segment == product));
        let dropped = before - inner.entries.len();
        if dropped > 0 {
            log::debug!("Invalidated {} cache entries for '{}'", dropped, product);
        }
    }

    /// Drops everything. Called on day rotation, when every window shifts.
    pub fn invalidate_all(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured entry bound.
    pub fn capacity(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_entry(v: i64, day: i32) -> CachedAggregation {
        CachedAggregation::new(AggregateValue::Int(v), day)
    }

    #[test]
    fn test_hit_only_while_day_matches() {
        let cache = ProductCache::new(8);
        cache.put("qty:apple:2", int_entry(6, 0));

        assert_eq!(
            cache.get("qty:apple:2", 0),
            Some(AggregateValue::Int(6))
        );
        // Same key, later day: stale.
        assert_eq!(cache.get("qty:apple:2", 1), None);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = ProductCache::new(8);
        cache.put("qty:apple:2", int_entry(6, 0));
        cache.put("qty:apple:2", int_entry(9, 1));
        assert_eq!(cache.get("qty:apple:2", 1), Some(AggregateValue::Int(9)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_eviction_on_insert() {
        let cache = ProductCache::new(2);
        cache.put("qty:a:1", int_entry(1, 0));
        cache.put("qty:b:1", int_entry(2, 0));

        // Touch a so b becomes the LRU victim.
        cache.get("qty:a:1", 0);
        cache.put("qty:c:1", int_entry(3, 0));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("qty:a:1", 0).is_some());
        assert!(cache.get("qty:b:1", 0).is_none());
        assert!(cache.get("qty:c:1", 0).is_some());
    }

    #[test]
    fn test_invalidate_product_matches_argument_segments() {
        let cache = ProductCache::new(8);
        cache.put("qty:apple:2", int_entry(1, 0));
        cache.put("rev:apple:5", int_entry(2, 0));
        cache.put("qty:pear:2", int_entry(3, 0));
        cache.put("common:apple:pear:3", int_entry(4, 0));

        cache.invalidate_product("apple");

        assert!(cache.get("qty:apple:2", 0).is_none());
        assert!(cache.get("rev:apple:5", 0).is_none());
        assert!(cache.get("common:apple:pear:3", 0).is_none());
        assert!(cache.get("qty:pear:2", 0).is_some());
    }

    #[test]
    fn test_invalidate_all() {
        let cache = ProductCache::new(8);
        cache.put("qty:a:1", int_entry(1, 0));
        cache.put("max:b:2", int_entry(2, 0));
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_caches_nothing() {
        let cache = ProductCache::new(0);
        cache.put("qty:a:1", int_entry(1, 0));
        assert!(cache.is_empty());
    }
}
