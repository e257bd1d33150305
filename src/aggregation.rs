//! Lazy windowed aggregations with day-stamped caching.
//!
//! Every aggregation walks the last `days` completed days of the time
//! series and caches its result under a `"<kind>:<args…>"` key. Cached
//! values are day-stamped: a hit is only served while the day it was
//! computed on is still current, so day rotation invalidates everything
//! implicitly and `invalidate_on_new_day` clears the map explicitly.
//!
//! `None` means the window is invalid or there are fewer completed days
//! than requested ("insufficient data" at the wire layer).

use crate::cache::{AggregateValue, CachedAggregation, ProductCache};
use crate::protocol::Event;
use crate::time_series::TimeSeries;

use std::sync::Arc;

/// Aggregation engine over a shared time series.
pub struct AggregationService {
    series: Arc<TimeSeries>,
    cache: ProductCache,
}

impl AggregationService {
    /// Creates a service caching at most `cache_entries` results.
    pub fn new(series: Arc<TimeSeries>, cache_entries: usize) -> Self {
        AggregationService {
            series,
            cache: ProductCache::new(cache_entries),
        }
    }

    fn window_size(&self, days: i32) -> Option<usize> {
        if days < 1 || days as usize > self.series.max_days() {
            return None;
        }
        Some(days as usize)
    }

    fn cached_int(&self, key: &str, current_day_id: i32) -> Option<i64> {
        match self.cache.get(key, current_day_id) {
            Some(AggregateValue::Int(v)) => Some(v),
            _ => None,
        }
    }

    fn cached_float(&self, key: &str, current_day_id: i32) -> Option<f64> {
        match self.cache.get(key, current_day_id) {
            Some(AggregateValue::Float(v)) => Some(v),
            _ => None,
        }
    }

    /// Total quantity of `product` sold over the last `days` completed days.
    pub fn aggregate_quantity(&self, product: &str, days: i32) -> Option<i64> {
        let window = self.window_size(days)?;
        let key = format!("qty:{}:{}", product, days);
        let current_day_id = self.series.current_day_id();

        if let Some(v) = self.cached_int(&key, current_day_id) {
            return Some(v);
        }

        let all_days = self.series.window_events(window)?;
        let total: i64 = matching(&all_days, product)
            .map(|e| i64::from(e.quantity))
            .sum();

        self.cache.put(
            &key,
            CachedAggregation::new(AggregateValue::Int(total), current_day_id),
        );
        Some(total)
    }

    /// Total revenue (`quantity × price`) of `product` over the window.
    pub fn aggregate_revenue(&self, product: &str, days: i32) -> Option<f64> {
        let window = self.window_size(days)?;
        let key = format!("rev:{}:{}", product, days);
        let current_day_id = self.series.current_day_id();

        if let Some(v) = self.cached_float(&key, current_day_id) {
            return Some(v);
        }

        let all_days = self.series.window_events(window)?;
        let total: f64 = matching(&all_days, product).map(Event::total_value).sum();

        self.cache.put(
            &key,
            CachedAggregation::new(AggregateValue::Float(total), current_day_id),
        );
        Some(total)
    }

    /// Quantity-weighted average price of `product` over the window.
    /// 0.0 when the product has no matching events.
    pub fn aggregate_average_price(&self, product: &str, days: i32) -> Option<f64> {
        let window = self.window_size(days)?;
        let key = format!("avg:{}:{}", product, days);
        let current_day_id = self.series.current_day_id();

        if let Some(v) = self.cached_float(&key, current_day_id) {
            return Some(v);
        }

        let all_days = self.series.window_events(window)?;
        let mut total_revenue = 0.0;
        let mut total_quantity: i64 = 0;
        for event in matching(&all_days, product) {
            total_revenue += event.total_value();
            total_quantity += i64::from(event.quantity);
        }

        if total_quantity == 0 {
            return Some(0.0);
        }

        let avg = total_revenue / total_quantity as f64;
        self.cache.put(
            &key,
            CachedAggregation::new(AggregateValue::Float(avg), current_day_id),
        );
        Some(avg)
    }

    /// Maximum unit price of `product` over the window. 0.0 when the
    /// product never sold in it.
    pub fn aggregate_max_price(&self, product: &str, days: i32) -> Option<f64> {
        let window = self.window_size(days)?;
        let key = format!("max:{}:{}", product, days);
        let current_day_id = self.series.current_day_id();

        if let Some(v) = self.cached_float(&key, current_day_id) {
            return Some(v);
        }

        let all_days = self.series.window_events(window)?;
        let max = matching(&all_days, product).map(|e| e.price).reduce(f64::max);
        let max = match max {
            Some(m) => m,
            None => return Some(0.0),
        };

        self.cache.put(
            &key,
            CachedAggregation::new(AggregateValue::Float(max), current_day_id),
        );
        Some(max)
    }

    /// Number of days in the window where both products sold at least once.
    pub fn count_common_days(&self, product1: &str, product2: &str, days: i32) -> Option<i64> {
        let window = self.window_size(days)?;
        let key = format!("common:{}:{}:{}", product1, product2, days);
        let current_day_id = self.series.current_day_id();

        if let Some(v) = self.cached_int(&key, current_day_id) {
            return Some(v);
        }

        let all_days = self.series.window_events(window)?;
        let mut common: i64 = 0;
        for day in &all_days {
            let has1 = day.iter().any(|e| e.product == product1);
            let has2 = day.iter().any(|e| e.product == product2);
            if has1 && has2 {
                common += 1;
            }
        }

        self.cache.put(
            &key,
            CachedAggregation::new(AggregateValue::Int(common), current_day_id),
        );
        Some(common)
    }

    /// Longest run of consecutive events of `product` within a single day,
    /// across the window.
    pub fn find_max_consecutive(&self, product: &str, days: i32) -> Option<i64> {
        let window = self.window_size(days)?;
        let key = format!("maxseq:{}:{}", product, days);
        let current_day_id = self.series.current_day_id();

        if let Some(v) = self.cached_int(&key, current_day_id) {
            return Some(v);
        }

        let all_days = self.series.window_events(window)?;
        let mut best: i64 = 0;
        for day in &all_days {
            let mut run: i64 = 0;
            for event in day {
                if event.product == product {
                    run += 1;
                    best = best.max(run);
                } else {
                    run = 0;
                }
            }
        }

        self.cache.put(
            &key,
            CachedAggregation::new(AggregateValue::Int(best), current_day_id),
        );
        Some(best)
    }

    /// Drops cached results that mention `product`. Called after every
    /// append for that product.
    pub fn invalidate_on_new_event(&self, product: &str) {
        self.cache.invalidate_product(product);
    }

    /// Drops everything. Called after day rotation.
    pub fn invalidate_on_new_day(&self) {
        self.cache.invalidate_all();
    }

    /// Live cache entries, for the admin `stats` command.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Configured cache bound.
    pub fn cache_capacity(&self) -> usize {
        self.cache.capacity()
    }
}

fn matching<'a>(days: &'a [Vec<Event>], product: &'a str) -> impl Iterator<Item = &'a Event> {
    days.iter()
        .flatten()
        .filter(move |e| e.product == product)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Persistence;
    use tempfile::TempDir;

    fn service(max_days: usize, memory_days: usize) -> (TempDir, AggregationService) {
        let dir = TempDir::new().unwrap();
        let series = Arc::new(
            TimeSeries::new(max_days, memory_days, Persistence::new(dir.path())).unwrap(),
        );
        let service = AggregationService::new(series, memory_days);
        (dir, service)
    }

    /// Two completed days: day 0 = (apple,2,1.00),(apple,3,2.00),
    /// day 1 = (apple,1,5.00).
    fn seed_two_days(svc: &AggregationService) {
        svc.series.add_event("apple", 2, 1.0).unwrap();
        svc.series.add_event("apple", 3, 2.0).unwrap();
        svc.series.new_day().unwrap();
        svc.invalidate_on_new_day();
        svc.series.add_event("apple", 1, 5.0).unwrap();
        svc.series.new_day().unwrap();
        svc.invalidate_on_new_day();
    }

    #[test]
    fn test_two_day_window_aggregations() {
        let (_dir, svc) = service(3, 3);
        seed_two_days(&svc);

        assert_eq!(svc.aggregate_quantity("apple", 2), Some(6));
        assert!((svc.aggregate_revenue("apple", 2).unwrap() - 13.0).abs() < 1e-9);
        assert!((svc.aggregate_average_price("apple", 2).unwrap() - 13.0 / 6.0).abs() < 1e-9);
        assert!((svc.aggregate_max_price("apple", 2).unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_insufficient_data() {
        let (_dir, svc) = service(5, 5);
        svc.series.add_event("apple", 1, 1.0).unwrap();
        svc.series.new_day().unwrap();

        // Only one completed day exists.
        assert_eq!(svc.aggregate_quantity("apple", 5), None);
        assert_eq!(svc.aggregate_revenue("apple", 5), None);
        // And a window wider than D is invalid outright.
        assert_eq!(svc.aggregate_quantity("apple", 6), None);
        assert_eq!(svc.aggregate_quantity("apple", 0), None);
    }

    #[test]
    fn test_unknown_product_defaults() {
        let (_dir, svc) = service(3, 3);
        seed_two_days(&svc);

        assert_eq!(svc.aggregate_quantity("melon", 2), Some(0));
        assert_eq!(svc.aggregate_average_price("melon", 2), Some(0.0));
        assert_eq!(svc.aggregate_max_price("melon", 2), Some(0.0));
    }

    #[test]
    fn test_cache_survives_repeat_and_expires_on_rotation() {
        let (_dir, svc) = service(5, 5);
        seed_two_days(&svc);

        assert_eq!(svc.aggregate_quantity("apple", 1), Some(1));
        assert_eq!(svc.cache_len(), 1);
        // Second call is a hit, not a second entry.
        assert_eq!(svc.aggregate_quantity("apple", 1), Some(1));
        assert_eq!(svc.cache_len(), 1);

        // Rotate: the most recent completed day becomes the empty one.
        svc.series.new_day().unwrap();
        svc.invalidate_on_new_day();
        assert_eq!(svc.aggregate_quantity("apple", 1), Some(0));
    }

    #[test]
    fn test_new_event_invalidates_product_entries() {
        let (_dir, svc) = service(5, 5);
        seed_two_days(&svc);

        svc.aggregate_quantity("apple", 2);
        svc.aggregate_quantity("pear", 2);
        assert_eq!(svc.cache_len(), 2);

        svc.series.add_event("apple", 1, 1.0).unwrap();
        svc.invalidate_on_new_event("apple");
        assert_eq!(svc.cache_len(), 1);
    }

    #[test]
    fn test_count_common_days() {
        let (_dir, svc) = service(5, 5);
        // Day 0: both. Day 1: only a. Day 2: both.
        for day in [vec!["a", "b"], vec!["a"], vec!["b", "a"]] {
            for product in day {
                svc.series.add_event(product, 1, 1.0).unwrap();
            }
            svc.series.new_day().unwrap();
            svc.invalidate_on_new_day();
        }

        assert_eq!(svc.count_common_days("a", "b", 3), Some(2));
        assert_eq!(svc.count_common_days("a", "b", 1), Some(1));
        assert_eq!(svc.count_common_days("a", "c", 3), Some(0));
    }

    #[test]
    fn test_find_max_consecutive() {
        let (_dir, svc) = service(5, 5);
        for product in ["a", "a", "b", "a", "a", "a"] {
            svc.series.add_event(product, 1, 1.0).unwrap();
        }
        svc.series.new_day().unwrap();
        svc.invalidate_on_new_day();
        // Runs do not cross day boundaries.
        svc.series.add_event("a", 1, 1.0).unwrap();
        svc.series.new_day().unwrap();
        svc.invalidate_on_new_day();

        assert_eq!(svc.find_max_consecutive("a", 2), Some(3));
        assert_eq!(svc.find_max_consecutive("b", 2), Some(1));
        assert_eq!(svc.find_max_consecutive("c", 2), Some(0));
    }
}
