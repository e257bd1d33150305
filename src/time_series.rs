//! Daily time series of sales events.
//!
//! One live day accepts appends; completed days live in a bounded in-memory
//! window (most recent first) backed by per-day files on disk. Day rotation
//! is driven by an administrative signal, not a wall clock.
//!
//! The whole series sits behind a single mutex with one condition variable.
//! `add_event` and `new_day` signal it; the blocking condition-queries
//! (simultaneous sales, N consecutive sales) loop on it with the classic
//! take-lock / test / wait / retest pattern. Every snapshot handed to a
//! caller is a copy; live event lists never escape the lock.

use crate::errors::TimeSeriesError;
use crate::persistence::Persistence;
use crate::protocol::{now_millis, Event};

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

/// One logical day of events.
#[derive(Debug)]
struct DayData {
    day_id: i32,
    events: Vec<Event>,
    start_time: i64,
    completed: bool,
}

impl DayData {
    fn new(day_id: i32) -> Self {
        DayData {
            day_id,
            events: Vec::new(),
            start_time: now_millis(),
            completed: false,
        }
    }

    fn restored(day_id: i32, events: Vec<Event>) -> Self {
        let start_time = events.first().map(|e| e.timestamp).unwrap_or(0);
        DayData {
            day_id,
            events,
            start_time,
            completed: true,
        }
    }
}

#[derive(Debug)]
struct SeriesState {
    current: DayData,
    /// Completed days, most recent at the front. Never longer than `S`.
    history: VecDeque<DayData>,
}

/// The time-series store: current day, memory window, disk tier, and the
/// condition variable behind the blocking queries.
#[derive(Debug)]
pub struct TimeSeries {
    max_days: usize,
    max_memory_days: usize,
    persistence: Persistence,
    state: Mutex<SeriesState>,
    new_event: Condvar,
}

impl TimeSeries {
    /// Creates an empty series starting at day 0.
    ///
    /// `max_days` is `D` (disk retention), `max_memory_days` is `S`
    /// (memory window); `1 <= S <= D` is required.
    pub fn new(
        max_days: usize,
        max_memory_days: usize,
        persistence: Persistence,
    ) -> Result<Self, TimeSeriesError> {
        Self::with_start_day(max_days, max_memory_days, persistence, 0, VecDeque::new())
    }

    /// Restores a series from disk: reads the state header and loads the
    /// last `S` completed days into memory, most recent first. Older days
    /// stay disk-only. Corrupt files abort the load.
    pub fn load(
        max_days: usize,
        max_memory_days: usize,
        persistence: Persistence,
    ) -> Result<Self, TimeSeriesError> {
        let current_day_id = persistence.load_state()?.unwrap_or(0);
        if current_day_id < 0 {
            return Err(TimeSeriesError::InvalidConfig(format!(
                "persisted day id {} is negative",
                current_day_id
            )));
        }

        let mut history = VecDeque::new();
        let first = (current_day_id - max_memory_days as i32).max(0);
        for day_id in (first..current_day_id).rev() {
            match persistence.load_day(day_id)? {
                Some(events) => history.push_back(DayData::restored(day_id, events)),
                None => {
                    // Keep the window contiguous even if a file vanished.
                    log::warn!("Day file {} missing during load", day_id);
                    history.push_back(DayData::restored(day_id, Vec::new()));
                }
            }
        }

        log::info!(
            "Time series restored: current day {}, {} days in memory",
            current_day_id,
            history.len()
        );
        Self::with_start_day(
            max_days,
            max_memory_days,
            persistence,
            current_day_id,
            history,
        )
    }

    fn with_start_day(
        max_days: usize,
        max_memory_days: usize,
        persistence: Persistence,
        current_day_id: i32,
        history: VecDeque<DayData>,
    ) -> Result<Self, TimeSeriesError> {
        if max_days < 1 {
            return Err(TimeSeriesError::InvalidConfig("max_days must be >= 1".into()));
        }
        if max_memory_days < 1 || max_memory_days > max_days {
            return Err(TimeSeriesError::InvalidConfig(
                "memory days must satisfy 1 <= S <= D".into(),
            ));
        }

        Ok(TimeSeries {
            max_days,
            max_memory_days,
            persistence,
            state: Mutex::new(SeriesState {
                current: DayData::new(current_day_id),
                history,
            }),
            new_event: Condvar::new(),
        })
    }

    fn write_state(&self) -> Result<MutexGuard<'_, SeriesState>, TimeSeriesError> {
        self.state.lock().map_err(|_| TimeSeriesError::LockPoisoned)
    }

    // Read-only accessors recover from poisoning: a panicked writer cannot
    // have left a snapshot copy half-made.
    fn read_state(&self) -> MutexGuard<'_, SeriesState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Appends an event stamped with the current time and wakes waiters.
    pub fn add_event(
        &self,
        product: &str,
        quantity: i32,
        price: f64,
    ) -> Result<(), TimeSeriesError> {
        self.add_event_record(Event::new(product, quantity, price))
    }

    /// Appends a pre-stamped event (recovery and replay paths).
    pub fn add_event_record(&self, event: Event) -> Result<(), TimeSeriesError> {
        let mut state = self.write_state()?;
        if state.current.completed {
            return Err(TimeSeriesError::DayCompleted(state.current.day_id));
        }
        state.current.events.push(event);
        self.new_event.notify_all();
        Ok(())
    }

    /// Rotates the current day into history and opens a fresh one.
    ///
    /// Under the lock: the day is marked completed and waiters are woken,
    /// the day is persisted and the state header updated, the day enters
    /// the memory window (evicting past `S`), the day file that fell out of
    /// the `D`-day disk window is deleted, and a new empty day is installed.
    /// Persistence failures are logged and rotation proceeds in memory;
    /// availability wins over single-write durability here.
    ///
    /// Returns the new current day id.
    pub fn new_day(&self) -> Result<i32, TimeSeriesError> {
        let mut state = self.write_state()?;

        state.current.completed = true;
        self.new_event.notify_all();

        let completed_id = state.current.day_id;
        if let Err(e) = self.persistence.save_day(completed_id, &state.current.events) {
            log::error!("Failed to persist day {}: {}", completed_id, e);
        }
        if let Err(e) = self.persistence.save_state(completed_id + 1) {
            log::error!("Failed to persist state header: {}", e);
        }

        let completed = std::mem::replace(&mut state.current, DayData::new(completed_id + 1));
        state.history.push_front(completed);
        while state.history.len() > self.max_memory_days {
            state.history.pop_back();
        }

        let expired = completed_id - self.max_days as i32;
        if expired >= 0 {
            if let Err(e) = self.persistence.delete_day(expired) {
                log::error!("Failed to delete expired day {}: {}", expired, e);
            }
        }

        log::info!(
            "Day {} completed ({} events); current day is now {}",
            completed_id,
            state.history.front().map(|d| d.events.len()).unwrap_or(0),
            completed_id + 1
        );
        Ok(completed_id + 1)
    }

    /// Snapshot of the current day's events, in append order.
    pub fn current_day_events(&self) -> Vec<Event> {
        self.read_state().current.events.clone()
    }

    /// Number of events in the current day.
    pub fn current_day_event_count(&self) -> usize {
        self.read_state().current.events.len()
    }

    /// Id of the live day.
    pub fn current_day_id(&self) -> i32 {
        self.read_state().current.day_id
    }

    /// Start of the live day, milliseconds since the epoch.
    pub fn current_day_start_time(&self) -> i64 {
        self.read_state().current.start_time
    }

    /// Completed days reachable through this store: at most `D`, and never
    /// more than have actually happened.
    pub fn historical_day_count(&self) -> usize {
        let state = self.read_state();
        (state.current.day_id as usize).min(self.max_days)
    }

    /// `D`, the disk retention bound.
    pub fn max_days(&self) -> usize {
        self.max_days
    }

    /// `S`, the memory window bound.
    pub fn max_memory_days(&self) -> usize {
        self.max_memory_days
    }

    /// Events of one completed day. `days_ago` 0 is the most recently
    /// completed day. Served from memory when the day is inside the window,
    /// from disk otherwise; out of range or missing reads as empty.
    pub fn historical_day_events(&self, days_ago: usize) -> Vec<Event> {
        let state = self.read_state();
        self.historical_events_locked(&state, days_ago)
    }

    fn historical_events_locked(&self, state: &SeriesState, days_ago: usize) -> Vec<Event> {
        let available = (state.current.day_id as usize).min(self.max_days);
        if days_ago >= available {
            return Vec::new();
        }

        if days_ago < state.history.len() {
            return state.history[days_ago].events.clone();
        }

        let target = state.current.day_id - 1 - days_ago as i32;
        match self.persistence.load_day(target) {
            Ok(Some(events)) => events,
            Ok(None) => {
                log::warn!("Day file {} not found", target);
                Vec::new()
            }
            Err(e) => {
                log::error!("Failed to load day {}: {}", target, e);
                Vec::new()
            }
        }
    }

    /// Event lists for the last `days` completed days (most recent first),
    /// or `None` when fewer than `days` completed days exist.
    pub fn window_events(&self, days: usize) -> Option<Vec<Vec<Event>>> {
        let state = self.read_state();
        let available = (state.current.day_id as usize).min(self.max_days);
        if days > available {
            return None;
        }
        Some(
            (0..days)
                .map(|ago| self.historical_events_locked(&state, ago))
                .collect(),
        )
    }

    /// Events of one day filtered by product membership, original order
    /// preserved. An empty `products` list means every product.
    /// `day_offset` 0 is the current day; `k` is the k-th most recently
    /// completed day; out of range reads as empty.
    pub fn filtered_events(&self, products: &[String], day_offset: i32) -> Vec<Event> {
        let state = self.read_state();
        let source = if day_offset <= 0 {
            state.current.events.clone()
        } else {
            self.historical_events_locked(&state, day_offset as usize - 1)
        };

        if products.is_empty() {
            return source;
        }
        source
            .into_iter()
            .filter(|event| products.iter().any(|p| *p == event.product))
            .collect()
    }

    /// Blocks until both products have sold at least once in the current
    /// day. Returns false when the day the call started on ends first.
    pub fn wait_for_simultaneous_sales(
        &self,
        product1: &str,
        product2: &str,
    ) -> Result<bool, TimeSeriesError> {
        let mut state = self.write_state()?;
        // Pin the day this waiter belongs to: rotation swaps the current
        // day under us, and that must read as "day ended", not as a fresh
        // wait on the next day.
        let day_id = state.current.day_id;

        loop {
            if state.current.completed || state.current.day_id != day_id {
                return Ok(false);
            }

            let mut has1 = false;
            let mut has2 = false;
            for event in &state.current.events {
                if event.product == product1 {
                    has1 = true;
                }
                if event.product == product2 {
                    has2 = true;
                }
                if has1 && has2 {
                    return Ok(true);
                }
            }

            state = self
                .new_event
                .wait(state)
                .map_err(|_| TimeSeriesError::LockPoisoned)?;
        }
    }

    /// Blocks until the last `n` events of the current day share a product,
    /// returning that product. Returns `None` when the day the call started
    /// on ends first.
    pub fn wait_for_consecutive_sales(&self, n: usize) -> Result<Option<String>, TimeSeriesError> {
        if n == 0 {
            return Ok(None);
        }

        let mut state = self.write_state()?;
        let day_id = state.current.day_id;

        loop {
            if state.current.completed || state.current.day_id != day_id {
                return Ok(None);
            }

            let events = &state.current.events;
            if events.len() >= n {
                let tail = &events[events.len() - n..];
                let product = &tail[0].product;
                if tail.iter().all(|e| &e.product == product) {
                    return Ok(Some(product.clone()));
                }
            }

            state = self
                .new_event
                .wait(state)
                .map_err(|_| TimeSeriesError::LockPoisoned)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_series(max_days: usize, memory_days: usize) -> (TempDir, TimeSeries) {
        let dir = TempDir::new().unwrap();
        let series =
            TimeSeries::new(max_days, memory_days, Persistence::new(dir.path())).unwrap();
        (dir, series)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(TimeSeries::new(0, 0, Persistence::new(dir.path())).is_err());
        assert!(TimeSeries::new(3, 5, Persistence::new(dir.path())).is_err());
        assert!(TimeSeries::new(3, 3, Persistence::new(dir.path())).is_ok());
    }

    #[test]
    fn test_snapshot_preserves_append_order() {
        let (_dir, series) = test_series(3, 3);
        series.add_event("apple", 1, 1.0).unwrap();
        series.add_event("pear", 2, 2.0).unwrap();
        series.add_event("apple", 3, 3.0).unwrap();

        let events = series.current_day_events();
        let products: Vec<_> = events.iter().map(|e| e.product.as_str()).collect();
        assert_eq!(products, vec!["apple", "pear", "apple"]);
    }

    #[test]
    fn test_new_day_rotation() {
        let (_dir, series) = test_series(3, 3);
        assert_eq!(series.current_day_id(), 0);
        series.add_event("apple", 1, 1.0).unwrap();

        let new_id = series.new_day().unwrap();
        assert_eq!(new_id, 1);
        assert_eq!(series.current_day_id(), 1);
        assert_eq!(series.current_day_event_count(), 0);
        assert_eq!(series.historical_day_count(), 1);
        assert_eq!(series.historical_day_events(0).len(), 1);
        assert!(series.current_day_start_time() > 0);
        assert_eq!(series.max_days(), 3);
        assert_eq!(series.max_memory_days(), 3);
    }

    #[test]
    fn test_memory_window_bounded() {
        let (_dir, series) = test_series(10, 2);
        for day in 0..5 {
            series.add_event("apple", day + 1, 1.0).unwrap();
            series.new_day().unwrap();
        }

        // History is capped at S=2 in memory but the older days remain
        // reachable through disk, most recent first.
        assert_eq!(series.current_day_id(), 5);
        assert_eq!(series.historical_day_count(), 5);
        assert_eq!(series.historical_day_events(0)[0].quantity, 5);
        assert_eq!(series.historical_day_events(1)[0].quantity, 4);
        // days_ago 3 is outside the memory window, served from disk.
        assert_eq!(series.historical_day_events(3)[0].quantity, 2);
    }

    #[test]
    fn test_disk_retention_window() {
        let (_dir, series) = test_series(2, 1);
        for _ in 0..4 {
            series.add_event("apple", 1, 1.0).unwrap();
            series.new_day().unwrap();
        }

        // D=2: only the last two completed days are reachable.
        assert_eq!(series.historical_day_count(), 2);
        assert_eq!(series.historical_day_events(0).len(), 1);
        assert_eq!(series.historical_day_events(1).len(), 1);
        assert!(series.historical_day_events(2).is_empty());
    }

    #[test]
    fn test_window_events_requires_enough_days() {
        let (_dir, series) = test_series(5, 5);
        series.add_event("apple", 1, 1.0).unwrap();
        series.new_day().unwrap();

        assert!(series.window_events(1).is_some());
        assert!(series.window_events(2).is_none());
    }

    #[test]
    fn test_filtered_events_current_day() {
        let (_dir, series) = test_series(3, 3);
        series.add_event("apple", 1, 1.0).unwrap();
        series.add_event("pear", 2, 2.0).unwrap();
        series.add_event("fig", 3, 3.0).unwrap();

        let all = series.filtered_events(&[], 0);
        assert_eq!(all.len(), 3);

        let some = series.filtered_events(&["apple".into(), "fig".into()], 0);
        let products: Vec<_> = some.iter().map(|e| e.product.as_str()).collect();
        assert_eq!(products, vec!["apple", "fig"]);
    }

    #[test]
    fn test_filtered_events_historical_day() {
        let (_dir, series) = test_series(3, 3);
        series.add_event("apple", 1, 1.0).unwrap();
        series.new_day().unwrap();
        series.add_event("pear", 1, 1.0).unwrap();

        let yesterday = series.filtered_events(&[], 1);
        assert_eq!(yesterday.len(), 1);
        assert_eq!(yesterday[0].product, "apple");

        // Out of range reads as empty.
        assert!(series.filtered_events(&[], 5).is_empty());
    }

    #[test]
    fn test_simultaneous_sales_satisfied() {
        let (_dir, series) = test_series(3, 3);
        let series = Arc::new(series);

        let waiter = {
            let series = Arc::clone(&series);
            thread::spawn(move || series.wait_for_simultaneous_sales("a", "b").unwrap())
        };

        thread::sleep(Duration::from_millis(50));
        series.add_event("a", 1, 1.0).unwrap();
        thread::sleep(Duration::from_millis(20));
        series.add_event("b", 1, 1.0).unwrap();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_simultaneous_sales_day_ends_first() {
        let (_dir, series) = test_series(3, 3);
        let series = Arc::new(series);

        let waiter = {
            let series = Arc::clone(&series);
            thread::spawn(move || series.wait_for_simultaneous_sales("a", "b").unwrap())
        };

        thread::sleep(Duration::from_millis(50));
        series.add_event("a", 1, 1.0).unwrap();
        series.new_day().unwrap();

        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn test_simultaneous_sales_already_present() {
        let (_dir, series) = test_series(3, 3);
        series.add_event("a", 1, 1.0).unwrap();
        series.add_event("b", 1, 1.0).unwrap();
        // Both products already sold: no blocking at all.
        assert!(series.wait_for_simultaneous_sales("a", "b").unwrap());
    }

    #[test]
    fn test_consecutive_sales_satisfied() {
        let (_dir, series) = test_series(3, 3);
        let series = Arc::new(series);

        let waiter = {
            let series = Arc::clone(&series);
            thread::spawn(move || series.wait_for_consecutive_sales(3).unwrap())
        };

        thread::sleep(Duration::from_millis(50));
        for product in ["a", "a", "b", "a", "a", "a"] {
            series.add_event(product, 1, 1.0).unwrap();
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(waiter.join().unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn test_consecutive_sales_day_ends_first() {
        let (_dir, series) = test_series(3, 3);
        let series = Arc::new(series);

        let waiter = {
            let series = Arc::clone(&series);
            thread::spawn(move || series.wait_for_consecutive_sales(3).unwrap())
        };

        thread::sleep(Duration::from_millis(50));
        series.add_event("a", 1, 1.0).unwrap();
        series.add_event("a", 1, 1.0).unwrap();
        series.new_day().unwrap();

        assert_eq!(waiter.join().unwrap(), None);
    }

    #[test]
    fn test_restart_restores_state() {
        let dir = TempDir::new().unwrap();
        {
            let series = TimeSeries::new(5, 3, Persistence::new(dir.path())).unwrap();
            series.add_event("apple", 2, 1.0).unwrap();
            series.add_event("apple", 3, 2.0).unwrap();
            series.new_day().unwrap();
            series.add_event("apple", 1, 5.0).unwrap();
            series.new_day().unwrap();
        }

        let restored = TimeSeries::load(5, 3, Persistence::new(dir.path())).unwrap();
        assert_eq!(restored.current_day_id(), 2);
        assert_eq!(restored.historical_day_count(), 2);
        assert_eq!(restored.current_day_event_count(), 0);

        let yesterday = restored.historical_day_events(0);
        assert_eq!(yesterday.len(), 1);
        assert_eq!(yesterday[0].quantity, 1);

        let day_before = restored.historical_day_events(1);
        assert_eq!(day_before.len(), 2);
        assert_eq!(day_before[0].quantity, 2);
        assert_eq!(day_before[1].quantity, 3);
    }

    #[test]
    fn test_history_never_exceeds_day_count() {
        let (_dir, series) = test_series(5, 5);
        assert_eq!(series.historical_day_count(), 0);
        series.new_day().unwrap();
        assert_eq!(series.historical_day_count(), 1);
    }
}
