use std::collections::BTreeMap;

use feed::{Bar, Timeframe};

/// Maximum retained bars; the oldest is evicted past this.
pub const BAR_CAPACITY: usize = 1000;

/// Outcome of [`BarStore::insert`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Insert {
    /// A new interval began. `closed` carries the bar that just stopped
    /// forming, which is the trigger for VWAP accumulation and per-bar
    /// overlay aggregates.
    Appended { closed: Option<Bar> },
    /// A bar with the same interval-open time existed and was overwritten
    /// in place.
    Updated,
    Rejected(Reject),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    /// `time` is not aligned to the interval boundary.
    Misaligned,
    /// `time` is beyond the currently active interval.
    Future,
    /// One of the OHLC fields is NaN or infinite.
    NonFinite,
}

/// Ordered sequence of OHLC bars keyed by aligned interval-open time.
///
/// Bars are exclusively owned by the store; malformed upstream data is
/// dropped at this boundary and never reaches the render pipeline.
pub struct BarStore {
    datapoints: BTreeMap<u64, Bar>,
    interval: Timeframe,
}

impl BarStore {
    pub fn new(interval: Timeframe) -> Self {
        Self {
            datapoints: BTreeMap::new(),
            interval,
        }
    }

    pub fn interval(&self) -> Timeframe {
        self.interval
    }

    pub fn len(&self) -> usize {
        self.datapoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datapoints.is_empty()
    }

    pub fn latest(&self) -> Option<&Bar> {
        self.datapoints.values().last()
    }

    pub fn first_time(&self) -> Option<u64> {
        self.datapoints.keys().next().copied()
    }

    pub fn latest_time(&self) -> Option<u64> {
        self.datapoints.keys().last().copied()
    }

    pub fn get(&self, time: u64) -> Option<&Bar> {
        self.datapoints.get(&time)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Bar)> {
        self.datapoints.values().enumerate()
    }

    /// Update-or-append with validation. Misaligned, future and non-finite
    /// bars signal malformed upstream data and are dropped, not corrected.
    pub fn insert(&mut self, bar: Bar, now_ms: u64) -> Insert {
        if !bar.is_finite() {
            log::warn!("Dropping bar with non-finite OHLC at t={}", bar.time);
            return Insert::Rejected(Reject::NonFinite);
        }

        let interval_ms = self.interval.to_milliseconds();
        if bar.time % interval_ms != 0 {
            log::warn!(
                "Dropping misaligned bar: t={} is not a multiple of {}ms",
                bar.time,
                interval_ms
            );
            return Insert::Rejected(Reject::Misaligned);
        }

        if bar.time > self.interval.align(now_ms) {
            log::warn!(
                "Dropping future bar: t={} beyond active interval at {}",
                bar.time,
                now_ms
            );
            return Insert::Rejected(Reject::Future);
        }

        if let Some(existing) = self.datapoints.get_mut(&bar.time) {
            *existing = bar;
            return Insert::Updated;
        }

        let closed = self
            .latest()
            .filter(|latest| latest.time < bar.time)
            .copied();

        self.datapoints.insert(bar.time, bar);

        while self.datapoints.len() > BAR_CAPACITY {
            self.datapoints.pop_first();
        }

        Insert::Appended { closed }
    }

    /// Bar at sequence position `index` (0 = oldest).
    pub fn bar_at(&self, index: usize) -> Option<&Bar> {
        self.datapoints.values().nth(index)
    }

    /// Sequence position of the bar with exactly this interval-open time.
    pub fn index_of_time(&self, time: u64) -> Option<usize> {
        self.datapoints.contains_key(&time).then(|| {
            self.datapoints
                .range(..time)
                .count()
        })
    }

    /// Timestamp at a (possibly fractional) sequence index, extrapolated
    /// past either end by whole intervals. Used by the time axis, which
    /// labels synthetic future slots beyond the last real bar.
    pub fn time_at_index(&self, index: f64) -> Option<f64> {
        let first = self.first_time()? as f64;
        let last = self.latest_time()? as f64;
        let interval = self.interval.to_milliseconds() as f64;
        let last_index = (self.len() - 1) as f64;

        if index <= 0.0 {
            return Some(first + index * interval);
        }
        if index >= last_index {
            return Some(last + (index - last_index) * interval);
        }

        let lower = index.floor() as usize;
        let frac = index - index.floor();
        let t0 = self.bar_at(lower)?.time as f64;
        let t1 = self.bar_at(lower + 1)?.time as f64;
        Some(t0 + frac * (t1 - t0))
    }

    /// Inverse of [`Self::time_at_index`] for crosshair and marker math.
    pub fn index_at_time(&self, time: f64) -> Option<f64> {
        let first = self.first_time()? as f64;
        let last = self.latest_time()? as f64;
        let interval = self.interval.to_milliseconds() as f64;
        let last_index = (self.len() - 1) as f64;

        if time <= first {
            return Some((time - first) / interval);
        }
        if time >= last {
            return Some(last_index + (time - last) / interval);
        }

        let before = self.datapoints.range(..=(time as u64)).count() - 1;
        let t0 = self.bar_at(before)?.time as f64;
        let t1 = self.bar_at(before + 1)?.time as f64;
        let frac = if t1 > t0 { (time - t0) / (t1 - t0) } else { 0.0 };
        Some(before as f64 + frac)
    }

    /// Lowest low and highest high over bars whose sequence index falls in
    /// `[start, end]`.
    pub fn min_max_in_index_range(&self, start: f32, end: f32) -> Option<(f32, f32)> {
        if self.is_empty() || end < 0.0 {
            return None;
        }

        let from = start.max(0.0).floor() as usize;
        let to = end.ceil() as usize;

        let mut it = self
            .datapoints
            .values()
            .skip(from)
            .take(to.saturating_sub(from) + 1);
        let first = it.next()?;
        let mut min_price = first.low;
        let mut max_price = first.high;

        for bar in it {
            min_price = min_price.min(bar.low);
            max_price = max_price.max(bar.high);
        }

        Some((min_price, max_price))
    }

    /// Bars (with sequence index) whose index falls in `[start, end]`.
    pub fn bars_in_index_range(
        &self,
        start: f32,
        end: f32,
    ) -> impl Iterator<Item = (usize, &Bar)> {
        let from = start.max(0.0).floor() as usize;
        let to = end.max(0.0).ceil() as usize;

        self.datapoints
            .values()
            .enumerate()
            .skip(from)
            .take(to.saturating_sub(from) + 1)
    }

    /// Reports interval gaps between the first and last stored bar.
    pub fn check_integrity(&self) -> Option<Vec<u64>> {
        let (Some(earliest), Some(latest)) = (self.first_time(), self.latest_time()) else {
            return None;
        };
        let interval = self.interval.to_milliseconds();

        let mut missing_keys = Vec::new();
        let mut time = earliest;
        while time < latest {
            if !self.datapoints.contains_key(&time) {
                missing_keys.push(time);
            }
            time += interval;
        }

        if missing_keys.is_empty() {
            None
        } else {
            log::warn!("Integrity check failed: missing {} bars", missing_keys.len());
            Some(missing_keys)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: u64 = 60_000;

    fn bar(time: u64, low: f32, high: f32) -> Bar {
        Bar {
            time,
            open: low,
            high,
            low,
            close: high,
        }
    }

    fn store_with(n: u64) -> BarStore {
        let mut store = BarStore::new(Timeframe::M1);
        for i in 0..n {
            store.insert(bar(i * MIN, 100.0, 101.0), n * MIN);
        }
        store
    }

    #[test]
    fn update_does_not_grow_store() {
        let mut store = store_with(5);
        let result = store.insert(bar(2 * MIN, 90.0, 95.0), 5 * MIN);
        assert_eq!(result, Insert::Updated);
        assert_eq!(store.len(), 5);
        assert_eq!(store.get(2 * MIN).unwrap().low, 90.0);
    }

    #[test]
    fn append_signals_previous_bar_closed() {
        let mut store = store_with(3);
        let result = store.insert(bar(3 * MIN, 100.0, 102.0), 3 * MIN);
        match result {
            Insert::Appended { closed: Some(prev) } => assert_eq!(prev.time, 2 * MIN),
            other => panic!("expected appended with closed bar, got {other:?}"),
        }
    }

    #[test]
    fn backfill_append_has_no_close_signal() {
        let mut store = BarStore::new(Timeframe::M1);
        store.insert(bar(10 * MIN, 100.0, 101.0), 10 * MIN);
        let result = store.insert(bar(4 * MIN, 100.0, 101.0), 10 * MIN);
        assert_eq!(result, Insert::Appended { closed: None });
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn cap_evicts_oldest() {
        let mut store = BarStore::new(Timeframe::M1);
        let n = (BAR_CAPACITY + 10) as u64;
        for i in 0..n {
            store.insert(bar(i * MIN, 100.0, 101.0), n * MIN);
        }
        assert_eq!(store.len(), BAR_CAPACITY);
        assert_eq!(store.first_time(), Some(10 * MIN));
    }

    #[test]
    fn rejects_malformed_bars() {
        let mut store = store_with(3);

        let misaligned = store.insert(bar(2 * MIN + 1, 100.0, 101.0), 3 * MIN);
        assert_eq!(misaligned, Insert::Rejected(Reject::Misaligned));

        let future = store.insert(bar(10 * MIN, 100.0, 101.0), 3 * MIN);
        assert_eq!(future, Insert::Rejected(Reject::Future));

        let nan = store.insert(bar(3 * MIN, f32::NAN, 101.0), 3 * MIN);
        assert_eq!(nan, Insert::Rejected(Reject::NonFinite));

        assert_eq!(store.len(), 3);
    }

    #[test]
    fn forming_bar_for_active_interval_is_accepted() {
        let mut store = store_with(3);
        // now is mid-interval; a bar opening this interval is not "future"
        let result = store.insert(bar(3 * MIN, 100.0, 101.0), 3 * MIN + 30_000);
        assert!(matches!(result, Insert::Appended { .. }));
    }

    #[test]
    fn index_time_roundtrip_with_gap() {
        let mut store = BarStore::new(Timeframe::M1);
        for t in [0, MIN, 4 * MIN, 5 * MIN] {
            store.insert(bar(t, 100.0, 101.0), 5 * MIN);
        }

        assert_eq!(store.index_of_time(4 * MIN), Some(2));
        assert_eq!(store.index_of_time(2 * MIN), None);

        let t = store.time_at_index(2.0).unwrap();
        assert_eq!(store.index_at_time(t).unwrap(), 2.0);

        // extrapolation past the newest bar
        let future = store.time_at_index(5.0).unwrap();
        assert_eq!(future, (5 * MIN + 2 * MIN) as f64);
    }

    #[test]
    fn min_max_over_index_range() {
        let mut store = BarStore::new(Timeframe::M1);
        store.insert(bar(0, 100.0, 110.0), 3 * MIN);
        store.insert(bar(MIN, 95.0, 105.0), 3 * MIN);
        store.insert(bar(2 * MIN, 102.0, 120.0), 3 * MIN);

        assert_eq!(store.min_max_in_index_range(0.0, 1.0), Some((95.0, 110.0)));
        assert_eq!(store.min_max_in_index_range(0.0, 10.0), Some((95.0, 120.0)));
        assert_eq!(store.min_max_in_index_range(0.0, -1.0), None);
    }

    #[test]
    fn integrity_reports_gaps() {
        let mut store = BarStore::new(Timeframe::M1);
        for t in [0, MIN, 3 * MIN] {
            store.insert(bar(t, 100.0, 101.0), 3 * MIN);
        }
        assert_eq!(store.check_integrity(), Some(vec![2 * MIN]));
    }
}
