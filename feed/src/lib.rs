pub mod depth;
pub mod marker;
pub mod sim;

use serde::{Deserialize, Serialize};

pub use depth::{DepthSnapshot, OrderLevel, Side};
pub use marker::{Marker, MarkerKind, Position};

/// Fixed aggregation interval of a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn to_minutes(self) -> u64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M3 => 3,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn to_milliseconds(self) -> u64 {
        self.to_minutes() * 60_000
    }

    /// Start of the interval that `time_ms` falls into.
    pub fn align(self, time_ms: u64) -> u64 {
        let interval = self.to_milliseconds();
        (time_ms / interval) * interval
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        };
        write!(f, "{name}")
    }
}

/// One OHLC aggregation over a fixed time interval.
///
/// `time` is the interval-open timestamp in milliseconds, aligned to the
/// interval boundary. The currently forming bar is mutated in place by each
/// tick; it becomes immutable once a later bar supersedes it.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Bar {
    pub time: u64,
    pub open: f32,
    pub high: f32,
    pub low: f32,
    pub close: f32,
}

impl Bar {
    pub fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
    }

    /// Fold a new traded price into the forming bar.
    pub fn apply_tick(&mut self, price: f32) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }
}

/// Push contract for OHLC bars. Implementations return every bar produced
/// since the previous poll, oldest first; the consumer derives the
/// "new interval started" signal itself by comparing against its store.
pub trait BarFeed {
    fn poll_bars(&mut self, now_ms: u64) -> Vec<Bar>;
}

/// Push contract for orderbook snapshots. Each snapshot replaces the
/// previous one wholesale; no diffing is performed.
pub trait OrderbookFeed {
    fn poll_snapshot(&mut self, now_ms: u64) -> Option<DepthSnapshot>;
}

/// Push contract for liquidation/whale event markers.
pub trait MarkerFeed {
    fn poll_markers(&mut self, now_ms: u64) -> Vec<Marker>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_alignment() {
        let tf = Timeframe::M5;
        assert_eq!(tf.align(1_700_000_299_999), 1_700_000_100_000);
        assert_eq!(tf.align(1_700_000_100_000), 1_700_000_100_000);
    }

    #[test]
    fn apply_tick_extends_extremes() {
        let mut bar = Bar {
            time: 0,
            open: 100.0,
            high: 100.0,
            low: 100.0,
            close: 100.0,
        };
        bar.apply_tick(104.0);
        bar.apply_tick(97.5);
        assert_eq!(bar.high, 104.0);
        assert_eq!(bar.low, 97.5);
        assert_eq!(bar.close, 97.5);
    }
}
