//! Deterministic simulated market used when no live transport is wired.
//!
//! A single [`SimFeed`] implements all three collaborator contracts: it walks
//! a price with a seeded LCG, keeps the forming bar mutated per poll, emits a
//! depth snapshot around the walk price, and occasionally produces
//! liquidation/whale markers anchored to the forming bar.

use crate::depth::{DepthSnapshot, OrderLevel, Side};
use crate::marker::{Marker, MarkerKind, Position};
use crate::{Bar, BarFeed, MarkerFeed, OrderbookFeed, Timeframe};

const BOOK_LEVELS_PER_SIDE: usize = 24;

pub struct SimFeed {
    timeframe: Timeframe,
    price: f32,
    tick_size: f32,
    forming: Option<Bar>,
    rng_state: u64,
}

impl SimFeed {
    pub fn new(timeframe: Timeframe, start_price: f32, tick_size: f32, seed: u64) -> Self {
        Self {
            timeframe,
            price: start_price,
            tick_size,
            forming: None,
            rng_state: seed.max(1),
        }
    }

    fn next_u32(&mut self) -> u32 {
        // Numerical Recipes LCG constants
        self.rng_state = self
            .rng_state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.rng_state >> 33) as u32
    }

    fn next_unit(&mut self) -> f32 {
        self.next_u32() as f32 / u32::MAX as f32
    }

    fn step_price(&mut self) -> f32 {
        let drift = (self.next_unit() - 0.5) * self.price * 0.001;
        self.price = (self.price + drift).max(self.tick_size);
        self.price
    }
}

impl BarFeed for SimFeed {
    fn poll_bars(&mut self, now_ms: u64) -> Vec<Bar> {
        let interval_open = self.timeframe.align(now_ms);
        let price = self.step_price();

        match &mut self.forming {
            Some(bar) if bar.time == interval_open => {
                bar.apply_tick(price);
                vec![*bar]
            }
            _ => {
                let bar = Bar {
                    time: interval_open,
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                };
                self.forming = Some(bar);
                vec![bar]
            }
        }
    }
}

impl OrderbookFeed for SimFeed {
    fn poll_snapshot(&mut self, now_ms: u64) -> Option<DepthSnapshot> {
        let mid = self.price;
        let step = self.tick_size.max(mid * 0.0002);

        let mut bids = Vec::with_capacity(BOOK_LEVELS_PER_SIDE);
        let mut asks = Vec::with_capacity(BOOK_LEVELS_PER_SIDE);

        for i in 1..=BOOK_LEVELS_PER_SIDE {
            let depth_factor = 1.0 + self.next_unit() * 8.0;
            bids.push(OrderLevel::new(
                mid - step * i as f32,
                depth_factor,
                Side::Bid,
            ));

            let depth_factor = 1.0 + self.next_unit() * 8.0;
            asks.push(OrderLevel::new(
                mid + step * i as f32,
                depth_factor,
                Side::Ask,
            ));
        }

        Some(DepthSnapshot {
            time: now_ms,
            bids,
            asks,
        })
    }
}

impl MarkerFeed for SimFeed {
    fn poll_markers(&mut self, now_ms: u64) -> Vec<Marker> {
        // Roughly one event per ~50 polls.
        if self.next_u32() % 50 != 0 {
            return vec![];
        }

        let roll = self.next_u32();
        let kind = if roll % 4 == 0 {
            MarkerKind::Whale
        } else {
            MarkerKind::Liquidation
        };
        let position = if roll % 2 == 0 {
            Position::Above
        } else {
            Position::Below
        };

        let marker = Marker {
            time: self.timeframe.align(now_ms),
            position,
            kind,
            size: 10_000.0 + self.next_unit() * 250_000.0,
        };
        log::debug!("Simulated {:?} marker at t={}", marker.kind, marker.time);
        vec![marker]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bars_are_interval_aligned() {
        let mut feed = SimFeed::new(Timeframe::M1, 50_000.0, 0.1, 7);
        for now in (0..600_000).step_by(10_000) {
            for bar in feed.poll_bars(now) {
                assert_eq!(bar.time % Timeframe::M1.to_milliseconds(), 0);
                assert!(bar.low <= bar.open && bar.open <= bar.high);
                assert!(bar.low <= bar.close && bar.close <= bar.high);
            }
        }
    }

    #[test]
    fn forming_bar_is_mutated_within_interval() {
        let mut feed = SimFeed::new(Timeframe::M1, 50_000.0, 0.1, 7);
        let first = feed.poll_bars(1_000)[0];
        let second = feed.poll_bars(2_000)[0];
        assert_eq!(first.time, second.time);
        assert_eq!(first.open, second.open);
    }

    #[test]
    fn snapshot_brackets_mid_price() {
        let mut feed = SimFeed::new(Timeframe::M1, 50_000.0, 0.1, 7);
        feed.poll_bars(1_000);
        let depth = feed.poll_snapshot(1_000).unwrap();
        let mid = depth.mid_price().unwrap();
        assert!(depth.best_bid().unwrap() < mid);
        assert!(depth.best_ask().unwrap() > mid);
    }

    #[test]
    fn same_seed_same_walk() {
        let mut a = SimFeed::new(Timeframe::M1, 50_000.0, 0.1, 42);
        let mut b = SimFeed::new(Timeframe::M1, 50_000.0, 0.1, 42);
        for now in (0..120_000).step_by(5_000) {
            assert_eq!(a.poll_bars(now), b.poll_bars(now));
        }
    }
}
