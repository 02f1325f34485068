use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Side {
    Bid,
    Ask,
}

/// One resting-order price level from the latest orderbook snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderLevel {
    pub price: f32,
    pub size: f32,
    pub dollar_value: f32,
    pub side: Side,
}

impl OrderLevel {
    pub fn new(price: f32, size: f32, side: Side) -> Self {
        Self {
            price,
            size,
            dollar_value: price * size,
            side,
        }
    }
}

/// Full orderbook snapshot. Replaced wholesale on every update; no history
/// is retained beyond the latest snapshot per side.
#[derive(Debug, Clone, Default)]
pub struct DepthSnapshot {
    pub time: u64,
    pub bids: Vec<OrderLevel>,
    pub asks: Vec<OrderLevel>,
}

impl DepthSnapshot {
    /// Highest bid price, if any bid levels exist.
    pub fn best_bid(&self) -> Option<f32> {
        self.bids
            .iter()
            .map(|level| level.price)
            .fold(None, |acc, p| Some(acc.map_or(p, |a: f32| a.max(p))))
    }

    /// Lowest ask price, if any ask levels exist.
    pub fn best_ask(&self) -> Option<f32> {
        self.asks
            .iter()
            .map(|level| level.price)
            .fold(None, |acc, p| Some(acc.map_or(p, |a: f32| a.min(p))))
    }

    pub fn mid_price(&self) -> Option<f32> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// Largest dollar value across both sides, used to normalize heatmap
    /// line widths.
    pub fn max_dollar_value(&self) -> f32 {
        self.bids
            .iter()
            .chain(self.asks.iter())
            .map(|level| level.dollar_value)
            .fold(0.0, f32::max)
    }

    pub fn levels(&self) -> impl Iterator<Item = &OrderLevel> {
        self.bids.iter().chain(self.asks.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> DepthSnapshot {
        DepthSnapshot {
            time: 0,
            bids: vec![
                OrderLevel::new(99.0, 2.0, Side::Bid),
                OrderLevel::new(98.5, 10.0, Side::Bid),
            ],
            asks: vec![
                OrderLevel::new(100.5, 1.0, Side::Ask),
                OrderLevel::new(101.0, 4.0, Side::Ask),
            ],
        }
    }

    #[test]
    fn best_prices_and_mid() {
        let depth = snapshot();
        assert_eq!(depth.best_bid(), Some(99.0));
        assert_eq!(depth.best_ask(), Some(100.5));
        assert_eq!(depth.mid_price(), Some(99.75));
    }

    #[test]
    fn max_dollar_value_spans_both_sides() {
        let depth = snapshot();
        assert_eq!(depth.max_dollar_value(), 98.5 * 10.0);
    }

    #[test]
    fn empty_book_has_no_mid() {
        assert_eq!(DepthSnapshot::default().mid_price(), None);
    }
}
