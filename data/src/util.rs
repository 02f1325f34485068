use std::time::{Duration, Instant};

/// Leading-edge rate limiter: the first call fires immediately, later
/// calls are swallowed until the cooldown elapses.
#[derive(Debug)]
pub struct Throttle {
    cooldown: Duration,
    last_fired: Option<Instant>,
}

impl Throttle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: None,
        }
    }

    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        match self.last_fired {
            Some(last) if now.duration_since(last) < self.cooldown => false,
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }
}

pub fn round_to_tick(price: f32, tick_size: f32) -> f32 {
    if tick_size <= 0.0 {
        return price;
    }
    (price / tick_size).round() * tick_size
}

/// Decimal places needed to print a value on the given tick grid.
pub fn count_decimals(tick_size: f32) -> usize {
    let value_str = tick_size.to_string();
    if let Some(pos) = value_str.find('.') {
        value_str.len() - pos - 1
    } else {
        0
    }
}

pub fn abbr_large_numbers(value: f32) -> String {
    let abs_value = value.abs();
    let sign = if value < 0.0 { "-" } else { "" };

    match abs_value {
        v if v >= 1_000_000_000.0 => format!("{}{:.2}b", sign, v / 1_000_000_000.0),
        v if v >= 1_000_000.0 => format!("{}{:.2}m", sign, v / 1_000_000.0),
        v if v >= 1_000.0 => format!("{}{:.1}k", sign, v / 1_000.0),
        v if v >= 100.0 => format!("{sign}{v:.0}"),
        v if v >= 1.0 => format!("{sign}{v:.1}"),
        v => format!("{sign}{v:.2}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_is_leading_edge() {
        let mut throttle = Throttle::new(Duration::from_millis(100));
        let start = Instant::now();

        assert!(throttle.try_acquire_at(start));
        assert!(!throttle.try_acquire_at(start + Duration::from_millis(50)));
        assert!(!throttle.try_acquire_at(start + Duration::from_millis(99)));
        assert!(throttle.try_acquire_at(start + Duration::from_millis(100)));
        assert!(!throttle.try_acquire_at(start + Duration::from_millis(150)));
    }

    #[test]
    fn rounds_to_tick_grid() {
        assert!((round_to_tick(100.07, 0.05) - 100.05).abs() < 1e-4);
        assert!((round_to_tick(100.08, 0.05) - 100.1).abs() < 1e-4);
        assert_eq!(round_to_tick(42.0, 0.0), 42.0);
    }

    #[test]
    fn decimals_from_tick_size() {
        assert_eq!(count_decimals(0.01), 2);
        assert_eq!(count_decimals(0.5), 1);
        assert_eq!(count_decimals(1.0), 0);
    }

    #[test]
    fn abbreviates_magnitudes() {
        assert_eq!(abbr_large_numbers(1_250_000.0), "1.25m");
        assert_eq!(abbr_large_numbers(53_400.0), "53.4k");
        assert_eq!(abbr_large_numbers(-2_000_000_000.0), "-2.00b");
        assert_eq!(abbr_large_numbers(0.25), "0.25");
    }
}
