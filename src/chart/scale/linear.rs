use iced::Color;
use iced::theme::palette::Extended;

/// Safety valve for tick loops when the range collapses toward zero.
pub const MAX_TICK_ITERATIONS: usize = 1000;

/// Last traded price, tagged with the direction of the bar it closed in
/// so the tag and the dashed line pick up the matching palette color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceInfoLabel {
    Up(f32),
    Down(f32),
}

impl PriceInfoLabel {
    pub fn new(close: f32, open: f32) -> Self {
        if close >= open {
            PriceInfoLabel::Up(close)
        } else {
            PriceInfoLabel::Down(close)
        }
    }

    pub fn get_with_color(self, palette: &Extended) -> (f32, Color) {
        match self {
            PriceInfoLabel::Up(price) => (price, palette.success.base.color),
            PriceInfoLabel::Down(price) => (price, palette.danger.base.color),
        }
    }
}

/// Picks a 1-2-5 stepped tick spacing so at most `labels_can_fit` ticks
/// land in `[lowest, highest]`, and the first tick at or above `lowest`.
pub fn calc_optimal_ticks(highest: f32, lowest: f32, labels_can_fit: i32) -> (f32, f32) {
    let range = (highest - lowest).max(f32::EPSILON);
    let rough_step = range / labels_can_fit.max(1) as f32;

    let magnitude = 10f32.powf(rough_step.log10().floor());
    let normalized = rough_step / magnitude;

    let step = if normalized <= 1.0 {
        magnitude
    } else if normalized <= 2.0 {
        2.0 * magnitude
    } else if normalized <= 5.0 {
        5.0 * magnitude
    } else {
        10.0 * magnitude
    };

    let first_tick = (lowest / step).ceil() * step;
    (step, first_tick)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_count(highest: f32, lowest: f32, can_fit: i32) -> usize {
        let (step, first) = calc_optimal_ticks(highest, lowest, can_fit);
        let mut count = 0;
        let mut tick = first;
        while tick <= highest && count < MAX_TICK_ITERATIONS {
            count += 1;
            tick += step;
        }
        count
    }

    #[test]
    fn steps_follow_one_two_five() {
        let (step, _) = calc_optimal_ticks(100.0, 0.0, 10);
        assert_eq!(step, 10.0);

        let (step, _) = calc_optimal_ticks(150.0, 0.0, 10);
        assert_eq!(step, 20.0);

        let (step, _) = calc_optimal_ticks(400.0, 0.0, 10);
        assert_eq!(step, 50.0);
    }

    #[test]
    fn first_tick_is_on_the_grid_at_or_above_lowest() {
        let (step, first) = calc_optimal_ticks(210.0, 93.0, 10);
        assert!(first >= 93.0);
        assert_eq!((first / step).fract(), 0.0);
    }

    #[test]
    fn never_produces_more_ticks_than_fit() {
        for (hi, lo) in [(100.0, 0.0), (51234.0, 49876.0), (1.0, 0.97)] {
            assert!(tick_count(hi, lo, 8) <= 9, "range {lo}..{hi}");
        }
    }

    #[test]
    fn label_color_follows_bar_direction() {
        assert_eq!(PriceInfoLabel::new(101.0, 100.0), PriceInfoLabel::Up(101.0));
        assert_eq!(PriceInfoLabel::new(99.0, 100.0), PriceInfoLabel::Down(99.0));
    }
}
