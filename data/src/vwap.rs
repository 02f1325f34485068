use feed::Bar;

const DAY_MS: u64 = 86_400_000;

/// One plotted VWAP sample with its ±1σ band edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VwapPoint {
    pub time: u64,
    pub value: f64,
    pub upper_band: f64,
    pub lower_band: f64,
}

/// Session VWAP over closed bars, anchored to 00:00 UTC.
///
/// Each bar contributes its typical price `(h + l + c) / 3` with unit
/// weight, so the line is an equal-weighted running mean rather than a
/// volume-weighted one. The band width uses a running sum of squared
/// deviations against the then-current mean, which only approximates a
/// true rolling standard deviation. Both quirks are deliberate: chart
/// output stays reproducible against the prior incarnations of this
/// indicator.
#[derive(Debug, Default)]
pub struct VwapAccumulator {
    cum_pv: f64,
    cum_v: f64,
    cum_sq_diff: f64,
    period_start: Option<u64>,
    points: Vec<VwapPoint>,
}

impl VwapAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[VwapPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Folds one bar into the session. Unclosed bars and bars from before
    /// the current session are ignored; a bar from a later UTC day starts
    /// a fresh session first.
    pub fn on_bar_closed(&mut self, bar: &Bar, is_closed: bool) {
        if !is_closed {
            return;
        }

        let bar_period = bar.time - bar.time % DAY_MS;
        match self.period_start {
            Some(current) if bar_period < current => return,
            Some(current) if bar_period > current => {
                log::info!("VWAP session rollover at t={}", bar_period);
                self.reset(bar_period);
            }
            Some(_) => {}
            None => self.period_start = Some(bar_period),
        }

        let typical_price = f64::from(bar.high + bar.low + bar.close) / 3.0;

        self.cum_pv += typical_price;
        self.cum_v += 1.0;

        let vwap = self.cum_pv / self.cum_v;
        self.cum_sq_diff += (typical_price - vwap).powi(2);

        let stddev = if self.cum_v > 1.0 {
            (self.cum_sq_diff / self.cum_v).sqrt()
        } else {
            0.0
        };

        self.points.push(VwapPoint {
            time: bar.time,
            value: vwap,
            upper_band: vwap + stddev,
            lower_band: vwap - stddev,
        });
    }

    fn reset(&mut self, period_start: u64) {
        self.cum_pv = 0.0;
        self.cum_v = 0.0;
        self.cum_sq_diff = 0.0;
        self.points.clear();
        self.period_start = Some(period_start);
    }
}
