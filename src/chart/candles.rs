use iced::widget::canvas::{self, Event, Frame, Geometry, Path, Stroke};
use iced::{Point, Rectangle, Renderer, Theme, mouse};

use data::aggr::{BarStore, Insert};
use data::util::abbr_large_numbers;
use data::vwap::VwapAccumulator;
use feed::depth::{DepthSnapshot, OrderLevel, Side};
use feed::marker::Marker;
use feed::{Bar, Timeframe};

use super::overlay::{MarkerOverlay, OverlayContext};
use super::scale::linear::PriceInfoLabel;
use super::{
    Chart, DEFAULT_VISIBLE_BARS, Interaction, Message, TEXT_SIZE, ViewState, canvas_interaction,
};
use crate::style::{ColorProvider, ColorRole};

/// Vertical distance within which a cursor picks up an orderbook level.
pub const HIT_TEST_THRESHOLD: f32 = 6.0;

/// Fraction of the chart width the longest heatmap bar may reach.
const HEATMAP_MAX_REACH: f32 = 0.2;

pub struct CandleChart {
    chart: ViewState,
    store: BarStore,
    vwap: VwapAccumulator,
    depth: Option<DepthSnapshot>,
    overlays: Vec<Box<dyn MarkerOverlay>>,
    colors: Box<dyn ColorProvider>,
    show_vwap: bool,
    show_heatmap: bool,
}

impl CandleChart {
    pub fn new(
        interval: Timeframe,
        tick_size: f32,
        colors: Box<dyn ColorProvider>,
        overlays: Vec<Box<dyn MarkerOverlay>>,
        show_vwap: bool,
        show_heatmap: bool,
    ) -> Self {
        Self {
            chart: ViewState::new(interval, tick_size),
            store: BarStore::new(interval),
            vwap: VwapAccumulator::new(),
            depth: None,
            overlays,
            colors,
            show_vwap,
            show_heatmap,
        }
    }

    /// Folds one polled bar in. An append closes the previous bar, which
    /// is the only path into the VWAP accumulator.
    pub fn update_latest_bar(&mut self, bar: &Bar, now_ms: u64) {
        let was_at_live_edge = self.is_at_live_edge();

        match self.store.insert(*bar, now_ms) {
            Insert::Appended { closed } => {
                if let Some(prev) = closed {
                    self.vwap.on_bar_closed(&prev, true);
                }
                if was_at_live_edge {
                    self.follow_live_edge();
                }
            }
            Insert::Updated | Insert::Rejected(_) => {}
        }

        if self.store.latest_time() == Some(bar.time) {
            self.chart.last_price = Some(PriceInfoLabel::new(bar.close, bar.open));
        }
    }

    pub fn update_depth(&mut self, snapshot: DepthSnapshot) {
        self.depth = Some(snapshot);
    }

    pub fn push_marker(&mut self, marker: &Marker) {
        for overlay in &mut self.overlays {
            overlay.on_marker(marker);
        }
    }

    fn is_at_live_edge(&self) -> bool {
        let right_edge = self.chart.view_offset + self.chart.visible_bar_count;
        right_edge >= self.store.len() as f32 - 1.0
    }

    fn follow_live_edge(&mut self) {
        self.chart.view_offset =
            (self.store.len() as f32 - self.chart.visible_bar_count).max(0.0);
    }

    /// Pre-frame pass: sanity-check the view, run the auto-range fit when
    /// the scale is not manually held, then drop the cached geometry.
    pub fn invalidate(&mut self) {
        self.ensure_sane_view();

        if !self.chart.price_scale_manually_set {
            let (start, end) = self.chart.visible_index_range();
            if let Some((low, high)) = self.store.min_max_in_index_range(start, end) {
                self.chart.autofit(low, high);
            }
        }

        self.chart.cache.clear_all();
    }

    /// A NaN that slips into the view state would poison every mapped
    /// coordinate and blank the chart for good, so recover to defaults
    /// instead of rendering from it.
    fn ensure_sane_view(&mut self) {
        let chart = &mut self.chart;
        let sane = chart.view_offset.is_finite()
            && chart.visible_bar_count.is_finite()
            && chart.min_price.is_finite()
            && chart.max_price.is_finite()
            && chart.min_price < chart.max_price;

        if !sane {
            log::error!(
                "Recovering from invalid view state: offset={} bars={} range=({}, {})",
                chart.view_offset,
                chart.visible_bar_count,
                chart.min_price,
                chart.max_price
            );
            chart.view_offset = 0.0;
            chart.visible_bar_count = DEFAULT_VISIBLE_BARS;
            chart.reset_price_range();
            chart.price_scale_manually_set = false;
        }
    }

    fn hovered_level(&self, cursor_y: f32) -> Option<&OrderLevel> {
        let depth = self.depth.as_ref()?;

        depth
            .levels()
            .map(|level| {
                let distance = (self.chart.price_to_y(level.price) - cursor_y).abs();
                (distance, level)
            })
            .filter(|(distance, _)| *distance <= HIT_TEST_THRESHOLD)
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, level)| level)
    }

    fn draw_heatmap(&self, frame: &mut Frame, theme: &Theme) {
        let Some(depth) = &self.depth else {
            return;
        };
        let max_dollar_value = depth.max_dollar_value();
        if max_dollar_value <= 0.0 {
            return;
        }

        let width = frame.width();
        let max_reach = width * HEATMAP_MAX_REACH;

        for level in depth.levels() {
            if level.price < self.chart.min_price || level.price > self.chart.max_price {
                continue;
            }

            let role = match level.side {
                Side::Bid => ColorRole::BidDepth,
                Side::Ask => ColorRole::AskDepth,
            };
            let ratio = level.dollar_value / max_dollar_value;

            let y = self.chart.price_to_y(level.price);
            frame.fill_rectangle(
                Point::new(width - ratio * max_reach, y - 0.5),
                iced::Size::new(ratio * max_reach, 1.0),
                self.colors
                    .color(role, theme)
                    .scale_alpha(0.25 + 0.75 * ratio),
            );
        }
    }

    fn draw_candles(&self, frame: &mut Frame, theme: &Theme) {
        let (start, end) = self.chart.visible_index_range();
        let bar_width = self.chart.bar_width();
        let candle_width = bar_width * 0.8;

        let bullish = self.colors.color(ColorRole::BullishCandle, theme);
        let bearish = self.colors.color(ColorRole::BearishCandle, theme);

        for (index, bar) in self.store.bars_in_index_range(start, end) {
            let x = self.chart.bar_index_to_x(index as f32);
            let color = if bar.close >= bar.open { bullish } else { bearish };

            let y_high = self.chart.price_to_y(bar.high);
            let y_low = self.chart.price_to_y(bar.low);
            frame.fill_rectangle(
                Point::new(x - candle_width / 8.0, y_high),
                iced::Size::new(candle_width / 4.0, (y_low - y_high).max(1.0)),
                color,
            );

            let y_open = self.chart.price_to_y(bar.open);
            let y_close = self.chart.price_to_y(bar.close);
            frame.fill_rectangle(
                Point::new(x - candle_width / 2.0, y_open.min(y_close)),
                iced::Size::new(candle_width, (y_open - y_close).abs().max(1.0)),
                color,
            );
        }
    }

    fn draw_vwap(&self, frame: &mut Frame, theme: &Theme) {
        let mut line = Vec::with_capacity(self.vwap.points().len());
        let mut upper = Vec::with_capacity(self.vwap.points().len());
        let mut lower = Vec::with_capacity(self.vwap.points().len());

        for point in self.vwap.points() {
            // points whose bar was evicted fall off the left edge
            let Some(index) = self.store.index_of_time(point.time) else {
                continue;
            };
            let x = self.chart.bar_index_to_x(index as f32);

            line.push(Point::new(x, self.chart.price_to_y(point.value as f32)));
            upper.push(Point::new(x, self.chart.price_to_y(point.upper_band as f32)));
            lower.push(Point::new(x, self.chart.price_to_y(point.lower_band as f32)));
        }

        let polyline = |points: &[Point]| {
            Path::new(|builder| {
                for (i, point) in points.iter().enumerate() {
                    if i == 0 {
                        builder.move_to(*point);
                    } else {
                        builder.line_to(*point);
                    }
                }
            })
        };

        if line.len() > 1 {
            let line_color = self.colors.color(ColorRole::VwapLine, theme);
            frame.stroke(
                &polyline(&line),
                Stroke::default().with_width(1.5).with_color(line_color),
            );

            let band_color = self.colors.color(ColorRole::VwapBand, theme);
            let band_stroke = Stroke::default().with_width(1.0).with_color(band_color);
            frame.stroke(&polyline(&upper), band_stroke);
            frame.stroke(&polyline(&lower), band_stroke);
        }
    }

    fn draw_depth_tooltip(&self, frame: &mut Frame, theme: &Theme, cursor_position: Point) {
        let Some(level) = self.hovered_level(cursor_position.y) else {
            return;
        };
        let palette = theme.extended_palette();

        let side = match level.side {
            Side::Bid => "bid",
            Side::Ask => "ask",
        };
        let content = format!(
            "{} {:.*} | {} | ${}",
            side,
            self.chart.decimals,
            level.price,
            abbr_large_numbers(level.size),
            abbr_large_numbers(level.dollar_value),
        );

        let position = Point::new(cursor_position.x + 12.0, cursor_position.y - 16.0);
        let width = content.len() as f32 * TEXT_SIZE * 0.6 + 8.0;

        frame.fill_rectangle(
            Point::new(position.x - 4.0, position.y - 2.0),
            iced::Size::new(width, TEXT_SIZE + 6.0),
            palette.background.weak.color.scale_alpha(0.9),
        );
        frame.fill_text(canvas::Text {
            content,
            position,
            size: TEXT_SIZE.into(),
            color: palette.background.weak.text,
            font: crate::style::AXIS_FONT,
            ..Default::default()
        });
    }
}

impl Chart for CandleChart {
    fn state(&self) -> &ViewState {
        &self.chart
    }

    fn mut_state(&mut self) -> &mut ViewState {
        &mut self.chart
    }

    fn invalidate_all(&mut self) {
        self.invalidate();
    }

    fn invalidate_crosshair(&mut self) {
        self.chart.cache.clear_crosshair();
    }

    fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn bar_count(&self) -> usize {
        self.store.len()
    }

    fn first_bar_time(&self) -> Option<u64> {
        self.store.first_time()
    }

    fn best_bid_ask(&self) -> (Option<f32>, Option<f32>) {
        match &self.depth {
            Some(depth) => (depth.best_bid(), depth.best_ask()),
            None => (None, None),
        }
    }
}

impl canvas::Program<Message> for CandleChart {
    type State = Interaction;

    fn update(
        &self,
        interaction: &mut Interaction,
        event: &Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<canvas::Action<Message>> {
        canvas_interaction(self, interaction, event, bounds, cursor)
    }

    fn draw(
        &self,
        _interaction: &Interaction,
        renderer: &Renderer,
        theme: &Theme,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        if self.store.is_empty() {
            return vec![];
        }
        let palette = theme.extended_palette();

        // layer order inside the cache is fixed: background, heatmap,
        // candles, vwap, last price, marker overlays
        let main = self.chart.cache.main.draw(renderer, bounds.size(), |frame| {
            frame.fill_rectangle(Point::ORIGIN, frame.size(), palette.background.base.color);

            if self.show_heatmap {
                self.draw_heatmap(frame, theme);
            }

            self.draw_candles(frame, theme);

            if self.show_vwap {
                self.draw_vwap(frame, theme);
            }

            self.chart.draw_last_price_line(frame, palette, frame.size());

            let ctx = OverlayContext::new(&self.store, &self.chart, cursor.position_in(bounds));
            for overlay in &self.overlays {
                overlay.draw(frame, &ctx, self.colors.as_ref(), theme);
            }
        });

        // crosshair lives in its own cache so pointer moves do not
        // re-tessellate the chart content
        let crosshair = self
            .chart
            .cache
            .crosshair
            .draw(renderer, bounds.size(), |frame| {
                if let Some(cursor_position) = cursor.position_in(bounds) {
                    self.chart
                        .draw_crosshair(frame, theme, frame.size(), cursor_position);
                    self.draw_depth_tooltip(frame, theme, cursor_position);
                }
            });

        vec![main, crosshair]
    }

    fn mouse_interaction(
        &self,
        interaction: &Interaction,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        match interaction {
            Interaction::DraggingChart { .. } => mouse::Interaction::Grabbing,
            _ if cursor.is_over(bounds) => mouse::Interaction::Crosshair,
            _ => mouse::Interaction::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::DefaultColors;
    use iced::Size;

    const MIN: u64 = 60_000;

    fn bar(time: u64, open: f32, close: f32) -> Bar {
        Bar {
            time,
            open,
            high: open.max(close) + 1.0,
            low: open.min(close) - 1.0,
            close,
        }
    }

    fn chart() -> CandleChart {
        let mut chart = CandleChart::new(
            Timeframe::M1,
            0.1,
            Box::new(DefaultColors),
            vec![],
            true,
            true,
        );
        chart.chart.bounds = Rectangle::with_size(Size::new(800.0, 600.0));
        chart
    }

    #[test]
    fn append_feeds_vwap_with_the_closed_bar_only() {
        let mut chart = chart();
        chart.update_latest_bar(&bar(0, 100.0, 101.0), 0);
        assert!(chart.vwap.points().is_empty());

        // updating the forming bar is not a close
        chart.update_latest_bar(&bar(0, 100.0, 102.0), 30_000);
        assert!(chart.vwap.points().is_empty());

        chart.update_latest_bar(&bar(MIN, 102.0, 103.0), MIN);
        assert_eq!(chart.vwap.points().len(), 1);
        assert_eq!(chart.vwap.points()[0].time, 0);
    }

    #[test]
    fn last_price_tracks_latest_close_direction() {
        let mut chart = chart();
        chart.update_latest_bar(&bar(0, 100.0, 101.0), 0);
        assert_eq!(chart.chart.last_price, Some(PriceInfoLabel::Up(101.0)));

        chart.update_latest_bar(&bar(0, 100.0, 99.0), 30_000);
        assert_eq!(chart.chart.last_price, Some(PriceInfoLabel::Down(99.0)));
    }

    #[test]
    fn rejected_bar_leaves_state_untouched() {
        let mut chart = chart();
        chart.update_latest_bar(&bar(0, 100.0, 101.0), 0);
        chart.update_latest_bar(&bar(MIN + 7, 50.0, 51.0), MIN);

        assert_eq!(chart.bar_count(), 1);
        assert_eq!(chart.chart.last_price, Some(PriceInfoLabel::Up(101.0)));
    }

    #[test]
    fn auto_range_skips_when_manually_held() {
        let mut chart = chart();
        for i in 0..20u64 {
            chart.update_latest_bar(&bar(i * MIN, 100.0, 101.0), i * MIN);
        }

        chart.chart.price_scale_manually_set = true;
        chart.chart.min_price = 500.0;
        chart.chart.max_price = 600.0;

        chart.invalidate();
        assert_eq!(chart.chart.min_price, 500.0);
        assert_eq!(chart.chart.max_price, 600.0);
    }

    #[test]
    fn render_guard_recovers_from_nan_state() {
        let mut chart = chart();
        for i in 0..5u64 {
            chart.update_latest_bar(&bar(i * MIN, 100.0, 101.0), i * MIN);
        }

        chart.chart.min_price = f32::NAN;
        chart.invalidate();

        assert!(chart.chart.min_price.is_finite());
        assert!(chart.chart.max_price.is_finite());
        assert!(chart.chart.min_price < chart.chart.max_price);
    }

    #[test]
    fn hover_picks_nearest_level_within_threshold() {
        let mut chart = chart();
        chart.update_latest_bar(&bar(0, 100.0, 101.0), 0);
        chart.chart.min_price = 90.0;
        chart.chart.max_price = 110.0;

        chart.update_depth(DepthSnapshot {
            time: 0,
            bids: vec![OrderLevel::new(100.0, 2.0, Side::Bid)],
            asks: vec![OrderLevel::new(100.2, 3.0, Side::Ask)],
        });

        // 600px over a 20.0 span: 1 price unit = 30px
        let y_bid = chart.chart.price_to_y(100.0);
        let hit = chart.hovered_level(y_bid + 4.0).unwrap();
        assert_eq!(hit.price, 100.0);

        let y_ask = chart.chart.price_to_y(100.2);
        let hit = chart.hovered_level(y_ask - 1.0).unwrap();
        assert_eq!(hit.price, 100.2);

        assert!(chart.hovered_level(y_bid + 50.0).is_none());
    }

    #[test]
    fn view_follows_live_edge_only_when_already_there() {
        let mut chart = chart();
        let total = 200u64;
        for i in 0..total {
            chart.update_latest_bar(&bar(i * MIN, 100.0, 101.0), i * MIN);
        }
        let offset_at_edge = chart.chart.view_offset;
        assert!(offset_at_edge > 0.0);

        // scroll back into history, then append: view must not jump
        chart.chart.view_offset = 10.0;
        chart.update_latest_bar(&bar(total * MIN, 100.0, 101.0), total * MIN);
        assert_eq!(chart.chart.view_offset, 10.0);
    }
}
