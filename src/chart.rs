pub mod candles;
pub mod overlay;
pub mod scale;

use iced::theme::palette::Extended;
use iced::widget::canvas::{self, Cache, Canvas, Event, Frame, Path};
use iced::widget::{Space, center, column, mouse_area, row, rule, text};
use iced::{Element, Length, Point, Rectangle, Size, Theme, mouse};

use data::util::round_to_tick;
use feed::Timeframe;

use crate::style;
use scale::linear::PriceInfoLabel;
use scale::{AxisLabelsX, AxisLabelsY};

pub const TEXT_SIZE: f32 = 12.0;

pub const MIN_VISIBLE_BARS: f32 = 10.0;
pub const MAX_VISIBLE_BARS: f32 = 750.0;
pub const DEFAULT_VISIBLE_BARS: f32 = 120.0;

pub const ZOOM_IN_FACTOR: f32 = 0.9;
pub const ZOOM_OUT_FACTOR: f32 = 1.1;

pub const MIN_PRICE_SPAN: f32 = 10.0;
const PRICE_EPSILON: f32 = 1e-6;

const RANGE_PADDING: f32 = 0.1;
const RANGE_SMOOTHING: f32 = 0.3;

/// Placeholder range the price scale holds until the first fit, and the
/// range a zoom reset returns to so the next fit snaps instead of easing.
pub const SENTINEL_RANGE: (f32, f32) = (0.0, 100_000.0);

const X_AXIS_HEIGHT: f32 = 26.0;

#[derive(Debug, Clone, Copy, Default)]
pub enum Interaction {
    #[default]
    Idle,
    DraggingChart {
        start: Point,
        start_offset: f32,
        start_min: f32,
        start_max: f32,
    },
    DraggingPriceScale {
        start: Point,
        start_min: f32,
        start_max: f32,
    },
    ZoomingTimeScale {
        last_position: Point,
    },
}

#[derive(Debug, Clone, Copy)]
pub enum Message {
    BoundsChanged(Rectangle),
    Panned {
        view_offset: f32,
        min_price: f32,
        max_price: f32,
    },
    ZoomedX {
        visible_bar_count: f32,
        view_offset: f32,
    },
    PriceScaled {
        min_price: f32,
        max_price: f32,
    },
    CrosshairMoved,
    ResetZoom,
}

enum Invalidate {
    All,
    Crosshair,
}

pub trait Chart: canvas::Program<Message> {
    fn state(&self) -> &ViewState;

    fn mut_state(&mut self) -> &mut ViewState;

    fn invalidate_all(&mut self);

    fn invalidate_crosshair(&mut self);

    fn is_empty(&self) -> bool;

    fn bar_count(&self) -> usize;

    /// Interval-open time of the oldest bar, for time-axis labeling.
    fn first_bar_time(&self) -> Option<u64>;

    fn best_bid_ask(&self) -> (Option<f32>, Option<f32>);
}

/// Shared pointer handling for the chart body canvas.
pub fn canvas_interaction<T: Chart>(
    chart: &T,
    interaction: &mut Interaction,
    event: &Event,
    bounds: Rectangle,
    cursor: mouse::Cursor,
) -> Option<canvas::Action<Message>> {
    if let Event::Mouse(mouse::Event::ButtonReleased(_)) = event {
        *interaction = Interaction::Idle;
        return Some(canvas::Action::request_redraw());
    }

    let state = chart.state();
    if state.bounds != bounds {
        return Some(canvas::Action::publish(Message::BoundsChanged(bounds)));
    }

    let cursor_position = cursor.position_in(bounds)?;

    match event {
        Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
            *interaction = Interaction::DraggingChart {
                start: cursor_position,
                start_offset: state.view_offset,
                start_min: state.min_price,
                start_max: state.max_price,
            };
            Some(canvas::Action::capture())
        }
        Event::Mouse(mouse::Event::CursorMoved { .. }) => match *interaction {
            Interaction::DraggingChart {
                start,
                start_offset,
                start_min,
                start_max,
            } => {
                let bar_width = state.bar_width();
                if bar_width <= 0.0 || bounds.height <= 0.0 {
                    return None;
                }

                let delta_x = cursor_position.x - start.x;
                let max_offset = chart.bar_count() as f32;
                let view_offset = (start_offset - delta_x / bar_width).clamp(0.0, max_offset);

                // dragging the body vertically slides the window without
                // claiming the price scale for manual control
                let price_per_px = (start_max - start_min) / bounds.height;
                let shift = (cursor_position.y - start.y) * price_per_px;

                Some(
                    canvas::Action::publish(Message::Panned {
                        view_offset,
                        min_price: start_min + shift,
                        max_price: start_max + shift,
                    })
                    .and_capture(),
                )
            }
            Interaction::Idle => Some(canvas::Action::publish(Message::CrosshairMoved)),
            _ => None,
        },
        Event::Mouse(mouse::Event::WheelScrolled { delta }) => {
            let scroll = match delta {
                mouse::ScrollDelta::Lines { y, .. } => *y,
                mouse::ScrollDelta::Pixels { y, .. } => y / 30.0,
            };
            if scroll == 0.0 {
                return None;
            }

            let factor = if scroll > 0.0 {
                ZOOM_IN_FACTOR
            } else {
                ZOOM_OUT_FACTOR
            };
            let (visible_bar_count, view_offset) =
                state.anchored_zoom(cursor_position.x, factor, chart.bar_count());

            Some(
                canvas::Action::publish(Message::ZoomedX {
                    visible_bar_count,
                    view_offset,
                })
                .and_capture(),
            )
        }
        _ => None,
    }
}

pub fn update<T: Chart>(chart: &mut T, message: &Message) {
    let bar_count = chart.bar_count();
    match chart.mut_state().apply(message, bar_count) {
        Invalidate::Crosshair => chart.invalidate_crosshair(),
        Invalidate::All => chart.invalidate_all(),
    }
}

pub fn view<'a, T: Chart>(chart: &'a T) -> Element<'a, Message> {
    if chart.is_empty() {
        return center(text("Waiting for data...").size(16)).into();
    }

    let state = chart.state();
    let y_labels_width = state.y_labels_width();
    let (best_bid, best_ask) = chart.best_bid_ask();

    let chart_canvas = Canvas::new(chart)
        .width(Length::Fill)
        .height(Length::Fill);

    let axis_y = Canvas::new(AxisLabelsY {
        labels_cache: &state.cache.y_labels,
        min_price: state.min_price,
        max_price: state.max_price,
        tick_size: state.tick_size,
        decimals: state.decimals,
        interval: state.interval,
        last_price: state.last_price,
        best_bid,
        best_ask,
        chart_bounds: state.bounds,
    })
    .width(Length::Fixed(y_labels_width))
    .height(Length::Fill);

    let axis_x = Canvas::new(AxisLabelsX {
        labels_cache: &state.cache.x_labels,
        view_offset: state.view_offset,
        visible_bar_count: state.visible_bar_count,
        bar_count: chart.bar_count(),
        first_time: chart.first_bar_time(),
        interval: state.interval,
        chart_bounds: state.bounds,
    })
    .width(Length::Fill)
    .height(Length::Fixed(X_AXIS_HEIGHT));

    column![
        row![
            chart_canvas,
            rule::vertical(1).style(style::split_ruler),
            mouse_area(axis_y).on_double_click(Message::ResetZoom),
        ],
        rule::horizontal(1).style(style::split_ruler),
        row![axis_x, Space::new()
                .width(Length::Fixed(y_labels_width))
                .height(Length::Fill)],
    ]
    .into()
}

#[derive(Default)]
pub struct Caches {
    pub main: Cache,
    pub x_labels: Cache,
    pub y_labels: Cache,
    pub crosshair: Cache,
}

impl Caches {
    pub fn clear_all(&self) {
        self.main.clear();
        self.x_labels.clear();
        self.y_labels.clear();
        self.crosshair.clear();
    }

    /// The axis caches hold the crosshair tags, so they refresh with it.
    pub fn clear_crosshair(&self) {
        self.x_labels.clear();
        self.y_labels.clear();
        self.crosshair.clear();
    }
}

/// Viewport of the chart: which bars are visible horizontally and which
/// price band is visible vertically, plus the caches keyed off them.
pub struct ViewState {
    pub cache: Caches,
    pub bounds: Rectangle,
    pub view_offset: f32,
    pub visible_bar_count: f32,
    pub min_price: f32,
    pub max_price: f32,
    pub price_scale_manually_set: bool,
    relock_after_fit: bool,
    pub interval: Timeframe,
    pub tick_size: f32,
    pub decimals: usize,
    pub last_price: Option<PriceInfoLabel>,
}

impl ViewState {
    pub fn new(interval: Timeframe, tick_size: f32) -> Self {
        Self {
            cache: Caches::default(),
            bounds: Rectangle::default(),
            view_offset: 0.0,
            visible_bar_count: DEFAULT_VISIBLE_BARS,
            min_price: SENTINEL_RANGE.0,
            max_price: SENTINEL_RANGE.1,
            price_scale_manually_set: false,
            relock_after_fit: false,
            interval,
            tick_size,
            decimals: data::util::count_decimals(tick_size),
            last_price: None,
        }
    }

    pub fn bar_width(&self) -> f32 {
        self.bounds.width / self.visible_bar_count
    }

    pub fn price_to_y(&self, price: f32) -> f32 {
        let clamped = price.clamp(self.min_price, self.max_price);
        let range = (self.max_price - self.min_price).max(PRICE_EPSILON);
        (1.0 - (clamped - self.min_price) / range) * self.bounds.height
    }

    pub fn y_to_price(&self, y: f32) -> f32 {
        let range = (self.max_price - self.min_price).max(PRICE_EPSILON);
        let price = self.max_price - (y / self.bounds.height) * range;
        if price.is_finite() { price } else { 0.0 }
    }

    pub fn bar_index_to_x(&self, index: f32) -> f32 {
        let bar_width = self.bar_width();
        (index - self.view_offset) * bar_width + bar_width / 2.0
    }

    pub fn x_to_bar_index(&self, x: f32) -> f32 {
        self.view_offset + x / self.bar_width() - 0.5
    }

    /// Sequence indices whose bar centers fall inside the viewport.
    pub fn visible_index_range(&self) -> (f32, f32) {
        (
            self.view_offset - 0.5,
            self.view_offset + self.visible_bar_count - 0.5,
        )
    }

    /// Horizontal zoom that keeps the bar under the cursor stationary.
    pub fn anchored_zoom(&self, cursor_x: f32, factor: f32, bar_count: usize) -> (f32, f32) {
        let anchor_index = self.x_to_bar_index(cursor_x);

        let visible_bar_count =
            (self.visible_bar_count * factor).clamp(MIN_VISIBLE_BARS, MAX_VISIBLE_BARS);
        let new_bar_width = self.bounds.width / visible_bar_count;

        let view_offset =
            (anchor_index + 0.5 - cursor_x / new_bar_width).clamp(0.0, bar_count as f32);

        (visible_bar_count, view_offset)
    }

    /// Moves the price range toward a fit of the visible bars: padded by
    /// 10% of the data span, snapped when leaving the sentinel, eased
    /// otherwise so live updates do not jolt the scale.
    pub fn autofit(&mut self, visible_low: f32, visible_high: f32) {
        let (mut low, mut high) = (visible_low, visible_high);
        if (high - low).abs() < PRICE_EPSILON {
            low -= 1.0;
            high += 1.0;
        }

        let padding = (high - low) * RANGE_PADDING;
        let target_min = low - padding;
        let target_max = high + padding;

        let at_sentinel = (self.min_price, self.max_price) == SENTINEL_RANGE
            || !self.min_price.is_finite()
            || !self.max_price.is_finite();

        if at_sentinel {
            self.min_price = target_min;
            self.max_price = target_max;

            if self.relock_after_fit {
                self.price_scale_manually_set = true;
                self.relock_after_fit = false;
            }
        } else {
            self.min_price += (target_min - self.min_price) * RANGE_SMOOTHING;
            self.max_price += (target_max - self.max_price) * RANGE_SMOOTHING;
        }
    }

    /// Zoom reset: release the manual hold and park on the sentinel so the
    /// next fit snaps, then re-take the hold at that fitted range.
    pub fn reset_price_range(&mut self) {
        self.min_price = SENTINEL_RANGE.0;
        self.max_price = SENTINEL_RANGE.1;
        self.price_scale_manually_set = false;
        self.relock_after_fit = true;
    }

    fn apply(&mut self, message: &Message, bar_count: usize) -> Invalidate {
        match message {
            Message::BoundsChanged(bounds) => {
                self.bounds = *bounds;
                Invalidate::All
            }
            Message::Panned {
                view_offset,
                min_price,
                max_price,
            } => {
                self.view_offset = view_offset.clamp(0.0, bar_count as f32);
                self.min_price = *min_price;
                self.max_price = *max_price;
                Invalidate::All
            }
            Message::ZoomedX {
                visible_bar_count,
                view_offset,
            } => {
                self.visible_bar_count =
                    visible_bar_count.clamp(MIN_VISIBLE_BARS, MAX_VISIBLE_BARS);
                self.view_offset = view_offset.clamp(0.0, bar_count as f32);
                Invalidate::All
            }
            Message::PriceScaled {
                min_price,
                max_price,
            } => {
                let (min, max) = enforce_min_span(*min_price, *max_price);
                self.min_price = min;
                self.max_price = max;
                self.price_scale_manually_set = true;
                Invalidate::All
            }
            Message::ResetZoom => {
                self.reset_price_range();
                Invalidate::All
            }
            Message::CrosshairMoved => Invalidate::Crosshair,
        }
    }

    pub fn y_labels_width(&self) -> f32 {
        let sample = format!("{:.*}", self.decimals, self.max_price.max(self.min_price.abs()));
        (sample.len() as f32 * TEXT_SIZE * 0.8 + 12.0).max(60.0)
    }

    /// Draws the crosshair snapped to the tick grid and the nearest bar
    /// center. Returns the snapped price and bar index for the axis tags.
    pub fn draw_crosshair(
        &self,
        frame: &mut Frame,
        theme: &Theme,
        region: Size,
        cursor_position: Point,
    ) -> (f32, f32) {
        let dashed = style::dashed_line(theme);

        let rounded_price = round_to_tick(self.y_to_price(cursor_position.y), self.tick_size);
        let snap_y = self.price_to_y(rounded_price);

        frame.stroke(
            &Path::line(
                Point::new(0.0, snap_y),
                Point::new(region.width, snap_y),
            ),
            dashed,
        );

        let snapped_index = self.x_to_bar_index(cursor_position.x).round();
        let snap_x = self.bar_index_to_x(snapped_index);

        frame.stroke(
            &Path::line(
                Point::new(snap_x, 0.0),
                Point::new(snap_x, region.height),
            ),
            dashed,
        );

        (rounded_price, snapped_index)
    }

    pub fn draw_last_price_line(
        &self,
        frame: &mut Frame,
        palette: &Extended,
        region: Size,
    ) {
        if let Some(label) = self.last_price {
            let (price, color) = label.get_with_color(palette);
            let y = self.price_to_y(price);

            frame.stroke(
                &Path::line(Point::new(0.0, y), Point::new(region.width, y)),
                canvas::Stroke {
                    width: 1.0,
                    line_dash: canvas::LineDash {
                        segments: &[2.0, 2.0],
                        offset: 4,
                    },
                    style: canvas::stroke::Style::Solid(color.scale_alpha(0.5)),
                    ..Default::default()
                },
            );
        }
    }
}

fn enforce_min_span(min: f32, max: f32) -> (f32, f32) {
    if max - min < MIN_PRICE_SPAN {
        let center = (min + max) / 2.0;
        (center - MIN_PRICE_SPAN / 2.0, center + MIN_PRICE_SPAN / 2.0)
    } else {
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_state() -> ViewState {
        let mut state = ViewState::new(Timeframe::M1, 0.1);
        state.bounds = Rectangle::with_size(Size::new(800.0, 600.0));
        state.view_offset = 10.0;
        state.visible_bar_count = 60.0;
        state.min_price = 100.0;
        state.max_price = 200.0;
        state
    }

    #[test]
    fn price_roundtrip_is_exact_within_range() {
        let state = view_state();
        for price in [100.0, 123.4, 177.7, 200.0] {
            let back = state.y_to_price(state.price_to_y(price));
            assert!((back - price).abs() < 1e-3, "{price} -> {back}");
        }
    }

    #[test]
    fn price_to_y_clamps_out_of_range() {
        let state = view_state();
        assert_eq!(state.price_to_y(500.0), 0.0);
        assert_eq!(state.price_to_y(-50.0), state.bounds.height);
    }

    #[test]
    fn index_roundtrip_is_exact() {
        let state = view_state();
        for index in [10.0, 25.5, 69.0] {
            let back = state.x_to_bar_index(state.bar_index_to_x(index));
            assert!((back - index).abs() < 1e-3);
        }
    }

    #[test]
    fn degenerate_price_range_maps_to_midline_not_nan() {
        let mut state = view_state();
        state.min_price = 150.0;
        state.max_price = 150.0;
        assert!(state.price_to_y(150.0).is_finite());
        assert!(state.y_to_price(300.0).is_finite());
    }

    #[test]
    fn anchored_zoom_keeps_cursor_bar_stationary() {
        let mut state = view_state();
        let cursor_x = 300.0;
        let anchor_index = state.x_to_bar_index(cursor_x);
        let x_before = state.bar_index_to_x(anchor_index);

        let (count, offset) = state.anchored_zoom(cursor_x, ZOOM_IN_FACTOR, 1000);
        assert!((count - 54.0).abs() < 1e-3);

        state.visible_bar_count = count;
        state.view_offset = offset;
        let x_after = state.bar_index_to_x(anchor_index);

        assert!((x_after - x_before).abs() <= 1.0);
    }

    #[test]
    fn zoom_clamps_visible_bar_count() {
        let mut state = view_state();
        state.visible_bar_count = 11.0;
        let (count, _) = state.anchored_zoom(400.0, 0.5, 1000);
        assert_eq!(count, MIN_VISIBLE_BARS);

        state.visible_bar_count = 700.0;
        let (count, _) = state.anchored_zoom(400.0, 2.0, 1000);
        assert_eq!(count, MAX_VISIBLE_BARS);
    }

    #[test]
    fn first_fit_snaps_with_ten_percent_padding() {
        let mut state = view_state();
        state.min_price = SENTINEL_RANGE.0;
        state.max_price = SENTINEL_RANGE.1;

        state.autofit(100.0, 200.0);

        assert!((state.min_price - 90.0).abs() < 1e-3);
        assert!((state.max_price - 210.0).abs() < 1e-3);
    }

    #[test]
    fn later_fits_ease_toward_target() {
        let mut state = view_state();
        state.min_price = 90.0;
        state.max_price = 210.0;

        state.autofit(150.0, 250.0);

        // target is [140, 260]; one step covers 30% of the distance
        assert!((state.min_price - 105.0).abs() < 1e-3);
        assert!((state.max_price - 225.0).abs() < 1e-3);
    }

    #[test]
    fn degenerate_fit_widens_by_one() {
        let mut state = view_state();
        state.min_price = SENTINEL_RANGE.0;
        state.max_price = SENTINEL_RANGE.1;

        state.autofit(150.0, 150.0);

        assert!(state.min_price < 149.0 + 1e-3);
        assert!(state.max_price > 151.0 - 1e-3);
    }

    #[test]
    fn manual_scaling_sets_and_keeps_the_hold() {
        let mut state = view_state();
        state.apply(
            &Message::PriceScaled {
                min_price: 120.0,
                max_price: 180.0,
            },
            1000,
        );
        assert!(state.price_scale_manually_set);

        // panning and zooming do not release the hold
        state.apply(
            &Message::Panned {
                view_offset: 5.0,
                min_price: 125.0,
                max_price: 185.0,
            },
            1000,
        );
        state.apply(
            &Message::ZoomedX {
                visible_bar_count: 80.0,
                view_offset: 5.0,
            },
            1000,
        );
        assert!(state.price_scale_manually_set);
    }

    #[test]
    fn price_scale_enforces_minimum_span() {
        let mut state = view_state();
        state.apply(
            &Message::PriceScaled {
                min_price: 149.0,
                max_price: 151.0,
            },
            1000,
        );
        assert_eq!(state.max_price - state.min_price, MIN_PRICE_SPAN);
        assert_eq!((state.min_price + state.max_price) / 2.0, 150.0);
    }

    #[test]
    fn reset_zoom_unlocks_then_relocks_after_the_snap() {
        let mut state = view_state();
        state.price_scale_manually_set = true;

        state.apply(&Message::ResetZoom, 1000);
        assert!(!state.price_scale_manually_set);
        assert_eq!((state.min_price, state.max_price), SENTINEL_RANGE);

        state.autofit(100.0, 200.0);
        assert!(state.price_scale_manually_set);
        assert!((state.min_price - 90.0).abs() < 1e-3);

        // a later reset-free fit cycle must not re-lock on its own
        state.price_scale_manually_set = false;
        state.autofit(100.0, 200.0);
        assert!(!state.price_scale_manually_set);
    }

    #[test]
    fn view_offset_clamps_to_bar_count() {
        let mut state = view_state();
        state.apply(
            &Message::Panned {
                view_offset: 5000.0,
                min_price: 100.0,
                max_price: 200.0,
            },
            300,
        );
        assert_eq!(state.view_offset, 300.0);

        state.apply(
            &Message::ZoomedX {
                visible_bar_count: 60.0,
                view_offset: -12.0,
            },
            300,
        );
        assert_eq!(state.view_offset, 0.0);
    }
}
