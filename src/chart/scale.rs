pub mod linear;
pub mod timeseries;

use iced::widget::canvas::{self, Cache, Event, Frame, Geometry};
use iced::{Alignment, Color, Point, Rectangle, Renderer, Size, Theme, mouse};

use data::util::round_to_tick;
use feed::Timeframe;

use super::{
    Interaction, MAX_VISIBLE_BARS, MIN_VISIBLE_BARS, Message, TEXT_SIZE, ZOOM_IN_FACTOR,
    ZOOM_OUT_FACTOR,
};
use crate::style;
use linear::PriceInfoLabel;

const LABEL_PADDING: f32 = 4.0;

/// How far a drag across the time axis scales the visible bar count.
const X_SCALING_SENSITIVITY: f32 = 0.01;

pub struct LabelContent {
    pub content: String,
    pub background_color: Option<Color>,
    pub text_color: Color,
    pub text_size: f32,
}

pub enum AxisLabel {
    X { position: f32, content: LabelContent },
    Y { position: f32, content: LabelContent },
}

impl AxisLabel {
    fn rect(&self, region: Size) -> Rectangle {
        match self {
            AxisLabel::X { position, content } => {
                let width = content.content.len() as f32 * content.text_size * 0.6;
                Rectangle {
                    x: position - width / 2.0,
                    y: 0.0,
                    width,
                    height: region.height,
                }
            }
            AxisLabel::Y { position, content } => {
                let lines = content.content.lines().count().max(1) as f32;
                let height = lines * (content.text_size + 2.0) + LABEL_PADDING;
                Rectangle {
                    x: 0.0,
                    y: position - height / 2.0,
                    width: region.width,
                    height,
                }
            }
        }
    }

    fn draw(&self, frame: &mut Frame) {
        let rect = self.rect(frame.size());

        let (content, position) = match self {
            AxisLabel::X { position, content } => {
                (content, Point::new(*position, frame.height() / 2.0))
            }
            AxisLabel::Y { position, content } => {
                (content, Point::new(LABEL_PADDING, *position))
            }
        };

        if let Some(background) = content.background_color {
            frame.fill_rectangle(rect.position(), rect.size(), background);
        }

        let align_x = match self {
            AxisLabel::X { .. } => iced::widget::text::Alignment::Center,
            AxisLabel::Y { .. } => iced::widget::text::Alignment::Left,
        };

        frame.fill_text(canvas::Text {
            content: content.content.clone(),
            position,
            size: content.text_size.into(),
            color: content.text_color,
            font: style::AXIS_FONT,
            align_x,
            align_y: Alignment::Center.into(),
            ..Default::default()
        });
    }
}

/// Draws labels back-to-front so that later entries win collisions; a
/// label overlapping an already drawn one is skipped entirely.
pub fn filter_and_draw(labels: &[AxisLabel], frame: &mut Frame) {
    let mut occupied: Vec<Rectangle> = Vec::with_capacity(labels.len());

    for label in labels.iter().rev() {
        let rect = label.rect(frame.size());

        if occupied.iter().any(|taken| taken.intersects(&rect)) {
            continue;
        }

        label.draw(frame);
        occupied.push(rect);
    }
}

/// Spreads overlapping tag rows downward so each keeps `min_gap` of room.
/// Input order is preserved; positions are adjusted in place.
pub fn push_apart_rows(positions: &mut [f32], min_gap: f32) {
    let mut order: Vec<usize> = (0..positions.len()).collect();
    order.sort_by(|&a, &b| positions[a].total_cmp(&positions[b]));

    for pair in order.windows(2) {
        let (above, below) = (pair[0], pair[1]);
        if positions[below] < positions[above] + min_gap {
            positions[below] = positions[above] + min_gap;
        }
    }
}

/// Price gutter on the right edge. Dragging stretches the range around
/// its center; scrolling zooms around the price under the cursor. Both
/// take manual control of the scale.
pub struct AxisLabelsY<'a> {
    pub labels_cache: &'a Cache,
    pub min_price: f32,
    pub max_price: f32,
    pub tick_size: f32,
    pub decimals: usize,
    pub interval: Timeframe,
    pub last_price: Option<PriceInfoLabel>,
    pub best_bid: Option<f32>,
    pub best_ask: Option<f32>,
    pub chart_bounds: Rectangle,
}

impl AxisLabelsY<'_> {
    fn price_to_y(&self, price: f32, height: f32) -> f32 {
        let range = (self.max_price - self.min_price).max(f32::EPSILON);
        (1.0 - (price - self.min_price) / range) * height
    }

    fn y_to_price(&self, y: f32, height: f32) -> f32 {
        let range = (self.max_price - self.min_price).max(f32::EPSILON);
        self.max_price - (y / height) * range
    }
}

impl canvas::Program<Message> for AxisLabelsY<'_> {
    type State = Interaction;

    fn update(
        &self,
        interaction: &mut Interaction,
        event: &Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<canvas::Action<Message>> {
        if let Event::Mouse(mouse::Event::ButtonReleased(_)) = event {
            *interaction = Interaction::Idle;
            return Some(canvas::Action::request_redraw());
        }

        let cursor_position = cursor.position_in(bounds)?;

        match event {
            Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                *interaction = Interaction::DraggingPriceScale {
                    start: cursor_position,
                    start_min: self.min_price,
                    start_max: self.max_price,
                };
                Some(canvas::Action::capture())
            }
            Event::Mouse(mouse::Event::CursorMoved { .. }) => {
                if let Interaction::DraggingPriceScale {
                    start,
                    start_min,
                    start_max,
                } = *interaction
                {
                    let height = self.chart_bounds.height.max(1.0);
                    let factor = (1.0 + (cursor_position.y - start.y) / height).max(0.01);

                    let center = (start_min + start_max) / 2.0;
                    let half_span = (start_max - start_min) / 2.0 * factor;

                    Some(
                        canvas::Action::publish(Message::PriceScaled {
                            min_price: center - half_span,
                            max_price: center + half_span,
                        })
                        .and_capture(),
                    )
                } else {
                    None
                }
            }
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

                let cursor_price = self.y_to_price(cursor_position.y, bounds.height);
                let min_price = cursor_price - (cursor_price - self.min_price) * factor;
                let max_price = cursor_price + (self.max_price - cursor_price) * factor;

                Some(
                    canvas::Action::publish(Message::PriceScaled {
                        min_price,
                        max_price,
                    })
                    .and_capture(),
                )
            }
            _ => None,
        }
    }

    fn draw(
        &self,
        _interaction: &Interaction,
        renderer: &Renderer,
        theme: &Theme,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let palette = theme.extended_palette();

        let labels = self.labels_cache.draw(renderer, bounds.size(), |frame| {
            let mut labels: Vec<AxisLabel> = Vec::new();

            let labels_can_fit = (bounds.height / (TEXT_SIZE * 3.0)) as i32;
            let (tick_step, first_tick) =
                linear::calc_optimal_ticks(self.max_price, self.min_price, labels_can_fit);

            let mut tick = first_tick;
            let mut iterations = 0;
            while tick <= self.max_price && iterations < linear::MAX_TICK_ITERATIONS {
                labels.push(AxisLabel::Y {
                    position: self.price_to_y(tick, bounds.height),
                    content: LabelContent {
                        content: format!("{:.*}", self.decimals, tick),
                        background_color: None,
                        text_color: palette.background.base.text.scale_alpha(0.8),
                        text_size: TEXT_SIZE,
                    },
                });
                tick += tick_step;
                iterations += 1;
            }

            // bid/ask/last tags cluster near the spread; spread them out
            // rather than letting the collision filter drop any of them
            let mut tag_rows: Vec<(f32, String, Color, Color)> = Vec::new();

            if let Some(bid) = self.best_bid {
                tag_rows.push((
                    self.price_to_y(bid, bounds.height),
                    format!("{:.*}", self.decimals, bid),
                    palette.success.weak.color,
                    palette.success.weak.text,
                ));
            }
            if let Some(ask) = self.best_ask {
                tag_rows.push((
                    self.price_to_y(ask, bounds.height),
                    format!("{:.*}", self.decimals, ask),
                    palette.danger.weak.color,
                    palette.danger.weak.text,
                ));
            }
            if let Some(label) = self.last_price {
                let (price, color) = label.get_with_color(palette);
                let countdown = timer_label(self.interval);
                tag_rows.push((
                    self.price_to_y(price, bounds.height),
                    format!("{:.*}\n{}", self.decimals, price, countdown),
                    color,
                    palette.background.base.color,
                ));
            }

            let mut positions: Vec<f32> = tag_rows.iter().map(|(y, ..)| *y).collect();
            push_apart_rows(&mut positions, TEXT_SIZE + LABEL_PADDING * 2.0);

            for ((_, content, background, text_color), position) in
                tag_rows.into_iter().zip(positions)
            {
                labels.push(AxisLabel::Y {
                    position,
                    content: LabelContent {
                        content,
                        background_color: Some(background),
                        text_color,
                        text_size: TEXT_SIZE,
                    },
                });
            }

            if let Some(cursor_position) = cursor.position_in(self.chart_bounds) {
                let price = round_to_tick(
                    self.y_to_price(cursor_position.y, self.chart_bounds.height),
                    self.tick_size,
                );
                labels.push(AxisLabel::Y {
                    position: self.price_to_y(price, bounds.height),
                    content: LabelContent {
                        content: format!("{:.*}", self.decimals, price),
                        background_color: Some(palette.secondary.base.color),
                        text_color: palette.secondary.base.text,
                        text_size: TEXT_SIZE,
                    },
                });
            }

            filter_and_draw(&labels, frame);
        });

        vec![labels]
    }

    fn mouse_interaction(
        &self,
        interaction: &Interaction,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        if matches!(interaction, Interaction::DraggingPriceScale { .. })
            || cursor.is_over(bounds)
        {
            mouse::Interaction::ResizingVertically
        } else {
            mouse::Interaction::default()
        }
    }
}

/// Remaining time until the current interval closes.
fn timer_label(interval: Timeframe) -> String {
    let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let interval_ms = interval.to_milliseconds();
    let remaining_secs = (interval_ms - now_ms % interval_ms) / 1000;

    let (hours, minutes, seconds) = (
        remaining_secs / 3600,
        (remaining_secs % 3600) / 60,
        remaining_secs % 60,
    );

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Time ruler along the bottom edge. Dragging or scrolling rescales the
/// visible bar count anchored at the right edge of the view.
pub struct AxisLabelsX<'a> {
    pub labels_cache: &'a Cache,
    pub view_offset: f32,
    pub visible_bar_count: f32,
    pub bar_count: usize,
    pub first_time: Option<u64>,
    pub interval: Timeframe,
    pub chart_bounds: Rectangle,
}

impl AxisLabelsX<'_> {
    fn rescaled(&self, factor: f32) -> Message {
        let visible_bar_count =
            (self.visible_bar_count * factor).clamp(MIN_VISIBLE_BARS, MAX_VISIBLE_BARS);

        let right_edge = self.view_offset + self.visible_bar_count;
        let view_offset = (right_edge - visible_bar_count).clamp(0.0, self.bar_count as f32);

        Message::ZoomedX {
            visible_bar_count,
            view_offset,
        }
    }

    /// Interval-open time at a (possibly fractional, possibly future)
    /// sequence index, assuming a gapless series.
    fn time_at_index(&self, index: f64) -> Option<f64> {
        let first = self.first_time? as f64;
        Some(first + index * self.interval.to_milliseconds() as f64)
    }
}

impl canvas::Program<Message> for AxisLabelsX<'_> {
    type State = Interaction;

    fn update(
        &self,
        interaction: &mut Interaction,
        event: &Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<canvas::Action<Message>> {
        if let Event::Mouse(mouse::Event::ButtonReleased(_)) = event {
            *interaction = Interaction::Idle;
            return Some(canvas::Action::request_redraw());
        }

        let cursor_position = cursor.position_in(bounds)?;

        match event {
            Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                *interaction = Interaction::ZoomingTimeScale {
                    last_position: cursor_position,
                };
                Some(canvas::Action::capture())
            }
            Event::Mouse(mouse::Event::CursorMoved { .. }) => {
                if let Interaction::ZoomingTimeScale { last_position } = *interaction {
                    let delta_x = cursor_position.x - last_position.x;
                    *interaction = Interaction::ZoomingTimeScale {
                        last_position: cursor_position,
                    };

                    let factor = (1.0 - delta_x * X_SCALING_SENSITIVITY).max(0.01);
                    Some(canvas::Action::publish(self.rescaled(factor)).and_capture())
                } else {
                    None
                }
            }
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
                Some(canvas::Action::publish(self.rescaled(factor)).and_capture())
            }
            _ => None,
        }
    }

    fn draw(
        &self,
        _interaction: &Interaction,
        renderer: &Renderer,
        theme: &Theme,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let palette = theme.extended_palette();

        let labels = self.labels_cache.draw(renderer, bounds.size(), |frame| {
            let (Some(earliest), Some(latest)) = (
                self.time_at_index(self.view_offset as f64),
                self.time_at_index((self.view_offset + self.visible_bar_count) as f64),
            ) else {
                return;
            };
            let (earliest, latest) = (earliest.max(0.0) as u64, latest.max(0.0) as u64);
            if latest <= earliest {
                return;
            }

            let mut labels: Vec<AxisLabel> = Vec::new();

            let labels_can_fit = (bounds.width / (TEXT_SIZE * 10.0)).max(1.0) as u64;
            let (time_step, rounded_earliest) =
                timeseries::calc_time_step(earliest, latest, labels_can_fit, self.interval);

            let mut time = rounded_earliest;
            while time <= latest {
                let x = timeseries::calc_x_pos(time, earliest, latest, bounds.width);

                if timeseries::is_drawable(x, bounds.width)
                    && let Some(content) = timeseries::format_label(time)
                {
                    labels.push(AxisLabel::X {
                        position: x,
                        content: LabelContent {
                            content,
                            background_color: None,
                            text_color: palette.background.base.text.scale_alpha(0.8),
                            text_size: TEXT_SIZE,
                        },
                    });
                }

                time += time_step;
            }

            if let Some(cursor_position) = cursor.position_in(self.chart_bounds) {
                let bar_width = self.chart_bounds.width / self.visible_bar_count;
                let snapped_index =
                    (self.view_offset + cursor_position.x / bar_width - 0.5).round();

                if let Some(time) = self.time_at_index(snapped_index as f64)
                    && time >= 0.0
                    && let Some(content) = timeseries::format_crosshair_label(time as u64)
                {
                    let snap_x = (snapped_index - self.view_offset) * bar_width
                        + bar_width / 2.0;
                    labels.push(AxisLabel::X {
                        position: snap_x,
                        content: LabelContent {
                            content,
                            background_color: Some(palette.secondary.base.color),
                            text_color: palette.secondary.base.text,
                            text_size: TEXT_SIZE,
                        },
                    });
                }
            }

            filter_and_draw(&labels, frame);
        });

        vec![labels]
    }

    fn mouse_interaction(
        &self,
        interaction: &Interaction,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        if matches!(interaction, Interaction::ZoomingTimeScale { .. })
            || cursor.is_over(bounds)
        {
            mouse::Interaction::ResizingHorizontally
        } else {
            mouse::Interaction::default()
        }
    }
}
