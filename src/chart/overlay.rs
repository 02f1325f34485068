use iced::widget::canvas::{Frame, Path};
use iced::{Color, Point, Theme};

use data::aggr::BarStore;
use feed::Bar;
use feed::marker::{Marker, MarkerKind, Position};

use super::ViewState;
use crate::style::{ColorProvider, ColorRole};

const MAX_RETAINED_MARKERS: usize = 200;
const MIN_GLYPH_SIZE: f32 = 4.0;
const MAX_GLYPH_SIZE: f32 = 12.0;
const GLYPH_GAP: f32 = 6.0;

/// Resolved geometry an overlay draws against. Anchoring is strict: a
/// marker only resolves if a bar with exactly its interval-open time is
/// stored, and it never re-anchors to a neighboring bar.
pub struct OverlayContext<'a> {
    store: &'a BarStore,
    view: &'a ViewState,
    cursor: Option<Point>,
}

impl<'a> OverlayContext<'a> {
    pub fn new(store: &'a BarStore, view: &'a ViewState, cursor: Option<Point>) -> Self {
        Self { store, view, cursor }
    }

    /// Screen x of the bar opening at `time`, with the bar itself for
    /// high/low placement. `None` when the bar was evicted or never seen;
    /// such markers simply are not drawn this frame.
    pub fn anchor(&self, time: u64) -> Option<(f32, &Bar)> {
        let index = self.store.index_of_time(time)?;
        let bar = self.store.get(time)?;
        Some((self.view.bar_index_to_x(index as f32), bar))
    }

    pub fn price_to_y(&self, price: f32) -> f32 {
        self.view.price_to_y(price)
    }

    pub fn bar_width(&self) -> f32 {
        self.view.bar_width()
    }

    pub fn view_offset(&self) -> f32 {
        self.view.view_offset
    }

    /// Pointer position in chart coordinates, as of the last full redraw.
    pub fn cursor(&self) -> Option<Point> {
        self.cursor
    }
}

/// A decoration layer drawn between the core chart content and the
/// crosshair. Implementations own their marker backlog.
pub trait MarkerOverlay {
    /// Feed event intake; called for every polled marker.
    fn on_marker(&mut self, marker: &Marker);

    fn draw(
        &self,
        frame: &mut Frame,
        ctx: &OverlayContext<'_>,
        colors: &dyn ColorProvider,
        theme: &Theme,
    );
}

fn glyph_size(marker_size: f32, bar_width: f32) -> f32 {
    let scaled = (marker_size / 50_000.0).sqrt() * 6.0;
    scaled.clamp(MIN_GLYPH_SIZE, MAX_GLYPH_SIZE).min(bar_width)
}

fn draw_triangle(frame: &mut Frame, center: Point, size: f32, pointing_down: bool, color: Color) {
    let half = size / 2.0;
    let tip_y = if pointing_down { half } else { -half };

    let path = Path::new(|builder| {
        builder.move_to(Point::new(center.x, center.y + tip_y));
        builder.line_to(Point::new(center.x - half, center.y - tip_y));
        builder.line_to(Point::new(center.x + half, center.y - tip_y));
        builder.close();
    });

    frame.fill(&path, color);
}

fn draw_marker_glyphs(
    markers: &[Marker],
    role: ColorRole,
    frame: &mut Frame,
    ctx: &OverlayContext<'_>,
    colors: &dyn ColorProvider,
    theme: &Theme,
) {
    let color = colors.color(role, theme);

    for marker in markers {
        let Some((x, bar)) = ctx.anchor(marker.time) else {
            continue;
        };

        let size = glyph_size(marker.size, ctx.bar_width());
        let (y, pointing_down) = match marker.position {
            Position::Above => (ctx.price_to_y(bar.high) - GLYPH_GAP - size / 2.0, true),
            Position::Below => (ctx.price_to_y(bar.low) + GLYPH_GAP + size / 2.0, false),
        };

        draw_triangle(frame, Point::new(x, y), size, pointing_down, color);
    }
}

fn retain_latest(markers: &mut Vec<Marker>) {
    if markers.len() > MAX_RETAINED_MARKERS {
        let excess = markers.len() - MAX_RETAINED_MARKERS;
        markers.drain(..excess);
    }
}

/// Triangles at forced-liquidation events, pointing at the bar extreme
/// on the side the event occurred.
#[derive(Default)]
pub struct LiquidationOverlay {
    markers: Vec<Marker>,
}

impl MarkerOverlay for LiquidationOverlay {
    fn on_marker(&mut self, marker: &Marker) {
        if marker.kind == MarkerKind::Liquidation {
            self.markers.push(*marker);
            retain_latest(&mut self.markers);
        }
    }

    fn draw(
        &self,
        frame: &mut Frame,
        ctx: &OverlayContext<'_>,
        colors: &dyn ColorProvider,
        theme: &Theme,
    ) {
        draw_marker_glyphs(&self.markers, ColorRole::Liquidation, frame, ctx, colors, theme);
    }
}

/// Triangles at outsized single trades.
#[derive(Default)]
pub struct WhaleOverlay {
    markers: Vec<Marker>,
}

impl MarkerOverlay for WhaleOverlay {
    fn on_marker(&mut self, marker: &Marker) {
        if marker.kind == MarkerKind::Whale {
            self.markers.push(*marker);
            retain_latest(&mut self.markers);
        }
    }

    fn draw(
        &self,
        frame: &mut Frame,
        ctx: &OverlayContext<'_>,
        colors: &dyn ColorProvider,
        theme: &Theme,
    ) {
        draw_marker_glyphs(&self.markers, ColorRole::Whale, frame, ctx, colors, theme);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed::Timeframe;
    use iced::{Rectangle, Size};

    const MIN: u64 = 60_000;

    fn setup() -> (BarStore, ViewState) {
        let mut store = BarStore::new(Timeframe::M1);
        for i in 0..10u64 {
            store.insert(
                Bar {
                    time: i * MIN,
                    open: 100.0,
                    high: 105.0,
                    low: 95.0,
                    close: 101.0,
                },
                10 * MIN,
            );
        }

        let mut view = ViewState::new(Timeframe::M1, 0.1);
        view.bounds = Rectangle::with_size(Size::new(800.0, 600.0));
        view.visible_bar_count = 10.0;
        view.min_price = 90.0;
        view.max_price = 110.0;

        (store, view)
    }

    #[test]
    fn anchor_requires_exact_bar_time() {
        let (store, view) = setup();
        let ctx = OverlayContext::new(&store, &view, None);

        assert!(ctx.anchor(3 * MIN).is_some());
        assert!(ctx.anchor(3 * MIN + 1).is_none());
        assert!(ctx.anchor(30 * MIN).is_none());
    }

    #[test]
    fn anchor_disappears_with_eviction_instead_of_moving() {
        let (mut store, view) = setup();
        assert!(OverlayContext::new(&store, &view, None).anchor(0).is_some());

        let total = (data::aggr::BAR_CAPACITY + 5) as u64;
        for i in 10..total {
            store.insert(
                Bar {
                    time: i * MIN,
                    open: 100.0,
                    high: 105.0,
                    low: 95.0,
                    close: 101.0,
                },
                total * MIN,
            );
        }

        assert!(OverlayContext::new(&store, &view, None).anchor(0).is_none());
    }

    #[test]
    fn overlays_only_keep_their_own_kind() {
        let mut liquidations = LiquidationOverlay::default();
        let mut whales = WhaleOverlay::default();

        let marker = Marker {
            time: 0,
            position: Position::Above,
            kind: MarkerKind::Whale,
            size: 100_000.0,
        };
        liquidations.on_marker(&marker);
        whales.on_marker(&marker);

        assert!(liquidations.markers.is_empty());
        assert_eq!(whales.markers.len(), 1);
    }

    #[test]
    fn marker_backlog_is_bounded() {
        let mut overlay = LiquidationOverlay::default();
        for i in 0..(MAX_RETAINED_MARKERS as u64 + 50) {
            overlay.on_marker(&Marker {
                time: i * MIN,
                position: Position::Below,
                kind: MarkerKind::Liquidation,
                size: 20_000.0,
            });
        }

        assert_eq!(overlay.markers.len(), MAX_RETAINED_MARKERS);
        assert_eq!(overlay.markers[0].time, 50 * MIN);
    }

    #[test]
    fn glyphs_scale_with_size_but_stay_bounded() {
        assert!(glyph_size(10_000.0, 80.0) < glyph_size(250_000.0, 80.0));
        assert_eq!(glyph_size(10_000_000.0, 80.0), MAX_GLYPH_SIZE);
        assert_eq!(glyph_size(1.0, 80.0), MIN_GLYPH_SIZE);
    }
}
