use iced::widget::canvas::{LineDash, Stroke, stroke};
use iced::widget::rule;
use iced::{Color, Theme};

pub const AXIS_FONT: iced::Font = iced::Font::MONOSPACE;

/// Semantic color slots the chart asks its [`ColorProvider`] for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRole {
    BullishCandle,
    BearishCandle,
    VwapLine,
    VwapBand,
    BidDepth,
    AskDepth,
    Liquidation,
    Whale,
}

/// Resolves chart colors against the active theme. Injected so embedders
/// can restyle the chart without touching the render pipeline.
pub trait ColorProvider {
    fn color(&self, role: ColorRole, theme: &Theme) -> Color;
}

/// Palette-derived defaults.
pub struct DefaultColors;

impl ColorProvider for DefaultColors {
    fn color(&self, role: ColorRole, theme: &Theme) -> Color {
        let palette = theme.extended_palette();

        match role {
            ColorRole::BullishCandle => palette.success.base.color,
            ColorRole::BearishCandle => palette.danger.base.color,
            ColorRole::VwapLine => palette.primary.base.color,
            ColorRole::VwapBand => palette.primary.weak.color.scale_alpha(0.6),
            ColorRole::BidDepth => palette.success.weak.color,
            ColorRole::AskDepth => palette.danger.weak.color,
            ColorRole::Liquidation => palette.danger.strong.color,
            ColorRole::Whale => palette.warning.base.color,
        }
    }
}

pub fn dashed_line(theme: &Theme) -> Stroke<'_> {
    let palette = theme.extended_palette();

    Stroke {
        width: 1.0,
        line_dash: LineDash {
            segments: &[2.0, 2.0],
            offset: 4,
        },
        style: stroke::Style::Solid(palette.secondary.strong.color.scale_alpha(0.6)),
        ..Default::default()
    }
}

pub fn split_ruler(theme: &Theme) -> rule::Style {
    let palette = theme.extended_palette();

    rule::Style {
        color: palette.secondary.strong.color.scale_alpha(0.5),
        ..rule::default(theme)
    }
}
