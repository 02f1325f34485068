use serde::{Deserialize, Serialize};

/// Where a marker sits relative to its anchor bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Position {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum MarkerKind {
    Liquidation,
    Whale,
}

/// An externally-originated chart event (liquidation, whale print).
///
/// Markers are anchored to a bar by exact `time` match: if no bar with that
/// interval-open timestamp exists, the marker is not drawn. It is never
/// reassigned to a neighboring bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    /// Interval-open timestamp of the anchor bar, milliseconds.
    pub time: u64,
    pub position: Position,
    pub kind: MarkerKind,
    /// Event magnitude in dollars; scales the drawn glyph.
    pub size: f32,
}
