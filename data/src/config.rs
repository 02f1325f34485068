use feed::Timeframe;
use serde::{Deserialize, Serialize};

fn default_timeframe() -> Timeframe {
    Timeframe::M1
}

fn default_true() -> bool {
    true
}

/// Application state persisted to `saved-state.json` on exit and restored
/// on launch. Unknown fields are ignored so older files keep loading.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct State {
    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,
    #[serde(default = "default_true")]
    pub show_vwap: bool,
    #[serde(default = "default_true")]
    pub show_heatmap: bool,
    #[serde(default)]
    pub window_size: Option<(f32, f32)>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::M1,
            show_vwap: true,
            show_heatmap: true,
            window_size: None,
        }
    }
}
