use chrono::{DateTime, Datelike, Timelike, Utc};
use feed::Timeframe;

const MINUTE: u64 = 60 * 1000;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

const M1_TIME_STEPS: [u64; 9] = [
    12 * HOUR,
    8 * HOUR,
    4 * HOUR,
    2 * HOUR,
    HOUR,
    30 * MINUTE,
    15 * MINUTE,
    5 * MINUTE,
    MINUTE,
];
const M3_TIME_STEPS: [u64; 8] = [
    DAY,
    12 * HOUR,
    8 * HOUR,
    4 * HOUR,
    2 * HOUR,
    HOUR,
    15 * MINUTE,
    3 * MINUTE,
];
const M5_TIME_STEPS: [u64; 7] = [
    DAY,
    12 * HOUR,
    4 * HOUR,
    2 * HOUR,
    HOUR,
    30 * MINUTE,
    5 * MINUTE,
];
const HOURLY_TIME_STEPS: [u64; 6] = [
    30 * DAY,
    7 * DAY,
    3 * DAY,
    DAY,
    12 * HOUR,
    2 * HOUR,
];

/// Margin within which off-screen labels are still laid out, so the
/// collision filter sees labels straddling the viewport edges.
const DRAW_MARGIN: f32 = 60.0;

/// Picks a label spacing from the per-timeframe step table and rounds
/// `earliest` up onto that grid.
pub fn calc_time_step(
    earliest: u64,
    latest: u64,
    labels_can_fit: u64,
    timeframe: Timeframe,
) -> (u64, u64) {
    let steps: &[u64] = match timeframe {
        Timeframe::M1 => &M1_TIME_STEPS,
        Timeframe::M3 => &M3_TIME_STEPS,
        Timeframe::M5 => &M5_TIME_STEPS,
        Timeframe::M15 | Timeframe::M30 => &M5_TIME_STEPS[..6],
        Timeframe::H1 | Timeframe::H4 | Timeframe::D1 => &HOURLY_TIME_STEPS,
    };

    let duration = latest - earliest;

    let mut time_step = steps[steps.len() - 1];
    for &step in steps {
        if duration / step >= labels_can_fit.max(1) {
            time_step = step;
            break;
        }
    }

    let rounded_earliest = earliest.div_ceil(time_step) * time_step;
    (time_step, rounded_earliest)
}

pub fn calc_x_pos(time: u64, earliest: u64, latest: u64, width: f32) -> f32 {
    ((time - earliest) as f64 / (latest - earliest) as f64) as f32 * width
}

pub fn is_drawable(x: f32, width: f32) -> bool {
    x > -DRAW_MARGIN && x < width + DRAW_MARGIN
}

/// Label text for a grid line: day boundaries show the date (month and
/// year boundaries promote to their own format), everything finer shows
/// the UTC wall clock.
pub fn format_label(time_ms: u64) -> Option<String> {
    let datetime: DateTime<Utc> = DateTime::from_timestamp_millis(time_ms as i64)?;

    let label = if datetime.hour() == 0 && datetime.minute() == 0 {
        if datetime.month() == 1 && datetime.day() == 1 {
            datetime.format("%Y").to_string()
        } else if datetime.day() == 1 {
            datetime.format("%b").to_string()
        } else {
            datetime.format("%-d").to_string()
        }
    } else {
        datetime.format("%H:%M").to_string()
    };

    Some(label)
}

pub fn format_crosshair_label(time_ms: u64) -> Option<String> {
    let datetime: DateTime<Utc> = DateTime::from_timestamp_millis(time_ms as i64)?;
    Some(datetime.format("%b %-d  %H:%M").to_string())
}
