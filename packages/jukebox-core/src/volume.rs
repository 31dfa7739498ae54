//! Volume conversions between user-facing percentages and sink gain.
//!
//! Commands carry an integer percentage; sessions store a gain in `[0.0, 1.0]`.
//! Out-of-range percentages are clamped, never rejected.

/// Lowest percentage a command can set. `0` is raised to this.
pub const MIN_VOLUME_PERCENT: i64 = 1;

/// Highest percentage a command can set.
pub const MAX_VOLUME_PERCENT: i64 = 100;

/// Gain applied to a fresh session.
pub const DEFAULT_VOLUME: f32 = 0.5;

/// Converts a command percentage into a gain: `clamp(pct, 1, 100) / 100`.
#[must_use]
pub fn percent_to_gain(percent: i64) -> f32 {
    clamp_percent(percent) as f32 / 100.0
}

/// Clamps a command percentage into `[1, 100]`.
#[must_use]
pub fn clamp_percent(percent: i64) -> u8 {
    percent.clamp(MIN_VOLUME_PERCENT, MAX_VOLUME_PERCENT) as u8
}

/// Converts a stored gain back to the nearest whole percentage.
#[must_use]
pub fn gain_to_percent(gain: f32) -> u8 {
    (clamp_gain(gain) * 100.0).round() as u8
}

/// Clamps a gain into `[0.0, 1.0]`. NaN maps to [`DEFAULT_VOLUME`].
#[must_use]
pub fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        DEFAULT_VOLUME
    } else {
        gain.clamp(0.0, 1.0)
    }
}
