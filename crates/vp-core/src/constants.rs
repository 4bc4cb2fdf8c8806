/// Numerical epsilon for near-zero comparisons
pub const EPSILON: f64 = 1e-9;

/// Milliseconds in one day
pub const MS_PER_DAY: f64 = 86_400_000.0;

/// Average days per month used to turn monthly cashflow into a daily rate (365.25 / 12, rounded)
pub const DEFAULT_DAYS_PER_MONTH: f64 = 30.44;

/// Length of one cap cycle in days
pub const DEFAULT_CYCLE_LENGTH_DAYS: f64 = 30.44;

/// Trailing window the trend controller compares against
pub const TREND_WINDOW_DAYS: f64 = 7.0;

/// Usage above this multiple of the expected window spend is overspending
pub const OVERSPEND_RATIO: f64 = 1.15;

/// Usage below this multiple of the expected window spend is underspending
pub const UNDERSPEND_RATIO: f64 = 0.80;

/// Proportional regen adjustment applied when a trend band trips
pub const NUDGE_STEP: f64 = 0.05;

/// Fallback split used when configured weights sum to ~0:
/// health, mana, stamina, essence
pub const DEFAULT_WEIGHT_SPLIT: [f64; 4] = [0.1, 0.3, 0.5, 0.1];
