use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::NudgeSettings;
use crate::numeric::safe_number;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Trend {
    #[default]
    OnTarget,
    Overspending,
    Underspending,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trend::OnTarget => "on-target",
            Trend::Overspending => "overspending",
            Trend::Underspending => "underspending",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NudgeOutcome {
    pub effective_per_day: f64,
    pub trend: Trend,
}

/// Compare trailing-window usage against the baseline and adjust regen.
///
/// Proportional and stateless: the same inputs always give the same output,
/// there is no accumulated history between calls.
pub fn nudge(baseline_per_day: f64, usage_window: f64, settings: &NudgeSettings) -> NudgeOutcome {
    let baseline = safe_number(baseline_per_day);
    let usage = safe_number(usage_window);
    let expected = baseline * safe_number(settings.window_days);

    if expected > 0.0 && usage > expected * settings.overspend_ratio {
        NudgeOutcome {
            effective_per_day: baseline * (1.0 - settings.step),
            trend: Trend::Overspending,
        }
    } else if expected > 0.0 && usage < expected * settings.underspend_ratio {
        NudgeOutcome {
            effective_per_day: baseline * (1.0 + settings.step),
            trend: Trend::Underspending,
        }
    } else {
        NudgeOutcome {
            effective_per_day: baseline,
            trend: Trend::OnTarget,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn defaults() -> NudgeSettings {
        NudgeSettings::default()
    }

    #[test]
    fn test_on_target_at_expected_usage() {
        let out = nudge(10.0, 70.0, &defaults());
        assert_eq!(out.trend, Trend::OnTarget);
        assert_eq!(out.effective_per_day, 10.0);
    }

    #[test]
    fn test_overspending_at_double_usage() {
        let out = nudge(10.0, 140.0, &defaults());
        assert_eq!(out.trend, Trend::Overspending);
        assert_relative_eq!(out.effective_per_day, 9.5);
    }

    #[test]
    fn test_underspending_with_no_usage() {
        let out = nudge(10.0, 0.0, &defaults());
        assert_eq!(out.trend, Trend::Underspending);
        assert_relative_eq!(out.effective_per_day, 10.5);
    }

    #[test]
    fn test_band_edges_are_exclusive() {
        // 115% and 80% exactly stay on target.
        assert_eq!(nudge(10.0, 70.0 * 1.15, &defaults()).trend, Trend::OnTarget);
        assert_eq!(nudge(10.0, 70.0 * 0.80, &defaults()).trend, Trend::OnTarget);
    }

    #[test]
    fn test_non_positive_baseline_never_nudges() {
        assert_eq!(nudge(0.0, 500.0, &defaults()).trend, Trend::OnTarget);
        let negative = nudge(-5.0, 0.0, &defaults());
        assert_eq!(negative.trend, Trend::OnTarget);
        assert_eq!(negative.effective_per_day, -5.0);
    }

    #[test]
    fn test_custom_thresholds() {
        let settings = NudgeSettings {
            overspend_ratio: 1.0,
            step: 0.5,
            ..defaults()
        };
        let out = nudge(10.0, 71.0, &settings);
        assert_eq!(out.trend, Trend::Overspending);
        assert_relative_eq!(out.effective_per_day, 5.0);
    }

    #[test]
    fn test_repeatable() {
        let a = nudge(12.3, 99.0, &defaults());
        let b = nudge(12.3, 99.0, &defaults());
        assert_eq!(a, b);
    }
}
