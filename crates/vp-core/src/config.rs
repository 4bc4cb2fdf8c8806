//! Cashflow configuration, pool weights, and engine tunables.
//!
//! `CashflowConfig` and `PoolWeights` are owned by whoever edits finance
//! settings; the engine only reads them. `EngineSettings` carries the
//! constants that used to be scattered literals (month length, cycle length,
//! nudge bands) plus the behavioural flags that distinguish engine variants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CYCLE_LENGTH_DAYS, DEFAULT_DAYS_PER_MONTH, DEFAULT_WEIGHT_SPLIT, NUDGE_STEP,
    OVERSPEND_RATIO, TREND_WINDOW_DAYS, UNDERSPEND_RATIO,
};
use crate::numeric::safe_number;

/// Whether regeneration keeps accruing past one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashflowMode {
    /// Accrue for every day since the anchor; surplus banks into cycles.
    #[default]
    Continuous,
    /// Accrue for at most one cycle length after the anchor.
    Finite,
}

/// How confirmed credits (refunds, transfers in) land on the pools.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditMode {
    /// All credit goes to Essence.
    #[default]
    Essence,
    /// Credit replenishes the entry's intent pool.
    Allocate,
    /// Credit offsets Health spend.
    Health,
}

impl fmt::Display for CashflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CashflowMode::Continuous => "continuous",
            CashflowMode::Finite => "finite",
        })
    }
}

impl FromStr for CashflowMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous" => Ok(CashflowMode::Continuous),
            "finite" => Ok(CashflowMode::Finite),
            other => Err(format!("unknown cashflow mode: {other}")),
        }
    }
}

impl fmt::Display for CreditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CreditMode::Essence => "essence",
            CreditMode::Allocate => "allocate",
            CreditMode::Health => "health",
        })
    }
}

impl FromStr for CreditMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "essence" => Ok(CreditMode::Essence),
            "allocate" => Ok(CreditMode::Allocate),
            "health" => Ok(CreditMode::Health),
            other => Err(format!("unknown credit mode: {other}")),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashflowConfig {
    pub mode: CashflowMode,
    pub credit_mode: CreditMode,
    pub inflow_monthly: f64,
    pub outflow_monthly: f64,
    /// Start of the truth-accumulation window (Unix ms).
    pub pay_cycle_anchor_ms: i64,
    #[serde(default)]
    pub last_anchor_update_ms: i64,
}

impl CashflowConfig {
    /// Net regeneration per day in minor units. Negative when outflow exceeds inflow.
    pub fn net_daily(&self, days_per_month: f64) -> f64 {
        if days_per_month <= 0.0 || !days_per_month.is_finite() {
            return 0.0;
        }
        let net = safe_number(self.inflow_monthly) - safe_number(self.outflow_monthly);
        net / days_per_month
    }
}

/// Per-pool share of net regeneration. Not required to sum to 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolWeights {
    pub health: f64,
    pub mana: f64,
    pub stamina: f64,
    pub essence: f64,
}

impl PoolWeights {
    /// The documented safe split used when configured weights are unusable.
    pub fn fallback() -> Self {
        let [health, mana, stamina, essence] = DEFAULT_WEIGHT_SPLIT;
        Self {
            health,
            mana,
            stamina,
            essence,
        }
    }
}

/// Trend band thresholds. The defaults are the historical 115% / 80% / ±5%.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgeSettings {
    pub window_days: f64,
    pub overspend_ratio: f64,
    pub underspend_ratio: f64,
    pub step: f64,
}

impl Default for NudgeSettings {
    fn default() -> Self {
        Self {
            window_days: TREND_WINDOW_DAYS,
            overspend_ratio: OVERSPEND_RATIO,
            underspend_ratio: UNDERSPEND_RATIO,
            step: NUDGE_STEP,
        }
    }
}

/// Engine tunables, loaded from `settings.toml` when present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub days_per_month: f64,
    pub cycle_length_days: f64,
    /// Keep accruing from the configured anchor across pay cycles. When false
    /// the effective anchor rolls forward to the start of the current cycle.
    pub carry_over: bool,
    pub nudge: NudgeSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            days_per_month: DEFAULT_DAYS_PER_MONTH,
            cycle_length_days: DEFAULT_CYCLE_LENGTH_DAYS,
            carry_over: true,
            nudge: NudgeSettings::default(),
        }
    }
}
