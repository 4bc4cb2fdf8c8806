//! Safe coercion, cap-wrap decomposition and weight normalisation.
//!
//! Everything upstream of a persisted snapshot funnels its numbers through
//! here, so NaN and infinities stop at this boundary.

use serde::{Deserialize, Serialize};

use crate::config::PoolWeights;
use crate::constants::EPSILON;

/// Coerce to a finite number, or 0.
pub fn safe_number(v: f64) -> f64 {
    safe_number_or(v, 0.0)
}

/// Coerce to a finite number, or `default`.
pub fn safe_number_or(v: f64, default: f64) -> f64 {
    if v.is_finite() { v } else { default }
}

/// Loose JSON coercion: numbers and numeric strings become finite f64,
/// everything else (null, bools, garbage strings, objects) becomes 0.
pub fn coerce_json_number(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => safe_number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => s.trim().parse::<f64>().map(safe_number).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Truth decomposed into whole banked cycles and the visible remainder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Wrapped {
    pub banked_cycles: u64,
    pub remainder: f64,
}

impl Wrapped {
    /// Recompose `banked_cycles * cap + remainder`.
    pub fn total(&self, cap: f64) -> f64 {
        self.banked_cycles as f64 * cap + self.remainder
    }
}

/// Split `truth` into `(banked_cycles, remainder)` with `0 <= remainder < cap`.
///
/// A non-positive cap yields `(0, 0)`. Negative or non-finite truth is
/// treated as empty.
pub fn wrap_into_cap(truth: f64, cap: f64) -> Wrapped {
    let cap = safe_number(cap);
    if cap <= 0.0 {
        return Wrapped::default();
    }
    let truth = safe_number(truth).max(0.0);

    let mut banked = (truth / cap).floor();
    let mut remainder = truth - banked * cap;

    // Float error at exact multiples can land the remainder just outside [0, cap).
    if remainder >= cap {
        banked += 1.0;
        remainder -= cap;
    }
    if remainder < 0.0 {
        remainder = 0.0;
    }

    Wrapped {
        banked_cycles: banked as u64,
        remainder,
    }
}

/// Normalise weights so they sum to 1.
///
/// Negative or non-finite components count as 0. When the sum is ~0 the
/// fallback split (health .1, mana .3, stamina .5, essence .1) is returned.
pub fn normalize_weights(weights: &PoolWeights) -> PoolWeights {
    let clean = |v: f64| safe_number(v).max(0.0);
    let w = PoolWeights {
        health: clean(weights.health),
        mana: clean(weights.mana),
        stamina: clean(weights.stamina),
        essence: clean(weights.essence),
    };

    let sum = w.health + w.mana + w.stamina + w.essence;
    if sum < EPSILON {
        return PoolWeights::fallback();
    }

    PoolWeights {
        health: w.health / sum,
        mana: w.mana / sum,
        stamina: w.stamina / sum,
        essence: w.essence / sum,
    }
}
