//! Routing of confirmed credits according to the configured credit mode.
//!
//! The mode is read at recompute time, not stored per transaction, so a mode
//! change reinterprets every credit since the anchor on the next rebuild.

use crate::allocation::allocate_credit;
use crate::config::CreditMode;
use crate::numeric::safe_number;
use crate::pool::{Intent, PoolAmounts};

/// Effect of one credit on the per-pool sums.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CreditEffect {
    /// Added to `credited` for each pool.
    pub credited: PoolAmounts,
    /// Subtracted from `spent` for each pool.
    pub spent_offset: PoolAmounts,
}

pub fn route_credit(mode: CreditMode, amount: f64, intent: Intent) -> CreditEffect {
    let amount = safe_number(amount).max(0.0);
    let mut effect = CreditEffect::default();
    match mode {
        CreditMode::Essence => effect.credited.essence = amount,
        CreditMode::Allocate => effect.credited = allocate_credit(amount, intent),
        CreditMode::Health => effect.spent_offset.health = amount,
    }
    effect
}
