//! Ghost projection: how a pool will look once its pending liability settles.
//!
//! The visible bar is the current cycle's remainder. A liability drains the
//! remainder first and only then borrows whole banked cycles. The overlay is
//! the span between the projected and current bar, as percentages of the cap.
//! Nothing here is persisted.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::allocation::allocate_batch;
use crate::config::CreditMode;
use crate::constants::EPSILON;
use crate::credit::route_credit;
use crate::ledger::{LedgerEntry, LedgerError};
use crate::numeric::{safe_number, wrap_into_cap};
use crate::pool::{Pool, PoolAmounts};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GhostProjection {
    pub remainder_before: f64,
    pub remainder_after: f64,
    pub banked_before: u64,
    pub banked_after: u64,
    pub overlay_start_pct: f64,
    pub overlay_width_pct: f64,
}

impl GhostProjection {
    pub fn is_noop(&self) -> bool {
        self.overlay_width_pct == 0.0 && self.banked_after == self.banked_before
    }

    /// `banked_after * cap + remainder_after`.
    pub fn projected_total(&self, cap: f64) -> f64 {
        self.banked_after as f64 * cap.max(0.0) + self.remainder_after
    }
}

/// Project `liability` onto a pool holding `truth` with cycle size `cap`.
pub fn project(truth: f64, cap: f64, liability: f64) -> GhostProjection {
    let cap = safe_number(cap);
    let before = wrap_into_cap(truth, cap);
    let liability = safe_number(liability).max(0.0);

    let noop = GhostProjection {
        remainder_before: before.remainder,
        remainder_after: before.remainder,
        banked_before: before.banked_cycles,
        banked_after: before.banked_cycles,
        overlay_start_pct: pct(before.remainder, cap),
        overlay_width_pct: 0.0,
    };
    if cap <= 0.0 || liability < EPSILON {
        return noop;
    }

    if liability <= before.remainder {
        let after = snap_zero(before.remainder - liability);
        return GhostProjection {
            remainder_after: after,
            overlay_start_pct: pct(after, cap),
            overlay_width_pct: pct(before.remainder - after, cap),
            ..noop
        };
    }

    let mut leftover = liability - before.remainder;
    let whole = ((leftover / cap).floor() as u64).min(before.banked_cycles);
    let mut banked_after = before.banked_cycles - whole;
    leftover -= whole as f64 * cap;

    let borrowed = leftover > EPSILON && banked_after > 0;
    let start = if borrowed {
        banked_after -= 1;
        cap
    } else {
        0.0
    };
    let after = snap_zero((start - leftover).max(0.0));

    // Overlay runs up to the borrowed cycle's top, or nowhere if none was left.
    let span_end = if borrowed { cap } else { 0.0 };

    GhostProjection {
        remainder_after: after,
        banked_after,
        overlay_start_pct: pct(after, cap),
        overlay_width_pct: pct((span_end - after).max(0.0), cap),
        ..noop
    }
}

fn pct(value: f64, cap: f64) -> f64 {
    if cap <= 0.0 {
        return 0.0;
    }
    (value / cap * 100.0).clamp(0.0, 100.0)
}

fn snap_zero(value: f64) -> f64 {
    if value.abs() < EPSILON { 0.0 } else { value }
}

/// Per-pool liability of a pending set, plus the ids that were dropped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PendingLiability {
    pub liability: PoolAmounts,
    pub dropped: Vec<String>,
}

/// Run the waterfall over the live pending set against `headroom`.
///
/// Malformed or non-pending entries are dropped one by one and logged; the
/// rest still project. Expired holds and core flows are skipped silently;
/// callers drop entries before the anchor. Pending credits
/// reduce the liability of the pool they would land on, floored at zero.
pub fn pending_liability<'a>(
    pending: impl IntoIterator<Item = &'a LedgerEntry>,
    credit_mode: CreditMode,
    headroom: &PoolAmounts,
    now_ms: i64,
) -> PendingLiability {
    let mut dropped = Vec::new();
    let mut live: Vec<&LedgerEntry> = Vec::new();

    for entry in pending {
        let check = if entry.is_pending() {
            entry.validate()
        } else {
            Err(LedgerError::NotPending {
                id: entry.id.clone(),
            })
        };
        if let Err(err) = check {
            warn!(%err, "dropping entry from ghost projection");
            dropped.push(entry.id.clone());
            continue;
        }
        if !entry.is_expired(now_ms) && !entry.classification.is_core() {
            live.push(entry);
        }
    }

    let mut available = *headroom;
    let mut liability = allocate_batch(live.iter().copied(), &mut available);

    for entry in live.iter().filter(|e| e.is_credit()) {
        let effect = route_credit(credit_mode, entry.amount_minor, entry.intent());
        for pool in Pool::ALL {
            *liability.get_mut(pool) -= effect.credited.get(pool) + effect.spent_offset.get(pool);
        }
    }
    for pool in Pool::ALL {
        let value = liability.get_mut(pool);
        *value = value.max(0.0);
    }

    PendingLiability { liability, dropped }
}
