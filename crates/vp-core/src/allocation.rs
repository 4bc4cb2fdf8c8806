//! Intent-first spend allocation waterfall.
//!
//! A spend draws from its intent pool up to the available headroom, and
//! whatever is left falls through to Health. Health has no ceiling check: it
//! is the reserve that absorbs overflow. Essence is never debited here.
//!
//! Running `allocate` repeatedly over a time-ordered batch against one
//! `available` map is how simultaneous pending debits compete for the same
//! headroom: earlier entries claim first.

use crate::ledger::LedgerEntry;
use crate::numeric::safe_number;
use crate::pool::{Intent, Pool, PoolAmounts};

/// Headroom that never runs out. Historical confirmed spend is re-derived
/// against this so it never competes with anything.
pub fn unbounded() -> PoolAmounts {
    PoolAmounts::splat(f64::INFINITY)
}

/// Split `spend` across pools, consuming headroom from `available`.
///
/// The returned deltas always sum to `spend` (after coercing it to a finite,
/// non-negative number).
pub fn allocate(spend: f64, intent: Intent, available: &mut PoolAmounts) -> PoolAmounts {
    let spend = safe_number(spend).max(0.0);
    let pool = intent.pool();

    // f64::max ignores NaN, so corrupted headroom reads as zero.
    let headroom = available.get(pool).max(0.0);
    let to_intent = spend.min(headroom);
    *available.get_mut(pool) = headroom - to_intent;

    let mut deltas = PoolAmounts::default();
    *deltas.get_mut(pool) = to_intent;
    deltas.health = spend - to_intent;
    deltas
}

/// Where a credit lands when it is routed back through the waterfall: a
/// negative spend against unbounded headroom, so the intent pool takes all of it.
pub fn allocate_credit(amount: f64, intent: Intent) -> PoolAmounts {
    let mut unlimited = unbounded();
    allocate(amount, intent, &mut unlimited)
}

/// Allocate a chronologically ordered batch of debits against shared headroom.
///
/// Entries are sorted by `(timestamp_ms, id)` before allocation so the
/// outcome does not depend on the caller's ordering. Credits and entries
/// with a recorded `applied_allocation` are honoured as-is: the recorded
/// allocation is added verbatim and does not consume headroom.
pub fn allocate_batch<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
    available: &mut PoolAmounts,
) -> PoolAmounts {
    let mut ordered: Vec<&LedgerEntry> = entries.into_iter().filter(|e| e.is_debit()).collect();
    ordered.sort_by(|a, b| {
        a.timestamp_ms
            .cmp(&b.timestamp_ms)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut total = PoolAmounts::default();
    for entry in ordered {
        let deltas = match &entry.applied_allocation {
            Some(applied) if applied.is_finite() => *applied,
            _ => allocate(-entry.amount_minor, entry.intent(), available),
        };
        total.add_assign(&deltas);
    }
    total
}

/// Sum of the debit-capable pools in a delta set (Essence excluded).
pub fn debited_total(deltas: &PoolAmounts) -> f64 {
    [Pool::Health, Pool::Mana, Pool::Stamina]
        .iter()
        .map(|p| *deltas.get(*p))
        .sum()
}
