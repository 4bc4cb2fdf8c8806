//! Ledger scan: per-pool usage since the pay-cycle anchor.
//!
//! Three buckets come out of one pass:
//! - `since_anchor`: confirmed spend and credit since the anchor
//! - `last_7_days`: confirmed spend inside the trailing trend window
//! - `pending_preview`: what pending entries would do, kept apart so it never
//!   leaks into truth
//!
//! Confirmed debits are re-derived against unbounded headroom (history does
//! not compete). Pending debits run in time order against the supplied
//! headroom because they are simultaneous unresolved claims. Without a
//! headroom the preview bucket stays zero, for callers that preview later
//! against fresh truth.

use serde::{Deserialize, Serialize};

use crate::allocation::{allocate, allocate_batch, unbounded};
use crate::config::CreditMode;
use crate::constants::{MS_PER_DAY, TREND_WINDOW_DAYS};
use crate::credit::route_credit;
use crate::ledger::{EntryStatus, LedgerEntry};
use crate::numeric::safe_number;
use crate::pool::{PerPool, Pool, PoolAmounts};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageWindow {
    pub spent: f64,
    pub credited: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolAggregate {
    pub since_anchor: UsageWindow,
    pub last_7_days: f64,
    pub pending_preview: UsageWindow,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UsageAggregates {
    pub pools: PerPool<PoolAggregate>,
    /// Entries that fell inside the window and were not core cashflow.
    pub scanned: usize,
}

impl UsageAggregates {
    pub fn get(&self, pool: Pool) -> &PoolAggregate {
        self.pools.get(pool)
    }
}

/// Time bounds of one scan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AggregationWindow {
    pub anchor_ms: i64,
    pub now_ms: i64,
    pub trend_window_days: f64,
}

impl AggregationWindow {
    pub fn new(anchor_ms: i64, now_ms: i64) -> Self {
        Self {
            anchor_ms,
            now_ms,
            trend_window_days: TREND_WINDOW_DAYS,
        }
    }

    pub fn with_trend_window(mut self, days: f64) -> Self {
        self.trend_window_days = days;
        self
    }

    pub fn contains(&self, entry: &LedgerEntry) -> bool {
        entry.timestamp_ms >= self.anchor_ms && !entry.classification.is_core()
    }

    fn trend_cutoff_ms(&self) -> i64 {
        let span = (safe_number(self.trend_window_days).max(0.0) * MS_PER_DAY) as i64;
        self.now_ms.saturating_sub(span)
    }
}

/// Scan `entries` and produce the three per-pool buckets.
pub fn aggregate(
    entries: &[LedgerEntry],
    credit_mode: CreditMode,
    window: &AggregationWindow,
    pending_headroom: Option<&PoolAmounts>,
) -> UsageAggregates {
    let mut pools: PerPool<PoolAggregate> = PerPool::default();
    let cutoff = window.trend_cutoff_ms();
    let mut scanned = 0usize;
    let mut pending: Vec<&LedgerEntry> = Vec::new();

    for entry in entries.iter().filter(|e| window.contains(e)) {
        scanned += 1;
        match entry.status {
            EntryStatus::Pending => pending.push(entry),
            EntryStatus::Confirmed => {
                apply_confirmed(&mut pools, entry, credit_mode, entry.timestamp_ms >= cutoff)
            }
        }
    }

    if let Some(headroom) = pending_headroom {
        let preview = preview_pending(pending, credit_mode, window.now_ms, headroom);
        for pool in Pool::ALL {
            pools.get_mut(pool).pending_preview = *preview.get(pool);
        }
    }

    UsageAggregates { pools, scanned }
}

fn apply_confirmed(
    pools: &mut PerPool<PoolAggregate>,
    entry: &LedgerEntry,
    credit_mode: CreditMode,
    in_trend_window: bool,
) {
    let amount = safe_number(entry.amount_minor);
    if amount < 0.0 {
        let deltas = match &entry.applied_allocation {
            Some(applied) if applied.is_finite() => *applied,
            _ => allocate(-amount, entry.intent(), &mut unbounded()),
        };
        for (pool, delta) in deltas.iter() {
            let agg = pools.get_mut(pool);
            agg.since_anchor.spent += delta;
            if in_trend_window {
                agg.last_7_days += delta;
            }
        }
    } else if amount > 0.0 {
        let effect = route_credit(credit_mode, amount, entry.intent());
        for pool in Pool::ALL {
            let agg = pools.get_mut(pool);
            agg.since_anchor.credited += effect.credited.get(pool);
            agg.since_anchor.spent -= effect.spent_offset.get(pool);
        }
    }
}

/// Preview-only allocation of pending entries against `headroom`.
///
/// Expired holds are skipped. Debits compete in chronological order; credits
/// follow the credit mode (Health mode shows up as negative Health spend).
pub fn preview_pending<'a>(
    pending: impl IntoIterator<Item = &'a LedgerEntry>,
    credit_mode: CreditMode,
    now_ms: i64,
    headroom: &PoolAmounts,
) -> PerPool<UsageWindow> {
    let live: Vec<&LedgerEntry> = pending
        .into_iter()
        .filter(|e| e.is_pending() && !e.is_expired(now_ms))
        .filter(|e| safe_number(e.amount_minor) != 0.0)
        .collect();

    let mut available = *headroom;
    let debits = allocate_batch(live.iter().copied(), &mut available);

    let mut preview: PerPool<UsageWindow> = PerPool::default();
    for (pool, spent) in debits.iter() {
        preview.get_mut(pool).spent = *spent;
    }

    for entry in live.iter().filter(|e| e.is_credit()) {
        let effect = route_credit(credit_mode, entry.amount_minor, entry.intent());
        for pool in Pool::ALL {
            let window = preview.get_mut(pool);
            window.credited += effect.credited.get(pool);
            window.spent -= effect.spent_offset.get(pool);
        }
    }

    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Classification;
    use crate::pool::Intent;
    use approx::assert_relative_eq;

    const DAY: i64 = 86_400_000;
    const ANCHOR: i64 = 1_000 * DAY;
    const NOW: i64 = ANCHOR + 20 * DAY;

    fn window() -> AggregationWindow {
        AggregationWindow::new(ANCHOR, NOW)
    }

    fn confirmed(amount: f64, day: i64) -> LedgerEntry {
        LedgerEntry::new(amount, ANCHOR + day * DAY, EntryStatus::Confirmed)
    }

    fn pending(amount: f64, day: i64) -> LedgerEntry {
        LedgerEntry::new(amount, ANCHOR + day * DAY, EntryStatus::Pending)
    }

    fn run(entries: &[LedgerEntry], mode: CreditMode) -> UsageAggregates {
        aggregate(entries, mode, &window(), Some(&unbounded()))
    }

    #[test]
    fn test_excludes_pre_anchor_and_core() {
        let entries = vec![
            LedgerEntry::new(-100.0, ANCHOR - 1, EntryStatus::Confirmed),
            confirmed(-3000.0, 1).with_classification(Classification::CoreOutflow),
            confirmed(5000.0, 1).with_classification(Classification::CoreInflow),
            confirmed(-40.0, 2),
        ];
        let agg = run(&entries, CreditMode::Essence);
        assert_eq!(agg.scanned, 1);
        assert_eq!(agg.get(Pool::Stamina).since_anchor.spent, 40.0);
        assert_eq!(agg.get(Pool::Essence).since_anchor.credited, 0.0);
    }

    #[test]
    fn test_confirmed_debits_use_intent_without_competition() {
        let entries = vec![
            confirmed(-500.0, 1).with_intent(Intent::Mana),
            confirmed(-500.0, 2).with_intent(Intent::Mana),
            confirmed(-25.0, 3),
        ];
        let agg = run(&entries, CreditMode::Essence);
        assert_eq!(agg.get(Pool::Mana).since_anchor.spent, 1000.0);
        assert_eq!(agg.get(Pool::Stamina).since_anchor.spent, 25.0);
        assert_eq!(agg.get(Pool::Health).since_anchor.spent, 0.0);
    }

    #[test]
    fn test_applied_allocation_is_authoritative() {
        let applied = PoolAmounts {
            health: 30.0,
            mana: 70.0,
            ..Default::default()
        };
        let entries = vec![
            confirmed(-100.0, 1)
                .with_intent(Intent::Stamina)
                .with_applied_allocation(applied),
        ];
        let agg = run(&entries, CreditMode::Essence);
        assert_eq!(agg.get(Pool::Health).since_anchor.spent, 30.0);
        assert_eq!(agg.get(Pool::Mana).since_anchor.spent, 70.0);
        assert_eq!(agg.get(Pool::Stamina).since_anchor.spent, 0.0);
    }

    #[test]
    fn test_corrupt_applied_allocation_falls_back_to_waterfall() {
        let applied = PoolAmounts {
            health: f64::NAN,
            ..Default::default()
        };
        let entries = vec![confirmed(-10.0, 1).with_applied_allocation(applied)];
        let agg = run(&entries, CreditMode::Essence);
        assert_eq!(agg.get(Pool::Stamina).since_anchor.spent, 10.0);
        assert_eq!(agg.get(Pool::Health).since_anchor.spent, 0.0);
    }

    #[test]
    fn test_trailing_window() {
        let entries = vec![confirmed(-10.0, 5), confirmed(-20.0, 14), confirmed(-30.0, 19)];
        let agg = run(&entries, CreditMode::Essence);
        let stamina = agg.get(Pool::Stamina);
        assert_eq!(stamina.since_anchor.spent, 60.0);
        // Window starts at day 13.
        assert_eq!(stamina.last_7_days, 50.0);
    }

    #[test]
    fn test_credit_modes() {
        let entries = vec![confirmed(-100.0, 1), confirmed(60.0, 2).with_intent(Intent::Mana)];

        let essence = run(&entries, CreditMode::Essence);
        assert_eq!(essence.get(Pool::Essence).since_anchor.credited, 60.0);

        let allocate = run(&entries, CreditMode::Allocate);
        assert_eq!(allocate.get(Pool::Mana).since_anchor.credited, 60.0);
        assert_eq!(allocate.get(Pool::Essence).since_anchor.credited, 0.0);

        let health = run(&entries, CreditMode::Health);
        assert_eq!(health.get(Pool::Health).since_anchor.spent, -60.0);
        assert_eq!(health.get(Pool::Stamina).since_anchor.spent, 100.0);
        assert_eq!(health.get(Pool::Essence).since_anchor.credited, 0.0);
    }

    #[test]
    fn test_credits_do_not_count_as_trend_usage() {
        let entries = vec![confirmed(500.0, 19)];
        let agg = run(&entries, CreditMode::Health);
        assert_eq!(agg.get(Pool::Health).last_7_days, 0.0);
    }

    #[test]
    fn test_pending_stays_out_of_truth_buckets() {
        let entries = vec![pending(-80.0, 19), confirmed(-20.0, 19)];
        let agg = run(&entries, CreditMode::Essence);
        let stamina = agg.get(Pool::Stamina);
        assert_eq!(stamina.since_anchor.spent, 20.0);
        assert_eq!(stamina.last_7_days, 20.0);
        assert_eq!(stamina.pending_preview.spent, 80.0);
    }

    #[test]
    fn test_pending_competes_for_headroom() {
        let entries = vec![
            pending(-30.0, 18).with_intent(Intent::Mana),
            pending(-30.0, 19).with_intent(Intent::Mana),
        ];
        let headroom = PoolAmounts {
            mana: 40.0,
            ..Default::default()
        };
        let agg = aggregate(&entries, CreditMode::Essence, &window(), Some(&headroom));
        assert_eq!(agg.get(Pool::Mana).pending_preview.spent, 40.0);
        assert_eq!(agg.get(Pool::Health).pending_preview.spent, 20.0);
    }

    #[test]
    fn test_without_headroom_preview_stays_empty() {
        let entries = vec![pending(-30.0, 18), confirmed(-10.0, 18)];
        let agg = aggregate(&entries, CreditMode::Essence, &window(), None);
        for (_, pool) in agg.pools.iter() {
            assert_eq!(pool.pending_preview, UsageWindow::default());
        }
        assert_eq!(agg.get(Pool::Stamina).since_anchor.spent, 10.0);
    }

    #[test]
    fn test_expired_pending_is_ignored() {
        let entries = vec![pending(-80.0, 10).with_expiry(ANCHOR + 15 * DAY)];
        let agg = run(&entries, CreditMode::Essence);
        assert_eq!(agg.get(Pool::Stamina).pending_preview.spent, 0.0);
    }

    #[test]
    fn test_pending_credit_preview() {
        let entries = vec![pending(25.0, 19)];
        let agg = run(&entries, CreditMode::Health);
        assert_eq!(agg.get(Pool::Health).pending_preview.spent, -25.0);
        assert_eq!(agg.get(Pool::Health).since_anchor.spent, 0.0);
    }

    #[test]
    fn test_non_finite_amounts_are_zeroed() {
        let entries = vec![confirmed(f64::NAN, 1), pending(f64::INFINITY, 2), confirmed(-5.0, 3)];
        let agg = run(&entries, CreditMode::Essence);
        for (_, pool) in agg.pools.iter() {
            assert!(pool.since_anchor.spent.is_finite());
            assert!(pool.pending_preview.spent.is_finite());
        }
        assert_relative_eq!(agg.get(Pool::Stamina).since_anchor.spent, 5.0);
    }
}
