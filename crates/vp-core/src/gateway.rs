//! Gateway recompute: config + weights + usage aggregates → snapshot.
//!
//! The snapshot is rebuilt from scratch on every call and never patched.
//! `recompute` is pure, so re-running it on every relevant event cannot
//! drift or double count.

use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregationWindow, UsageAggregates, UsageWindow, aggregate, preview_pending};
use crate::config::{CashflowConfig, CashflowMode, CreditMode, EngineSettings, PoolWeights};
use crate::constants::{EPSILON, MS_PER_DAY};
use crate::ledger::LedgerEntry;
use crate::nudge::{Trend, nudge};
use crate::numeric::{normalize_weights, safe_number, wrap_into_cap};
use crate::pool::{PerPool, Pool, PoolAmounts};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub pool: Pool,
    pub cap_minor: f64,
    pub regen_baseline_per_day: f64,
    pub regen_effective_per_day: f64,
    pub remainder_minor: f64,
    pub banked_cycles: u64,
    pub truth_total_minor: f64,
    pub spent_since_anchor: f64,
    pub credit_since_anchor: f64,
    pub spent_last_7_days: f64,
    pub pending_preview: UsageWindow,
    pub trend: Trend,
}

impl PoolSnapshot {
    pub fn empty(pool: Pool) -> Self {
        Self {
            pool,
            cap_minor: 0.0,
            regen_baseline_per_day: 0.0,
            regen_effective_per_day: 0.0,
            remainder_minor: 0.0,
            banked_cycles: 0,
            truth_total_minor: 0.0,
            spent_since_anchor: 0.0,
            credit_since_anchor: 0.0,
            spent_last_7_days: 0.0,
            pending_preview: UsageWindow::default(),
            trend: Trend::OnTarget,
        }
    }

    /// `truth == banked * cap + remainder` and `0 <= remainder < cap`
    /// (or everything zero when the cap is not positive).
    pub fn is_consistent(&self) -> bool {
        if self.cap_minor <= 0.0 {
            return self.banked_cycles == 0 && self.remainder_minor == 0.0;
        }
        let recomposed = self.banked_cycles as f64 * self.cap_minor + self.remainder_minor;
        let tolerance = EPSILON * self.truth_total_minor.abs().max(1.0);
        self.remainder_minor >= 0.0
            && self.remainder_minor < self.cap_minor
            && (recomposed - self.truth_total_minor).abs() <= tolerance
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySnapshot {
    pub pools: PerPool<PoolSnapshot>,
    pub net_daily_minor: f64,
    pub updated_at_ms: i64,
    /// False for the degraded all-zero snapshot produced without config.
    pub configured: bool,
    pub mode: CashflowMode,
    pub credit_mode: CreditMode,
    /// Anchor the truth window actually started from.
    pub anchor_ms: i64,
    pub anchor_updated_at_ms: i64,
    pub accrued_days: f64,
    pub cycle_length_days: f64,
}

impl GatewaySnapshot {
    /// All-zero snapshot: "not yet configured", not an error.
    pub fn unconfigured(now_ms: i64) -> Self {
        Self {
            pools: PerPool::from_fn(PoolSnapshot::empty),
            net_daily_minor: 0.0,
            updated_at_ms: now_ms,
            configured: false,
            mode: CashflowMode::default(),
            credit_mode: CreditMode::default(),
            anchor_ms: now_ms,
            anchor_updated_at_ms: 0,
            accrued_days: 0.0,
            cycle_length_days: 0.0,
        }
    }

    pub fn get(&self, pool: Pool) -> &PoolSnapshot {
        self.pools.get(pool)
    }

    /// Truth totals per pool, used as headroom for pending allocation.
    pub fn truth_totals(&self) -> PoolAmounts {
        self.pools.map(|_, p| p.truth_total_minor)
    }
}

/// Anchor the truth window starts from.
///
/// With carry-over the configured anchor is used as-is. Without it the
/// anchor rolls forward by whole cycles so only the current cycle accrues.
pub fn effective_anchor_ms(config: &CashflowConfig, settings: &EngineSettings, now_ms: i64) -> i64 {
    let anchor = config.pay_cycle_anchor_ms;
    let cycle_ms = safe_number(settings.cycle_length_days) * MS_PER_DAY;
    if settings.carry_over || cycle_ms <= 0.0 || now_ms <= anchor {
        return anchor;
    }
    let cycles = (now_ms.saturating_sub(anchor) as f64 / cycle_ms).floor();
    anchor.saturating_add((cycles * cycle_ms) as i64)
}

/// Days of regeneration to credit since `anchor_ms`. Finite mode stops
/// accruing after one cycle.
pub fn accrued_days(
    anchor_ms: i64,
    now_ms: i64,
    mode: CashflowMode,
    cycle_length_days: f64,
) -> f64 {
    let days = (now_ms.saturating_sub(anchor_ms) as f64 / MS_PER_DAY).max(0.0);
    match mode {
        CashflowMode::Continuous => days,
        CashflowMode::Finite => days.min(safe_number(cycle_length_days).max(0.0)),
    }
}

/// Pure recompute of every pool from config, weights and aggregates.
pub fn recompute(
    config: &CashflowConfig,
    weights: &PoolWeights,
    aggregates: &UsageAggregates,
    settings: &EngineSettings,
    now_ms: i64,
) -> GatewaySnapshot {
    let net_daily = safe_number(config.net_daily(settings.days_per_month));
    let weights = normalize_weights(weights);
    let cycle_length = safe_number(settings.cycle_length_days).max(0.0);
    let anchor_ms = effective_anchor_ms(config, settings, now_ms);
    let accrued = accrued_days(anchor_ms, now_ms, config.mode, cycle_length);

    let pools = PerPool::from_fn(|pool| {
        let usage = aggregates.get(pool);
        let weight = match pool {
            Pool::Health => weights.health,
            Pool::Mana => weights.mana,
            Pool::Stamina => weights.stamina,
            Pool::Essence => weights.essence,
        };

        let baseline = net_daily * weight;
        let spent_7 = safe_number(usage.last_7_days);
        let outcome = nudge(baseline, spent_7, &settings.nudge);
        let effective = safe_number(outcome.effective_per_day);

        let cap = effective * cycle_length;
        let spent = safe_number(usage.since_anchor.spent);
        let credited = safe_number(usage.since_anchor.credited);
        let truth = effective * accrued - spent + credited;

        let wrapped = wrap_into_cap(truth.max(0.0), cap);

        PoolSnapshot {
            pool,
            cap_minor: cap,
            regen_baseline_per_day: baseline,
            regen_effective_per_day: effective,
            remainder_minor: wrapped.remainder,
            banked_cycles: wrapped.banked_cycles,
            truth_total_minor: wrapped.total(cap.max(0.0)),
            spent_since_anchor: spent,
            credit_since_anchor: credited,
            spent_last_7_days: spent_7,
            pending_preview: UsageWindow {
                spent: safe_number(usage.pending_preview.spent),
                credited: safe_number(usage.pending_preview.credited),
            },
            trend: outcome.trend,
        }
    });

    GatewaySnapshot {
        pools,
        net_daily_minor: net_daily,
        updated_at_ms: now_ms,
        configured: true,
        mode: config.mode,
        credit_mode: config.credit_mode,
        anchor_ms,
        anchor_updated_at_ms: config.last_anchor_update_ms,
        accrued_days: accrued,
        cycle_length_days: cycle_length,
    }
}

/// Full pipeline: aggregate the ledger, recompute, then preview pending
/// entries against the fresh truth as headroom.
///
/// Missing config or weights degrade to [`GatewaySnapshot::unconfigured`].
pub fn rebuild(
    config: Option<&CashflowConfig>,
    weights: Option<&PoolWeights>,
    ledger: &[LedgerEntry],
    settings: &EngineSettings,
    now_ms: i64,
) -> GatewaySnapshot {
    let (Some(config), Some(weights)) = (config, weights) else {
        tracing::debug!("cashflow config or weights missing, emitting unconfigured snapshot");
        return GatewaySnapshot::unconfigured(now_ms);
    };

    let anchor_ms = effective_anchor_ms(config, settings, now_ms);
    let window =
        AggregationWindow::new(anchor_ms, now_ms).with_trend_window(settings.nudge.window_days);
    // Pending preview runs after recompute against fresh truth headroom.
    let aggregates = aggregate(ledger, config.credit_mode, &window, None);

    let mut snapshot = recompute(config, weights, &aggregates, settings, now_ms);

    let pending = ledger
        .iter()
        .filter(|e| e.is_pending() && window.contains(e));
    let preview = preview_pending(pending, config.credit_mode, now_ms, &snapshot.truth_totals());
    for pool in Pool::ALL {
        snapshot.pools.get_mut(pool).pending_preview = *preview.get(pool);
    }

    tracing::debug!(
        scanned = aggregates.scanned,
        net_daily = snapshot.net_daily_minor,
        accrued_days = snapshot.accrued_days,
        "gateway recompute complete"
    );
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::PoolAggregate;
    use crate::config::NudgeSettings;
    use crate::ledger::{Classification, EntryStatus};
    use crate::pool::Intent;
    use approx::assert_relative_eq;

    const DAY: i64 = 86_400_000;
    const ANCHOR: i64 = 19_000 * DAY;

    /// Net 100/day, all of it to Stamina.
    fn config() -> CashflowConfig {
        CashflowConfig {
            inflow_monthly: 3044.0,
            outflow_monthly: 0.0,
            pay_cycle_anchor_ms: ANCHOR,
            ..Default::default()
        }
    }

    fn stamina_only() -> PoolWeights {
        PoolWeights {
            stamina: 1.0,
            ..Default::default()
        }
    }

    fn on_target_usage(per_day: f64) -> UsageAggregates {
        // Usage exactly at baseline keeps the nudge out of the way.
        let mut aggregates = UsageAggregates::default();
        aggregates.pools.stamina = PoolAggregate {
            last_7_days: per_day * 7.0,
            ..Default::default()
        };
        aggregates
    }

    #[test]
    fn test_concrete_cap_and_wrap() {
        // effective 10/day over 50 days = 500 truth, cap 304.4
        let config = CashflowConfig {
            inflow_monthly: 304.4,
            ..config()
        };
        let now = ANCHOR + 50 * DAY;
        let snap = recompute(&config, &stamina_only(), &on_target_usage(10.0), &EngineSettings::default(), now);
        let stamina = snap.get(Pool::Stamina);

        assert_relative_eq!(stamina.regen_effective_per_day, 10.0, epsilon = 1e-9);
        assert_relative_eq!(stamina.cap_minor, 304.4, epsilon = 1e-9);
        assert_eq!(stamina.banked_cycles, 1);
        assert_relative_eq!(stamina.remainder_minor, 195.6, epsilon = 1e-6);
        assert_relative_eq!(stamina.truth_total_minor, 500.0, epsilon = 1e-6);
        assert!(stamina.is_consistent());
    }

    #[test]
    fn test_spend_and_credit_move_truth() {
        let now = ANCHOR + 10 * DAY;
        let mut aggregates = on_target_usage(100.0);
        aggregates.pools.stamina.since_anchor = UsageWindow {
            spent: 250.0,
            credited: 50.0,
        };
        let snap = recompute(&config(), &stamina_only(), &aggregates, &EngineSettings::default(), now);
        let stamina = snap.get(Pool::Stamina);
        assert_relative_eq!(stamina.truth_total_minor, 1000.0 - 250.0 + 50.0, epsilon = 1e-6);
        assert_eq!(stamina.spent_since_anchor, 250.0);
        assert_eq!(stamina.credit_since_anchor, 50.0);
    }

    #[test]
    fn test_truth_floors_at_zero() {
        let now = ANCHOR + DAY;
        let mut aggregates = on_target_usage(100.0);
        aggregates.pools.stamina.since_anchor.spent = 10_000.0;
        let snap = recompute(&config(), &stamina_only(), &aggregates, &EngineSettings::default(), now);
        let stamina = snap.get(Pool::Stamina);
        assert_eq!(stamina.truth_total_minor, 0.0);
        assert_eq!(stamina.remainder_minor, 0.0);
        assert_eq!(stamina.banked_cycles, 0);
    }

    #[test]
    fn test_negative_net_gives_zero_caps() {
        let config = CashflowConfig {
            inflow_monthly: 1000.0,
            outflow_monthly: 4000.0,
            ..config()
        };
        let snap = recompute(&config, &PoolWeights::fallback(), &UsageAggregates::default(), &EngineSettings::default(), ANCHOR + 5 * DAY);
        assert!(snap.net_daily_minor < 0.0);
        for (_, pool) in snap.pools.iter() {
            assert!(pool.cap_minor <= 0.0);
            assert_eq!(pool.remainder_minor, 0.0);
            assert_eq!(pool.banked_cycles, 0);
            assert_eq!(pool.truth_total_minor, 0.0);
            assert!(pool.is_consistent());
        }
    }

    #[test]
    fn test_zero_weights_use_fallback_split() {
        let now = ANCHOR + DAY;
        let snap = recompute(&config(), &PoolWeights::default(), &UsageAggregates::default(), &EngineSettings::default(), now);
        assert_relative_eq!(snap.get(Pool::Stamina).regen_baseline_per_day, 50.0, epsilon = 1e-9);
        assert_relative_eq!(snap.get(Pool::Mana).regen_baseline_per_day, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_trend_adjusts_effective_rate() {
        let now = ANCHOR + 10 * DAY;
        let mut aggregates = UsageAggregates::default();
        aggregates.pools.stamina.last_7_days = 1400.0;
        let snap = recompute(&config(), &stamina_only(), &aggregates, &EngineSettings::default(), now);
        let stamina = snap.get(Pool::Stamina);
        assert_eq!(stamina.trend, Trend::Overspending);
        assert_relative_eq!(stamina.regen_effective_per_day, 95.0, epsilon = 1e-9);
        assert_relative_eq!(stamina.cap_minor, 95.0 * 30.44, epsilon = 1e-6);
    }

    #[test]
    fn test_finite_mode_stops_accruing_after_one_cycle() {
        let config = CashflowConfig {
            mode: CashflowMode::Finite,
            ..config()
        };
        let now = ANCHOR + 90 * DAY;
        let snap = recompute(&config, &stamina_only(), &on_target_usage(100.0), &EngineSettings::default(), now);
        assert_relative_eq!(snap.accrued_days, 30.44);
        let stamina = snap.get(Pool::Stamina);
        assert_eq!(stamina.banked_cycles, 1);
        assert!(stamina.remainder_minor < 1e-6);
    }

    #[test]
    fn test_without_carry_over_anchor_rolls_forward() {
        let settings = EngineSettings {
            cycle_length_days: 30.0,
            carry_over: false,
            ..Default::default()
        };
        let now = ANCHOR + 75 * DAY;
        assert_eq!(effective_anchor_ms(&config(), &settings, now), ANCHOR + 60 * DAY);

        let snap = recompute(&config(), &stamina_only(), &on_target_usage(100.0), &settings, now);
        assert_relative_eq!(snap.accrued_days, 15.0, epsilon = 1e-9);
        assert_eq!(snap.get(Pool::Stamina).banked_cycles, 0);
    }

    #[test]
    fn test_anchor_in_future_accrues_nothing() {
        let snap = recompute(&config(), &stamina_only(), &UsageAggregates::default(), &EngineSettings::default(), ANCHOR - DAY);
        assert_eq!(snap.accrued_days, 0.0);
        assert_eq!(snap.get(Pool::Stamina).truth_total_minor, 0.0);
    }

    #[test]
    fn test_extreme_anchor_and_clock_do_not_overflow() {
        assert!(accrued_days(i64::MIN, i64::MAX, CashflowMode::Continuous, 30.44).is_finite());
        assert_eq!(accrued_days(i64::MAX, i64::MIN, CashflowMode::Continuous, 30.44), 0.0);

        let settings = EngineSettings {
            carry_over: false,
            ..Default::default()
        };
        let config = CashflowConfig {
            pay_cycle_anchor_ms: i64::MIN,
            ..config()
        };
        let anchor = effective_anchor_ms(&config, &settings, i64::MAX);
        assert!(anchor > i64::MIN);

        let snap = rebuild(Some(&config), Some(&stamina_only()), &[], &settings, i64::MAX);
        assert!(snap.configured);
        assert!(snap.accrued_days.is_finite());
    }

    #[test]
    fn test_corrupt_aggregates_never_leak_nan() {
        let mut aggregates = UsageAggregates::default();
        aggregates.pools.stamina.since_anchor.spent = f64::NAN;
        aggregates.pools.mana.last_7_days = f64::INFINITY;
        let config = CashflowConfig {
            inflow_monthly: f64::NAN,
            ..config()
        };
        let snap = recompute(&config, &stamina_only(), &aggregates, &EngineSettings::default(), ANCHOR + DAY);
        let json = serde_json::to_string(&snap).unwrap();
        assert!(!json.contains("null"), "non-finite values serialise as null: {json}");
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let now = ANCHOR + 12 * DAY;
        let ledger = vec![
            LedgerEntry::new(-320.0, ANCHOR + DAY, EntryStatus::Confirmed).with_id("a"),
            LedgerEntry::new(-40.0, ANCHOR + 11 * DAY, EntryStatus::Confirmed)
                .with_id("b")
                .with_intent(Intent::Mana),
            LedgerEntry::new(75.0, ANCHOR + 2 * DAY, EntryStatus::Confirmed).with_id("c"),
            LedgerEntry::new(-60.0, ANCHOR + 12 * DAY, EntryStatus::Pending).with_id("d"),
        ];
        let settings = EngineSettings::default();
        let weights = PoolWeights::fallback();

        let a = rebuild(Some(&config()), Some(&weights), &ledger, &settings, now);
        let b = rebuild(Some(&config()), Some(&weights), &ledger, &settings, now);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_rebuild_without_config_is_unconfigured() {
        let snap = rebuild(None, Some(&PoolWeights::fallback()), &[], &EngineSettings::default(), 42);
        assert!(!snap.configured);
        assert_eq!(snap.updated_at_ms, 42);
        for (_, pool) in snap.pools.iter() {
            assert_eq!(pool.cap_minor, 0.0);
            assert_eq!(pool.remainder_minor, 0.0);
        }

        let no_weights = rebuild(Some(&config()), None, &[], &EngineSettings::default(), 42);
        assert!(!no_weights.configured);
    }

    #[test]
    fn test_rebuild_previews_pending_against_truth() {
        // 5 days at 100/day = 500 stamina truth; two pending debits compete.
        let now = ANCHOR + 5 * DAY;
        let ledger = vec![
            LedgerEntry::new(-300.0, ANCHOR + 4 * DAY, EntryStatus::Pending).with_id("p1"),
            LedgerEntry::new(-300.0, ANCHOR + 5 * DAY, EntryStatus::Pending).with_id("p2"),
            LedgerEntry::new(-999.0, ANCHOR + DAY, EntryStatus::Confirmed)
                .with_classification(Classification::CoreOutflow),
        ];
        // No confirmed spend in the trend window: disable the underspend bump.
        let settings = EngineSettings {
            nudge: NudgeSettings {
                underspend_ratio: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let snap = rebuild(Some(&config()), Some(&stamina_only()), &ledger, &settings, now);
        let stamina = snap.get(Pool::Stamina);
        let health = snap.get(Pool::Health);
        assert_relative_eq!(stamina.truth_total_minor, 500.0, epsilon = 1e-6);
        assert_relative_eq!(stamina.pending_preview.spent, 500.0, epsilon = 1e-6);
        assert_relative_eq!(health.pending_preview.spent, 100.0, epsilon = 1e-6);
        assert_eq!(stamina.spent_since_anchor, 0.0, "pending never touches truth");
    }
}
