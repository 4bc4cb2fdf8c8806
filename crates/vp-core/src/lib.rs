//! Vital pools resource-truth engine.
//!
//! Turns a daily regeneration rate, a ledger of confirmed and pending
//! transactions, and a pay-cycle anchor into an authoritative per-pool
//! snapshot (cap, banked cycles, visible remainder) plus a per-frame ghost
//! projection of what each pool looks like once pending entries settle.
//!
//! Zero I/O — pure engine with no opinions about transport or persistence.

pub mod aggregate;
pub mod allocation;
pub mod config;
pub mod constants;
pub mod credit;
pub mod gateway;
pub mod ghost;
pub mod ledger;
pub mod nudge;
pub mod numeric;
pub mod pool;
pub mod runtime;
pub mod serde_compat;
pub mod time;

pub use aggregate::{AggregationWindow, PoolAggregate, UsageAggregates, UsageWindow, aggregate};
pub use allocation::{allocate, allocate_batch, allocate_credit, debited_total, unbounded};
pub use config::{CashflowConfig, CashflowMode, CreditMode, EngineSettings, NudgeSettings, PoolWeights};
pub use constants::{DEFAULT_CYCLE_LENGTH_DAYS, DEFAULT_DAYS_PER_MONTH, EPSILON, MS_PER_DAY};
pub use credit::{CreditEffect, route_credit};
pub use gateway::{GatewaySnapshot, PoolSnapshot, rebuild, recompute};
pub use ghost::{GhostProjection, PendingLiability, pending_liability, project};
pub use ledger::{Classification, EntryStatus, LedgerEntry, LedgerError};
pub use nudge::{NudgeOutcome, Trend, nudge};
pub use numeric::{Wrapped, coerce_json_number, normalize_weights, safe_number, safe_number_or, wrap_into_cap};
pub use pool::{Intent, PerPool, Pool, PoolAmounts};
pub use runtime::{Frame, FrameSink, PoolFrame, RuntimeLoopContext};
pub use serde_compat::{
    CURRENT_VERSION, WireError, export_ledger_json, export_snapshot_json, import_ledger_json,
    import_snapshot_json,
};
pub use time::{Clock, ManualClock, SystemClock};
