//! Frame-driven extrapolation and ghost projection.
//!
//! `RuntimeLoopContext` holds the last authoritative snapshot and the current
//! pending set. Each `tick` extrapolates truth forward from the snapshot,
//! turns the pending set into per-pool liability, and projects the ghost
//! overlay. The host owns the context and drives it; nothing here spawns
//! tasks or keeps global state.

use serde::Serialize;

use crate::config::CashflowMode;
use crate::gateway::GatewaySnapshot;
use crate::ghost::{GhostProjection, pending_liability, project};
use crate::ledger::LedgerEntry;
use crate::nudge::Trend;
use crate::pool::{PerPool, Pool};
use crate::time::{Clock, days_between};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolFrame {
    pub pool: Pool,
    /// Snapshot truth plus regeneration since the snapshot was taken.
    pub truth_minor: f64,
    pub cap_minor: f64,
    pub remainder_minor: f64,
    pub banked_cycles: u64,
    pub liability_minor: f64,
    pub trend: Trend,
    pub ghost: GhostProjection,
}

/// One rendered frame: snapshot view plus ghost overlay for every pool.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub at_ms: i64,
    pub sequence: u64,
    pub configured: bool,
    pub pools: PerPool<PoolFrame>,
    /// Pending entries that could not be projected this frame.
    pub dropped: Vec<String>,
}

/// Render boundary.
pub trait FrameSink {
    fn render(&mut self, frame: &Frame);
}

impl<F: FnMut(&Frame)> FrameSink for F {
    fn render(&mut self, frame: &Frame) {
        self(frame)
    }
}

#[derive(Debug)]
pub struct RuntimeLoopContext {
    snapshot: GatewaySnapshot,
    pending: Vec<LedgerEntry>,
    running: bool,
    sequence: u64,
}

impl RuntimeLoopContext {
    pub fn new(snapshot: GatewaySnapshot) -> Self {
        Self {
            snapshot,
            pending: Vec::new(),
            running: false,
            sequence: 0,
        }
    }

    pub fn start(&mut self, now_ms: i64) {
        if !self.running {
            tracing::debug!(now_ms, "runtime loop started");
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        if self.running {
            tracing::debug!(frames = self.sequence, "runtime loop stopped");
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Replace the extrapolation baseline with a fresh recompute.
    pub fn rebase(&mut self, snapshot: GatewaySnapshot) {
        self.snapshot = snapshot;
    }

    /// Swap in a whole new pending set. Takes effect on the next tick.
    pub fn replace_pending(&mut self, pending: Vec<LedgerEntry>) {
        self.pending = pending;
    }

    pub fn snapshot(&self) -> &GatewaySnapshot {
        &self.snapshot
    }

    pub fn pending(&self) -> &[LedgerEntry] {
        &self.pending
    }

    /// Days of regeneration to add on top of the snapshot at `now_ms`.
    fn extrapolation_days(&self, now_ms: i64) -> f64 {
        let elapsed = days_between(self.snapshot.updated_at_ms, now_ms).max(0.0);
        match self.snapshot.mode {
            CashflowMode::Continuous => elapsed,
            CashflowMode::Finite => {
                let left = (self.snapshot.cycle_length_days - self.snapshot.accrued_days).max(0.0);
                elapsed.min(left)
            }
        }
    }

    /// Compute one frame. `None` while stopped.
    pub fn tick(&mut self, now_ms: i64) -> Option<Frame> {
        if !self.running {
            return None;
        }
        let days = self.extrapolation_days(now_ms);

        let truths = self.snapshot.pools.map(|_, p| {
            (p.truth_total_minor + p.regen_effective_per_day * days).max(0.0)
        });
        let liability =
            pending_liability(&self.pending, self.snapshot.credit_mode, &truths, now_ms);

        let pools = self.snapshot.pools.map(|pool, p| {
            let truth = *truths.get(pool);
            let owed = *liability.liability.get(pool);
            let ghost = project(truth, p.cap_minor, owed);
            PoolFrame {
                pool,
                truth_minor: truth,
                cap_minor: p.cap_minor,
                remainder_minor: ghost.remainder_before,
                banked_cycles: ghost.banked_before,
                liability_minor: owed,
                trend: p.trend,
                ghost,
            }
        });

        self.sequence += 1;
        Some(Frame {
            at_ms: now_ms,
            sequence: self.sequence,
            configured: self.snapshot.configured,
            pools,
            dropped: liability.dropped,
        })
    }

    /// Tick at the clock's time and hand the frame to `sink`.
    /// Returns whether a frame was rendered.
    pub fn tick_into(&mut self, clock: &dyn Clock, sink: &mut dyn FrameSink) -> bool {
        match self.tick(clock.now_ms()) {
            Some(frame) => {
                sink.render(&frame);
                true
            }
            None => false,
        }
    }
}
