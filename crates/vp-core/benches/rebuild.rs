use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use vp_core::{
    CashflowConfig, EngineSettings, EntryStatus, Intent, LedgerEntry, PoolWeights,
    RuntimeLoopContext, rebuild,
};

const DAY: i64 = 86_400_000;
const ANCHOR: i64 = 20_000 * DAY;

fn ledger(n: usize) -> Vec<LedgerEntry> {
    (0..n)
        .map(|i| {
            let ts = ANCHOR + (i as i64 * DAY) / 40;
            let status = if i % 10 == 0 {
                EntryStatus::Pending
            } else {
                EntryStatus::Confirmed
            };
            let amount = if i % 7 == 0 { 250.0 } else { -(i as f64 % 90.0) - 1.0 };
            let entry = LedgerEntry::new(amount, ts, status).with_id(format!("e{i}"));
            if i % 3 == 0 {
                entry.with_intent(Intent::Mana)
            } else {
                entry
            }
        })
        .collect()
}

fn config() -> CashflowConfig {
    CashflowConfig {
        inflow_monthly: 450_000.0,
        outflow_monthly: 210_000.0,
        pay_cycle_anchor_ms: ANCHOR,
        ..Default::default()
    }
}

fn bench_rebuild(c: &mut Criterion) {
    let settings = EngineSettings::default();
    let weights = PoolWeights::fallback();
    let mut group = c.benchmark_group("rebuild");
    for n in [100usize, 1_000, 10_000] {
        let entries = ledger(n);
        let now = ANCHOR + 30 * DAY;
        group.bench_with_input(BenchmarkId::from_parameter(n), &entries, |b, entries| {
            b.iter(|| rebuild(Some(&config()), Some(&weights), black_box(entries), &settings, now))
        });
    }
    group.finish();
}

fn bench_frame(c: &mut Criterion) {
    let entries = ledger(1_000);
    let now = ANCHOR + 30 * DAY;
    let snap = rebuild(
        Some(&config()),
        Some(&PoolWeights::fallback()),
        &entries,
        &EngineSettings::default(),
        now,
    );
    let mut ctx = RuntimeLoopContext::new(snap);
    ctx.start(now);
    ctx.replace_pending(entries.into_iter().filter(|e| e.is_pending()).collect());

    let mut t = now;
    c.bench_function("runtime_tick", |b| {
        b.iter(|| {
            t += 16;
            black_box(ctx.tick(t))
        })
    });
}

criterion_group!(benches, bench_rebuild, bench_frame);
criterion_main!(benches);
