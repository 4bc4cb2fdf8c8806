//! Host loop for `vp watch`.
//!
//! The frame loop owns the `RuntimeLoopContext` and never touches SQLite. A
//! poller task owns a second connection, publishes the pending set and the
//! periodic recompute over `watch` channels, and the loop picks both up
//! between frames.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use vp_core::time::ms_to_iso8601;
use vp_core::{Clock, Frame, FrameSink, GatewaySnapshot, LedgerEntry, RuntimeLoopContext, SystemClock};
use vp_store::ProfileStore;

pub struct WatchOptions {
    pub interval_ms: u64,
    pub poll_ms: u64,
    pub recompute_ms: u64,
    /// Stop after this many frames.
    pub frames: Option<u64>,
    pub json: bool,
}

/// Run until Ctrl-C or the frame limit. Returns the number of frames rendered.
pub async fn run(store: ProfileStore, poller: ProfileStore, options: WatchOptions) -> Result<u64> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping watch");
            on_signal.cancel();
        }
    });

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let json = options.json;
    let mut stdout = std::io::stdout();
    let mut sink = |frame: &Frame| {
        if json {
            match serde_json::to_string(frame) {
                Ok(line) => {
                    let _ = writeln!(stdout, "{line}");
                }
                Err(e) => tracing::warn!("failed to serialize frame: {e}"),
            }
        } else {
            print_frame_table(frame);
        }
        let _ = stdout.flush();
    };

    run_with_sink(store, poller, &options, clock, &mut sink, cancel).await
}

/// The loop itself, with the clock, sink and cancellation injected.
pub async fn run_with_sink(
    store: ProfileStore,
    poller: ProfileStore,
    options: &WatchOptions,
    clock: Arc<dyn Clock>,
    sink: &mut dyn FrameSink,
    cancel: CancellationToken,
) -> Result<u64> {
    let now = clock.now_ms();
    let snapshot = store
        .snapshot_or_recompute(now)
        .context("failed to load snapshot")?;
    let pending = store
        .pending_entries(now)
        .context("failed to read pending entries")?;
    drop(store);

    let (pending_tx, mut pending_rx) = watch::channel(pending.clone());
    let (snapshot_tx, mut snapshot_rx) = watch::channel(snapshot.clone());

    let mut ctx = RuntimeLoopContext::new(snapshot);
    ctx.replace_pending(pending);
    ctx.start(now);

    let poll_task = tokio::spawn(poll_store(
        poller,
        Arc::clone(&clock),
        pending_tx,
        snapshot_tx,
        (options.poll_ms, options.recompute_ms),
        cancel.clone(),
    ));

    let mut ticker = tokio::time::interval(Duration::from_millis(options.interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut rendered = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if snapshot_rx.has_changed().unwrap_or(false) {
                    ctx.rebase(snapshot_rx.borrow_and_update().clone());
                }
                if pending_rx.has_changed().unwrap_or(false) {
                    ctx.replace_pending(pending_rx.borrow_and_update().clone());
                }
                if ctx.tick_into(clock.as_ref(), sink) {
                    rendered += 1;
                }
                if options.frames.is_some_and(|limit| rendered >= limit) {
                    break;
                }
            }
        }
    }

    ctx.stop();
    cancel.cancel();
    if let Err(e) = poll_task.await {
        tracing::warn!("store poller ended abnormally: {e}");
    }
    Ok(rendered)
}

async fn poll_store(
    store: ProfileStore,
    clock: Arc<dyn Clock>,
    pending_tx: watch::Sender<Vec<LedgerEntry>>,
    snapshot_tx: watch::Sender<GatewaySnapshot>,
    (poll_ms, recompute_ms): (u64, u64),
    cancel: CancellationToken,
) {
    let mut poll = tokio::time::interval(Duration::from_millis(poll_ms.max(1)));
    let mut recompute = tokio::time::interval(Duration::from_millis(recompute_ms.max(1)));
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    recompute.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The loop already starts from a fresh snapshot.
    recompute.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = poll.tick() => {
                match store.pending_entries(clock.now_ms()) {
                    Ok(pending) => {
                        pending_tx.send_if_modified(|current| {
                            if *current == pending {
                                false
                            } else {
                                *current = pending;
                                true
                            }
                        });
                    }
                    Err(e) => tracing::warn!("pending poll failed: {e}"),
                }
            }
            _ = recompute.tick() => {
                match store.recompute(clock.now_ms()) {
                    Ok(snapshot) => {
                        let _ = snapshot_tx.send(snapshot);
                    }
                    Err(e) => tracing::warn!("periodic recompute failed: {e}"),
                }
            }
        }
    }
    tracing::debug!("store poller stopped");
}

/// Compact per-pool table for one frame.
pub fn print_frame_table(frame: &Frame) {
    println!("frame #{} at {}", frame.sequence, ms_to_iso8601(frame.at_ms));
    if !frame.configured {
        println!("(not configured)");
        return;
    }
    println!(
        "{:<8} {:>10} {:>6} {:>10} {:>10} {:>6} {:>10}",
        "pool", "truth", "banked", "remainder", "pending", "after", "remaining"
    );
    for (_, pool) in frame.pools.iter() {
        println!(
            "{:<8} {:>10.2} {:>6} {:>10.2} {:>10.2} {:>6} {:>10.2}",
            pool.pool,
            pool.truth_minor,
            pool.banked_cycles,
            pool.remainder_minor,
            pool.liability_minor,
            pool.ghost.banked_after,
            pool.ghost.remainder_after,
        );
    }
}
