mod server;
mod watch;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rmcp::{ServiceExt, transport::stdio};
use vp_core::time::{ms_to_iso8601, now_ms, parse_date_ms};
use vp_core::{
    CashflowConfig, CashflowMode, Classification, CreditMode, EntryStatus, GatewaySnapshot,
    Intent, LedgerEntry, PoolAmounts, PoolWeights, RuntimeLoopContext, debited_total,
};
use vp_store::{ProfileStore, default_base_dir, list_profiles};

#[derive(Parser)]
#[command(name = "vp", about = "Vital pool resource-truth engine")]
struct Cli {
    /// Profile to operate on (defaults to "default")
    #[arg(long, global = true, env = "VP_PROFILE")]
    profile: Option<String>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server on stdio transport
    Serve,

    /// Show or edit the cashflow configuration
    Config {
        #[arg(long)]
        mode: Option<CashflowMode>,

        #[arg(long)]
        credit_mode: Option<CreditMode>,

        /// Monthly inflow in minor units
        #[arg(long)]
        inflow: Option<f64>,

        /// Monthly outflow in minor units
        #[arg(long)]
        outflow: Option<f64>,

        /// Pay-cycle anchor (YYYY-MM-DD or Unix ms)
        #[arg(long)]
        anchor: Option<String>,
    },

    /// Show or edit pool weights
    Weights {
        #[arg(long)]
        health: Option<f64>,
        #[arg(long)]
        mana: Option<f64>,
        #[arg(long)]
        stamina: Option<f64>,
        #[arg(long)]
        essence: Option<f64>,
    },

    /// Record a transaction (negative amounts are spends)
    Record {
        /// Amount in minor units
        #[arg(allow_hyphen_values = true)]
        amount: f64,

        /// Spend intent: mana or stamina
        #[arg(long)]
        intent: Option<Intent>,

        /// Record as a pending hold instead of a confirmed entry
        #[arg(long)]
        pending: bool,

        #[arg(long, default_value = "other")]
        classification: Classification,

        /// When a pending hold lapses (YYYY-MM-DD or Unix ms)
        #[arg(long)]
        expires: Option<String>,

        /// Transaction time (YYYY-MM-DD or Unix ms, defaults to now)
        #[arg(long)]
        at: Option<String>,

        /// Explicit entry id (a v4 UUID is generated otherwise)
        #[arg(long)]
        id: Option<String>,
    },

    /// Confirm a pending entry
    Settle {
        id: String,

        /// Settled Health share, in minor units
        #[arg(long)]
        health: Option<f64>,
        /// Settled Mana share, in minor units
        #[arg(long)]
        mana: Option<f64>,
        /// Settled Stamina share, in minor units
        #[arg(long)]
        stamina: Option<f64>,
    },

    /// List ledger entries
    Entries {
        #[arg(long)]
        status: Option<EntryStatus>,

        /// Earliest timestamp (YYYY-MM-DD or Unix ms)
        #[arg(long)]
        from: Option<String>,

        /// Latest timestamp, exclusive (YYYY-MM-DD or Unix ms)
        #[arg(long)]
        to: Option<String>,

        #[arg(long)]
        classification: Option<Classification>,
    },

    /// Import a ledger JSON file
    Import {
        /// Input file path
        path: PathBuf,
    },

    /// Rebuild the snapshot from config, weights and ledger
    Recompute,

    /// Show the current snapshot
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Project pending entries onto the pools
    Preview {
        #[arg(long)]
        json: bool,
    },

    /// Run the frame loop, rendering until interrupted
    Watch {
        /// Milliseconds between frames
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,

        /// Milliseconds between pending-set polls
        #[arg(long, default_value_t = 2000)]
        poll_ms: u64,

        /// Milliseconds between full recomputes
        #[arg(long, default_value_t = 60_000)]
        recompute_ms: u64,

        /// Stop after this many frames
        #[arg(long)]
        frames: Option<u64>,

        /// Emit frames as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Export the ledger or snapshot to a JSON file
    Export {
        what: ExportKind,

        /// Output file path
        path: PathBuf,
    },

    /// List profiles with a database
    Profiles,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportKind {
    Ledger,
    Snapshot,
}

fn data_dir() -> Option<PathBuf> {
    std::env::var("VP_DATA_DIR").ok().map(PathBuf::from)
}

fn open_store(cli: &Cli) -> Result<ProfileStore> {
    let base_dir = data_dir();
    ProfileStore::open(cli.profile.as_deref(), base_dir.as_deref())
        .context("failed to open profile store")
}

fn parse_time(label: &str, input: &str) -> Result<i64> {
    parse_date_ms(input)
        .with_context(|| format!("invalid {label} '{input}': expected YYYY-MM-DD or Unix ms"))
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Serve => cmd_serve(&cli).await,
        Commands::Config {
            mode,
            credit_mode,
            inflow,
            outflow,
            anchor,
        } => cmd_config(&cli, *mode, *credit_mode, *inflow, *outflow, anchor.as_deref()),
        Commands::Weights {
            health,
            mana,
            stamina,
            essence,
        } => cmd_weights(&cli, [*health, *mana, *stamina, *essence]),
        Commands::Record {
            amount,
            intent,
            pending,
            classification,
            expires,
            at,
            id,
        } => cmd_record(
            &cli,
            *amount,
            *intent,
            *pending,
            *classification,
            expires.as_deref(),
            at.as_deref(),
            id.as_deref(),
        ),
        Commands::Settle {
            id,
            health,
            mana,
            stamina,
        } => cmd_settle(&cli, id, [*health, *mana, *stamina]),
        Commands::Entries {
            status,
            from,
            to,
            classification,
        } => cmd_entries(&cli, *status, from.as_deref(), to.as_deref(), *classification),
        Commands::Import { path } => cmd_import(&cli, path),
        Commands::Recompute => cmd_recompute(&cli),
        Commands::Status { json } => cmd_status(&cli, *json),
        Commands::Preview { json } => cmd_preview(&cli, *json),
        Commands::Watch {
            interval_ms,
            poll_ms,
            recompute_ms,
            frames,
            json,
        } => {
            let options = watch::WatchOptions {
                interval_ms: *interval_ms,
                poll_ms: *poll_ms,
                recompute_ms: *recompute_ms,
                frames: *frames,
                json: *json,
            };
            cmd_watch(&cli, options).await
        }
        Commands::Export { what, path } => cmd_export(&cli, *what, path),
        Commands::Profiles => cmd_profiles(),
    }
}

async fn cmd_serve(cli: &Cli) -> Result<()> {
    let store = open_store(cli)?;
    tracing::info!("starting MCP server for profile '{}'", store.profile());

    let server = server::VpServer::new(store);
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;
    service.waiting().await?;
    Ok(())
}

fn cmd_config(
    cli: &Cli,
    mode: Option<CashflowMode>,
    credit_mode: Option<CreditMode>,
    inflow: Option<f64>,
    outflow: Option<f64>,
    anchor: Option<&str>,
) -> Result<()> {
    let store = open_store(cli)?;
    let now = now_ms();
    let existing = store
        .store()
        .load_config()
        .context("failed to load config")?;
    let edited = mode.is_some()
        || credit_mode.is_some()
        || inflow.is_some()
        || outflow.is_some()
        || anchor.is_some();

    let mut config = existing.clone().unwrap_or_else(|| CashflowConfig {
        pay_cycle_anchor_ms: now,
        last_anchor_update_ms: now,
        ..Default::default()
    });
    if let Some(mode) = mode {
        config.mode = mode;
    }
    if let Some(credit_mode) = credit_mode {
        config.credit_mode = credit_mode;
    }
    if let Some(inflow) = inflow {
        config.inflow_monthly = inflow;
    }
    if let Some(outflow) = outflow {
        config.outflow_monthly = outflow;
    }
    if let Some(anchor) = anchor {
        config.pay_cycle_anchor_ms = parse_time("anchor", anchor)?;
        config.last_anchor_update_ms = now;
    }

    if edited {
        store
            .store()
            .save_config(&config)
            .context("failed to save config")?;
        store
            .recompute(now)
            .context("failed to recompute after config change")?;
    } else if existing.is_none() {
        println!("(no cashflow config; pass --inflow/--outflow/--anchor to create one)");
        return Ok(());
    }

    println!("mode:        {}", config.mode);
    println!("credit_mode: {}", config.credit_mode);
    println!("inflow:      {:.2}/month", config.inflow_monthly);
    println!("outflow:     {:.2}/month", config.outflow_monthly);
    println!("anchor:      {}", ms_to_iso8601(config.pay_cycle_anchor_ms));
    println!(
        "net_daily:   {:.2}",
        config.net_daily(store.settings().days_per_month)
    );
    Ok(())
}

fn cmd_weights(cli: &Cli, edits: [Option<f64>; 4]) -> Result<()> {
    let store = open_store(cli)?;
    let mut weights = store
        .store()
        .load_weights()
        .context("failed to load weights")?
        .unwrap_or_default();

    let [health, mana, stamina, essence] = edits;
    if edits.iter().any(Option::is_some) {
        weights = PoolWeights {
            health: health.unwrap_or(weights.health),
            mana: mana.unwrap_or(weights.mana),
            stamina: stamina.unwrap_or(weights.stamina),
            essence: essence.unwrap_or(weights.essence),
        };
        store
            .store()
            .save_weights(&weights)
            .context("failed to save weights")?;
        store
            .recompute(now_ms())
            .context("failed to recompute after weights change")?;
    }

    println!("health:  {}", weights.health);
    println!("mana:    {}", weights.mana);
    println!("stamina: {}", weights.stamina);
    println!("essence: {}", weights.essence);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_record(
    cli: &Cli,
    amount: f64,
    intent: Option<Intent>,
    pending: bool,
    classification: Classification,
    expires: Option<&str>,
    at: Option<&str>,
    id: Option<&str>,
) -> Result<()> {
    let store = open_store(cli)?;
    let timestamp = match at {
        Some(at) => parse_time("timestamp", at)?,
        None => now_ms(),
    };
    let status = if pending {
        EntryStatus::Pending
    } else {
        EntryStatus::Confirmed
    };

    let mut entry = LedgerEntry::new(amount, timestamp, status).with_classification(classification);
    if let Some(id) = id {
        entry = entry.with_id(id);
    }
    if let Some(intent) = intent {
        entry = entry.with_intent(intent);
    }
    if let Some(expires) = expires {
        entry = entry.with_expiry(parse_time("expiry", expires)?);
    }

    store
        .store()
        .upsert_entry(&entry)
        .context("failed to record entry")?;
    store
        .recompute(now_ms())
        .context("failed to recompute after record")?;
    println!("{} {} {:.2}", entry.id, entry.status, entry.amount_minor);
    Ok(())
}

fn cmd_settle(cli: &Cli, id: &str, shares: [Option<f64>; 3]) -> Result<()> {
    let store = open_store(cli)?;
    let allocation = shares.iter().any(Option::is_some).then(|| {
        let [health, mana, stamina] = shares;
        PoolAmounts {
            health: health.unwrap_or(0.0),
            mana: mana.unwrap_or(0.0),
            stamina: stamina.unwrap_or(0.0),
            essence: 0.0,
        }
    });

    let entry = store
        .store()
        .settle_entry(id, allocation)
        .with_context(|| format!("failed to settle {id}"))?;
    store
        .recompute(now_ms())
        .context("failed to recompute after settle")?;
    println!("{} {}", entry.id, entry.status);
    Ok(())
}

fn cmd_entries(
    cli: &Cli,
    status: Option<EntryStatus>,
    from: Option<&str>,
    to: Option<&str>,
    classification: Option<Classification>,
) -> Result<()> {
    let store = open_store(cli)?;
    let from = from.map(|f| parse_time("from", f)).transpose()?.unwrap_or(i64::MIN);
    let to = to.map(|t| parse_time("to", t)).transpose()?.unwrap_or(i64::MAX);

    let entries = store
        .store()
        .entries_in_range(from, to, classification)
        .context("failed to read ledger")?;
    let mut shown = 0usize;
    for entry in entries
        .iter()
        .filter(|e| status.is_none_or(|s| e.status == s))
    {
        println!(
            "{}  {}  {:>10.2}  {:<9}  {:<11}  {}",
            ms_to_iso8601(entry.timestamp_ms),
            entry.id,
            entry.amount_minor,
            entry.status,
            entry.classification,
            entry.intent(),
        );
        shown += 1;
    }
    if shown == 0 {
        println!("(no entries)");
    }
    Ok(())
}

fn cmd_import(cli: &Cli, path: &Path) -> Result<()> {
    let store = open_store(cli)?;
    let n = store
        .store()
        .import_ledger_file(path)
        .context("failed to import ledger")?;
    let snapshot = store
        .recompute(now_ms())
        .context("failed to recompute after import")?;

    println!(
        "imported {n} entries from {}. configured={}, net_daily={:.2}",
        path.display(),
        snapshot.configured,
        snapshot.net_daily_minor
    );
    Ok(())
}

fn cmd_recompute(cli: &Cli) -> Result<()> {
    let store = open_store(cli)?;
    let snapshot = store.recompute(now_ms()).context("failed to recompute")?;
    print_snapshot(store.profile(), &snapshot);
    Ok(())
}

fn cmd_status(cli: &Cli, json: bool) -> Result<()> {
    let store = open_store(cli)?;
    let snapshot = store
        .snapshot_or_recompute(now_ms())
        .context("failed to load snapshot")?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot).context("failed to serialize snapshot")?
        );
    } else {
        print_snapshot(store.profile(), &snapshot);
    }
    Ok(())
}

fn print_snapshot(profile: &str, snapshot: &GatewaySnapshot) {
    println!("profile:   {profile}");
    if !snapshot.configured {
        println!("(not configured; run `vp config` and `vp weights`)");
        return;
    }
    println!(
        "mode:      {} (credits -> {})",
        snapshot.mode, snapshot.credit_mode
    );
    println!("anchor:    {}", ms_to_iso8601(snapshot.anchor_ms));
    println!("accrued:   {:.2} days", snapshot.accrued_days);
    println!("net_daily: {:.2}", snapshot.net_daily_minor);
    println!();
    println!(
        "{:<8} {:>10} {:>10} {:>6} {:>10} {:>8}  trend",
        "pool", "truth", "cap", "banked", "remainder", "regen"
    );
    for (_, pool) in snapshot.pools.iter() {
        println!(
            "{:<8} {:>10.2} {:>10.2} {:>6} {:>10.2} {:>8.2}  {}",
            pool.pool,
            pool.truth_total_minor,
            pool.cap_minor,
            pool.banked_cycles,
            pool.remainder_minor,
            pool.regen_effective_per_day,
            pool.trend,
        );
    }
}

fn cmd_preview(cli: &Cli, json: bool) -> Result<()> {
    let store = open_store(cli)?;
    let now = now_ms();
    let snapshot = store
        .snapshot_or_recompute(now)
        .context("failed to load snapshot")?;
    let pending = store
        .pending_entries(now)
        .context("failed to read pending entries")?;
    let count = pending.len();

    let mut ctx = RuntimeLoopContext::new(snapshot);
    ctx.replace_pending(pending);
    ctx.start(now);
    let frame = ctx
        .tick(now)
        .context("runtime loop did not produce a frame")?;
    ctx.stop();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&frame).context("failed to serialize frame")?
        );
        return Ok(());
    }

    let liability = frame.pools.map(|_, p| p.liability_minor);
    println!(
        "pending:   {count} entries, {:.2} owed",
        debited_total(&liability)
    );
    watch::print_frame_table(&frame);
    if !frame.dropped.is_empty() {
        println!("dropped:   {}", frame.dropped.join(", "));
    }
    Ok(())
}

async fn cmd_watch(cli: &Cli, options: watch::WatchOptions) -> Result<()> {
    let store = open_store(cli)?;
    // The poller gets its own connection; the frame loop never touches SQLite.
    let poller = open_store(cli)?;
    let frames = watch::run(store, poller, options).await?;
    tracing::info!(frames, "watch finished");
    Ok(())
}

fn cmd_export(cli: &Cli, what: ExportKind, path: &Path) -> Result<()> {
    let store = open_store(cli)?;
    match what {
        ExportKind::Ledger => {
            let json = store
                .store()
                .export_ledger_string()
                .context("failed to serialize ledger")?;
            std::fs::write(path, &json)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        ExportKind::Snapshot => {
            let now = now_ms();
            store
                .snapshot_or_recompute(now)
                .context("failed to load snapshot")?;
            store
                .store()
                .export_snapshot_file(path, now)
                .context("failed to export snapshot")?;
        }
    }

    println!("exported to {}", path.display());
    Ok(())
}

fn cmd_profiles() -> Result<()> {
    let base = data_dir().unwrap_or_else(default_base_dir);
    let profiles = list_profiles(&base).context("failed to list profiles")?;
    if profiles.is_empty() {
        println!("(no profiles)");
    }
    for profile in profiles {
        println!("{profile}");
    }
    Ok(())
}
