use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;
use vp_core::{
    Classification, Clock, EntryStatus, GatewaySnapshot, Intent, LedgerEntry, PoolAmounts,
    RuntimeLoopContext, SystemClock, debited_total,
};
use vp_store::ProfileStore;

#[derive(Clone)]
pub struct VpServer {
    state: Arc<Mutex<ProfileStore>>,
    clock: Arc<dyn Clock>,
    tool_router: ToolRouter<Self>,
}

impl VpServer {
    pub fn new(store: ProfileStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: ProfileStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(store)),
            clock,
            tool_router: Self::tool_router(),
        }
    }

    fn snapshot_json(snapshot: &GatewaySnapshot) -> serde_json::Value {
        let pools: serde_json::Map<String, serde_json::Value> = snapshot
            .pools
            .iter()
            .map(|(pool, p)| {
                (
                    pool.to_string(),
                    serde_json::json!({
                        "truth": p.truth_total_minor,
                        "cap": p.cap_minor,
                        "banked": p.banked_cycles,
                        "remainder": p.remainder_minor,
                        "regen_per_day": p.regen_effective_per_day,
                        "trend": p.trend,
                    }),
                )
            })
            .collect();
        serde_json::json!({
            "configured": snapshot.configured,
            "updated_at_ms": snapshot.updated_at_ms,
            "mode": snapshot.mode,
            "credit_mode": snapshot.credit_mode,
            "net_daily": snapshot.net_daily_minor,
            "pools": pools,
        })
    }
}

fn text_result(value: &serde_json::Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value).unwrap_or_default(),
    )])
}

// --- Tool parameter types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct RecordRequest {
    /// Amount in minor units. Negative for spends, positive for credits.
    amount_minor: f64,
    /// Spend intent: "mana" or "stamina" (defaults to stamina)
    intent: Option<String>,
    /// Record as a pending hold instead of a confirmed entry
    #[serde(default)]
    pending: bool,
    /// "other" (default), "coreInflow" or "coreOutflow"
    classification: Option<String>,
    /// Transaction time in Unix ms (defaults to now)
    timestamp_ms: Option<i64>,
    /// When a pending hold lapses, in Unix ms
    expiry_ms: Option<i64>,
    /// Explicit entry id; a UUID is generated when omitted
    id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SettledShares {
    #[serde(default)]
    health: f64,
    #[serde(default)]
    mana: f64,
    #[serde(default)]
    stamina: f64,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SettleRequest {
    /// Id of the pending entry to confirm
    id: String,
    /// How the settled spend was actually split, when known
    allocation: Option<SettledShares>,
}

#[tool_router]
impl VpServer {
    #[tool(
        description = "Current per-pool resource truth: cap, banked cycles, visible remainder, regeneration rate and spend trend. Uses the stored snapshot and recomputes only when none exists."
    )]
    async fn vp_status(&self) -> Result<CallToolResult, McpError> {
        let store = self.state.lock().await;
        let snapshot = store
            .snapshot_or_recompute(self.clock.now_ms())
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let mut result = Self::snapshot_json(&snapshot);
        result["profile"] = serde_json::json!(store.profile());
        Ok(text_result(&result))
    }

    #[tool(
        description = "Rebuild the snapshot from the cashflow config, pool weights and confirmed ledger, then store it. Record and settle already do this; call it to roll truth forward to now or after edits made outside this server."
    )]
    async fn vp_recompute(&self) -> Result<CallToolResult, McpError> {
        let store = self.state.lock().await;
        let snapshot = store
            .recompute(self.clock.now_ms())
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(text_result(&Self::snapshot_json(&snapshot)))
    }

    #[tool(
        description = "Record a ledger entry. Negative amounts are spends drawn from the intent pool first, then Health; positive amounts are credits. Pending entries show up as a ghost overlay until settled."
    )]
    async fn vp_record(
        &self,
        Parameters(req): Parameters<RecordRequest>,
    ) -> Result<CallToolResult, McpError> {
        let intent = req
            .intent
            .as_deref()
            .map(str::parse::<Intent>)
            .transpose()
            .map_err(|e| McpError::invalid_params(e, None))?;
        let classification = req
            .classification
            .as_deref()
            .map(str::parse::<Classification>)
            .transpose()
            .map_err(|e| McpError::invalid_params(e, None))?
            .unwrap_or_default();

        let status = if req.pending {
            EntryStatus::Pending
        } else {
            EntryStatus::Confirmed
        };
        let timestamp = req.timestamp_ms.unwrap_or_else(|| self.clock.now_ms());
        let mut entry =
            LedgerEntry::new(req.amount_minor, timestamp, status).with_classification(classification);
        if let Some(id) = req.id {
            entry = entry.with_id(id);
        }
        if let Some(intent) = intent {
            entry = entry.with_intent(intent);
        }
        if let Some(expiry) = req.expiry_ms {
            entry = entry.with_expiry(expiry);
        }

        let store = self.state.lock().await;
        store
            .store()
            .upsert_entry(&entry)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        store
            .recompute(self.clock.now_ms())
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(text_result(&serde_json::json!({
            "id": entry.id,
            "status": entry.status,
            "amount_minor": entry.amount_minor,
            "intent": entry.intent(),
        })))
    }

    #[tool(
        description = "Confirm a pending entry. Optionally pass the allocation the spend actually settled with; it becomes authoritative on the next recompute."
    )]
    async fn vp_settle(
        &self,
        Parameters(req): Parameters<SettleRequest>,
    ) -> Result<CallToolResult, McpError> {
        let allocation = req.allocation.map(|shares| PoolAmounts {
            health: shares.health,
            mana: shares.mana,
            stamina: shares.stamina,
            essence: 0.0,
        });

        let store = self.state.lock().await;
        let entry = store
            .store()
            .settle_entry(&req.id, allocation)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        store
            .recompute(self.clock.now_ms())
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(text_result(&serde_json::json!({
            "id": entry.id,
            "status": entry.status,
        })))
    }

    #[tool(
        description = "Project the current pending entries onto the pools: per-pool liability and what cap, banked cycles and remainder will look like once they settle."
    )]
    async fn vp_preview(&self) -> Result<CallToolResult, McpError> {
        let now = self.clock.now_ms();
        let (snapshot, pending) = {
            let store = self.state.lock().await;
            let snapshot = store
                .snapshot_or_recompute(now)
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
            let pending = store
                .pending_entries(now)
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
            (snapshot, pending)
        };
        let count = pending.len();

        let mut ctx = RuntimeLoopContext::new(snapshot);
        ctx.replace_pending(pending);
        ctx.start(now);
        let frame = ctx
            .tick(now)
            .ok_or_else(|| McpError::internal_error("runtime loop produced no frame", None))?;
        ctx.stop();

        let liability = frame.pools.map(|_, p| p.liability_minor);
        let result = serde_json::json!({
            "pending": count,
            "owed": debited_total(&liability),
            "dropped": frame.dropped,
            "frame": frame,
        });
        Ok(text_result(&result))
    }
}

#[tool_handler]
impl ServerHandler for VpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Vital pools: four regenerating resource pools (health, mana, stamina, essence) \
                 fed by monthly cashflow and drained by ledger spends.\n\n\
                 - vp_status shows the authoritative truth for each pool.\n\
                 - vp_record adds spends (negative) or credits (positive); mark card holds as pending.\n\
                 - vp_settle confirms a pending hold once it posts.\n\
                 - vp_preview shows what the pools look like once every pending entry settles.\n\
                 - vp_recompute rolls the snapshot forward; record and settle refresh it themselves."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
