use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use vp_core::{
    CashflowConfig, CashflowMode, Classification, CreditMode, EntryStatus, GatewaySnapshot,
    Intent, LedgerEntry, PoolAmounts, PoolWeights,
};

use crate::error::{Result, StoreError};
use crate::schema;

const ENTRY_COLUMNS: &str = "id, amount_minor, timestamp_ms, status, classification, intent_pool, applied_allocation, expiry_ms";

pub struct Store {
    conn: Connection,
}

/// Raw `ledger_entries` row before string fields are parsed.
type EntryRow = (
    String,
    f64,
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<i64>,
);

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        Ok(stmt.query_row([key], |row| row.get(0)).optional()?)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Cashflow config ---

    pub fn save_config(&self, config: &CashflowConfig) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO cashflow_config
             (id, mode, credit_mode, inflow_monthly, outflow_monthly, pay_cycle_anchor_ms, last_anchor_update_ms)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                config.mode.to_string(),
                config.credit_mode.to_string(),
                config.inflow_monthly,
                config.outflow_monthly,
                config.pay_cycle_anchor_ms,
                config.last_anchor_update_ms,
            ],
        )?;
        Ok(())
    }

    pub fn load_config(&self) -> Result<Option<CashflowConfig>> {
        let row: Option<(String, String, f64, f64, i64, i64)> = self
            .conn
            .query_row(
                "SELECT mode, credit_mode, inflow_monthly, outflow_monthly, pay_cycle_anchor_ms, last_anchor_update_ms
                 FROM cashflow_config WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((mode, credit_mode, inflow, outflow, anchor, anchor_updated)) = row else {
            return Ok(None);
        };
        Ok(Some(CashflowConfig {
            mode: mode.parse::<CashflowMode>().map_err(StoreError::InvalidData)?,
            credit_mode: credit_mode
                .parse::<CreditMode>()
                .map_err(StoreError::InvalidData)?,
            inflow_monthly: inflow,
            outflow_monthly: outflow,
            pay_cycle_anchor_ms: anchor,
            last_anchor_update_ms: anchor_updated,
        }))
    }

    // --- Pool weights ---

    pub fn save_weights(&self, weights: &PoolWeights) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO pool_weights (id, health, mana, stamina, essence)
             VALUES (1, ?1, ?2, ?3, ?4)",
            params![weights.health, weights.mana, weights.stamina, weights.essence],
        )?;
        Ok(())
    }

    pub fn load_weights(&self) -> Result<Option<PoolWeights>> {
        let weights = self
            .conn
            .query_row(
                "SELECT health, mana, stamina, essence FROM pool_weights WHERE id = 1",
                [],
                |row| {
                    Ok(PoolWeights {
                        health: row.get(0)?,
                        mana: row.get(1)?,
                        stamina: row.get(2)?,
                        essence: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(weights)
    }

    // --- Ledger ---

    /// Insert or replace one entry by id.
    pub fn upsert_entry(&self, entry: &LedgerEntry) -> Result<()> {
        upsert_entry_on(&self.conn, entry)
    }

    /// Insert or replace a batch of entries in one transaction.
    pub fn upsert_entries(&self, entries: &[LedgerEntry]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for entry in entries {
            upsert_entry_on(&tx, entry)?;
        }
        tx.commit()?;
        Ok(entries.len())
    }

    pub fn get_entry(&self, id: &str) -> Result<Option<LedgerEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, [id], read_entry_row)
            .optional()?;
        row.map(entry_from_row).transpose()
    }

    pub fn delete_entry(&self, id: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM ledger_entries WHERE id = ?1", [id])?;
        Ok(n > 0)
    }

    pub fn entry_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM ledger_entries", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn all_entries(&self) -> Result<Vec<LedgerEntry>> {
        self.query_entries("1 = 1", params![])
    }

    /// Entries at or after `anchor_ms`, oldest first.
    pub fn entries_since(&self, anchor_ms: i64) -> Result<Vec<LedgerEntry>> {
        self.query_entries("timestamp_ms >= ?1", params![anchor_ms])
    }

    pub fn entries_by_status(&self, status: EntryStatus) -> Result<Vec<LedgerEntry>> {
        self.query_entries("status = ?1", params![status.as_str()])
    }

    /// Entries in `[from_ms, to_ms)`, optionally restricted to one classification.
    pub fn entries_in_range(
        &self,
        from_ms: i64,
        to_ms: i64,
        classification: Option<Classification>,
    ) -> Result<Vec<LedgerEntry>> {
        match classification {
            Some(c) => self.query_entries(
                "timestamp_ms >= ?1 AND timestamp_ms < ?2 AND classification = ?3",
                params![from_ms, to_ms, c.as_str()],
            ),
            None => self.query_entries(
                "timestamp_ms >= ?1 AND timestamp_ms < ?2",
                params![from_ms, to_ms],
            ),
        }
    }

    fn query_entries(
        &self,
        filter: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE {filter} ORDER BY timestamp_ms, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows: Vec<EntryRow> = stmt
            .query_map(args, read_entry_row)?
            .collect::<std::result::Result<_, _>>()?;
        rows.into_iter().map(entry_from_row).collect()
    }

    /// Confirm a pending entry, optionally recording the allocation it settled with.
    pub fn settle_entry(
        &self,
        id: &str,
        applied_allocation: Option<PoolAmounts>,
    ) -> Result<LedgerEntry> {
        let mut entry = self
            .get_entry(id)?
            .ok_or_else(|| StoreError::NotFound(format!("ledger entry {id}")))?;
        if !entry.is_pending() {
            return Err(vp_core::LedgerError::NotPending { id: id.to_string() }.into());
        }

        entry.status = EntryStatus::Confirmed;
        entry.expiry_ms = None;
        if applied_allocation.is_some() {
            entry.applied_allocation = applied_allocation;
        }
        entry.validate()?;
        self.upsert_entry(&entry)?;
        Ok(entry)
    }

    // --- Snapshot ---

    /// Replace the snapshot document. The previous one survives any failure.
    pub fn save_snapshot(&self, snapshot: &GatewaySnapshot) -> Result<()> {
        let document = serde_json::to_string(snapshot)
            .map_err(|e| StoreError::InvalidData(format!("snapshot serialization failed: {e}")))?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM gateway_snapshot", [])?;
        tx.execute(
            "INSERT INTO gateway_snapshot (id, updated_at_ms, document) VALUES (1, ?1, ?2)",
            params![snapshot.updated_at_ms, document],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_snapshot(&self) -> Result<Option<GatewaySnapshot>> {
        let document: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM gateway_snapshot WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        document
            .map(|doc| {
                serde_json::from_str(&doc)
                    .map_err(|e| StoreError::InvalidData(format!("corrupt snapshot document: {e}")))
            })
            .transpose()
    }
}

fn upsert_entry_on(conn: &Connection, entry: &LedgerEntry) -> Result<()> {
    entry.validate()?;
    let allocation = entry
        .applied_allocation
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::InvalidData(format!("allocation serialization failed: {e}")))?;

    conn.execute(
        "INSERT OR REPLACE INTO ledger_entries
         (id, amount_minor, timestamp_ms, status, classification, intent_pool, applied_allocation, expiry_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id,
            entry.amount_minor,
            entry.timestamp_ms,
            entry.status.as_str(),
            entry.classification.as_str(),
            entry.intent_pool.map(|i| i.as_str()),
            allocation,
            entry.expiry_ms,
        ],
    )?;
    Ok(())
}

fn read_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn entry_from_row(row: EntryRow) -> Result<LedgerEntry> {
    let (id, amount_minor, timestamp_ms, status, classification, intent, allocation, expiry_ms) =
        row;
    let applied_allocation = allocation
        .map(|json| serde_json::from_str::<PoolAmounts>(&json))
        .transpose()
        .map_err(|e| StoreError::InvalidData(format!("entry {id}: bad allocation: {e}")))?;

    Ok(LedgerEntry {
        status: status.parse::<EntryStatus>().map_err(StoreError::InvalidData)?,
        classification: classification
            .parse::<Classification>()
            .map_err(StoreError::InvalidData)?,
        intent_pool: intent
            .map(|s| s.parse::<Intent>())
            .transpose()
            .map_err(StoreError::InvalidData)?,
        id,
        amount_minor,
        timestamp_ms,
        applied_allocation,
        expiry_ms,
    })
}
