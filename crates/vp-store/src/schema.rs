use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    // Checkpoint every ~400KB instead of the default ~4MB
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // In-memory DBs and fresh files legitimately fail this.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::debug!("startup WAL checkpoint complete");
    }

    // Config, weights and snapshot are single-row tables (id = 1).
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cashflow_config (
            id                    INTEGER PRIMARY KEY CHECK (id = 1),
            mode                  TEXT NOT NULL DEFAULT 'continuous',
            credit_mode           TEXT NOT NULL DEFAULT 'essence',
            inflow_monthly        REAL NOT NULL DEFAULT 0,
            outflow_monthly       REAL NOT NULL DEFAULT 0,
            pay_cycle_anchor_ms   INTEGER NOT NULL,
            last_anchor_update_ms INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS pool_weights (
            id      INTEGER PRIMARY KEY CHECK (id = 1),
            health  REAL NOT NULL DEFAULT 0,
            mana    REAL NOT NULL DEFAULT 0,
            stamina REAL NOT NULL DEFAULT 0,
            essence REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS ledger_entries (
            id                 TEXT PRIMARY KEY,
            amount_minor       REAL NOT NULL,
            timestamp_ms       INTEGER NOT NULL,
            status             TEXT NOT NULL,
            classification     TEXT NOT NULL DEFAULT 'other',
            intent_pool        TEXT,
            applied_allocation TEXT,
            expiry_ms          INTEGER
        );

        CREATE TABLE IF NOT EXISTS gateway_snapshot (
            id            INTEGER PRIMARY KEY CHECK (id = 1),
            updated_at_ms INTEGER NOT NULL,
            document      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ledger_ts ON ledger_entries(timestamp_ms);
        CREATE INDEX IF NOT EXISTS idx_ledger_status ON ledger_entries(status);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}
