use std::fs;
use std::path::Path;

use vp_core::{export_ledger_json, export_snapshot_json, import_ledger_json};

use crate::error::{Result, StoreError};
use crate::store::Store;

impl Store {
    /// Import a version "1" ledger file. Entries are upserted by id.
    pub fn import_ledger_file(&self, path: &Path) -> Result<usize> {
        let json = fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidData(format!("failed to read {}: {e}", path.display()))
        })?;
        self.import_ledger_str(&json)
    }

    /// Import a version "1" ledger JSON string. The whole file lands or none of it.
    pub fn import_ledger_str(&self, json: &str) -> Result<usize> {
        let entries = import_ledger_json(json).map_err(|e| StoreError::InvalidData(e.to_string()))?;
        let n = self.upsert_entries(&entries)?;
        tracing::info!(entries = n, "ledger import complete");
        Ok(n)
    }

    /// Export the full ledger as a version "1" JSON string.
    pub fn export_ledger_string(&self) -> Result<String> {
        let entries = self.all_entries()?;
        export_ledger_json(&entries)
            .map_err(|e| StoreError::InvalidData(format!("JSON export failed: {e}")))
    }

    /// Export the stored snapshot document, stamped with `now_ms`.
    pub fn export_snapshot_string(&self, now_ms: i64) -> Result<String> {
        let snapshot = self
            .load_snapshot()?
            .ok_or_else(|| StoreError::NotFound("snapshot (run a recompute first)".to_string()))?;
        export_snapshot_json(&snapshot, now_ms)
            .map_err(|e| StoreError::InvalidData(format!("JSON export failed: {e}")))
    }

    pub fn export_snapshot_file(&self, path: &Path, now_ms: i64) -> Result<()> {
        let json = self.export_snapshot_string(now_ms)?;
        fs::write(path, json).map_err(|e| {
            StoreError::InvalidData(format!("failed to write {}: {e}", path.display()))
        })
    }
}
