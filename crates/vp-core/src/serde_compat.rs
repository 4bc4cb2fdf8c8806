//! JSON serde for the version "1" wire format.
//!
//! The wire format uses camelCase field names. Ledger files may carry
//! `amountMinor` as a number, a numeric string, or null; all coerce to a
//! finite f64. Missing ids get a fresh v4 uuid.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gateway::GatewaySnapshot;
use crate::ledger::{Classification, EntryStatus, LedgerEntry};
use crate::numeric::coerce_json_number;
use crate::pool::{Intent, PoolAmounts};
use crate::time::ms_to_iso8601;

pub const CURRENT_VERSION: &str = "1";

// --- Wire format types ---

#[derive(Serialize, Deserialize, Debug)]
pub struct WireLedger {
    pub version: String,
    #[serde(default)]
    pub entries: Vec<WireLedgerEntry>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WireLedgerEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub amount_minor: serde_json::Value,
    pub timestamp_ms: i64,
    pub status: EntryStatus,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default)]
    pub intent_pool: Option<Intent>,
    #[serde(default)]
    pub applied_allocation: Option<PoolAmounts>,
    #[serde(default)]
    pub expiry_ms: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WireSnapshotExport {
    pub version: String,
    #[serde(default)]
    pub exported_at: String,
    pub snapshot: GatewaySnapshot,
}

#[derive(Debug)]
pub enum WireError {
    Json(serde_json::Error),
    UnsupportedVersion(String),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Json(e) => write!(f, "invalid JSON: {e}"),
            WireError::UnsupportedVersion(v) => {
                write!(f, "unsupported wire version {v:?} (expected {CURRENT_VERSION:?})")
            }
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WireError::Json(e) => Some(e),
            WireError::UnsupportedVersion(_) => None,
        }
    }
}

impl From<serde_json::Error> for WireError {
    fn from(e: serde_json::Error) -> Self {
        WireError::Json(e)
    }
}

fn check_version(version: &str) -> Result<(), WireError> {
    if version == CURRENT_VERSION {
        Ok(())
    } else {
        Err(WireError::UnsupportedVersion(version.to_string()))
    }
}

// --- Conversion ---

impl WireLedgerEntry {
    pub fn into_entry(self) -> LedgerEntry {
        LedgerEntry {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            amount_minor: coerce_json_number(&self.amount_minor),
            timestamp_ms: self.timestamp_ms,
            status: self.status,
            classification: self.classification,
            intent_pool: self.intent_pool,
            applied_allocation: self.applied_allocation,
            expiry_ms: self.expiry_ms,
        }
    }

    pub fn from_entry(entry: &LedgerEntry) -> Self {
        WireLedgerEntry {
            id: Some(entry.id.clone()),
            amount_minor: serde_json::json!(entry.amount_minor),
            timestamp_ms: entry.timestamp_ms,
            status: entry.status,
            classification: entry.classification,
            intent_pool: entry.intent_pool,
            applied_allocation: entry.applied_allocation,
            expiry_ms: entry.expiry_ms,
        }
    }
}

/// Parse a ledger file into domain entries.
pub fn import_ledger_json(json: &str) -> Result<Vec<LedgerEntry>, WireError> {
    let wire: WireLedger = serde_json::from_str(json)?;
    check_version(&wire.version)?;
    Ok(wire
        .entries
        .into_iter()
        .map(WireLedgerEntry::into_entry)
        .collect())
}

/// Serialize entries to a version "1" ledger file.
pub fn export_ledger_json(entries: &[LedgerEntry]) -> Result<String, serde_json::Error> {
    let wire = WireLedger {
        version: CURRENT_VERSION.to_string(),
        entries: entries.iter().map(WireLedgerEntry::from_entry).collect(),
    };
    serde_json::to_string_pretty(&wire)
}

/// Serialize a snapshot document, stamped with the export time.
pub fn export_snapshot_json(
    snapshot: &GatewaySnapshot,
    exported_at_ms: i64,
) -> Result<String, serde_json::Error> {
    let wire = WireSnapshotExport {
        version: CURRENT_VERSION.to_string(),
        exported_at: ms_to_iso8601(exported_at_ms),
        snapshot: snapshot.clone(),
    };
    serde_json::to_string_pretty(&wire)
}

pub fn import_snapshot_json(json: &str) -> Result<GatewaySnapshot, WireError> {
    let wire: WireSnapshotExport = serde_json::from_str(json)?;
    check_version(&wire.version)?;
    Ok(wire.snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;

    #[test]
    fn test_amount_coercion() {
        let json = r#"{
            "version": "1",
            "entries": [
                {"id": "a", "amountMinor": -1250, "timestampMs": 10, "status": "confirmed"},
                {"id": "b", "amountMinor": "-99.5", "timestampMs": 11, "status": "pending",
                 "intentPool": "mana", "expiryMs": 500},
                {"id": "c", "amountMinor": null, "timestampMs": 12, "status": "confirmed"},
                {"amountMinor": "garbage", "timestampMs": 13, "status": "confirmed",
                 "classification": "coreOutflow"}
            ]
        }"#;
        let entries = import_ledger_json(json).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].amount_minor, -1250.0);
        assert_eq!(entries[1].amount_minor, -99.5);
        assert_eq!(entries[1].intent_pool, Some(Intent::Mana));
        assert_eq!(entries[1].expiry_ms, Some(500));
        assert_eq!(entries[2].amount_minor, 0.0);
        assert_eq!(entries[3].amount_minor, 0.0);
        assert_eq!(entries[3].classification, Classification::CoreOutflow);
        assert!(Uuid::parse_str(&entries[3].id).is_ok(), "missing id gets a uuid");
    }

    #[test]
    fn test_rejects_unknown_version() {
        let err = import_ledger_json(r#"{"version": "0.9", "entries": []}"#).unwrap_err();
        assert!(matches!(err, WireError::UnsupportedVersion(v) if v == "0.9"));
    }

    #[test]
    fn test_rejects_unknown_intent() {
        let json = r#"{"version": "1", "entries": [
            {"amountMinor": 1, "timestampMs": 1, "status": "pending", "intentPool": "essence"}
        ]}"#;
        assert!(matches!(import_ledger_json(json), Err(WireError::Json(_))));
    }

    #[test]
    fn test_ledger_export_reimports() {
        let entries = vec![
            LedgerEntry::new(-40.0, 5, EntryStatus::Pending)
                .with_id("x")
                .with_intent(Intent::Mana)
                .with_expiry(99),
        ];
        let json = export_ledger_json(&entries).unwrap();
        assert!(json.contains("\"amountMinor\": -40.0"));
        assert_eq!(import_ledger_json(&json).unwrap(), entries);
    }

    #[test]
    fn test_snapshot_export_envelope() {
        let snapshot = GatewaySnapshot::unconfigured(0);
        let json = export_snapshot_json(&snapshot, 0).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], "1");
        assert_eq!(value["exportedAt"], "1970-01-01T00:00:00Z");
        assert_eq!(value["snapshot"]["configured"], false);
        assert_eq!(value["snapshot"]["pools"]["stamina"]["pool"], "stamina");

        let back = import_snapshot_json(&json).unwrap();
        assert_eq!(back.get(Pool::Stamina).cap_minor, 0.0);
    }
}
