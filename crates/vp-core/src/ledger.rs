use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pool::{Intent, PoolAmounts};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Confirmed,
}

/// Core entries define the income/expense baseline and never count as pool usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Classification {
    CoreInflow,
    CoreOutflow,
    #[default]
    Other,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(EntryStatus::Pending),
            "confirmed" => Ok(EntryStatus::Confirmed),
            other => Err(format!("unknown entry status: {other}")),
        }
    }
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::CoreInflow => "coreInflow",
            Classification::CoreOutflow => "coreOutflow",
            Classification::Other => "other",
        }
    }

    pub fn is_core(self) -> bool {
        matches!(self, Classification::CoreInflow | Classification::CoreOutflow)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "coreInflow" | "core_inflow" | "core-inflow" => Ok(Classification::CoreInflow),
            "coreOutflow" | "core_outflow" | "core-outflow" => Ok(Classification::CoreOutflow),
            "other" => Ok(Classification::Other),
            other => Err(format!("unknown classification: {other}")),
        }
    }
}

/// One transaction as the engine sees it. Positive amounts are credits,
/// negative amounts are debits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub amount_minor: f64,
    pub timestamp_ms: i64,
    pub status: EntryStatus,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default)]
    pub intent_pool: Option<Intent>,
    /// Allocation decided when the entry settled. Authoritative when present.
    #[serde(default)]
    pub applied_allocation: Option<PoolAmounts>,
    #[serde(default)]
    pub expiry_ms: Option<i64>,
}

impl LedgerEntry {
    /// A pool-usage entry with a fresh v4 id.
    pub fn new(amount_minor: f64, timestamp_ms: i64, status: EntryStatus) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            amount_minor,
            timestamp_ms,
            status,
            classification: Classification::Other,
            intent_pool: None,
            applied_allocation: None,
            expiry_ms: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent_pool = Some(intent);
        self
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }

    pub fn with_applied_allocation(mut self, allocation: PoolAmounts) -> Self {
        self.applied_allocation = Some(allocation);
        self
    }

    pub fn with_expiry(mut self, expiry_ms: i64) -> Self {
        self.expiry_ms = Some(expiry_ms);
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == EntryStatus::Pending
    }

    pub fn is_debit(&self) -> bool {
        self.amount_minor < 0.0
    }

    pub fn is_credit(&self) -> bool {
        self.amount_minor > 0.0
    }

    /// Intent, defaulting to Stamina when untagged.
    pub fn intent(&self) -> Intent {
        self.intent_pool.unwrap_or_default()
    }

    /// A pending hold past its expiry will never settle.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.is_pending() && self.expiry_ms.is_some_and(|expiry| expiry <= now_ms)
    }

    /// Check the numeric fields a projection depends on.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.amount_minor.is_finite() {
            return Err(LedgerError::NonFiniteAmount {
                id: self.id.clone(),
            });
        }
        if let Some(alloc) = &self.applied_allocation
            && !alloc.is_finite()
        {
            return Err(LedgerError::NonFiniteAllocation {
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    NonFiniteAmount { id: String },
    NonFiniteAllocation { id: String },
    NotPending { id: String },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::NonFiniteAmount { id } => write!(f, "entry {id}: amount is not finite"),
            LedgerError::NonFiniteAllocation { id } => {
                write!(f, "entry {id}: applied allocation is not finite")
            }
            LedgerError::NotPending { id } => write!(f, "entry {id}: not pending"),
        }
    }
}

impl std::error::Error for LedgerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let e = LedgerEntry::new(-1200.0, 10, EntryStatus::Pending);
        assert!(Uuid::parse_str(&e.id).is_ok());
        assert!(e.is_debit());
        assert!(e.is_pending());
        assert_eq!(e.intent(), Intent::Stamina);
        assert_eq!(e.classification, Classification::Other);
    }

    #[test]
    fn test_expiry_only_applies_to_pending() {
        let pending = LedgerEntry::new(-5.0, 0, EntryStatus::Pending).with_expiry(1_000);
        assert!(!pending.is_expired(999));
        assert!(pending.is_expired(1_000));

        let confirmed = LedgerEntry::new(-5.0, 0, EntryStatus::Confirmed).with_expiry(1_000);
        assert!(!confirmed.is_expired(5_000));
    }

    #[test]
    fn test_validate() {
        let ok = LedgerEntry::new(-5.0, 0, EntryStatus::Pending);
        assert!(ok.validate().is_ok());

        let bad = ok.clone().with_id("x");
        let bad = LedgerEntry {
            amount_minor: f64::NAN,
            ..bad
        };
        assert_eq!(
            bad.validate(),
            Err(LedgerError::NonFiniteAmount { id: "x".into() })
        );

        let bad_alloc = ok.with_id("y").with_applied_allocation(PoolAmounts {
            health: f64::INFINITY,
            ..Default::default()
        });
        assert!(matches!(
            bad_alloc.validate(),
            Err(LedgerError::NonFiniteAllocation { .. })
        ));
    }

    #[test]
    fn test_classification_parsing() {
        assert!("coreInflow".parse::<Classification>().unwrap().is_core());
        assert!("core_outflow".parse::<Classification>().unwrap().is_core());
        assert!(!"other".parse::<Classification>().unwrap().is_core());
        assert!("salary".parse::<Classification>().is_err());
    }

    #[test]
    fn test_entry_json_shape() {
        let e = LedgerEntry::new(-250.0, 42, EntryStatus::Confirmed)
            .with_id("t1")
            .with_intent(Intent::Mana)
            .with_classification(Classification::CoreOutflow);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["amountMinor"], -250.0);
        assert_eq!(json["intentPool"], "mana");
        assert_eq!(json["classification"], "coreOutflow");
        assert_eq!(json["status"], "confirmed");
    }
}
