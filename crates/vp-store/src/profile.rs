use std::path::{Path, PathBuf};
use std::{env, fs};

use vp_core::gateway::effective_anchor_ms;
use vp_core::{AggregationWindow, EngineSettings, EntryStatus, GatewaySnapshot, LedgerEntry, rebuild};

use crate::error::{Result, StoreError};
use crate::store::Store;

pub const DEFAULT_PROFILE: &str = "default";
pub const SETTINGS_FILE: &str = "settings.toml";

/// Default base directory for all vital-pools storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".vital-pools")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Sanitize a profile name for use as a filename.
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn resolve_profile(name: Option<&str>) -> String {
    name.map(sanitize_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
}

/// Load engine tunables from `<base>/settings.toml`. A missing file means defaults.
pub fn load_settings(base: &Path) -> Result<EngineSettings> {
    let path = base.join(SETTINGS_FILE);
    if !path.exists() {
        return Ok(EngineSettings::default());
    }
    let content = fs::read_to_string(&path).map_err(|e| {
        StoreError::InvalidData(format!("failed to read {}: {e}", path.display()))
    })?;
    toml::from_str(&content)
        .map_err(|e| StoreError::InvalidData(format!("invalid {}: {e}", path.display())))
}

pub fn save_settings(base: &Path, settings: &EngineSettings) -> Result<()> {
    let path = base.join(SETTINGS_FILE);
    let content = toml::to_string_pretty(settings)
        .map_err(|e| StoreError::InvalidData(format!("settings serialization failed: {e}")))?;
    fs::write(&path, content).map_err(|e| {
        StoreError::InvalidData(format!("failed to write {}: {e}", path.display()))
    })
}

/// Profile names that have a database under `<base>/profiles`.
pub fn list_profiles(base: &Path) -> Result<Vec<String>> {
    let dir = base.join("profiles");
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let read = fs::read_dir(&dir).map_err(|e| {
        StoreError::InvalidData(format!("failed to read {}: {e}", dir.display()))
    })?;
    let mut names: Vec<String> = read
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            (path.extension()? == "db")
                .then(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .flatten()
        })
        .collect();
    names.sort();
    Ok(names)
}

/// One profile's database plus the shared engine settings.
///
/// Layout:
/// ```text
/// ~/.vital-pools/
/// ├── settings.toml
/// └── profiles/
///     ├── default.db
///     └── ...
/// ```
pub struct ProfileStore {
    store: Store,
    profile: String,
    settings: EngineSettings,
}

impl ProfileStore {
    /// Open a profile, creating directories as needed.
    /// `profile`: profile name (defaults to "default").
    /// `base_dir`: override the base directory (for testing).
    pub fn open(profile: Option<&str>, base_dir: Option<&Path>) -> Result<Self> {
        let base = base_dir.map(PathBuf::from).unwrap_or_else(default_base_dir);
        let profiles_dir = base.join("profiles");

        fs::create_dir_all(&profiles_dir).map_err(|e| {
            StoreError::InvalidData(format!("failed to create {}: {e}", profiles_dir.display()))
        })?;

        let profile = resolve_profile(profile);
        let store = Store::open(&profiles_dir.join(format!("{profile}.db")))?;
        let settings = load_settings(&base)?;

        tracing::debug!(profile = %profile, base = %base.display(), "profile opened");
        Ok(Self {
            store,
            profile,
            settings,
        })
    }

    /// Open with an in-memory store and default settings (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            store: Store::open_in_memory()?,
            profile: "test".to_string(),
            settings: EngineSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Load inputs, rebuild the snapshot in memory, then write it once.
    ///
    /// Unreadable config or weights degrade to the unconfigured snapshot.
    pub fn recompute(&self, now_ms: i64) -> Result<GatewaySnapshot> {
        let config = self.store.load_config().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cashflow config unreadable, treating as missing");
            None
        });
        let weights = self.store.load_weights().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "pool weights unreadable, treating as missing");
            None
        });

        let ledger = match &config {
            Some(c) => self
                .store
                .entries_since(effective_anchor_ms(c, &self.settings, now_ms))?,
            None => Vec::new(),
        };

        let snapshot = rebuild(
            config.as_ref(),
            weights.as_ref(),
            &ledger,
            &self.settings,
            now_ms,
        );
        self.store.save_snapshot(&snapshot)?;
        self.store
            .set_metadata("last_recompute_ms", &now_ms.to_string())?;

        tracing::info!(
            profile = %self.profile,
            entries = ledger.len(),
            configured = snapshot.configured,
            "snapshot written"
        );
        Ok(snapshot)
    }

    /// The stored snapshot, or a fresh recompute when none exists yet.
    pub fn snapshot_or_recompute(&self, now_ms: i64) -> Result<GatewaySnapshot> {
        match self.store.load_snapshot() {
            Ok(Some(snapshot)) => Ok(snapshot),
            Ok(None) => self.recompute(now_ms),
            Err(e) => {
                tracing::warn!(error = %e, "stored snapshot unreadable, recomputing");
                self.recompute(now_ms)
            }
        }
    }

    /// Pending entries that have not expired, oldest first.
    ///
    /// Core flows never count. Once a config is stored, entries before the
    /// effective anchor are left out too, matching what `recompute` scans.
    pub fn pending_entries(&self, now_ms: i64) -> Result<Vec<LedgerEntry>> {
        let anchor_ms = match self.store.load_config() {
            Ok(Some(config)) => effective_anchor_ms(&config, &self.settings, now_ms),
            Ok(None) => i64::MIN,
            Err(e) => {
                tracing::warn!(error = %e, "cashflow config unreadable, pending set unanchored");
                i64::MIN
            }
        };
        let window = AggregationWindow::new(anchor_ms, now_ms);
        Ok(self
            .store
            .entries_by_status(EntryStatus::Pending)?
            .into_iter()
            .filter(|e| !e.is_expired(now_ms) && window.contains(e))
            .collect())
    }
}
