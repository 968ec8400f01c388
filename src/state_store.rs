// State persistence for the grid engine
// JSON file (atomic replace) or SQLite, both holding one versioned snapshot
//
// The snapshot carries everything needed to resume after a restart:
// enabled pairs, active grids, portfolio counters and risk state.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::config::StateBackend;
use crate::engine::{EngineCounters, PairState};
use crate::grid::Grid;
use crate::portfolio::Portfolio;
use crate::risk::RiskState;
use crate::Symbol;

pub const SNAPSHOT_VERSION: u32 = 1;

// =============================================================================
// Snapshot
// =============================================================================

/// Persisted engine state. `None` fields fall back to config defaults on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: Option<DateTime<Utc>>,
    pub enabled_pairs: Option<Vec<Symbol>>,
    pub grids: Vec<Grid>,
    pub portfolio: Option<Portfolio>,
    pub risk: RiskState,
    pub counters: EngineCounters,
    pub pair_states: BTreeMap<Symbol, PairState>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: None,
            enabled_pairs: None,
            grids: Vec::new(),
            portfolio: None,
            risk: RiskState::default(),
            counters: EngineCounters::default(),
            pair_states: BTreeMap::new(),
        }
    }
}

impl Snapshot {
    fn check_version(self) -> Result<Self> {
        if self.version > SNAPSHOT_VERSION {
            bail!(
                "snapshot version {} is newer than supported version {}",
                self.version,
                SNAPSHOT_VERSION
            );
        }
        Ok(self)
    }
}

pub trait StateStore: Send + Sync {
    fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Last saved snapshot, or defaults when nothing was saved yet
    fn load(&self) -> Result<Snapshot>;

    fn describe(&self) -> String;
}

// =============================================================================
// JSON file store
// =============================================================================

pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }
}

impl StateStore for JsonStateStore {
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(snapshot)?)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!("State saved to: {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Snapshot> {
        if !self.path.exists() {
            debug!("No state file at {}, using defaults", self.path.display());
            return Ok(Snapshot::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        info!(
            "Loaded state: {} grids, {} deals",
            snapshot.grids.len(),
            snapshot.portfolio.as_ref().map_or(0, |p| p.deal_count)
        );
        snapshot.check_version()
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

// =============================================================================
// SQLite store
// =============================================================================

pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
    label: String,
}

impl SqliteStateStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::with_connection(conn, format!("sqlite:{}", db_path.display()))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, "sqlite::memory:".to_string())
    }

    fn with_connection(conn: Connection, label: String) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            label,
        };
        store.create_tables()?;
        info!("SQLite state store initialized ({})", store.label);
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("state store connection lock poisoned"))
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL,
                saved_at TEXT,
                payload TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS grids (
                pair TEXT PRIMARY KEY,
                side TEXT NOT NULL,
                price_low REAL NOT NULL,
                price_high REAL NOT NULL,
                orders INTEGER NOT NULL,
                realized_pnl REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }
}

impl StateStore for SqliteStateStore {
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let mut conn = self.lock()?;
        let payload = serde_json::to_string(snapshot)?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO snapshots (id, version, saved_at, payload)
             VALUES (1, ?1, ?2, ?3)",
            params![
                snapshot.version,
                snapshot.saved_at.map(|t| t.to_rfc3339()),
                payload
            ],
        )?;

        // Flat view of active grids for ad-hoc inspection
        tx.execute("DELETE FROM grids", [])?;
        for grid in &snapshot.grids {
            tx.execute(
                "INSERT INTO grids (pair, side, price_low, price_high, orders, realized_pnl, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    grid.pair.as_str(),
                    grid.side.to_string(),
                    grid.price_low,
                    grid.price_high,
                    grid.orders.len() as i64,
                    grid.realized_pnl,
                    grid.created_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        debug!("State saved to {}", self.label);
        Ok(())
    }

    fn load(&self) -> Result<Snapshot> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row("SELECT payload FROM snapshots WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match payload {
            Some(json) => {
                let snapshot: Snapshot = serde_json::from_str(&json)
                    .context("Failed to parse stored snapshot")?;
                info!("Loaded state from {}", self.label);
                snapshot.check_version()
            }
            None => {
                debug!("No snapshot in {}, using defaults", self.label);
                Ok(Snapshot::default())
            }
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

// =============================================================================
// Factory Function
// =============================================================================

pub fn create_state_store<P: AsRef<Path>>(
    state_dir: P,
    backend: StateBackend,
) -> Result<Box<dyn StateStore>> {
    let state_dir = state_dir.as_ref();
    std::fs::create_dir_all(state_dir)?;

    Ok(match backend {
        StateBackend::Json => Box::new(JsonStateStore::new(state_dir.join("grid_state.json"))?),
        StateBackend::Sqlite => Box::new(SqliteStateStore::new(state_dir.join("grid_state.db"))?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridOrder, OrderState};
    use crate::Side;
    use chrono::TimeZone;

    fn sample() -> Snapshot {
        let now = Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap();
        let mut portfolio = Portfolio::new(100.0, now);
        portfolio.record_realized(0.42);

        Snapshot {
            saved_at: Some(now),
            enabled_pairs: Some(vec![Symbol::new("BTCUSDT")]),
            grids: vec![Grid {
                pair: Symbol::new("BTCUSDT"),
                side: Side::Long,
                price_low: 95.0,
                price_high: 105.0,
                atr: 2.0,
                orders: vec![GridOrder {
                    entry: 95.0,
                    exit: 98.5,
                    quantity: 1.0,
                    state: OrderState::Open,
                }],
                created_at: now,
                realized_pnl: 0.42,
                fills: 1,
            }],
            portfolio: Some(portfolio),
            counters: EngineCounters {
                grids_started: 1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("grid_state_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_json_missing_file_gives_defaults() {
        let store = JsonStateStore::new(temp_dir("missing").join("state.json")).unwrap();
        assert_eq!(store.load().unwrap(), Snapshot::default());
    }

    #[test]
    fn test_json_save_then_load() {
        let dir = temp_dir("json");
        let store = JsonStateStore::new(dir.join("state.json")).unwrap();
        store.save(&sample()).unwrap();

        assert_eq!(store.load().unwrap(), sample());
        assert!(!dir.join("state.json.tmp").exists());
    }

    #[test]
    fn test_sqlite_save_then_load() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        assert_eq!(store.load().unwrap(), Snapshot::default());

        store.save(&sample()).unwrap();
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());
    }

    #[test]
    fn test_newer_version_refused() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let snap = Snapshot {
            version: SNAPSHOT_VERSION + 1,
            ..Default::default()
        };
        store.save(&snap).unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn test_factory_picks_backend() {
        let dir = temp_dir("factory");
        let store = create_state_store(&dir, StateBackend::Sqlite).unwrap();
        assert!(store.describe().starts_with("sqlite:"));
        let store = create_state_store(&dir, StateBackend::Json).unwrap();
        assert!(store.describe().starts_with("json:"));
    }
}
