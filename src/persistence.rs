//! Persistence of failsafe configurations across restarts
//!
//! Only failsafe settings saved with `persist = true` are stored. Entries are
//! keyed by station id and restored when the station is registered again.

use crate::error::Result;
use crate::failsafe::FailsafeConfig;
use crate::logging::{StructuredLogger, get_logger};
use crate::station::StationId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Storage for persisted failsafe configurations
#[async_trait]
pub trait FailsafeStore: Send + Sync {
    async fn load_failsafe(&self, station: &StationId) -> Result<Option<FailsafeConfig>>;
    async fn save_failsafe(&self, station: &StationId, config: &FailsafeConfig) -> Result<()>;
    async fn clear_failsafe(&self, station: &StationId) -> Result<()>;
}

/// One persisted entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedFailsafe {
    pub config: FailsafeConfig,
    pub saved_at: DateTime<Utc>,
}

/// On-disk layout of the store file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistentState {
    #[serde(default)]
    pub stations: BTreeMap<String, PersistedFailsafe>,
}

/// JSON file backed store.
///
/// The whole file is rewritten on every change; writes go to a sibling
/// temporary file that is renamed over the target.
pub struct JsonFileStore {
    file_path: PathBuf,
    state: Mutex<Option<PersistentState>>,
    logger: StructuredLogger,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            state: Mutex::new(None),
            logger: get_logger("persistence"),
        }
    }

    async fn read_state(&self) -> Result<PersistentState> {
        if !tokio::fs::try_exists(&self.file_path).await? {
            self.logger
                .info("No persistent failsafe file found, using defaults");
            return Ok(PersistentState::default());
        }
        let contents = tokio::fs::read_to_string(&self.file_path).await?;
        if contents.trim().is_empty() {
            return Ok(PersistentState::default());
        }
        let state: PersistentState = serde_json::from_str(&contents)?;
        self.logger.info(&format!(
            "Loaded {} persisted failsafe entr{} from {}",
            state.stations.len(),
            if state.stations.len() == 1 { "y" } else { "ies" },
            self.file_path.display()
        ));
        Ok(state)
    }

    async fn write_state(&self, state: &PersistentState) -> Result<()> {
        if let Some(parent) = self.file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(state)?;
        let tmp = self.file_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.file_path).await?;
        self.logger.debug("Saved persistent failsafe state to disk");
        Ok(())
    }
}

#[async_trait]
impl FailsafeStore for JsonFileStore {
    async fn load_failsafe(&self, station: &StationId) -> Result<Option<FailsafeConfig>> {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_state().await?);
        }
        Ok(guard
            .as_ref()
            .and_then(|s| s.stations.get(station.as_str()))
            .map(|entry| entry.config))
    }

    async fn save_failsafe(&self, station: &StationId, config: &FailsafeConfig) -> Result<()> {
        let mut guard = self.state.lock().await;
        let mut state = match guard.take() {
            Some(state) => state,
            None => self.read_state().await?,
        };
        state.stations.insert(
            station.to_string(),
            PersistedFailsafe {
                config: *config,
                saved_at: Utc::now(),
            },
        );
        let written = self.write_state(&state).await;
        *guard = Some(state);
        written
    }

    async fn clear_failsafe(&self, station: &StationId) -> Result<()> {
        let mut guard = self.state.lock().await;
        let mut state = match guard.take() {
            Some(state) => state,
            None => self.read_state().await?,
        };
        let removed = state.stations.remove(station.as_str()).is_some();
        let written = if removed {
            self.write_state(&state).await
        } else {
            Ok(())
        };
        *guard = Some(state);
        written
    }
}

/// In-memory store, for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<StationId, FailsafeConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl FailsafeStore for MemoryStore {
    async fn load_failsafe(&self, station: &StationId) -> Result<Option<FailsafeConfig>> {
        Ok(self.entries.lock().await.get(station).copied())
    }

    async fn save_failsafe(&self, station: &StationId, config: &FailsafeConfig) -> Result<()> {
        self.entries.lock().await.insert(station.clone(), *config);
        Ok(())
    }

    async fn clear_failsafe(&self, station: &StationId) -> Result<()> {
        self.entries.lock().await.remove(station);
        Ok(())
    }
}
