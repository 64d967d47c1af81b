//! State persistence.
//!
//! The coordinator hydrates its state once at startup and afterwards asks for
//! a save on every mutation. Saves are debounced through a single pending slot:
//! a new request replaces the pending one, so a burst of volume presses turns
//! into one write of the newest state.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::state::clamp_volume;
use super::state::ScreenPosition;
use super::state::TheaterState;

pub const STORAGE_KEY: &str = "home_theater_state";
pub const STORAGE_VERSION: u32 = 1;

/// Persisted projection of `TheaterState`.
///
/// Every field falls back to its default individually so that older or
/// hand-edited files still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub amp_power: bool,
    pub volume: f64,
    pub muted: bool,
    pub source: Option<String>,
    pub screen_position: String,
    pub active_scene: Option<String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot::from(&TheaterState::default())
    }
}

impl From<&TheaterState> for Snapshot {
    fn from(state: &TheaterState) -> Self {
        Self {
            amp_power: state.amp_power,
            volume: state.volume,
            muted: state.muted,
            source: state.source.clone(),
            screen_position: state.screen_position.to_string(),
            active_scene: state.active_scene.clone(),
        }
    }
}

impl Snapshot {
    /// Rebuild the live state from a persisted snapshot.
    ///
    /// A screen can't credibly still be travelling after a restart, so
    /// `opening`/`closing` come back as `up`.
    pub fn into_state(self) -> TheaterState {
        let screen_position = match ScreenPosition::from_str(&self.screen_position) {
            Ok(position) if position.is_moving() => {
                debug!(
                    "Persisted screen position '{}' was transitional, resetting to up",
                    self.screen_position
                );
                ScreenPosition::Up
            }
            Ok(position) => position,
            Err(_) => {
                warn!(
                    "Unknown persisted screen position '{}', resetting to up",
                    self.screen_position
                );
                ScreenPosition::Up
            }
        };

        TheaterState {
            amp_power: self.amp_power,
            volume: clamp_volume(self.volume),
            muted: self.muted,
            source: self.source,
            screen_position,
            active_scene: self.active_scene,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Malformed state document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported state document version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("State document is keyed '{found}', expected '{expected}'")]
    UnexpectedKey { found: String, expected: &'static str },
}

/// Storage backend for snapshots.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Read the last saved snapshot, `None` if nothing was ever saved.
    async fn load(&self) -> Result<Option<Snapshot>, StoreError>;

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    version: u32,
    key: String,
    data: Snapshot,
}

/// Snapshot persisted as a versioned JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

#[async_trait]
impl Persistence for JsonFileStore {
    async fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(self.path.clone(), e)),
        };

        let document: Document = serde_json::from_slice(&bytes)?;
        if document.version != STORAGE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: document.version,
                expected: STORAGE_VERSION,
            });
        }
        if document.key != STORAGE_KEY {
            return Err(StoreError::UnexpectedKey {
                found: document.key,
                expected: STORAGE_KEY,
            });
        }

        Ok(Some(document.data))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let document = Document {
            version: STORAGE_VERSION,
            key: STORAGE_KEY.to_string(),
            data: snapshot.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io(parent.to_path_buf(), e))?;
        }

        // Write-then-rename so an interrupted save never leaves a torn file.
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::Io(tmp.clone(), e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Io(self.path.clone(), e))?;

        Ok(())
    }
}

struct PendingSave {
    snapshot: Snapshot,
    handle: JoinHandle<()>,
}

/// Load/save lifecycle around a `Persistence` backend.
pub struct StateStore {
    persistence: Arc<dyn Persistence>,
    save_delay: Duration,
    pending: Option<PendingSave>,
}

impl StateStore {
    pub fn new(persistence: Arc<dyn Persistence>, save_delay: Duration) -> Self {
        Self {
            persistence,
            save_delay,
            pending: None,
        }
    }

    /// Hydrate state from storage, falling back to defaults on any failure.
    pub async fn load(&self) -> TheaterState {
        match self.persistence.load().await {
            Ok(Some(snapshot)) => {
                let state = snapshot.into_state();
                info!("Restored theater state: {:?}", state);
                state
            }
            Ok(None) => {
                info!("No persisted theater state, starting from defaults");
                TheaterState::default()
            }
            Err(e) => {
                error!("Failed to load persisted state, starting from defaults: {}", e);
                TheaterState::default()
            }
        }
    }

    /// Request a save of `snapshot` after the debounce window.
    ///
    /// Replaces any save still waiting in the window; only the newest
    /// snapshot is ever written.
    pub fn schedule_save(&mut self, snapshot: Snapshot) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }

        let persistence = self.persistence.clone();
        let delay = self.save_delay;
        let to_write = snapshot.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match persistence.save(&to_write).await {
                Ok(()) => debug!("Persisted theater state"),
                Err(e) => error!("Failed to persist theater state: {}", e),
            }
        });

        self.pending = Some(PendingSave { snapshot, handle });
    }

    /// Write any save still waiting in the debounce window right now.
    pub async fn flush(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.handle.is_finished() {
            return;
        }
        pending.handle.abort();

        match self.persistence.save(&pending.snapshot).await {
            Ok(()) => debug!("Flushed pending theater state"),
            Err(e) => error!("Failed to flush theater state: {}", e),
        }
    }
}

impl Drop for StateStore {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }
    }
}

/// In-memory backend recording every write.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    pub initial: Option<Snapshot>,
    pub saves: std::sync::Mutex<Vec<Snapshot>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            initial: Some(snapshot),
            saves: Default::default(),
        }
    }

    pub fn saves(&self) -> Vec<Snapshot> {
        self.saves.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Persistence for MemoryStore {
    async fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.initial.clone())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.saves.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}
