//! Phantom-host snapshots.
//!
//! A snapshot is `{game_state, room_state, saved_at_ms}` as JSON. Files are
//! written to a sibling temp file and renamed into place, so a crash during
//! a save leaves the previous snapshot intact.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use warfront_core::factions::FactionId;
use warfront_core::state::GameState;

use crate::error::Result;

/// Room bookkeeping saved beside the world.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomState {
    /// Room name.
    pub room_id: String,
    /// Seed of the current round's world.
    pub seed: u64,
    /// Rounds started in this room.
    pub round: u32,
    /// Factions under human control at save time.
    pub human_factions: BTreeSet<FactionId>,
}

/// A persisted room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The world.
    pub game_state: GameState,
    /// Room bookkeeping.
    pub room_state: RoomState,
    /// Wall clock at save time.
    pub saved_at_ms: u64,
}

impl Snapshot {
    /// Age at `now_ms`. A clock that went backwards counts as fresh.
    #[must_use]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.saved_at_ms)
    }

    /// Whether the snapshot is too old to resume.
    #[must_use]
    pub fn is_stale(&self, now_ms: u64, max_age_ms: u64) -> bool {
        self.age_ms(now_ms) > max_age_ms
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Somewhere to keep the latest snapshot.
pub trait SnapshotStore {
    /// Replace the stored snapshot.
    fn save(&mut self, snapshot: &Snapshot) -> Result<()>;

    /// The stored snapshot, if any.
    fn load(&self) -> Result<Option<Snapshot>>;

    /// Forget the stored snapshot.
    fn clear(&mut self) -> Result<()>;
}

/// Snapshot kept in a JSON file.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Store at `path`. Nothing is touched until the first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&mut self, snapshot: &Snapshot) -> Result<()> {
        let json = snapshot.to_json()?;
        let temp = self.temp_path();
        std::fs::write(&temp, json)?;
        std::fs::rename(&temp, &self.path)?;
        tracing::debug!(path = %self.path.display(), tick = snapshot.game_state.tick, "snapshot saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => Ok(Some(Snapshot::from_json(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&mut self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Snapshot kept in memory as encoded JSON, for tests and ephemeral rooms.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    json: Option<String>,
    saves: usize,
}

impl MemorySnapshotStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with `snapshot`.
    pub fn with_snapshot(snapshot: &Snapshot) -> Result<Self> {
        Ok(Self {
            json: Some(snapshot.to_json()?),
            saves: 0,
        })
    }

    /// Number of saves so far.
    #[must_use]
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.json = Some(snapshot.to_json()?);
        self.saves += 1;
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>> {
        self.json.as_deref().map(Snapshot::from_json).transpose()
    }

    fn clear(&mut self) -> Result<()> {
        self.json = None;
        Ok(())
    }
}
