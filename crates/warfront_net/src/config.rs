//! Host and session tuning.
//!
//! Everything is in milliseconds or plain counts so RON files stay exact.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};

/// Configuration shared by [`crate::sync::SyncSession`] and
/// [`crate::phantom::PhantomHost`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Room name written into snapshots.
    pub room_id: String,
    /// World and AI seed for the first round.
    pub seed: u64,
    /// How often the phantom host persists a snapshot.
    pub save_interval_ms: u64,
    /// Snapshots older than this are discarded on start.
    pub snapshot_max_age_ms: u64,
    /// A peer that hears no heartbeat for this long starts an election.
    pub host_timeout_ms: u64,
    /// Heartbeat cadence of the host.
    pub heartbeat_interval_ms: u64,
    /// Full-state resync cadence of the host.
    pub full_state_interval_ms: u64,
    /// Bot factions kept alive by the phantom host.
    pub min_bots: usize,
    /// Start a fresh round once a single faction is left.
    pub restart_finished_rounds: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            room_id: "default".to_string(),
            seed: 1,
            save_interval_ms: 30_000,
            snapshot_max_age_ms: 10 * 60 * 1000,
            host_timeout_ms: 5_000,
            heartbeat_interval_ms: 1_000,
            full_state_interval_ms: 10_000,
            min_bots: 2,
            restart_finished_rounds: true,
        }
    }
}

impl HostConfig {
    /// Parse a configuration from RON text. Missing fields take defaults.
    pub fn from_ron(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text).map_err(|e| NetError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a RON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text).map_err(|e| match e {
            NetError::InvalidConfig(message) => {
                NetError::InvalidConfig(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Reject intervals that would spin or never fire.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 || self.full_state_interval_ms == 0 || self.save_interval_ms == 0
        {
            return Err(NetError::InvalidConfig("intervals must be positive".into()));
        }
        if self.host_timeout_ms <= self.heartbeat_interval_ms {
            return Err(NetError::InvalidConfig(
                "host_timeout_ms must exceed heartbeat_interval_ms".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HostConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.snapshot_max_age_ms, 600_000);
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = HostConfig::from_ron("(min_bots: 4, room_id: \"eu-1\")").expect("parse");
        assert_eq!(config.min_bots, 4);
        assert_eq!(config.room_id, "eu-1");
        assert_eq!(config.heartbeat_interval_ms, 1_000);
    }

    #[test]
    fn test_timeout_must_outlast_heartbeat() {
        let result = HostConfig::from_ron("(host_timeout_ms: 500, heartbeat_interval_ms: 1000)");
        assert!(matches!(result, Err(NetError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("host.ron");
        std::fs::write(&path, "(seed: 99)").expect("write");
        assert_eq!(HostConfig::load(&path).expect("load").seed, 99);
    }
}
