//! Replay system for recording and playing back games.
//!
//! Replays store the initial world state and the stream of actions
//! applied during the game. Because the tick is deterministic, replaying
//! the actions against the initial state reproduces the game, and the
//! final hash tells whether it did.
//!
//! Actions issued by the host AI during tick `t` are recorded as pending
//! input of tick `t + 1`, so playback needs no AI.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::actions::GameAction;
use crate::config::SimConfig;
use crate::error::{GameError, Result};
use crate::simulation::{Simulation, TickEvents};

/// A single action record for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayAction {
    /// Tick whose pending input carried the action.
    pub tick: u64,
    /// The action.
    pub action: GameAction,
}

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 2;

/// Complete replay data structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Scenario identifier or name.
    pub scenario_id: String,
    /// Seed of the host AI that played the game.
    pub seed: u64,
    /// Simulation configuration in force.
    pub config: SimConfig,
    /// Serialized initial world state.
    pub initial_state: Vec<u8>,
    /// Stream of actions in tick order.
    pub actions: Vec<ReplayAction>,
    /// Final tick when the game ended.
    pub final_tick: u64,
    /// Final state hash for verification.
    pub final_hash: u64,
}

impl Replay {
    /// Create a new replay from a simulation's current state.
    pub fn new(scenario_id: impl Into<String>, seed: u64, initial: &Simulation) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            seed,
            config: initial.config().clone(),
            initial_state: initial.serialize()?,
            actions: Vec::new(),
            final_tick: initial.get_tick(),
            final_hash: 0,
        })
    }

    /// Record an action applied as pending input of `tick`.
    pub fn record_action(&mut self, tick: u64, action: GameAction) {
        self.actions.push(ReplayAction { tick, action });
    }

    /// Record everything one tick applied: its pending input and the AI
    /// actions it produced.
    pub fn record_tick(&mut self, tick: u64, pending: &[GameAction], events: &TickEvents) {
        for action in pending {
            self.record_action(tick, action.clone());
        }
        for action in &events.ai_actions {
            self.record_action(tick + 1, action.clone());
        }
    }

    /// Finalize the replay with end-game state.
    pub fn finalize(&mut self, final_tick: u64, final_hash: u64) {
        self.final_tick = final_tick;
        self.final_hash = final_hash;
    }

    /// Save the replay to a JSON file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_vec(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize replay: {e}")))?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if file reading or deserialization fails, or the
    /// version does not match.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let replay: Self = serde_json::from_slice(&bytes).map_err(|e| GameError::DataParseError {
            path: path.as_ref().display().to_string(),
            message: e.to_string(),
        })?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::InvalidState(format!(
                "Replay version mismatch: expected {}, got {}",
                REPLAY_VERSION, replay.version
            )));
        }

        Ok(replay)
    }

    /// Get the initial simulation for playback.
    ///
    /// # Errors
    /// Returns an error if state deserialization fails.
    pub fn restore_initial_state(&self) -> Result<Simulation> {
        Simulation::deserialize(&self.initial_state, self.config.clone())
    }

    /// Actions applied at a specific tick.
    #[must_use]
    pub fn actions_at_tick(&self, tick: u64) -> Vec<&GameAction> {
        self.actions
            .iter()
            .filter(|record| record.tick == tick)
            .map(|record| &record.action)
            .collect()
    }

    /// Get the total number of actions in the replay.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }
}

/// Replay playback controller.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    simulation: Simulation,
    action_index: usize,
    /// Whether playback is paused.
    pub paused: bool,
}

impl ReplayPlayer {
    /// Create a new replay player from a replay.
    ///
    /// # Errors
    /// Returns an error if the initial state cannot be restored.
    pub fn new(replay: Replay) -> Result<Self> {
        let simulation = replay.restore_initial_state()?;
        Ok(Self {
            replay,
            simulation,
            action_index: 0,
            paused: false,
        })
    }

    /// Advance the replay by one tick.
    ///
    /// Returns true if there are more ticks to play.
    pub fn advance(&mut self) -> bool {
        if self.paused || self.is_finished() {
            return !self.is_finished();
        }
        self.step();
        !self.is_finished()
    }

    fn step(&mut self) {
        let tick = self.simulation.get_tick();
        let mut pending = Vec::new();
        while let Some(record) = self.replay.actions.get(self.action_index) {
            if record.tick > tick {
                break;
            }
            pending.push(record.action.clone());
            self.action_index += 1;
        }
        let now_ms = tick * self.replay.config.tick_ms;
        self.simulation.tick(pending, now_ms, None);
    }

    /// Seek to a specific tick.
    ///
    /// # Errors
    /// Returns an error if state restoration fails.
    pub fn seek(&mut self, target_tick: u64) -> Result<()> {
        self.simulation = self.replay.restore_initial_state()?;
        self.action_index = 0;
        while self.simulation.get_tick() < target_tick && !self.is_finished() {
            self.step();
        }
        Ok(())
    }

    /// Get the current tick.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.simulation.get_tick()
    }

    /// Get a reference to the current simulation.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Get the replay being played.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// Check if the replay has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.simulation.get_tick() >= self.replay.final_tick
    }

    /// Replay from the start and compare against the recorded final hash.
    ///
    /// # Errors
    /// Returns [`GameError::DesyncDetected`] on a hash mismatch, or an
    /// error if state restoration fails.
    pub fn verify(&mut self) -> Result<()> {
        self.seek(self.replay.final_tick)?;
        let actual = self.simulation.state_hash();
        if actual != self.replay.final_hash {
            return Err(GameError::DesyncDetected {
                tick: self.simulation.get_tick(),
                local_hash: actual,
                remote_hash: self.replay.final_hash,
            });
        }
        Ok(())
    }

    /// Toggle pause state.
    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionKind;
    use crate::ai::{AiConfig, AiContext};
    use crate::components::{Poi, PoiKind};
    use crate::factions::{Faction, FactionId, FactionKind};
    use crate::math::{ratio, GeoBounds, GeoPoint};
    use crate::state::GameState;
    use crate::unit_class::UnitClass;

    fn point(lat_milli: i32, lng_milli: i32) -> GeoPoint {
        GeoPoint::new(ratio(lat_milli, 1000), ratio(lng_milli, 1000))
    }

    fn create_test_simulation() -> Simulation {
        let mut state = GameState::new(GeoBounds::from_degrees(-10, 10, -10, 10));
        for (id, kind) in [(1, FactionKind::Player), (2, FactionKind::Bot)] {
            let mut faction = Faction::new(FactionId(id), format!("F{id}"), kind);
            faction.gold = 2_000;
            faction.oil = 500;
            faction.established = true;
            state.factions.insert(faction);
        }
        let mut red = Poi::new(10, PoiKind::City, "Red", point(0, 0), 1);
        red.owner = FactionId(1);
        let mut blue = Poi::new(11, PoiKind::City, "Blue", point(300, 0), 1);
        blue.owner = FactionId(2);
        state.pois.insert(red);
        state.pois.insert(blue);
        state.pois.insert(Poi::new(12, PoiKind::City, "Free", point(150, 150), 2));
        Simulation::new(state)
    }

    fn record_game(ticks: u64) -> (Replay, u64) {
        let mut sim = create_test_simulation();
        let mut ai = AiContext::new(5, AiConfig::default());
        let mut replay = Replay::new("test_scenario", 5, &sim).unwrap();
        for tick in 0..ticks {
            let pending = if tick == 3 {
                vec![GameAction::new(
                    1,
                    FactionId(1),
                    0,
                    ActionKind::SpawnUnit {
                        unit_id: Some(1 << 40),
                        class: UnitClass::Tank,
                        position: point(0, 20),
                    },
                )]
            } else {
                Vec::new()
            };
            let events = sim.tick(pending.clone(), tick * 33, Some(&mut ai));
            replay.record_tick(tick, &pending, &events);
        }
        let hash = sim.state_hash();
        replay.finalize(sim.get_tick(), hash);
        (replay, hash)
    }

    #[test]
    fn test_replay_records_pending_and_ai_actions() {
        let (replay, _) = record_game(10);
        assert_eq!(replay.actions_at_tick(3).len(), 1);
        assert!(replay.action_count() > 1);
        assert!(replay.actions.iter().any(|r| r.action.actor == FactionId(2)));
    }

    #[test]
    fn test_replay_verifies() {
        let (replay, _) = record_game(90);
        let mut player = ReplayPlayer::new(replay).unwrap();
        assert!(player.verify().is_ok());
        assert!(player.is_finished());
    }

    #[test]
    fn test_tampered_replay_fails_verification() {
        let (mut replay, _) = record_game(20);
        replay.actions.retain(|r| r.tick != 3);
        let mut player = ReplayPlayer::new(replay).unwrap();
        assert!(matches!(player.verify(), Err(GameError::DesyncDetected { .. })));
    }

    #[test]
    fn test_save_and_load() {
        let (replay, hash) = record_game(5);
        let dir = std::env::temp_dir().join(format!("warfront-replay-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("game.replay.json");
        replay.save(&path).unwrap();
        let loaded = Replay::load(&path).unwrap();
        assert_eq!(loaded.final_hash, hash);
        assert_eq!(loaded.actions, replay.actions);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_pause_blocks_advance() {
        let (replay, _) = record_game(5);
        let mut player = ReplayPlayer::new(replay).unwrap();
        player.toggle_pause();
        assert!(player.advance());
        assert_eq!(player.current_tick(), 0);
        player.toggle_pause();
        player.advance();
        assert_eq!(player.current_tick(), 1);
    }
}
