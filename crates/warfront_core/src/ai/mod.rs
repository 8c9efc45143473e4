//! Host-side AI: the pacing director and per-faction bot brains.
//!
//! AI never touches [`GameState`] directly. Each think cycle reads the
//! state and returns [`GameAction`]s that go through the same resolver as
//! player input, so peers that receive them end up in the same place.
//!
//! Only the host owns an [`AiContext`]. Its contents are scratch state:
//! a host that takes over after migration starts with a fresh context.

pub mod brain;
pub mod director;

use std::collections::BTreeMap;
use std::path::Path;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::actions::{ActionKind, GameAction};
use crate::config::SimConfig;
use crate::error::{GameError, Result};
use crate::factions::FactionId;
use crate::math::Fixed;
use crate::state::GameState;

pub use brain::{choose_production, BotBrain, ProductionInput, TaskForce, TaskForceKind, TaskForceStatus};
pub use director::DirectorState;

/// High bit marking dedup ids minted by the host AI.
pub const AI_ACTION_FLAG: u64 = 1 << 63;

/// Dedup id for the `seq`-th AI action issued on `tick`.
#[must_use]
pub fn ai_action_id(tick: u64, seq: u64) -> u64 {
    AI_ACTION_FLAG | (tick << 20) | (seq & 0xF_FFFF)
}

/// AI tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Minimum time between two think cycles of one bot.
    pub bot_think_interval_ms: u64,
    /// Hostiles this close to an owned city trigger a defense force.
    pub detection_radius_m: u32,
    /// Defense forces engage hostiles within this distance of their city.
    pub defense_perimeter_m: u32,
    /// Escorts gather within this distance of their force's target.
    pub escort_jitter_m: u32,
    /// Hostile units near a city needed to raise a defense force.
    pub defense_trigger: usize,
    /// Own power over rival power, in permille, that allows a raid.
    pub raid_ratio_permille: u32,
    /// Own power over rival power, in permille, that allows an assault.
    pub assault_ratio_permille: u32,
    /// Production jitter around the producing city.
    pub production_jitter_m: u32,
    /// Wave director difficulty, 1 to 3.
    pub difficulty: u8,
    /// Delay before the first wave and wave interval at difficulty 1.
    pub wave_interval_ms: u64,
    /// Director skips a wave while intensity is at or above this.
    pub intensity_threshold_permille: u32,
    /// Intensity added per active projectile per update.
    pub projectile_intensity_permille: u32,
    /// Intensity added per explosion per update.
    pub explosion_intensity_permille: u32,
    /// Intensity kept per update.
    pub intensity_retain_permille: u32,
    /// Largest wave.
    pub max_wave_size: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            bot_think_interval_ms: 300,
            detection_radius_m: 20_000,
            defense_perimeter_m: 25_000,
            escort_jitter_m: 2_000,
            defense_trigger: 2,
            raid_ratio_permille: 1_000,
            assault_ratio_permille: 1_500,
            production_jitter_m: 2_000,
            difficulty: 1,
            wave_interval_ms: 90_000,
            intensity_threshold_permille: 5_000,
            projectile_intensity_permille: 100,
            explosion_intensity_permille: 200,
            intensity_retain_permille: 950,
            max_wave_size: 12,
        }
    }
}

fn metres(m: u32) -> Fixed {
    Fixed::from_num(m) / Fixed::from_num(1000)
}

fn permille(p: u32) -> Fixed {
    Fixed::from_num(p) / Fixed::from_num(1000)
}

impl AiConfig {
    /// Parse from RON text. Missing fields take defaults.
    pub fn from_ron(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a RON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_ron(&text)
    }

    /// Reject unusable values.
    pub fn validate(&self) -> Result<()> {
        if !(1..=3).contains(&self.difficulty) {
            return Err(GameError::InvalidConfig("difficulty must be 1, 2 or 3".into()));
        }
        if self.wave_interval_ms == 0 {
            return Err(GameError::InvalidConfig("wave_interval_ms must be positive".into()));
        }
        if self.intensity_retain_permille > 1_000 {
            return Err(GameError::InvalidConfig(
                "intensity_retain_permille must not exceed 1000".into(),
            ));
        }
        Ok(())
    }

    /// Defense trigger radius in km.
    #[must_use]
    pub fn detection_radius_km(&self) -> Fixed {
        metres(self.detection_radius_m)
    }

    /// Defense engagement radius in km.
    #[must_use]
    pub fn defense_perimeter_km(&self) -> Fixed {
        metres(self.defense_perimeter_m)
    }

    /// Escort gathering spread in km.
    #[must_use]
    pub fn escort_jitter_km(&self) -> Fixed {
        metres(self.escort_jitter_m)
    }

    /// Production spread in km.
    #[must_use]
    pub fn production_jitter_km(&self) -> Fixed {
        metres(self.production_jitter_m)
    }

    /// Intensity threshold.
    #[must_use]
    pub fn intensity_threshold(&self) -> Fixed {
        permille(self.intensity_threshold_permille)
    }

    /// Intensity per active projectile.
    #[must_use]
    pub fn projectile_intensity(&self) -> Fixed {
        permille(self.projectile_intensity_permille)
    }

    /// Intensity per explosion.
    #[must_use]
    pub fn explosion_intensity(&self) -> Fixed {
        permille(self.explosion_intensity_permille)
    }

    /// Intensity decay factor.
    #[must_use]
    pub fn intensity_retain(&self) -> Fixed {
        permille(self.intensity_retain_permille)
    }

    /// Wave interval scaled by difficulty.
    #[must_use]
    pub fn scaled_wave_interval_ms(&self) -> u64 {
        self.wave_interval_ms * 3 / (2 + u64::from(self.difficulty))
    }
}

/// Everything the host AI keeps between ticks.
#[derive(Debug, Clone)]
pub struct AiContext {
    /// Tuning.
    pub config: AiConfig,
    /// Wave pacing.
    pub director: DirectorState,
    /// One brain per live bot faction.
    pub brains: BTreeMap<FactionId, BotBrain>,
    /// Source of every random AI choice.
    pub rng: ChaCha8Rng,
}

impl AiContext {
    /// Create a context with a seeded generator.
    #[must_use]
    pub fn new(seed: u64, config: AiConfig) -> Self {
        let director = DirectorState::new(config.difficulty);
        Self {
            config,
            director,
            brains: BTreeMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Create brains for new bot factions and drop the ones whose faction
    /// is gone, defeated or now human.
    pub fn sync(&mut self, state: &GameState) {
        self.brains
            .retain(|id, _| state.faction(*id).is_some_and(|f| f.is_bot()));
        for faction in state.factions.iter().filter(|f| f.is_bot()) {
            self.brains
                .entry(faction.id)
                .or_insert_with(|| BotBrain::new(faction.id));
        }
    }

    /// Run the director and every due brain. Returned actions carry host
    /// dedup ids and may have unfilled unit ids.
    pub fn think(&mut self, state: &GameState, sim: &SimConfig, now_ms: u64) -> Vec<GameAction> {
        self.sync(state);

        let mut issued: Vec<(FactionId, ActionKind)> = Vec::new();
        issued.extend(self.director.update(state, &self.config, now_ms, &mut self.rng));

        for brain in self.brains.values_mut() {
            if !brain.is_due(now_ms, self.config.bot_think_interval_ms) {
                continue;
            }
            let orders = brain.think(state, sim, &self.config, now_ms, &mut self.rng);
            issued.extend(orders.into_iter().map(|kind| (brain.faction, kind)));
        }

        issued
            .into_iter()
            .enumerate()
            .map(|(seq, (actor, payload))| GameAction::new(ai_action_id(state.tick, seq as u64), actor, now_ms, payload))
            .collect()
    }
}
