//! Wave director.
//!
//! Tracks how busy the battlefield is and, when things go quiet, sends a
//! free reinforcement wave from a random bot city at the nearest neutral
//! city, or at the human player once no neutral city is left.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::actions::ActionKind;
use crate::ai::AiConfig;
use crate::components::{Poi, PoiId};
use crate::factions::{FactionId, FactionKind};
use crate::math::{fixed_serde, Fixed, GeoPoint};
use crate::state::GameState;
use crate::unit_class::UnitClass;

/// Director pacing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorState {
    /// Running measure of combat activity.
    #[serde(with = "fixed_serde")]
    pub intensity: Fixed,
    /// Wall-clock time of the next wave; `None` until first scheduled.
    pub next_wave_at_ms: Option<u64>,
    /// Waves sent so far.
    pub wave_count: u32,
    /// 1 to 3.
    pub difficulty: u8,
}

impl DirectorState {
    /// Fresh director at the given difficulty.
    #[must_use]
    pub fn new(difficulty: u8) -> Self {
        Self {
            intensity: Fixed::ZERO,
            next_wave_at_ms: None,
            wave_count: 0,
            difficulty: difficulty.clamp(1, 3),
        }
    }

    /// Units in the next wave.
    #[must_use]
    pub fn wave_size(&self, config: &AiConfig) -> u32 {
        (2 + self.wave_count + u32::from(self.difficulty)).min(config.max_wave_size)
    }

    /// Fold the current activity into intensity, then spawn a wave if the
    /// timer has fired and the field is quiet.
    pub fn update(
        &mut self,
        state: &GameState,
        config: &AiConfig,
        now_ms: u64,
        rng: &mut ChaCha8Rng,
    ) -> Option<(FactionId, ActionKind)> {
        let activity = config.projectile_intensity() * Fixed::from_num(state.projectiles.active_count())
            + config.explosion_intensity() * Fixed::from_num(state.explosions.len());
        self.intensity = (self.intensity + activity) * config.intensity_retain();

        let interval = config.scaled_wave_interval_ms();
        let due = *self.next_wave_at_ms.get_or_insert(now_ms + interval);
        if now_ms < due {
            return None;
        }
        self.next_wave_at_ms = Some(now_ms + interval);
        if self.intensity >= config.intensity_threshold() {
            tracing::debug!(intensity = %self.intensity, "wave skipped, battlefield busy");
            return None;
        }

        let wave = self.plan_wave(state, config, rng)?;
        self.wave_count += 1;
        tracing::info!(wave = self.wave_count, faction = %wave.0, "director dispatched wave");
        Some(wave)
    }

    fn plan_wave(
        &self,
        state: &GameState,
        config: &AiConfig,
        rng: &mut ChaCha8Rng,
    ) -> Option<(FactionId, ActionKind)> {
        let bot_cities: Vec<&Poi> = state
            .pois
            .iter()
            .filter(|p| p.is_city() && state.faction(p.owner).is_some_and(|f| f.is_bot()))
            .collect();
        if bot_cities.is_empty() {
            return None;
        }
        let home = bot_cities[rng.gen_range(0..bot_cities.len())];
        let objective = wave_objective(state, home)?;

        let size = self.wave_size(config);
        let classes = (0..size)
            .map(|i| if i % 3 == 2 { UnitClass::Tank } else { UnitClass::Infantry })
            .collect();
        let position = state.bounds.clamp(home.position);

        Some((
            home.owner,
            ActionKind::SpawnWave {
                unit_ids: Vec::new(),
                classes,
                position,
                objective,
            },
        ))
    }
}

fn nearest<'a>(from: GeoPoint, pois: impl Iterator<Item = &'a Poi>) -> Option<PoiId> {
    pois.min_by_key(|p| (from.distance_km(p.position), p.id))
        .map(|p| p.id)
}

/// Nearest neutral city, else the nearest city held by a human player.
fn wave_objective(state: &GameState, home: &Poi) -> Option<PoiId> {
    let neutral = nearest(
        home.position,
        state.pois.iter().filter(|p| p.is_city() && p.owner.is_neutral()),
    );
    neutral.or_else(|| {
        nearest(
            home.position,
            state.pois.iter().filter(|p| {
                p.is_city()
                    && state
                        .faction(p.owner)
                        .is_some_and(|f| f.kind == FactionKind::Player && !f.defeated)
            }),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::PoiKind;
    use crate::factions::Faction;
    use crate::math::ratio;
    use rand::SeedableRng;

    fn point(lat_milli: i32, lng_milli: i32) -> GeoPoint {
        GeoPoint::new(ratio(lat_milli, 1000), ratio(lng_milli, 1000))
    }

    fn world() -> GameState {
        let mut state = GameState::default();
        state.factions.insert(Faction::new(FactionId(1), "Human", FactionKind::Player));
        state.factions.insert(Faction::new(FactionId(2), "Bot", FactionKind::Bot));
        let mut bot_city = Poi::new(10, PoiKind::City, "Bot Town", point(0, 0), 2);
        bot_city.owner = FactionId(2);
        let mut human_city = Poi::new(11, PoiKind::City, "Human Town", point(500, 0), 2);
        human_city.owner = FactionId(1);
        state.pois.insert(bot_city);
        state.pois.insert(human_city);
        state.pois.insert(Poi::new(12, PoiKind::City, "Far", point(3_000, 0), 3));
        state.pois.insert(Poi::new(13, PoiKind::City, "Near", point(1_000, 0), 3));
        state
    }

    fn run(director: &mut DirectorState, state: &GameState, now_ms: u64) -> Option<(FactionId, ActionKind)> {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        director.update(state, &AiConfig::default(), now_ms, &mut rng)
    }

    #[test]
    fn test_first_wave_waits_for_timer() {
        let state = world();
        let mut director = DirectorState::new(1);
        assert!(run(&mut director, &state, 0).is_none());
        assert_eq!(director.next_wave_at_ms, Some(90_000));
        assert!(run(&mut director, &state, 89_999).is_none());
        assert!(run(&mut director, &state, 90_000).is_some());
        assert_eq!(director.wave_count, 1);
    }

    #[test]
    fn test_wave_targets_nearest_neutral_city() {
        let state = world();
        let mut director = DirectorState::new(1);
        director.next_wave_at_ms = Some(0);
        let (actor, action) = run(&mut director, &state, 0).unwrap();
        assert_eq!(actor, FactionId(2));
        match action {
            ActionKind::SpawnWave { classes, objective, .. } => {
                assert_eq!(objective, 13);
                assert_eq!(classes.len(), 3);
                assert_eq!(classes[2], UnitClass::Tank);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_wave_falls_back_to_human_city() {
        let mut state = world();
        for id in [12, 13] {
            state.pois.get_mut(id).unwrap().owner = FactionId(2);
        }
        let mut director = DirectorState::new(2);
        director.next_wave_at_ms = Some(0);
        let (_, action) = run(&mut director, &state, 0).unwrap();
        assert!(matches!(action, ActionKind::SpawnWave { objective: 11, .. }));
    }

    #[test]
    fn test_busy_battlefield_skips_wave() {
        let state = world();
        let mut director = DirectorState::new(1);
        director.next_wave_at_ms = Some(0);
        director.intensity = Fixed::from_num(100);
        assert!(run(&mut director, &state, 0).is_none());
        assert_eq!(director.wave_count, 0);
        assert_eq!(director.next_wave_at_ms, Some(90_000));
    }

    #[test]
    fn test_intensity_decays() {
        let state = world();
        let mut director = DirectorState::new(1);
        director.intensity = Fixed::from_num(10);
        run(&mut director, &state, 0);
        assert!(director.intensity < Fixed::from_num(10));
    }
}
