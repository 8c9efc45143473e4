//! Tunable simulation constants.
//!
//! Values are stored in integer units (metres, permille, milli-hp, ticks)
//! so RON files stay readable and exact; accessors convert to [`Fixed`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::math::Fixed;
use crate::unit_class::UnitClass;

/// Simulation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Nominal tick length, used only to convert wall-clock throttles.
    pub tick_ms: u64,
    /// Spatial grid cell edge.
    pub cell_size_m: u32,
    /// Radius of continuous capture around a POI.
    pub capture_radius_m: u32,
    /// Radius in which a unit lets its faction claim an oil rig or gold mine.
    pub claim_radius_m: u32,
    /// Spawns must land this close to an owned city or structure.
    pub spawn_radius_m: u32,
    /// Structures outside territory must land this close to an owned city.
    pub build_radius_m: u32,
    /// Neighbors closer than this push each other apart.
    pub separation_radius_m: u32,
    /// Neighbors closer than this are ignored by separation.
    pub separation_dead_zone_m: u32,
    /// Distance of the terrain look-ahead probe.
    pub lookahead_m: u32,
    /// Absolute arrival tolerance.
    pub arrival_epsilon_m: u32,
    /// Steering magnitude cap as a fraction of per-tick speed.
    pub max_steering_permille: u32,
    /// Pursuers stop once within this fraction of their range.
    pub pursue_range_permille: u32,
    /// Defensive units further than this from their anchor walk back.
    pub defend_radius_m: u32,
    /// Gap between neighbors in a formation.
    pub formation_spacing_m: u32,
    /// Minimum damage per shot.
    pub min_damage: u32,
    /// Damage per shot as a fraction of attack.
    pub damage_permille: u32,
    /// Siege damage per eligible unit per tick.
    pub siege_millihp_per_unit: u32,
    /// POI regeneration per tick when left alone.
    pub poi_regen_millihp: u32,
    /// POI hp after an ownership change, as a fraction of max.
    pub capture_hp_permille: u32,
    /// Kill counts granting veterancy ranks 1, 2 and 3.
    pub veterancy_thresholds: [u32; 3],
    /// Max hp and attack bonus per veterancy rank.
    pub veterancy_bonus_permille: u32,
    /// Income is paid every this many ticks.
    pub income_interval_ticks: u64,
    /// Victory and defeat are evaluated every this many ticks.
    pub victory_check_interval_ticks: u64,
    /// Gold per city per income step, before tier weighting.
    pub city_gold: u32,
    /// Gold per gold mine per income step, before tier weighting.
    pub gold_mine_gold: u32,
    /// Oil per oil rig per income step, before tier weighting.
    pub oil_rig_oil: u32,
    /// Income multiplier for tiers 1, 2 and 3.
    pub tier_multiplier: [u32; 3],
    /// Gold paid to claim a neutral oil rig or gold mine.
    pub claim_cost_gold: u32,
    /// Starting gold for a faction created by base selection.
    pub starting_gold: u32,
    /// Starting oil for a faction created by base selection.
    pub starting_oil: u32,
    /// Units granted with a starting base.
    pub starting_garrison: Vec<UnitClass>,
    /// Gold cost of a strategic missile.
    pub missile_cost_gold: u32,
    /// Oil cost of a strategic missile.
    pub missile_cost_oil: u32,
    /// Silo reload time.
    pub missile_cooldown_ticks: u32,
    /// Strategic missile blast radius.
    pub missile_radius_m: u32,
    /// Strategic missile damage at the blast centre.
    pub missile_damage: u32,
    /// Strategic missile progress per tick.
    pub missile_speed_permille: u32,
    /// Explosion presentation lifetime.
    pub explosion_ticks: u32,
    /// Message log capacity.
    pub max_messages: usize,
    /// Relation between factions that never set one.
    pub default_relation: i8,
    /// Factions at or below this relation are at war.
    pub war_threshold: i8,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_ms: 33,
            cell_size_m: 11_000,
            capture_radius_m: 5_000,
            claim_radius_m: 5_000,
            spawn_radius_m: 30_000,
            build_radius_m: 30_000,
            separation_radius_m: 600,
            separation_dead_zone_m: 50,
            lookahead_m: 500,
            arrival_epsilon_m: 10,
            max_steering_permille: 500,
            pursue_range_permille: 800,
            defend_radius_m: 20_000,
            formation_spacing_m: 500,
            min_damage: 5,
            damage_permille: 500,
            siege_millihp_per_unit: 1_000,
            poi_regen_millihp: 200,
            capture_hp_permille: 500,
            veterancy_thresholds: [3, 8, 15],
            veterancy_bonus_permille: 200,
            income_interval_ticks: 30,
            victory_check_interval_ticks: 30,
            city_gold: 10,
            gold_mine_gold: 15,
            oil_rig_oil: 8,
            tier_multiplier: [3, 2, 1],
            claim_cost_gold: 200,
            starting_gold: 1_000,
            starting_oil: 200,
            starting_garrison: vec![
                UnitClass::Infantry,
                UnitClass::Infantry,
                UnitClass::Infantry,
                UnitClass::Tank,
            ],
            missile_cost_gold: 1_000,
            missile_cost_oil: 500,
            missile_cooldown_ticks: 900,
            missile_radius_m: 15_000,
            missile_damage: 400,
            missile_speed_permille: 20,
            explosion_ticks: 15,
            max_messages: 50,
            default_relation: -100,
            war_threshold: -50,
        }
    }
}

fn metres(m: u32) -> Fixed {
    Fixed::from_num(m) / Fixed::from_num(1000)
}

fn permille(p: u32) -> Fixed {
    Fixed::from_num(p) / Fixed::from_num(1000)
}

impl SimConfig {
    /// Parse a configuration from RON text. Missing fields take defaults.
    pub fn from_ron(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a RON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: Self = ron::from_str(&text).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or break the tick.
    pub fn validate(&self) -> Result<()> {
        if self.cell_size_m == 0 {
            return Err(GameError::InvalidConfig("cell_size_m must be positive".into()));
        }
        if self.income_interval_ticks == 0 || self.victory_check_interval_ticks == 0 {
            return Err(GameError::InvalidConfig(
                "tick intervals must be positive".into(),
            ));
        }
        if self.tick_ms == 0 {
            return Err(GameError::InvalidConfig("tick_ms must be positive".into()));
        }
        if !(-100..=100).contains(&self.default_relation) || !(-100..=100).contains(&self.war_threshold)
        {
            return Err(GameError::InvalidConfig(
                "relations must lie in [-100, 100]".into(),
            ));
        }
        if self.missile_speed_permille == 0 {
            return Err(GameError::InvalidConfig(
                "missile_speed_permille must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Grid cell edge in km.
    #[must_use]
    pub fn cell_size_km(&self) -> Fixed {
        metres(self.cell_size_m)
    }

    /// Capture radius in km.
    #[must_use]
    pub fn capture_radius_km(&self) -> Fixed {
        metres(self.capture_radius_m)
    }

    /// Claim radius in km.
    #[must_use]
    pub fn claim_radius_km(&self) -> Fixed {
        metres(self.claim_radius_m)
    }

    /// Spawn radius in km.
    #[must_use]
    pub fn spawn_radius_km(&self) -> Fixed {
        metres(self.spawn_radius_m)
    }

    /// Build radius in km.
    #[must_use]
    pub fn build_radius_km(&self) -> Fixed {
        metres(self.build_radius_m)
    }

    /// Separation radius in km.
    #[must_use]
    pub fn separation_radius_km(&self) -> Fixed {
        metres(self.separation_radius_m)
    }

    /// Separation dead-zone in km.
    #[must_use]
    pub fn separation_dead_zone_km(&self) -> Fixed {
        metres(self.separation_dead_zone_m)
    }

    /// Look-ahead probe distance in km.
    #[must_use]
    pub fn lookahead_km(&self) -> Fixed {
        metres(self.lookahead_m)
    }

    /// Arrival tolerance in km.
    #[must_use]
    pub fn arrival_epsilon_km(&self) -> Fixed {
        metres(self.arrival_epsilon_m)
    }

    /// Steering cap as a fraction.
    #[must_use]
    pub fn max_steering(&self) -> Fixed {
        permille(self.max_steering_permille)
    }

    /// Pursuit stop distance as a fraction of range.
    #[must_use]
    pub fn pursue_range_fraction(&self) -> Fixed {
        permille(self.pursue_range_permille)
    }

    /// Defensive leash in km.
    #[must_use]
    pub fn defend_radius_km(&self) -> Fixed {
        metres(self.defend_radius_m)
    }

    /// Formation spacing in km.
    #[must_use]
    pub fn formation_spacing_km(&self) -> Fixed {
        metres(self.formation_spacing_m)
    }

    /// Damage dealt by a shot with the given attack value.
    #[must_use]
    pub fn shot_damage(&self, attack: Fixed) -> Fixed {
        (attack * permille(self.damage_permille)).max(Fixed::from_num(self.min_damage))
    }

    /// Siege damage per eligible unit per tick.
    #[must_use]
    pub fn siege_damage_per_unit(&self) -> Fixed {
        permille(self.siege_millihp_per_unit)
    }

    /// POI regeneration per tick.
    #[must_use]
    pub fn poi_regen_per_tick(&self) -> Fixed {
        permille(self.poi_regen_millihp)
    }

    /// POI hp fraction after capture.
    #[must_use]
    pub fn capture_hp_fraction(&self) -> Fixed {
        permille(self.capture_hp_permille)
    }

    /// Veterancy bonus fraction per rank.
    #[must_use]
    pub fn veterancy_bonus(&self) -> Fixed {
        permille(self.veterancy_bonus_permille)
    }

    /// Income multiplier for a POI tier (1-3; out-of-range tiers use tier 3).
    #[must_use]
    pub fn tier_multiplier(&self, tier: u8) -> u32 {
        let index = usize::from(tier.clamp(1, 3)) - 1;
        self.tier_multiplier[index]
    }

    /// Missile blast radius in km.
    #[must_use]
    pub fn missile_radius_km(&self) -> Fixed {
        metres(self.missile_radius_m)
    }

    /// Missile progress per tick.
    #[must_use]
    pub fn missile_speed(&self) -> Fixed {
        permille(self.missile_speed_permille)
    }

    /// Number of ticks covering `ms` milliseconds, at least one.
    #[must_use]
    pub fn ticks_for_ms(&self, ms: u64) -> u64 {
        (ms / self.tick_ms).max(1)
    }
}
