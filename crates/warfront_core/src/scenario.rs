//! World seeding.
//!
//! Real games get their POIs and coastline from an external generator.
//! [`WorldGenerator`] is the seam for that; [`ScenarioData`] is the
//! built-in implementation, a hand-written RON file.
//!
//! Coordinates in scenario files are micro-degrees so they stay exact.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::components::{AutoMode, Formation, Poi, PoiId, PoiKind, Unit};
use crate::config::SimConfig;
use crate::error::{GameError, Result};
use crate::factions::{Faction, FactionId, FactionKind, Personality};
use crate::math::{ratio, GeoBounds, GeoPoint};
use crate::state::GameState;
use crate::unit_class::UnitClass;

/// Anything that can produce a starting world.
pub trait WorldGenerator {
    /// Build the initial state. The same seed must give the same world.
    fn generate(&self, seed: u64, config: &SimConfig) -> Result<GameState>;
}

// ============================================================================
// Data file types
// ============================================================================

/// A coordinate in micro-degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioPoint {
    /// Latitude.
    pub lat: i32,
    /// Longitude.
    pub lng: i32,
}

impl ScenarioPoint {
    fn to_geo(self) -> GeoPoint {
        GeoPoint::from_micro_degrees(self.lat, self.lng)
    }
}

/// Playable area in whole degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioBounds {
    /// Southern edge.
    pub min_lat: i32,
    /// Northern edge.
    pub max_lat: i32,
    /// Western edge.
    pub min_lng: i32,
    /// Eastern edge.
    pub max_lng: i32,
}

/// A POI entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoiData {
    /// Identifier, unique within the file.
    pub id: PoiId,
    /// Category.
    pub kind: PoiKind,
    /// Display name.
    pub name: String,
    /// Location.
    pub at: ScenarioPoint,
    /// 1 to 3.
    #[serde(default = "default_tier")]
    pub tier: u8,
    /// Reachable by ships.
    #[serde(default)]
    pub coastal: bool,
}

fn default_tier() -> u8 {
    2
}

/// A faction present from the start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionData {
    /// Identifier; 0 is reserved for the neutral faction.
    pub id: u16,
    /// Display name.
    pub name: String,
    /// Display color.
    #[serde(default)]
    pub color: Option<String>,
    /// Controller.
    pub kind: FactionKind,
    /// Starting gold; falls back to the configured starting gold.
    #[serde(default)]
    pub gold: Option<u32>,
    /// Starting oil; falls back to the configured starting oil.
    #[serde(default)]
    pub oil: Option<u32>,
    /// Bot style; picked from the seed when absent.
    #[serde(default)]
    pub personality: Option<Personality>,
    /// Bot aggression in permille.
    #[serde(default)]
    pub aggression_permille: Option<u32>,
    /// Cities owned at the start.
    #[serde(default)]
    pub cities: Vec<PoiId>,
}

/// A unit present from the start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitData {
    /// Class.
    pub class: UnitClass,
    /// Owning faction id.
    pub owner: u16,
    /// Location.
    pub at: ScenarioPoint,
}

/// Neutral defenders posted at a POI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardData {
    /// The guarded POI.
    pub poi: PoiId,
    /// One unit per entry.
    pub classes: Vec<UnitClass>,
}

/// A complete scenario file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioData {
    /// Scenario name, used as the replay id.
    pub name: String,
    /// Playable area.
    pub bounds: ScenarioBounds,
    /// Points of interest.
    pub pois: Vec<PoiData>,
    /// Factions besides the neutral one.
    #[serde(default)]
    pub factions: Vec<FactionData>,
    /// Starting units.
    #[serde(default)]
    pub units: Vec<UnitData>,
    /// Neutral garrisons.
    #[serde(default)]
    pub guards: Vec<GuardData>,
}

impl ScenarioData {
    /// Parse a scenario from RON text.
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Load a scenario from a RON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        ron::from_str(&text).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Check references and ranges.
    pub fn validate(&self) -> Result<()> {
        let b = &self.bounds;
        if b.min_lat >= b.max_lat || b.min_lng >= b.max_lng {
            return Err(GameError::InvalidState(format!("scenario '{}' has empty bounds", self.name)));
        }
        let bounds = self.geo_bounds();

        let mut poi_ids: Vec<PoiId> = self.pois.iter().map(|p| p.id).collect();
        poi_ids.sort_unstable();
        if poi_ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(GameError::InvalidState("duplicate POI id".into()));
        }
        if let Some(poi) = self.pois.iter().find(|p| !bounds.contains(p.at.to_geo())) {
            return Err(GameError::InvalidState(format!("POI {} lies outside the bounds", poi.id)));
        }

        let mut faction_ids: Vec<u16> = self.factions.iter().map(|f| f.id).collect();
        faction_ids.sort_unstable();
        if faction_ids.first() == Some(&0) || faction_ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(GameError::InvalidState("faction ids must be unique and non-zero".into()));
        }
        for faction in &self.factions {
            for city in &faction.cities {
                let is_city = self.pois.iter().any(|p| p.id == *city && p.kind == PoiKind::City);
                if !is_city {
                    return Err(GameError::InvalidState(format!(
                        "faction {} claims {city}, which is not a city",
                        faction.id
                    )));
                }
            }
        }

        for unit in &self.units {
            if faction_ids.binary_search(&unit.owner).is_err() {
                return Err(GameError::EntityNotFound(u64::from(unit.owner)));
            }
            if !bounds.contains(unit.at.to_geo()) {
                return Err(GameError::InvalidState(format!("{:?} unit lies outside the bounds", unit.class)));
            }
        }
        for guard in &self.guards {
            if poi_ids.binary_search(&guard.poi).is_err() {
                return Err(GameError::EntityNotFound(guard.poi));
            }
        }
        Ok(())
    }

    fn geo_bounds(&self) -> GeoBounds {
        let b = &self.bounds;
        GeoBounds::from_degrees(b.min_lat, b.max_lat, b.min_lng, b.max_lng)
    }

    fn build_faction(data: &FactionData, seed: u64, config: &SimConfig) -> Faction {
        let mut faction = Faction::new(FactionId(data.id), data.name.clone(), data.kind);
        if let Some(color) = &data.color {
            faction.color.clone_from(color);
        }
        faction.gold = data.gold.unwrap_or(config.starting_gold);
        faction.oil = data.oil.unwrap_or(config.starting_oil);
        if data.kind == FactionKind::Bot {
            let index = seed.wrapping_add(u64::from(data.id)) % 5;
            faction.personality = Some(
                data.personality
                    .unwrap_or_else(|| Personality::from_index(index as u32)),
            );
        }
        if let Some(aggression) = data.aggression_permille {
            faction.aggression = ratio(aggression.min(1_000) as i32, 1_000);
        }
        faction.established = !data.cities.is_empty();
        faction
    }

    fn post_guards(&self, state: &mut GameState, config: &SimConfig) {
        if self.guards.is_empty() {
            return;
        }
        let guard_id = state.next_faction_id();
        let mut guardians = Faction::new(guard_id, "Guardians", FactionKind::Neutral);
        guardians.guard_of = Some(FactionId::NEUTRAL);
        state.factions.insert(guardians);
        state.set_relation(guard_id, FactionId::NEUTRAL, 100);

        for guard in &self.guards {
            let Some(anchor) = state.poi(guard.poi).map(|p| p.position) else {
                continue;
            };
            let offsets = Formation::Box.offsets(guard.classes.len(), config.formation_spacing_km());
            for (class, offset) in guard.classes.iter().zip(offsets) {
                let id = state.allocate_entity_id();
                let position = state.bounds.clamp(anchor.offset_km(offset));
                let mut unit = Unit::new(id, *class, guard_id, position);
                unit.guard_poi = Some(guard.poi);
                unit.auto_mode = Some(AutoMode::Defend { anchor });
                state.units.insert(unit);
            }
        }
    }
}

impl WorldGenerator for ScenarioData {
    fn generate(&self, seed: u64, config: &SimConfig) -> Result<GameState> {
        self.validate()?;
        let mut state = GameState::new(self.geo_bounds());

        for data in &self.pois {
            let mut poi = Poi::new(data.id, data.kind, data.name.clone(), data.at.to_geo(), data.tier);
            poi.coastal = data.coastal;
            state.pois.insert(poi);
        }
        for data in &self.factions {
            state.factions.insert(Self::build_faction(data, seed, config));
            for city in &data.cities {
                if let Some(poi) = state.pois.get_mut(*city) {
                    poi.owner = FactionId(data.id);
                }
            }
        }
        for data in &self.units {
            let id = state.allocate_entity_id();
            state
                .units
                .insert(Unit::new(id, data.class, FactionId(data.owner), data.at.to_geo()));
        }
        self.post_guards(&mut state, config);

        tracing::info!(
            scenario = %self.name,
            pois = state.pois.len(),
            factions = state.factions.len(),
            units = state.units.len(),
            "Scenario generated"
        );
        Ok(state)
    }
}
