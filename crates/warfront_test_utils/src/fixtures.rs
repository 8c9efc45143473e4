//! Test fixtures and helpers.
//!
//! Pre-built worlds and a builder for consistent testing.

use fixed::types::I32F32;
use warfront_core::actions::{ActionKind, GameAction};
use warfront_core::components::{Poi, PoiId, PoiKind, Unit, UnitId};
use warfront_core::factions::{Faction, FactionId, FactionKind};
use warfront_core::math::{GeoBounds, GeoPoint};
use warfront_core::simulation::Simulation;
use warfront_core::state::GameState;
use warfront_core::terrain::{Surface, TerrainOracle};
use warfront_core::unit_class::UnitClass;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// A coordinate given in milli-degrees.
#[must_use]
pub fn point(lat_milli: i32, lng_milli: i32) -> GeoPoint {
    GeoPoint::from_micro_degrees(lat_milli * 1_000, lng_milli * 1_000)
}

/// Wrap a payload into an action.
#[must_use]
pub fn action(id: u64, actor: u16, payload: ActionKind) -> GameAction {
    GameAction::new(id, FactionId(actor), 0, payload)
}

/// Terrain split by a parallel: land to the north, ocean to the south and
/// a coastal band of `band` degrees on either side of the shoreline.
#[derive(Debug, Clone, Copy)]
pub struct CoastlineTerrain {
    /// Latitude of the shoreline.
    pub shore_lat: I32F32,
    /// Half-width of the coastal band.
    pub band: I32F32,
}

impl CoastlineTerrain {
    /// Shoreline on the equator with a 0.05 degree band.
    #[must_use]
    pub fn equator() -> Self {
        Self {
            shore_lat: I32F32::ZERO,
            band: fixed(1) / fixed(20),
        }
    }
}

impl TerrainOracle for CoastlineTerrain {
    fn is_ready(&self) -> bool {
        true
    }

    fn classify(&self, point: GeoPoint) -> Surface {
        if point.lat > self.shore_lat + self.band {
            Surface::Land
        } else if point.lat < self.shore_lat - self.band {
            Surface::Ocean
        } else {
            Surface::Coast
        }
    }
}

/// Fluent builder for small worlds.
///
/// Factions are created established and rich so tests opt in to scarcity.
#[derive(Debug, Clone)]
pub struct WorldBuilder {
    state: GameState,
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldBuilder {
    /// Empty world spanning ten degrees around the origin.
    #[must_use]
    pub fn new() -> Self {
        Self::with_bounds(GeoBounds::from_degrees(-10, 10, -10, 10))
    }

    /// Empty world with the given bounds.
    #[must_use]
    pub fn with_bounds(bounds: GeoBounds) -> Self {
        Self {
            state: GameState::new(bounds),
        }
    }

    /// Add an established faction with 10 000 gold and 2 000 oil.
    #[must_use]
    pub fn faction(mut self, id: u16, kind: FactionKind) -> Self {
        let mut faction = Faction::new(FactionId(id), format!("Faction {id}"), kind);
        faction.gold = 10_000;
        faction.oil = 2_000;
        faction.established = true;
        self.state.factions.insert(faction);
        self
    }

    /// Set a faction's treasury.
    #[must_use]
    pub fn treasury(mut self, id: u16, gold: u32, oil: u32) -> Self {
        if let Some(faction) = self.state.faction_mut(FactionId(id)) {
            faction.gold = gold;
            faction.oil = oil;
        }
        self
    }

    /// Add a POI owned by `owner` (0 for neutral).
    #[must_use]
    pub fn poi(mut self, id: PoiId, kind: PoiKind, at: GeoPoint, owner: u16) -> Self {
        let mut poi = Poi::new(id, kind, format!("{kind:?} {id}"), at, 2);
        poi.owner = FactionId(owner);
        self.state.pois.insert(poi);
        self
    }

    /// Add a tier-2 city.
    #[must_use]
    pub fn city(self, id: PoiId, at: GeoPoint, owner: u16) -> Self {
        self.poi(id, PoiKind::City, at, owner)
    }

    /// Add a tier-2 coastal city.
    #[must_use]
    pub fn coastal_city(mut self, id: PoiId, at: GeoPoint, owner: u16) -> Self {
        self = self.city(id, at, owner);
        if let Some(poi) = self.state.pois.get_mut(id) {
            poi.coastal = true;
        }
        self
    }

    /// Add a unit with a chosen id.
    #[must_use]
    pub fn unit(mut self, id: UnitId, class: UnitClass, owner: u16, at: GeoPoint) -> Self {
        self.state.units.insert(Unit::new(id, class, FactionId(owner), at));
        self
    }

    /// Adjust the unit with `id`.
    #[must_use]
    pub fn with_unit(mut self, id: UnitId, f: impl FnOnce(&mut Unit)) -> Self {
        if let Some(unit) = self.state.units.get_mut(id) {
            f(unit);
        }
        self
    }

    /// Set the hostility between two factions.
    #[must_use]
    pub fn relation(mut self, a: u16, b: u16, value: i8) -> Self {
        self.state.set_relation(FactionId(a), FactionId(b), value);
        self
    }

    /// Finish as a bare state.
    #[must_use]
    pub fn build(self) -> GameState {
        self.state
    }

    /// Finish as a simulation with default config and open terrain.
    #[must_use]
    pub fn simulation(self) -> Simulation {
        Simulation::new(self.state)
    }
}

/// Two established factions facing each other across one degree of
/// latitude, each with a city, infantry and armor, and a neutral city
/// in between.
#[must_use]
pub fn skirmish_world() -> GameState {
    let mut builder = WorldBuilder::new()
        .faction(1, FactionKind::Player)
        .faction(2, FactionKind::Bot)
        .city(10, point(0, 0), 1)
        .city(11, point(1_000, 0), 2)
        .city(12, point(500, 0), 0);
    for i in 0..4u64 {
        let offset = i as i32 * 20;
        builder = builder
            .unit(100 + i, UnitClass::Infantry, 1, point(30, offset))
            .unit(200 + i, UnitClass::Tank, 1, point(40, offset))
            .unit(300 + i, UnitClass::Infantry, 2, point(970, offset))
            .unit(400 + i, UnitClass::Tank, 2, point(960, offset));
    }
    if let Some(faction) = builder.state.faction_mut(FactionId(2)) {
        faction.personality = Some(warfront_core::factions::Personality::Balanced);
    }
    builder.build()
}

/// A larger world for benchmarks: `per_side` tanks on each side closing on
/// one another.
#[must_use]
pub fn battle_world(per_side: u64) -> GameState {
    let mut builder = WorldBuilder::new()
        .faction(1, FactionKind::Player)
        .faction(2, FactionKind::Player)
        .city(10, point(-200, 0), 1)
        .city(11, point(200, 0), 2);
    for i in 0..per_side {
        let lng = (i % 20) as i32 * 10 - 100;
        let row = (i / 20) as i32 * 10;
        let south = point(-100 - row, lng);
        let north = point(100 + row, lng);
        builder = builder
            .unit(1_000 + i, UnitClass::Tank, 1, south)
            .with_unit(1_000 + i, |u| u.destination = Some(north))
            .unit(5_000 + i, UnitClass::Tank, 2, north)
            .with_unit(5_000 + i, |u| u.destination = Some(south));
    }
    builder.build()
}
