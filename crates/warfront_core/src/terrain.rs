//! Interfaces to the external terrain and territory engines.
//!
//! The simulation only asks yes/no questions of the map. Until an oracle
//! reports ready, every question is answered permissively so that a
//! world can run before its coastline data has loaded.

use serde::{Deserialize, Serialize};

use crate::factions::FactionId;
use crate::math::GeoPoint;
use crate::unit_class::{UnitClass, UnitDomain};

/// Surface classification of a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Surface {
    /// Inland.
    Land,
    /// Open water.
    Ocean,
    /// Shoreline, reachable from both.
    Coast,
}

impl Surface {
    /// Whether a unit of `domain` may stand on this surface.
    #[must_use]
    pub const fn admits(self, domain: UnitDomain) -> bool {
        match domain {
            UnitDomain::Air => true,
            UnitDomain::Ground | UnitDomain::Structure => matches!(self, Self::Land | Self::Coast),
            UnitDomain::Naval => matches!(self, Self::Ocean | Self::Coast),
        }
    }
}

/// Extra facts a placement check may use.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlacementContext {
    /// Faction asking to place.
    pub faction: FactionId,
    /// Whether the placement is next to a coastal city.
    pub near_coastal_city: bool,
}

/// Land/ocean classification and movement validity.
pub trait TerrainOracle: Send + Sync {
    /// Whether terrain data is loaded.
    fn is_ready(&self) -> bool;

    /// Classify a coordinate.
    fn classify(&self, point: GeoPoint) -> Surface;

    /// Whether a unit of `class` may move onto `point`.
    fn is_valid_move(&self, class: UnitClass, point: GeoPoint) -> bool {
        !self.is_ready() || self.classify(point).admits(class.domain())
    }

    /// Whether a unit or structure of `class` may be placed at `point`.
    fn is_valid_placement(&self, class: UnitClass, point: GeoPoint, ctx: &PlacementContext) -> bool {
        if !self.is_ready() {
            return true;
        }
        let surface = self.classify(point);
        match class {
            UnitClass::Port => surface == Surface::Coast || ctx.near_coastal_city,
            _ => surface.admits(class.domain()),
        }
    }
}

/// Point-in-territory test for structure placement.
pub trait TerritoryOracle: Send + Sync {
    /// Whether `point` lies in `faction`'s territory.
    fn is_point_in_faction_territory(&self, point: GeoPoint, faction: FactionId) -> bool;
}

/// Terrain that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenTerrain;

impl TerrainOracle for OpenTerrain {
    fn is_ready(&self) -> bool {
        false
    }

    fn classify(&self, _point: GeoPoint) -> Surface {
        Surface::Coast
    }
}

/// Territory that is nobody's, so placement falls back to city proximity.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTerritory;

impl TerritoryOracle for NoTerritory {
    fn is_point_in_faction_territory(&self, _point: GeoPoint, _faction: FactionId) -> bool {
        false
    }
}
