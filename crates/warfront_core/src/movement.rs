//! Movement and steering.
//!
//! Every mobile unit resolves where it wants to go, blends that heading
//! with separation and obstacle-avoidance forces, and takes one step.
//! All units read the positions from the start of the pass, and results
//! are written back afterwards, so processing order cannot leak into
//! positions.

use crate::components::{AutoMode, TargetRef, Unit};
use crate::config::SimConfig;
use crate::math::{Fixed, GeoPoint, Vec2Fixed};
use crate::spatial::SpatialGrid;
use crate::state::GameState;
use crate::terrain::TerrainOracle;

/// Where a unit is heading this tick, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Goal {
    /// Nothing to do.
    Hold,
    /// Inside weapon range of the pursued target; face it.
    Face(GeoPoint),
    /// Chasing the pursued target.
    Pursue(GeoPoint),
    /// Walking to the ordered destination.
    Destination(GeoPoint),
    /// Walking back to the defensive anchor.
    Anchor(GeoPoint),
}

#[derive(Debug, Clone, Copy)]
struct Step {
    position: GeoPoint,
    heading: Fixed,
    destination: Option<GeoPoint>,
    target: Option<TargetRef>,
    boosted: bool,
}

fn target_position(state: &GameState, target: TargetRef) -> Option<GeoPoint> {
    match target {
        TargetRef::Unit(id) => state.units.get(id).filter(|u| u.is_alive()).map(|u| u.position),
        TargetRef::Poi(id) => state.pois.get(id).map(|p| p.position),
    }
}

fn resolve_goal(state: &GameState, unit: &Unit, config: &SimConfig) -> Goal {
    if let Some(target) = unit.target {
        if let Some(position) = target_position(state, target) {
            let stop_at = unit.range * config.pursue_range_fraction();
            return if unit.position.within_km(position, stop_at) {
                Goal::Face(position)
            } else {
                Goal::Pursue(position)
            };
        }
    }
    if let Some(destination) = unit.destination {
        return Goal::Destination(destination);
    }
    if let Some(AutoMode::Defend { anchor }) = unit.auto_mode {
        if !unit.position.within_km(anchor, config.lookahead_km()) {
            return Goal::Anchor(anchor);
        }
    }
    Goal::Hold
}

/// Inverse-distance push away from close neighbors.
fn separation(units: &[Unit], index: usize, neighbors: &[usize], config: &SimConfig) -> Vec2Fixed {
    let me = &units[index];
    let radius = config.separation_radius_km();
    let dead_zone = config.separation_dead_zone_km();
    let mut push = Vec2Fixed::ZERO;
    for &other in neighbors {
        if other == index || units[other].class.domain() != me.class.domain() {
            continue;
        }
        let away = units[other].position.delta_km(me.position);
        let distance = away.length();
        if distance <= dead_zone || distance >= radius {
            continue;
        }
        push = push + away.normalize().scale(radius / distance - Fixed::ONE);
    }
    push
}

fn plan_step(
    state: &GameState,
    index: usize,
    grid: &SpatialGrid,
    terrain: &dyn TerrainOracle,
    config: &SimConfig,
) -> Step {
    let units = state.units.as_slice();
    let unit = &units[index];
    let mut step = Step {
        position: unit.position,
        heading: unit.heading,
        destination: unit.destination,
        target: unit.target,
        boosted: unit.boosted,
    };

    let goal = resolve_goal(state, unit, config);
    let (desired, explicit) = match goal {
        Goal::Hold => return step,
        Goal::Face(position) => {
            step.heading = unit.position.bearing_to(position);
            step.destination = None;
            return step;
        }
        Goal::Pursue(position) | Goal::Anchor(position) => (position, false),
        Goal::Destination(position) => (position, true),
    };

    let travel = if unit.boosted {
        unit.speed * Fixed::from_num(2)
    } else {
        unit.speed
    };
    let to_goal = unit.position.delta_km(desired);
    let remaining = to_goal.length();

    let proposed = if remaining <= travel || remaining <= config.arrival_epsilon_km() {
        desired
    } else {
        let direction = to_goal.normalize();
        let mut steering = separation(units, index, &grid.query(unit.position), config);

        let probe = unit.position.offset_km(direction.scale(config.lookahead_km()));
        if !terrain.is_valid_move(unit.class, probe) {
            steering = steering + direction.perp_left();
        }
        steering = steering.clamp_length(config.max_steering());

        let mut blended = (direction + steering).normalize();
        if blended.is_zero() {
            blended = direction;
        }
        step.heading = blended.bearing_deg();
        unit.position.offset_km(blended.scale(travel))
    };

    if !state.bounds.contains(proposed) || !terrain.is_valid_move(unit.class, proposed) {
        tracing::debug!(unit = unit.id, "movement rejected by bounds or terrain");
        step.destination = None;
        step.target = None;
        step.boosted = false;
        return step;
    }

    step.position = proposed;
    if proposed == desired && explicit {
        step.destination = None;
        step.boosted = false;
    }
    step
}

/// Advance every mobile unit by one tick.
pub fn run_movement(
    state: &mut GameState,
    grid: &SpatialGrid,
    terrain: &dyn TerrainOracle,
    config: &SimConfig,
) {
    let steps: Vec<(usize, Step)> = state
        .units
        .iter()
        .enumerate()
        .filter(|(_, unit)| unit.is_alive() && unit.class.is_mobile())
        .map(|(index, _)| (index, plan_step(state, index, grid, terrain, config)))
        .collect();

    let units = state.units.as_mut_slice();
    for (index, step) in steps {
        let unit = &mut units[index];
        unit.position = step.position;
        unit.heading = step.heading;
        unit.destination = step.destination;
        unit.target = step.target;
        unit.boosted = step.boosted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factions::FactionId;
    use crate::math::{ratio, GeoBounds};
    use crate::terrain::{OpenTerrain, Surface};
    use crate::unit_class::UnitClass;

    fn point(lat_milli: i32, lng_milli: i32) -> GeoPoint {
        GeoPoint::new(ratio(lat_milli, 1000), ratio(lng_milli, 1000))
    }

    fn world() -> (GameState, SpatialGrid, SimConfig) {
        let bounds = GeoBounds::from_degrees(-10, 10, -10, 10);
        let config = SimConfig::default();
        let grid = SpatialGrid::new(config.cell_size_km(), &bounds);
        (GameState::new(bounds), grid, config)
    }

    fn tick(state: &mut GameState, grid: &mut SpatialGrid, config: &SimConfig, terrain: &dyn TerrainOracle) {
        grid.rebuild(state.units.as_slice());
        run_movement(state, grid, terrain, config);
    }

    struct NorthIsWater;

    impl TerrainOracle for NorthIsWater {
        fn is_ready(&self) -> bool {
            true
        }

        fn classify(&self, point: GeoPoint) -> Surface {
            if point.lat > Fixed::ZERO {
                Surface::Ocean
            } else {
                Surface::Land
            }
        }
    }

    #[test]
    fn test_unit_reaches_destination_and_stops() {
        let (mut state, mut grid, config) = world();
        let mut unit = Unit::new(1, UnitClass::Tank, FactionId(1), point(0, 0));
        unit.destination = Some(point(0, 9));
        state.units.insert(unit);

        for _ in 0..100 {
            tick(&mut state, &mut grid, &config, &OpenTerrain);
        }
        let unit = state.units.get(1).unwrap();
        assert_eq!(unit.position, point(0, 9));
        assert!(unit.destination.is_none());
    }

    #[test]
    fn test_step_length_matches_speed() {
        let (mut state, mut grid, config) = world();
        let mut unit = Unit::new(1, UnitClass::Tank, FactionId(1), point(0, 0));
        unit.destination = Some(point(0, 1_000));
        state.units.insert(unit);
        tick(&mut state, &mut grid, &config, &OpenTerrain);
        let moved = point(0, 0).distance_km(state.units.get(1).unwrap().position);
        assert!((moved - UnitClass::Tank.speed_km()).abs() < ratio(1, 1000));
    }

    #[test]
    fn test_boost_doubles_speed() {
        let (mut state, mut grid, config) = world();
        let mut unit = Unit::new(1, UnitClass::Tank, FactionId(1), point(0, 0));
        unit.destination = Some(point(0, 1_000));
        unit.boosted = true;
        state.units.insert(unit);
        tick(&mut state, &mut grid, &config, &OpenTerrain);
        let moved = point(0, 0).distance_km(state.units.get(1).unwrap().position);
        assert!((moved - UnitClass::Tank.speed_km() * Fixed::from_num(2)).abs() < ratio(1, 1000));
    }

    #[test]
    fn test_out_of_bounds_clears_destination() {
        let (mut state, mut grid, config) = world();
        let mut unit = Unit::new(1, UnitClass::Tank, FactionId(1), point(0, 10_000));
        unit.destination = Some(point(0, 12_000));
        state.units.insert(unit);
        tick(&mut state, &mut grid, &config, &OpenTerrain);
        let unit = state.units.get(1).unwrap();
        assert_eq!(unit.position, point(0, 10_000));
        assert!(unit.destination.is_none());
    }

    #[test]
    fn test_ground_unit_stops_at_shoreline() {
        let (mut state, mut grid, config) = world();
        let mut unit = Unit::new(1, UnitClass::Tank, FactionId(1), point(-1, 0));
        unit.destination = Some(point(500, 0));
        state.units.insert(unit);
        for _ in 0..50 {
            tick(&mut state, &mut grid, &config, &NorthIsWater);
        }
        let unit = state.units.get(1).unwrap();
        assert!(unit.position.lat <= Fixed::ZERO);
        assert!(unit.destination.is_none());
    }

    #[test]
    fn test_pursuer_stops_inside_range() {
        let (mut state, mut grid, config) = world();
        let mut hunter = Unit::new(1, UnitClass::Tank, FactionId(1), point(0, 0));
        hunter.target = Some(TargetRef::Unit(2));
        state.units.insert(hunter);
        state.units.insert(Unit::new(2, UnitClass::Infantry, FactionId(2), point(0, 100)));

        for _ in 0..200 {
            tick(&mut state, &mut grid, &config, &OpenTerrain);
        }
        let hunter = state.units.get(1).unwrap();
        let gap = hunter.position.distance_km(point(0, 100));
        assert!(gap <= UnitClass::Tank.range_km());
        assert!(gap > ratio(4, 1));
        assert_eq!(hunter.target, Some(TargetRef::Unit(2)));
    }

    #[test]
    fn test_separation_pushes_overlapping_units_apart() {
        let (mut state, mut grid, config) = world();
        for id in [1, 2] {
            let offset = if id == 1 { 0 } else { 2 };
            let mut unit = Unit::new(id, UnitClass::Infantry, FactionId(1), point(0, offset));
            unit.destination = Some(point(1_000, offset));
            state.units.insert(unit);
        }
        let before = point(0, 0).distance_km(point(0, 2));
        for _ in 0..5 {
            tick(&mut state, &mut grid, &config, &OpenTerrain);
        }
        let a = state.units.get(1).unwrap().position;
        let b = state.units.get(2).unwrap().position;
        assert!(a.distance_km(b) > before);
    }

    #[test]
    fn test_defender_returns_to_anchor() {
        let (mut state, mut grid, config) = world();
        let mut unit = Unit::new(1, UnitClass::Infantry, FactionId(1), point(0, 50));
        unit.auto_mode = Some(AutoMode::Defend { anchor: point(0, 0) });
        state.units.insert(unit);
        for _ in 0..300 {
            tick(&mut state, &mut grid, &config, &OpenTerrain);
        }
        let unit = state.units.get(1).unwrap();
        assert!(unit.position.within_km(point(0, 0), config.lookahead_km()));
    }

    #[test]
    fn test_structures_never_move() {
        let (mut state, mut grid, config) = world();
        let mut base = Unit::new(1, UnitClass::MilitaryBase, FactionId(1), point(0, 0));
        base.destination = Some(point(0, 50));
        state.units.insert(base);
        tick(&mut state, &mut grid, &config, &OpenTerrain);
        assert_eq!(state.units.get(1).unwrap().position, point(0, 0));
    }
}
