//! Continuous siege capture and POI regeneration.

use std::collections::BTreeMap;

use crate::combat::{CaptureEvent, CombatEvents};
use crate::components::PoiId;
use crate::config::SimConfig;
use crate::factions::FactionId;
use crate::math::Fixed;
use crate::spatial::SpatialGrid;
use crate::state::GameState;

/// Hand a POI to `new_owner` at the post-capture hp.
///
/// Returns `None` if the POI does not exist or already belongs to
/// `new_owner`.
pub fn transfer_poi(
    state: &mut GameState,
    poi_id: PoiId,
    new_owner: FactionId,
    config: &SimConfig,
) -> Option<CaptureEvent> {
    let poi = state.pois.get_mut(poi_id)?;
    if poi.owner == new_owner {
        return None;
    }
    let previous = poi.owner;
    poi.owner = new_owner;
    poi.hp = poi.max_hp * config.capture_hp_fraction();
    let is_city = poi.is_city();
    let name = poi.name.clone();

    if is_city {
        if let Some(faction) = state.faction_mut(new_owner) {
            faction.established = true;
        }
    }
    let new_name = state
        .faction(new_owner)
        .map_or_else(|| new_owner.to_string(), |f| f.name.clone());
    state.push_message(format!("{new_name} captured {name}"), config.max_messages);
    tracing::info!(poi = poi_id, from = %previous, to = %new_owner, "POI captured");

    Some(CaptureEvent {
        poi: poi_id,
        from: previous,
        to: new_owner,
    })
}

/// Apply siege damage from capture-eligible hostiles around every POI,
/// transfer POIs that reach zero, and regenerate the untouched ones.
pub fn run_capture(state: &mut GameState, grid: &SpatialGrid, config: &SimConfig, events: &mut CombatEvents) {
    let radius = config.capture_radius_km();
    let tick = state.tick;

    for index in 0..state.pois.len() {
        let poi = &state.pois.as_slice()[index];
        let units = state.units.as_slice();

        let mut besiegers: BTreeMap<FactionId, u32> = BTreeMap::new();
        let mut contested = false;
        for unit_index in grid.query_radius(poi.position, radius) {
            let Some(unit) = units.get(unit_index) else {
                continue;
            };
            if !unit.is_alive() || !poi.position.within_km(unit.position, radius) {
                continue;
            }
            if unit.owner == poi.owner || unit.guard_poi == Some(poi.id) {
                contested = true;
                continue;
            }
            if unit.can_capture_poi(poi.kind) && state.is_hostile(unit.owner, poi.owner, config) {
                *besiegers.entry(unit.owner).or_default() += 1;
            }
        }

        let poi_id = poi.id;
        let shot_this_tick = poi.last_damaged_tick == Some(tick);
        let siegers: u32 = besiegers.values().sum();

        if siegers == 0 || contested {
            if !shot_this_tick && siegers == 0 {
                state.pois.as_mut_slice()[index].repair(config.poi_regen_per_tick());
            }
            continue;
        }

        let poi = &mut state.pois.as_mut_slice()[index];
        poi.take_damage(config.siege_damage_per_unit() * Fixed::from_num(siegers));
        if poi.hp > Fixed::ZERO {
            continue;
        }

        let mut winner = None;
        let mut best = 0;
        for (faction, count) in &besiegers {
            if *count > best {
                best = *count;
                winner = Some(*faction);
            }
        }
        if let Some(winner) = winner {
            if let Some(event) = transfer_poi(state, poi_id, winner, config) {
                events.captures.push(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Poi, PoiKind, Unit};
    use crate::factions::{Faction, FactionKind};
    use crate::math::{ratio, Fixed, GeoBounds, GeoPoint};
    use crate::unit_class::UnitClass;

    fn point(lat_milli: i32, lng_milli: i32) -> GeoPoint {
        GeoPoint::new(ratio(lat_milli, 1000), ratio(lng_milli, 1000))
    }

    fn world() -> (GameState, SpatialGrid, SimConfig) {
        let bounds = GeoBounds::from_degrees(-10, 10, -10, 10);
        let config = SimConfig::default();
        let grid = SpatialGrid::new(config.cell_size_km(), &bounds);
        let mut state = GameState::new(bounds);
        for id in 1..=3 {
            state
                .factions
                .insert(Faction::new(FactionId(id), format!("F{id}"), FactionKind::Bot));
        }
        (state, grid, config)
    }

    fn step(state: &mut GameState, grid: &mut SpatialGrid, config: &SimConfig) -> CombatEvents {
        let mut events = CombatEvents::default();
        grid.rebuild(state.units.as_slice());
        run_capture(state, grid, config, &mut events);
        state.tick += 1;
        events
    }

    fn weak_city(state: &mut GameState, owner: FactionId) {
        let mut city = Poi::new(100, PoiKind::City, "Arles", point(0, 0), 3);
        city.owner = owner;
        city.hp = Fixed::from_num(2);
        state.pois.insert(city);
    }

    #[test]
    fn test_siege_transfers_to_largest_besieger() {
        let (mut state, mut grid, config) = world();
        weak_city(&mut state, FactionId::NEUTRAL);
        state.units.insert(Unit::new(1, UnitClass::Infantry, FactionId(2), point(0, 10)));
        state.units.insert(Unit::new(2, UnitClass::Infantry, FactionId(3), point(0, 10)));
        state.units.insert(Unit::new(3, UnitClass::Infantry, FactionId(3), point(0, 10)));

        let events = step(&mut state, &mut grid, &config);
        assert_eq!(events.captures.len(), 1);
        let city = state.pois.get(100).unwrap();
        assert_eq!(city.owner, FactionId(3));
        assert_eq!(city.hp, Fixed::from_num(200));
        assert!(state.faction(FactionId(3)).unwrap().established);
    }

    #[test]
    fn test_tie_goes_to_lowest_faction_id() {
        let (mut state, mut grid, config) = world();
        weak_city(&mut state, FactionId::NEUTRAL);
        state.units.insert(Unit::new(1, UnitClass::Infantry, FactionId(3), point(0, 10)));
        state.units.insert(Unit::new(2, UnitClass::Infantry, FactionId(2), point(0, 10)));
        step(&mut state, &mut grid, &config);
        assert_eq!(state.pois.get(100).unwrap().owner, FactionId(2));
    }

    #[test]
    fn test_defender_presence_blocks_siege() {
        let (mut state, mut grid, config) = world();
        weak_city(&mut state, FactionId(1));
        state.units.insert(Unit::new(1, UnitClass::Infantry, FactionId(2), point(0, 10)));
        state.units.insert(Unit::new(2, UnitClass::Tank, FactionId(1), point(0, 20)));
        step(&mut state, &mut grid, &config);
        let city = state.pois.get(100).unwrap();
        assert_eq!(city.owner, FactionId(1));
        assert_eq!(city.hp, Fixed::from_num(2));
    }

    #[test]
    fn test_bound_guard_contests_siege_without_regen() {
        let (mut state, mut grid, config) = world();
        weak_city(&mut state, FactionId::NEUTRAL);
        state.units.insert(Unit::new(1, UnitClass::Infantry, FactionId(2), point(0, 10)));
        let mut guard = Unit::new(2, UnitClass::Tank, FactionId(3), point(0, 30));
        guard.guard_poi = Some(100);
        state.units.insert(guard);
        for _ in 0..5 {
            step(&mut state, &mut grid, &config);
        }
        let city = state.pois.get(100).unwrap();
        assert_eq!(city.owner, FactionId::NEUTRAL);
        assert_eq!(city.hp, Fixed::from_num(2));
    }

    #[test]
    fn test_tanks_do_not_siege() {
        let (mut state, mut grid, config) = world();
        weak_city(&mut state, FactionId::NEUTRAL);
        state.units.insert(Unit::new(1, UnitClass::Tank, FactionId(2), point(0, 10)));
        step(&mut state, &mut grid, &config);
        let city = state.pois.get(100).unwrap();
        assert_eq!(city.owner, FactionId::NEUTRAL);
        assert!(city.hp > Fixed::from_num(2));
    }

    #[test]
    fn test_untouched_poi_regenerates_but_shot_poi_does_not() {
        let (mut state, mut grid, config) = world();
        weak_city(&mut state, FactionId::NEUTRAL);
        step(&mut state, &mut grid, &config);
        let healed = state.pois.get(100).unwrap().hp;
        assert_eq!(healed, Fixed::from_num(2) + config.poi_regen_per_tick());

        let tick = state.tick;
        state.pois.get_mut(100).unwrap().last_damaged_tick = Some(tick);
        step(&mut state, &mut grid, &config);
        assert_eq!(state.pois.get(100).unwrap().hp, healed);
    }
}
