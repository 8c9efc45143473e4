//! Property tests over whole ticks.

use std::collections::BTreeSet;

use proptest::prelude::*;
use warfront_core::actions::{ActionOutcome, GameAction};
use warfront_core::components::{TargetRef, Unit};
use warfront_core::config::SimConfig;
use warfront_core::math::{Fixed, GeoBounds, GeoPoint};
use warfront_core::simulation::{Simulation, TickEvents};
use warfront_core::spatial::SpatialGrid;
use warfront_core::state::GameState;
use warfront_core::unit_class::UnitClass;
use warfront_test_utils::determinism::strategies::{arb_action_stream, arb_point};
use warfront_test_utils::fixtures::{battle_world, skirmish_world};

fn unit_ids(state: &GameState) -> Vec<u64> {
    state.units.ids()
}

fn run_stream(mut sim: Simulation, actions: &[GameAction], ticks: u64) -> (Simulation, Vec<TickEvents>) {
    let mut log = Vec::new();
    for tick in 0..ticks {
        let pending: Vec<GameAction> = actions
            .iter()
            .enumerate()
            .filter(|(i, _)| *i as u64 % ticks.max(1) == tick)
            .map(|(_, a)| a.clone())
            .collect();
        log.push(sim.tick(pending, tick * 33, None));
    }
    (sim, log)
}

fn assert_conserved(state: &GameState) {
    for unit in state.units.iter() {
        assert!(unit.hp > Fixed::ZERO, "unit {} present with hp {}", unit.id, unit.hp);
        assert!(unit.hp <= unit.max_hp, "unit {} over max hp", unit.id);
    }
}

fn assert_single_owner(state: &GameState) {
    for poi in state.pois.iter() {
        assert!(
            state.faction(poi.owner).is_some(),
            "POI {} owned by unknown faction {}",
            poi.id,
            poi.owner
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_conservation_and_ownership(actions in arb_action_stream(unit_ids(&skirmish_world()), 30)) {
        let mut sim = Simulation::new(skirmish_world());
        for tick in 0..120u64 {
            let pending = if tick < actions.len() as u64 {
                vec![actions[tick as usize].clone()]
            } else {
                Vec::new()
            };
            sim.tick(pending, tick * 33, None);
            assert_conserved(sim.state());
            assert_single_owner(sim.state());
        }
    }

    #[test]
    fn prop_reapplying_actions_changes_nothing(actions in arb_action_stream(unit_ids(&skirmish_world()), 20)) {
        let mut sim = Simulation::new(skirmish_world());
        for action in &actions {
            sim.apply_action(action);
        }
        let after_first = sim.state().clone();
        for action in &actions {
            prop_assert_eq!(sim.apply_action(action), ActionOutcome::Duplicate);
        }
        prop_assert_eq!(sim.state(), &after_first);
    }

    #[test]
    fn prop_identical_inputs_give_identical_states(actions in arb_action_stream(unit_ids(&skirmish_world()), 20)) {
        let (a, _) = run_stream(Simulation::new(skirmish_world()), &actions, 60);
        let (b, _) = run_stream(Simulation::new(skirmish_world()), &actions, 60);
        prop_assert_eq!(a.state(), b.state());
        prop_assert_eq!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn prop_grid_query_matches_brute_force(
        points in proptest::collection::vec(arb_point(), 1..200),
        center in arb_point(),
        radius_permille in 1u32..=1000,
    ) {
        let config = SimConfig::default();
        let bounds = GeoBounds::from_degrees(-3, 3, -3, 3);
        let mut grid = SpatialGrid::new(config.cell_size_km(), &bounds);
        let units: Vec<Unit> = points
            .iter()
            .enumerate()
            .map(|(i, p)| Unit::new(i as u64 + 1, UnitClass::Infantry, warfront_core::factions::FactionId(1), *p))
            .collect();
        grid.rebuild(&units);

        let radius = config.cell_size_km() * Fixed::from_num(radius_permille) / Fixed::from_num(1000);
        let from_grid: BTreeSet<usize> = grid
            .query(center)
            .into_iter()
            .filter(|i| center.within_km(units[*i].position, radius))
            .collect();
        let brute: BTreeSet<usize> = units
            .iter()
            .enumerate()
            .filter(|(_, u)| center.within_km(u.position, radius))
            .map(|(i, _)| i)
            .collect();
        prop_assert_eq!(from_grid, brute);
    }
}

fn target_position(state: &GameState, target: TargetRef) -> Option<GeoPoint> {
    match target {
        TargetRef::Unit(id) => state.unit(id).map(|u| u.position),
        TargetRef::Poi(id) => state.poi(id).map(|p| p.position),
    }
}

#[test]
fn no_shot_lands_beyond_range() {
    let mut sim = Simulation::new(battle_world(60));
    let mut shots = 0;
    for tick in 0..600u64 {
        let events = sim.tick(Vec::new(), tick * 33, None);
        for damage in &events.damage_events {
            let Some(attacker) = sim.state().unit(damage.attacker) else {
                continue;
            };
            let Some(at) = target_position(sim.state(), damage.target) else {
                continue;
            };
            shots += 1;
            assert!(
                attacker.position.distance_km(at) <= attacker.range,
                "unit {} fired beyond range",
                attacker.id
            );
        }
    }
    assert!(shots > 0, "battle produced no shots");
}

#[test]
fn battle_keeps_invariants_to_the_end() {
    let mut sim = Simulation::new(battle_world(40));
    for tick in 0..900u64 {
        sim.tick(Vec::new(), tick * 33, None);
        assert_conserved(sim.state());
        assert_single_owner(sim.state());
    }
}
