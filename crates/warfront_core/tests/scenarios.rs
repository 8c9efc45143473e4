//! End-to-end scenarios run through the full tick.

use warfront_core::actions::{ActionKind, ActionOutcome, RejectReason};
use warfront_core::ai::brain::{choose_production, ProductionInput};
use warfront_core::ai::{AiConfig, AiContext};
use warfront_core::components::{GameResult, TargetRef};
use warfront_core::factions::{FactionId, FactionKind, Personality};
use warfront_core::math::Fixed;
use warfront_core::replay::{Replay, ReplayPlayer};
use warfront_core::scenario::{ScenarioData, WorldGenerator};
use warfront_core::simulation::Simulation;
use warfront_core::unit_class::UnitClass;
use warfront_test_utils::determinism::HostRun;
use warfront_test_utils::fixtures::{action, point, skirmish_world, CoastlineTerrain, WorldBuilder};

#[test]
fn infantry_takes_an_undefended_city() {
    let mut sim = WorldBuilder::new()
        .faction(1, FactionKind::Player)
        .city(10, point(0, 0), 0)
        .unit(100, UnitClass::Infantry, 1, point(0, 0))
        .simulation();
    assert_eq!(sim.state().unit(100).map(|u| u.hp), Some(Fixed::from_num(120)));

    let mut captured = false;
    for tick in 0..1_000u64 {
        let events = sim.tick(Vec::new(), tick * 33, None);
        if let Some(capture) = events.captures.first() {
            assert_eq!(capture.to, FactionId(1));
            let city = sim.state().poi(10).expect("city");
            assert_eq!(city.owner, FactionId(1));
            assert_eq!(city.hp, city.max_hp / Fixed::from_num(2));
            captured = true;
            break;
        }
    }
    assert!(captured, "city never fell");
}

#[test]
fn units_in_range_fire_on_the_same_tick() {
    // Range 50 km, roughly 40 km apart.
    let long_gun = |u: &mut warfront_core::components::Unit| u.range = Fixed::from_num(50);
    let mut sim = WorldBuilder::new()
        .faction(1, FactionKind::Player)
        .faction(2, FactionKind::Player)
        .unit(1, UnitClass::Tank, 1, point(0, 0))
        .unit(2, UnitClass::Tank, 2, point(360, 0))
        .with_unit(1, long_gun)
        .with_unit(2, long_gun)
        .with_unit(1, |u| u.target = Some(TargetRef::Unit(2)))
        .with_unit(2, |u| u.target = Some(TargetRef::Unit(1)))
        .simulation();

    let events = sim.tick(Vec::new(), 0, None);
    let attackers: Vec<u64> = events.damage_events.iter().map(|d| d.attacker).collect();
    assert!(attackers.contains(&1));
    assert!(attackers.contains(&2));
    assert_eq!(sim.state().projectiles.active_count(), 2);
}

#[test]
fn broke_faction_cannot_spawn() {
    let mut sim = WorldBuilder::new()
        .faction(1, FactionKind::Player)
        .treasury(1, 0, 0)
        .city(10, point(0, 0), 1)
        .simulation();
    let spawn = action(
        1,
        1,
        ActionKind::SpawnUnit {
            unit_id: Some(1 << 40),
            class: UnitClass::Infantry,
            position: point(10, 0),
        },
    );
    let events = sim.tick(vec![spawn], 0, None);
    assert_eq!(events.outcomes[0].1, ActionOutcome::Rejected(RejectReason::Unaffordable));
    assert!(sim.state().units.is_empty());
    assert_eq!(sim.state().faction(FactionId(1)).map(|f| f.gold), Some(0));
}

#[test]
fn isolated_bot_without_infantry_builds_infantry() {
    let class = choose_production(&ProductionInput {
        gold: 5_000,
        oil: 1_000,
        personality: Personality::Aggressor,
        infantry: 0,
        capture_short: false,
        coastal: false,
        roll: 0,
    });
    assert_eq!(class, Some(UnitClass::Infantry));

    // Same situation through the whole host loop: the first production
    // order of a bot 500 km from any neutral city is infantry.
    let state = WorldBuilder::new()
        .faction(2, FactionKind::Bot)
        .city(11, point(0, 0), 2)
        .city(12, point(4_500, 0), 0)
        .build();
    let mut run = HostRun::new(state, 1);
    run.run(20);
    let units: Vec<UnitClass> = run.sim.state().units.iter().map(|u| u.class).collect();
    assert!(!units.is_empty(), "bot produced nothing");
    assert_eq!(units[0], UnitClass::Infantry);
}

#[test]
fn player_without_units_or_cities_is_defeated() {
    let mut sim = WorldBuilder::new()
        .faction(1, FactionKind::Player)
        .faction(2, FactionKind::Bot)
        .city(11, point(0, 0), 2)
        .simulation();
    sim.state_mut().local_faction = Some(FactionId(1));

    let interval = sim.config().victory_check_interval_ticks;
    let mut defeated = Vec::new();
    for tick in 0..=interval {
        defeated.extend(sim.tick(Vec::new(), tick * 33, None).defeated);
    }
    assert_eq!(defeated, vec![FactionId(1)]);
    assert_eq!(sim.state().result, GameResult::Defeat);
}

#[test]
fn naval_spawn_follows_the_coastline() {
    let mut sim = WorldBuilder::new()
        .faction(1, FactionKind::Player)
        .coastal_city(10, point(0, 0), 1)
        .simulation()
        .with_terrain(std::sync::Arc::new(CoastlineTerrain::equator()));

    let on_land = action(
        1,
        1,
        ActionKind::SpawnUnit {
            unit_id: Some(1 << 40),
            class: UnitClass::Destroyer,
            position: point(100, 0),
        },
    );
    let at_sea = action(
        2,
        1,
        ActionKind::SpawnUnit {
            unit_id: Some((1 << 40) + 1),
            class: UnitClass::Destroyer,
            position: point(-100, 0),
        },
    );
    let events = sim.tick(vec![on_land, at_sea], 0, None);
    assert_eq!(events.outcomes[0].1, ActionOutcome::Rejected(RejectReason::InvalidPlacement));
    assert_eq!(events.outcomes[1].1, ActionOutcome::Applied);
}

#[test]
fn recorded_skirmish_replays_exactly() {
    let mut sim = Simulation::new(skirmish_world());
    let mut ai = AiContext::new(21, AiConfig::default());
    let mut replay = Replay::new("skirmish", 21, &sim).expect("replay");
    for tick in 0..400u64 {
        let pending = if tick == 5 {
            vec![action(
                9,
                1,
                ActionKind::MoveUnits {
                    unit_ids: vec![200, 201, 202, 203],
                    destination: point(500, 0),
                    formation: None,
                    boost: false,
                },
            )]
        } else {
            Vec::new()
        };
        let events = sim.tick(pending.clone(), tick * 33, Some(&mut ai));
        replay.record_tick(tick, &pending, &events);
    }
    replay.finalize(sim.get_tick(), sim.state_hash());

    let mut player = ReplayPlayer::new(replay).expect("player");
    player.verify().expect("replay diverged");
}

#[test]
fn scenario_file_drives_a_game() {
    let text = r#"(
        name: "Channel",
        bounds: (min_lat: -3, max_lat: 3, min_lng: -3, max_lng: 3),
        pois: [
            (id: 1, kind: CITY, name: "West", at: (lat: 0, lng: -500000), tier: 1),
            (id: 2, kind: CITY, name: "East", at: (lat: 0, lng: 500000), tier: 1),
            (id: 3, kind: CITY, name: "Middle", at: (lat: 0, lng: 0)),
            (id: 4, kind: GOLD_MINE, name: "Mine", at: (lat: 200000, lng: 0)),
        ],
        factions: [
            (id: 1, name: "West", kind: BOT, cities: [1]),
            (id: 2, name: "East", kind: BOT, cities: [2]),
        ],
        guards: [(poi: 3, classes: [INFANTRY])],
    )"#;
    let world = ScenarioData::from_ron(text).expect("scenario");
    let state = world.generate(4, &Default::default()).expect("world");
    let mut run = HostRun::new(state, 4);
    run.run(600);

    let state = run.sim.state();
    assert!(state.units.iter().any(|u| u.owner == FactionId(1)));
    assert!(state.units.iter().any(|u| u.owner == FactionId(2)));
    assert!(state.pois.iter().all(|p| state.faction(p.owner).is_some()));
}
