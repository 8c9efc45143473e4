//! Target verification, acquisition and firing.
//!
//! Units are processed in ascending id order. Each one ticks its
//! cooldown, drops a target that is no longer valid, retaliates against
//! its last attacker if it has nothing better to do, looks for the
//! nearest hostile unit (then hostile POIs), and fires when the target
//! is inside weapon range.
//!
//! Damage lands immediately; the projectile spawned alongside is a
//! presentation record.

use serde::{Deserialize, Serialize};

use crate::capture::transfer_poi;
use crate::components::{AutoMode, PoiId, TargetRef, Unit, UnitId};
use crate::config::SimConfig;
use crate::factions::FactionId;
use crate::math::{Fixed, GeoPoint};
use crate::projectiles::Launch;
use crate::spatial::SpatialGrid;
use crate::state::GameState;

/// A shot that connected this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageEvent {
    /// Firing unit.
    pub attacker: UnitId,
    /// Struck entity.
    pub target: TargetRef,
    /// Damage dealt.
    #[serde(with = "crate::math::fixed_serde")]
    pub damage: Fixed,
}

/// A POI that changed hands this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureEvent {
    /// POI that changed hands.
    pub poi: PoiId,
    /// Previous owner.
    pub from: FactionId,
    /// New owner.
    pub to: FactionId,
}

/// Everything combat and capture report back to the tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombatEvents {
    /// Shots fired.
    pub damage: Vec<DamageEvent>,
    /// `(killer, victim)` pairs.
    pub kills: Vec<(UnitId, UnitId)>,
    /// Ownership changes.
    pub captures: Vec<CaptureEvent>,
}

/// Whether `unit` may keep or pick `target` as its objective.
fn is_valid_target(state: &GameState, unit: &Unit, target: TargetRef, config: &SimConfig) -> bool {
    match target {
        TargetRef::Unit(id) => state.units.get(id).is_some_and(|victim| {
            victim.is_alive()
                && state.is_hostile(unit.owner, victim.owner, config)
                && unit.weapon().can_target(victim.class.domain())
                && within_leash(unit, victim.position, config)
        }),
        TargetRef::Poi(id) => state.pois.get(id).is_some_and(|poi| {
            unit.guard_poi != Some(id)
                && state.is_hostile(unit.owner, poi.owner, config)
                && unit.weapon().can_target_poi(poi.is_offshore())
        }),
    }
}

/// Defensive units do not chase past their leash.
fn within_leash(unit: &Unit, point: GeoPoint, config: &SimConfig) -> bool {
    match unit.auto_mode {
        Some(AutoMode::Defend { anchor }) => anchor.within_km(point, config.defend_radius_km()),
        _ => true,
    }
}

fn target_position(state: &GameState, target: TargetRef) -> Option<GeoPoint> {
    match target {
        TargetRef::Unit(id) => state.units.get(id).map(|u| u.position),
        TargetRef::Poi(id) => state.pois.get(id).map(|p| p.position),
    }
}

/// Nearest hostile unit within `radius`, ties broken by lower id.
fn nearest_hostile_unit(
    state: &GameState,
    grid: &SpatialGrid,
    unit: &Unit,
    radius: Fixed,
    config: &SimConfig,
) -> Option<UnitId> {
    let units = state.units.as_slice();
    grid.query_radius(unit.position, radius)
        .into_iter()
        .filter_map(|index| units.get(index))
        .filter(|other| {
            other.id != unit.id && is_valid_target(state, unit, TargetRef::Unit(other.id), config)
        })
        .filter_map(|other| {
            let distance = unit.position.distance_km(other.position);
            (distance <= radius).then_some((distance, other.id))
        })
        .min()
        .map(|(_, id)| id)
}

/// Nearest hostile POI within `radius`, ties broken by lower id.
fn nearest_hostile_poi(state: &GameState, unit: &Unit, radius: Fixed, config: &SimConfig) -> Option<PoiId> {
    state
        .pois
        .iter()
        .filter(|poi| is_valid_target(state, unit, TargetRef::Poi(poi.id), config))
        .filter_map(|poi| {
            let distance = unit.position.distance_km(poi.position);
            (distance <= radius).then_some((distance, poi.id))
        })
        .min()
        .map(|(_, id)| id)
}

/// Decide what `unit` shoots at this tick and which target it keeps.
///
/// Returns `(kept_target, shot)`.
fn choose(
    state: &GameState,
    grid: &SpatialGrid,
    unit: &Unit,
    config: &SimConfig,
) -> (Option<TargetRef>, Option<TargetRef>) {
    let mut target = unit
        .target
        .filter(|t| is_valid_target(state, unit, *t, config));

    if unit.hold_fire {
        return (None, None);
    }

    let moving = unit.destination.is_some() && target.is_none();

    if target.is_none() && !moving {
        if let Some(attacker) = unit.last_attacker {
            let candidate = TargetRef::Unit(attacker);
            if is_valid_target(state, unit, candidate, config) {
                target = Some(candidate);
            }
        }
    }

    if target.is_some() {
        return (target, target);
    }

    let radius = match unit.auto_mode {
        Some(AutoMode::Aggressive) if !moving => unit.vision.max(unit.range),
        _ => unit.range,
    };
    if let Some(id) = nearest_hostile_unit(state, grid, unit, radius, config) {
        let found = TargetRef::Unit(id);
        return if moving { (None, Some(found)) } else { (Some(found), Some(found)) };
    }
    if moving {
        return (None, None);
    }
    match nearest_hostile_poi(state, unit, radius, config) {
        Some(id) => (Some(TargetRef::Poi(id)), Some(TargetRef::Poi(id))),
        None => (None, None),
    }
}

/// Grant veterancy ranks earned by the attacker's kill count.
fn promote(unit: &mut Unit, config: &SimConfig) {
    let rank = config
        .veterancy_thresholds
        .iter()
        .filter(|threshold| unit.kills >= **threshold)
        .count() as u8;
    let bonus = config.veterancy_bonus();
    while unit.veterancy < rank {
        unit.veterancy += 1;
        unit.max_hp += unit.max_hp * bonus;
        unit.hp = (unit.hp + unit.max_hp * bonus).min(unit.max_hp);
        unit.attack += unit.attack * bonus;
        tracing::debug!(unit = unit.id, rank = unit.veterancy, "unit promoted");
    }
}

/// Run combat for every living armed unit.
pub fn run_combat(state: &mut GameState, grid: &SpatialGrid, config: &SimConfig, events: &mut CombatEvents) {
    for index in 0..state.units.len() {
        let unit = &state.units.as_slice()[index];
        if !unit.is_alive() {
            continue;
        }
        let armed = unit.is_armed();
        let (kept, shot) = if armed {
            choose(state, grid, unit, config)
        } else {
            (None, None)
        };

        let unit = &mut state.units.as_mut_slice()[index];
        unit.cooldown = unit.cooldown.saturating_sub(1);
        if !armed {
            continue;
        }
        unit.target = kept;
        if kept.is_none() {
            unit.last_attacker = None;
        }
        if unit.cooldown > 0 {
            continue;
        }
        if let Some(shot) = shot {
            fire(state, index, shot, config, events);
        }
    }
}

/// Fire the weapon of the unit at `index` if `target` is inside range.
fn fire(state: &mut GameState, index: usize, target: TargetRef, config: &SimConfig, events: &mut CombatEvents) {
    let attacker = state.units.as_slice()[index].clone();
    let Some(to_pos) = target_position(state, target) else {
        return;
    };
    if !attacker.position.within_km(to_pos, attacker.range) {
        return;
    }

    let damage = config.shot_damage(attacker.attack);
    let weapon = attacker.weapon();
    state.projectiles.spawn(
        Launch {
            from_id: attacker.id,
            to: Some(target),
            from_pos: attacker.position,
            to_pos,
            weapon,
            payload: None,
        },
        Fixed::from_num(weapon.projectile_speed_permille()) / Fixed::from_num(1000),
    );
    state.units.as_mut_slice()[index].cooldown = attacker.class.stats().cooldown_ticks;
    events.damage.push(DamageEvent {
        attacker: attacker.id,
        target,
        damage,
    });

    match target {
        TargetRef::Unit(victim_id) => {
            let Some(victim) = state.units.get_mut(victim_id) else {
                return;
            };
            victim.take_damage(damage);
            victim.last_attacker = Some(attacker.id);
            if victim.is_alive() {
                return;
            }
            events.kills.push((attacker.id, victim_id));
            let shooter = &mut state.units.as_mut_slice()[index];
            shooter.kills += 1;
            shooter.target = None;
            promote(shooter, config);
        }
        TargetRef::Poi(poi_id) => {
            let tick = state.tick;
            let Some(poi) = state.pois.get_mut(poi_id) else {
                return;
            };
            poi.take_damage(damage);
            poi.last_damaged_tick = Some(tick);
            if poi.hp > Fixed::ZERO || !attacker.can_capture_poi(poi.kind) {
                return;
            }
            if let Some(event) = transfer_poi(state, poi_id, attacker.owner, config) {
                events.captures.push(event);
            }
            state.units.as_mut_slice()[index].target = None;
        }
    }
}
