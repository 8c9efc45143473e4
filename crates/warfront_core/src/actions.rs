//! Player and bot commands, and the resolver that applies them.
//!
//! Every state change that does not come from the simulation itself
//! arrives as a [`GameAction`]. The same resolver runs on every peer, so
//! an action applied locally and the copy received over the network
//! produce the same result. Bad actions never fail loudly: they come back
//! as [`ActionOutcome::Rejected`] and leave the state untouched.

use serde::{Deserialize, Serialize};

use crate::components::{AutoMode, Formation, Payload, PoiId, PoiKind, TargetRef, Unit, UnitId};
use crate::config::SimConfig;
use crate::factions::{Faction, FactionId, FactionKind};
use crate::math::{Fixed, GeoPoint, Vec2Fixed};
use crate::projectiles::Launch;
use crate::state::GameState;
use crate::terrain::{PlacementContext, TerrainOracle, TerritoryOracle};
use crate::unit_class::{UnitClass, WeaponType};

/// A command issued by a player or bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameAction {
    /// Dedup id, unique per action.
    pub id: u64,
    /// Faction issuing the command.
    pub actor: FactionId,
    /// Wall-clock time at the issuer, informational.
    pub timestamp_ms: u64,
    /// What to do.
    pub payload: ActionKind,
}

impl GameAction {
    /// Create an action.
    #[must_use]
    pub fn new(id: u64, actor: FactionId, timestamp_ms: u64, payload: ActionKind) -> Self {
        Self {
            id,
            actor,
            timestamp_ms,
            payload,
        }
    }
}

/// Typed action payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Produce a mobile unit near an owned city or structure.
    SpawnUnit {
        /// Id chosen by the sender; minted by the engine when absent.
        unit_id: Option<UnitId>,
        /// Class to produce.
        class: UnitClass,
        /// Spawn point.
        position: GeoPoint,
    },
    /// Send owned units somewhere.
    MoveUnits {
        /// Units to move.
        unit_ids: Vec<UnitId>,
        /// Group destination.
        destination: GeoPoint,
        /// Arrangement around the destination.
        #[serde(default)]
        formation: Option<Formation>,
        /// Double speed until arrival.
        #[serde(default)]
        boost: bool,
    },
    /// Order owned units to attack.
    SetTarget {
        /// Attackers.
        unit_ids: Vec<UnitId>,
        /// Victim.
        target: TargetRef,
    },
    /// Place a structure.
    BuildStructure {
        /// Id chosen by the sender; minted by the engine when absent.
        unit_id: Option<UnitId>,
        /// Structure class.
        class: UnitClass,
        /// Placement point.
        position: GeoPoint,
    },
    /// Take a neutral city as a starting base.
    SelectStartingBase {
        /// City to take.
        poi_id: PoiId,
        /// Faction name, used if the faction is new.
        name: String,
        /// Faction color, used if the faction is new.
        color: String,
    },
    /// Pay to take a neutral oil rig or gold mine.
    ClaimPoi {
        /// POI to claim.
        poi_id: PoiId,
    },
    /// Fire a strategic missile from a silo.
    LaunchMissile {
        /// Launching silo.
        silo_id: UnitId,
        /// Aim point.
        target: GeoPoint,
    },
    /// Change standing behavior.
    SetAutoMode {
        /// Units to change.
        unit_ids: Vec<UnitId>,
        /// New behavior, `None` to clear.
        mode: Option<AutoMode>,
    },
    /// Rearrange units around their shared destination.
    SetFormation {
        /// Units to arrange.
        unit_ids: Vec<UnitId>,
        /// Arrangement.
        formation: Formation,
    },
    /// Stop and hold fire.
    HoldPosition {
        /// Units to stop.
        unit_ids: Vec<UnitId>,
    },
    /// Free reinforcement wave for a bot faction, sent at a POI.
    SpawnWave {
        /// One id per class; the host fills them before broadcasting.
        unit_ids: Vec<UnitId>,
        /// Classes to spawn.
        classes: Vec<UnitClass>,
        /// Muster point near one of the actor's cities.
        position: GeoPoint,
        /// POI the wave marches on.
        objective: PoiId,
    },
    /// Any action type this build does not know.
    #[serde(other)]
    Unknown,
}

/// Why an action changed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// The actor faction does not exist or is defeated.
    UnknownFaction,
    /// A referenced unit or POI does not exist.
    InvalidReference,
    /// The actor does not own what it tried to command.
    Unauthorized,
    /// The actor cannot pay.
    Unaffordable,
    /// Terrain, territory or proximity rejected the position.
    InvalidPlacement,
    /// The position is outside the scenario bounds.
    OutOfBounds,
    /// The class cannot be spawned this way.
    WrongClass,
    /// The requested id already exists.
    IdInUse,
    /// The POI is already owned, or the actor already has a base.
    AlreadyClaimed,
    /// The silo is reloading.
    OnCooldown,
    /// The action type is not recognised.
    UnknownAction,
}

/// Result of resolving one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    /// The action changed the state.
    Applied,
    /// The dedup id was seen before.
    Duplicate,
    /// The action was dropped.
    Rejected(RejectReason),
}

type Resolution = std::result::Result<(), RejectReason>;

/// Applies actions to a state.
pub struct Resolver<'a> {
    /// Simulation constants.
    pub config: &'a SimConfig,
    /// Placement and movement validity.
    pub terrain: &'a dyn TerrainOracle,
    /// Faction territory.
    pub territory: &'a dyn TerritoryOracle,
}

impl Resolver<'_> {
    /// Apply one action at most once per dedup id.
    pub fn apply(&self, state: &mut GameState, action: &GameAction) -> ActionOutcome {
        if state.was_applied(action.id) {
            return ActionOutcome::Duplicate;
        }
        state.record_applied(action.id);

        let result = self.resolve(state, action);
        let outcome = match result {
            Ok(()) => ActionOutcome::Applied,
            Err(reason) => ActionOutcome::Rejected(reason),
        };
        tracing::debug!(action = action.id, actor = %action.actor, ?outcome, "action resolved");
        outcome
    }

    fn resolve(&self, state: &mut GameState, action: &GameAction) -> Resolution {
        let actor = action.actor;
        if let ActionKind::SelectStartingBase { poi_id, name, color } = &action.payload {
            return self.select_starting_base(state, actor, *poi_id, name, color);
        }
        if matches!(action.payload, ActionKind::Unknown) {
            return Err(RejectReason::UnknownAction);
        }
        if !state.faction(actor).is_some_and(|f| !f.defeated) {
            return Err(RejectReason::UnknownFaction);
        }

        match &action.payload {
            ActionKind::SpawnUnit {
                unit_id,
                class,
                position,
            } => self.spawn_unit(state, actor, *unit_id, *class, *position),
            ActionKind::MoveUnits {
                unit_ids,
                destination,
                formation,
                boost,
            } => self.move_units(state, actor, unit_ids, *destination, *formation, *boost),
            ActionKind::SetTarget { unit_ids, target } => self.set_target(state, actor, unit_ids, *target),
            ActionKind::BuildStructure {
                unit_id,
                class,
                position,
            } => self.build_structure(state, actor, *unit_id, *class, *position),
            ActionKind::ClaimPoi { poi_id } => self.claim_poi(state, actor, *poi_id),
            ActionKind::LaunchMissile { silo_id, target } => self.launch_missile(state, actor, *silo_id, *target),
            ActionKind::SetAutoMode { unit_ids, mode } => for_owned(state, actor, unit_ids, |unit| {
                unit.auto_mode = *mode;
            }),
            ActionKind::SetFormation { unit_ids, formation } => self.set_formation(state, actor, unit_ids, *formation),
            ActionKind::HoldPosition { unit_ids } => for_owned(state, actor, unit_ids, |unit| {
                unit.stop();
                unit.hold_fire = true;
            }),
            ActionKind::SpawnWave {
                unit_ids,
                classes,
                position,
                objective,
            } => self.spawn_wave(state, actor, unit_ids, classes, *position, *objective),
            ActionKind::SelectStartingBase { .. } | ActionKind::Unknown => Err(RejectReason::UnknownAction),
        }
    }

    fn spawn_unit(
        &self,
        state: &mut GameState,
        actor: FactionId,
        unit_id: Option<UnitId>,
        class: UnitClass,
        position: GeoPoint,
    ) -> Resolution {
        if !class.is_mobile() {
            return Err(RejectReason::WrongClass);
        }
        let radius = self.config.spawn_radius_km();
        let near_coastal = near_owned_coastal_city(state, actor, position, radius);
        let near_base = near_owned_city(state, actor, position, radius)
            || state.units.iter().any(|u| {
                u.owner == actor && u.class.is_structure() && u.position.within_km(position, radius)
            });
        if !near_base {
            return Err(RejectReason::InvalidPlacement);
        }
        if class.is_naval() && !near_coastal {
            return Err(RejectReason::InvalidPlacement);
        }
        self.place(state, actor, unit_id, class, position, near_coastal)
    }

    fn build_structure(
        &self,
        state: &mut GameState,
        actor: FactionId,
        unit_id: Option<UnitId>,
        class: UnitClass,
        position: GeoPoint,
    ) -> Resolution {
        if !class.is_structure() {
            return Err(RejectReason::WrongClass);
        }
        let radius = self.config.build_radius_km();
        let in_territory = self.territory.is_point_in_faction_territory(position, actor);
        if !in_territory && !near_owned_city(state, actor, position, radius) {
            return Err(RejectReason::InvalidPlacement);
        }
        let near_coastal = near_owned_coastal_city(state, actor, position, radius);
        self.place(state, actor, unit_id, class, position, near_coastal)
    }

    /// Shared tail of spawn and build: id, bounds, terrain, payment.
    fn place(
        &self,
        state: &mut GameState,
        actor: FactionId,
        unit_id: Option<UnitId>,
        class: UnitClass,
        position: GeoPoint,
        near_coastal_city: bool,
    ) -> Resolution {
        if unit_id.is_some_and(|id| state.units.contains(id) || state.pois.contains(id)) {
            return Err(RejectReason::IdInUse);
        }
        if !state.bounds.contains(position) {
            return Err(RejectReason::OutOfBounds);
        }
        let ctx = PlacementContext {
            faction: actor,
            near_coastal_city,
        };
        if !self.terrain.is_valid_placement(class, position, &ctx) {
            return Err(RejectReason::InvalidPlacement);
        }

        let stats = class.stats();
        let paid = state
            .faction_mut(actor)
            .is_some_and(|faction| faction.try_pay(stats.gold, stats.oil));
        if !paid {
            return Err(RejectReason::Unaffordable);
        }

        let id = match unit_id {
            Some(id) => id,
            None => state.allocate_entity_id(),
        };
        state.units.insert(Unit::new(id, class, actor, position));
        Ok(())
    }

    fn spawn_wave(
        &self,
        state: &mut GameState,
        actor: FactionId,
        unit_ids: &[UnitId],
        classes: &[UnitClass],
        position: GeoPoint,
        objective: PoiId,
    ) -> Resolution {
        if !state.faction(actor).is_some_and(|f| f.kind == FactionKind::Bot) {
            return Err(RejectReason::Unauthorized);
        }
        if unit_ids.len() != classes.len() || unit_ids.is_empty() {
            return Err(RejectReason::InvalidReference);
        }
        if classes.iter().any(|class| !class.is_mobile()) {
            return Err(RejectReason::WrongClass);
        }
        let goal = state.pois.get(objective).ok_or(RejectReason::InvalidReference)?;
        let (goal_position, goal_owner) = (goal.position, goal.owner);
        for (i, id) in unit_ids.iter().enumerate() {
            if state.units.contains(*id) || state.pois.contains(*id) || unit_ids[..i].contains(id) {
                return Err(RejectReason::IdInUse);
            }
        }
        if !state.bounds.contains(position) {
            return Err(RejectReason::OutOfBounds);
        }
        let radius = self.config.spawn_radius_km();
        if !near_owned_city(state, actor, position, radius) {
            return Err(RejectReason::InvalidPlacement);
        }

        let ctx = PlacementContext {
            faction: actor,
            near_coastal_city: near_owned_coastal_city(state, actor, position, radius),
        };
        let offsets = Formation::Box.offsets(classes.len(), self.config.formation_spacing_km());
        let spots: Vec<GeoPoint> = offsets
            .into_iter()
            .map(|offset| state.bounds.clamp(position.offset_km(offset)))
            .collect();
        let placeable = classes
            .iter()
            .zip(&spots)
            .all(|(class, spot)| self.terrain.is_valid_placement(*class, *spot, &ctx));
        if !placeable {
            return Err(RejectReason::InvalidPlacement);
        }

        let siege = state.is_hostile(actor, goal_owner, self.config);
        for ((id, class), spot) in unit_ids.iter().zip(classes).zip(spots) {
            let mut unit = Unit::new(*id, *class, actor, spot);
            if unit.can_capture || !siege || !unit.is_armed() {
                unit.destination = Some(goal_position);
            } else {
                unit.target = Some(TargetRef::Poi(objective));
            }
            state.units.insert(unit);
        }
        tracing::info!(faction = %actor, size = unit_ids.len(), objective, "reinforcement wave spawned");
        Ok(())
    }

    fn move_units(
        &self,
        state: &mut GameState,
        actor: FactionId,
        unit_ids: &[UnitId],
        destination: GeoPoint,
        formation: Option<Formation>,
        boost: bool,
    ) -> Resolution {
        let movers = owned_mobile(state, actor, unit_ids);
        if movers.is_empty() {
            return Err(RejectReason::Unauthorized);
        }
        let offsets = formation.map_or_else(
            || vec![Vec2Fixed::ZERO; movers.len()],
            |f| f.offsets(movers.len(), self.config.formation_spacing_km()),
        );
        let bounds = state.bounds;
        for (id, offset) in movers.iter().zip(offsets) {
            if let Some(unit) = state.units.get_mut(*id) {
                unit.destination = Some(bounds.clamp(destination.offset_km(offset)));
                unit.formation_offset = formation.map(|_| offset);
                unit.target = None;
                unit.hold_fire = false;
                unit.boosted = boost;
            }
        }
        Ok(())
    }

    fn set_target(&self, state: &mut GameState, actor: FactionId, unit_ids: &[UnitId], target: TargetRef) -> Resolution {
        let hostile = match target {
            TargetRef::Unit(id) => state
                .units
                .get(id)
                .is_some_and(|victim| victim.is_alive() && state.is_hostile(actor, victim.owner, self.config)),
            TargetRef::Poi(id) => state
                .pois
                .get(id)
                .is_some_and(|poi| state.is_hostile(actor, poi.owner, self.config)),
        };
        if !hostile {
            return Err(RejectReason::InvalidReference);
        }
        for_owned(state, actor, unit_ids, |unit| {
            let own_guard_post = matches!(target, TargetRef::Poi(poi) if unit.guard_poi == Some(poi));
            if unit.is_armed() && !own_guard_post {
                unit.target = Some(target);
                unit.destination = None;
                unit.hold_fire = false;
            }
        })
    }

    fn set_formation(
        &self,
        state: &mut GameState,
        actor: FactionId,
        unit_ids: &[UnitId],
        formation: Formation,
    ) -> Resolution {
        let members = owned_mobile(state, actor, unit_ids);
        if members.is_empty() {
            return Err(RejectReason::Unauthorized);
        }

        let lead = members.iter().find_map(|id| {
            let unit = state.units.get(*id)?;
            let destination = unit.destination?;
            let offset = unit.formation_offset.unwrap_or(Vec2Fixed::ZERO);
            Some(destination.offset_km(-offset))
        });
        let anchor = lead.unwrap_or_else(|| centroid(state, &members));

        let offsets = formation.offsets(members.len(), self.config.formation_spacing_km());
        let bounds = state.bounds;
        for (id, offset) in members.iter().zip(offsets) {
            if let Some(unit) = state.units.get_mut(*id) {
                unit.destination = Some(bounds.clamp(anchor.offset_km(offset)));
                unit.formation_offset = Some(offset);
            }
        }
        Ok(())
    }

    fn select_starting_base(
        &self,
        state: &mut GameState,
        actor: FactionId,
        poi_id: PoiId,
        name: &str,
        color: &str,
    ) -> Resolution {
        if actor.is_neutral() {
            return Err(RejectReason::UnknownFaction);
        }
        let poi = state.pois.get(poi_id).ok_or(RejectReason::InvalidReference)?;
        if !poi.is_city() || !poi.owner.is_neutral() {
            return Err(RejectReason::AlreadyClaimed);
        }
        if state.cities_of(actor).next().is_some() {
            return Err(RejectReason::AlreadyClaimed);
        }
        let home = poi.position;
        let city_name = poi.name.clone();

        match state.faction_mut(actor) {
            Some(faction) => {
                faction.established = true;
                faction.defeated = false;
            }
            None => {
                let mut faction = Faction::new(actor, name, FactionKind::Player);
                faction.color = color.to_string();
                faction.gold = self.config.starting_gold;
                faction.oil = self.config.starting_oil;
                faction.established = true;
                state.factions.insert(faction);
            }
        }

        if let Some(poi) = state.pois.get_mut(poi_id) {
            poi.owner = actor;
        }
        state.units.retain(|u| u.guard_poi != Some(poi_id));

        let garrison = &self.config.starting_garrison;
        let offsets = Formation::Box.offsets(garrison.len(), self.config.formation_spacing_km());
        for (class, offset) in garrison.iter().zip(offsets) {
            let id = state.allocate_entity_id();
            let position = state.bounds.clamp(home.offset_km(offset));
            state.units.insert(Unit::new(id, *class, actor, position));
        }

        let faction_name = state.faction(actor).map_or_else(|| name.to_string(), |f| f.name.clone());
        state.push_message(format!("{faction_name} established a base at {city_name}"), self.config.max_messages);
        tracing::info!(faction = %actor, poi = poi_id, "starting base selected");
        Ok(())
    }

    fn claim_poi(&self, state: &mut GameState, actor: FactionId, poi_id: PoiId) -> Resolution {
        let poi = state.pois.get(poi_id).ok_or(RejectReason::InvalidReference)?;
        if poi.kind == PoiKind::City || !poi.owner.is_neutral() {
            return Err(RejectReason::AlreadyClaimed);
        }
        let radius = self.config.claim_radius_km();
        let present = state
            .units
            .iter()
            .any(|u| u.owner == actor && u.is_alive() && u.position.within_km(poi.position, radius));
        if !present {
            return Err(RejectReason::InvalidPlacement);
        }
        let cost = self.config.claim_cost_gold;
        if !state.faction_mut(actor).is_some_and(|f| f.try_pay(cost, 0)) {
            return Err(RejectReason::Unaffordable);
        }
        if let Some(poi) = state.pois.get_mut(poi_id) {
            poi.owner = actor;
        }
        tracing::info!(faction = %actor, poi = poi_id, "POI claimed");
        Ok(())
    }

    fn launch_missile(&self, state: &mut GameState, actor: FactionId, silo_id: UnitId, target: GeoPoint) -> Resolution {
        let silo = state.units.get(silo_id).ok_or(RejectReason::InvalidReference)?;
        if silo.class != UnitClass::MissileSilo {
            return Err(RejectReason::WrongClass);
        }
        if silo.owner != actor {
            return Err(RejectReason::Unauthorized);
        }
        if silo.cooldown > 0 {
            return Err(RejectReason::OnCooldown);
        }
        if !state.bounds.contains(target) {
            return Err(RejectReason::OutOfBounds);
        }
        let from_pos = silo.position;
        let (gold, oil) = (self.config.missile_cost_gold, self.config.missile_cost_oil);
        if !state.faction_mut(actor).is_some_and(|f| f.try_pay(gold, oil)) {
            return Err(RejectReason::Unaffordable);
        }

        state.projectiles.spawn(
            Launch {
                from_id: silo_id,
                to: None,
                from_pos,
                to_pos: target,
                weapon: WeaponType::Strategic,
                payload: Some(Payload {
                    radius: self.config.missile_radius_km(),
                    damage: Fixed::from_num(self.config.missile_damage),
                    owner: actor,
                }),
            },
            self.config.missile_speed(),
        );
        if let Some(silo) = state.units.get_mut(silo_id) {
            silo.cooldown = self.config.missile_cooldown_ticks;
        }
        tracing::info!(faction = %actor, silo = silo_id, "strategic missile launched");
        Ok(())
    }
}

/// Ids from `unit_ids` that `actor` owns and that can move, deduplicated,
/// in the order given.
fn owned_mobile(state: &GameState, actor: FactionId, unit_ids: &[UnitId]) -> Vec<UnitId> {
    let mut seen = Vec::with_capacity(unit_ids.len());
    for id in unit_ids {
        if seen.contains(id) {
            continue;
        }
        if state
            .units
            .get(*id)
            .is_some_and(|u| u.owner == actor && u.is_alive() && u.class.is_mobile())
        {
            seen.push(*id);
        }
    }
    seen
}

/// Run `f` on every listed unit the actor owns; unowned ids are skipped.
fn for_owned(state: &mut GameState, actor: FactionId, unit_ids: &[UnitId], mut f: impl FnMut(&mut Unit)) -> Resolution {
    let mut touched = 0usize;
    for id in unit_ids {
        if let Some(unit) = state.units.get_mut(*id) {
            if unit.owner == actor && unit.is_alive() {
                f(unit);
                touched += 1;
            }
        }
    }
    if touched == 0 {
        return Err(RejectReason::Unauthorized);
    }
    Ok(())
}

fn near_owned_city(state: &GameState, actor: FactionId, position: GeoPoint, radius: Fixed) -> bool {
    state
        .cities_of(actor)
        .any(|city| city.position.within_km(position, radius))
}

fn near_owned_coastal_city(state: &GameState, actor: FactionId, position: GeoPoint, radius: Fixed) -> bool {
    state
        .cities_of(actor)
        .any(|city| city.coastal && city.position.within_km(position, radius))
        || state.units.iter().any(|u| {
            u.owner == actor && u.class == UnitClass::Port && u.position.within_km(position, radius)
        })
}

fn centroid(state: &GameState, ids: &[UnitId]) -> GeoPoint {
    let mut lat = Fixed::ZERO;
    let mut lng = Fixed::ZERO;
    let mut count = 0i32;
    for unit in ids.iter().filter_map(|id| state.units.get(*id)) {
        lat += unit.position.lat;
        lng += unit.position.lng;
        count += 1;
    }
    if count == 0 {
        return GeoPoint::default();
    }
    GeoPoint::new(lat / Fixed::from_num(count), lng / Fixed::from_num(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Poi;
    use crate::math::{ratio, GeoBounds};
    use crate::terrain::{NoTerritory, OpenTerrain};

    fn point(lat_milli: i32, lng_milli: i32) -> GeoPoint {
        GeoPoint::new(ratio(lat_milli, 1000), ratio(lng_milli, 1000))
    }

    fn setup() -> (GameState, SimConfig) {
        let mut state = GameState::new(GeoBounds::from_degrees(-10, 10, -10, 10));
        let mut faction = Faction::new(FactionId(1), "Red", FactionKind::Player);
        faction.gold = 1_000;
        faction.oil = 100;
        faction.established = true;
        state.factions.insert(faction);
        state.factions.insert(Faction::new(FactionId(2), "Blue", FactionKind::Bot));
        let mut city = Poi::new(100, PoiKind::City, "Home", point(0, 0), 1);
        city.owner = FactionId(1);
        state.pois.insert(city);
        state.pois.insert(Poi::new(101, PoiKind::City, "Free", point(1_000, 1_000), 2));
        state.pois.insert(Poi::new(102, PoiKind::OilRig, "Rig", point(0, 20), 2));
        (state, SimConfig::default())
    }

    fn apply(state: &mut GameState, config: &SimConfig, id: u64, actor: u16, payload: ActionKind) -> ActionOutcome {
        let resolver = Resolver {
            config,
            terrain: &OpenTerrain,
            territory: &NoTerritory,
        };
        resolver.apply(state, &GameAction::new(id, FactionId(actor), 0, payload))
    }

    fn spawn(unit_id: u64, class: UnitClass, position: GeoPoint) -> ActionKind {
        ActionKind::SpawnUnit {
            unit_id: Some(unit_id),
            class,
            position,
        }
    }

    #[test]
    fn test_spawn_deducts_and_inserts() {
        let (mut state, config) = setup();
        let outcome = apply(&mut state, &config, 1, 1, spawn(7, UnitClass::Tank, point(0, 10)));
        assert_eq!(outcome, ActionOutcome::Applied);
        assert_eq!(state.units.get(7).map(|u| u.owner), Some(FactionId(1)));
        let faction = state.faction(FactionId(1)).unwrap();
        assert_eq!((faction.gold, faction.oil), (700, 50));
    }

    #[test]
    fn test_duplicate_id_is_noop() {
        let (mut state, config) = setup();
        apply(&mut state, &config, 1, 1, spawn(7, UnitClass::Infantry, point(0, 10)));
        let snapshot = state.clone();
        let outcome = apply(&mut state, &config, 1, 1, spawn(8, UnitClass::Infantry, point(0, 10)));
        assert_eq!(outcome, ActionOutcome::Duplicate);
        assert_eq!(state, snapshot);
    }

    #[test]
    fn test_late_redelivery_after_many_actions_is_noop() {
        let (mut state, config) = setup();
        let first = (1 << 40) | 1;
        apply(&mut state, &config, first, 1, spawn(7, UnitClass::Infantry, point(0, 10)));
        for seq in 2..=(crate::state::APPLIED_WINDOW as u64 + 50) {
            apply(&mut state, &config, (1 << 40) | seq, 1, ActionKind::HoldPosition { unit_ids: vec![7] });
        }
        let gold = state.faction(FactionId(1)).unwrap().gold;
        let outcome = apply(&mut state, &config, first, 1, spawn(8, UnitClass::Infantry, point(0, 10)));
        assert_eq!(outcome, ActionOutcome::Duplicate);
        assert!(state.unit(8).is_none());
        assert_eq!(state.faction(FactionId(1)).unwrap().gold, gold);
    }

    #[test]
    fn test_unaffordable_spawn_changes_nothing() {
        let (mut state, config) = setup();
        state.faction_mut(FactionId(1)).unwrap().gold = 0;
        let outcome = apply(&mut state, &config, 1, 1, spawn(7, UnitClass::Infantry, point(0, 10)));
        assert_eq!(outcome, ActionOutcome::Rejected(RejectReason::Unaffordable));
        assert!(state.units.is_empty());
        assert_eq!(state.faction(FactionId(1)).unwrap().gold, 0);
    }

    #[test]
    fn test_spawn_far_from_base_rejected() {
        let (mut state, config) = setup();
        let outcome = apply(&mut state, &config, 1, 1, spawn(7, UnitClass::Infantry, point(2_000, 0)));
        assert_eq!(outcome, ActionOutcome::Rejected(RejectReason::InvalidPlacement));
    }

    #[test]
    fn test_naval_spawn_needs_coastal_city() {
        let (mut state, config) = setup();
        let outcome = apply(&mut state, &config, 1, 1, spawn(7, UnitClass::Destroyer, point(0, 10)));
        assert_eq!(outcome, ActionOutcome::Rejected(RejectReason::InvalidPlacement));
        state.pois.get_mut(100).unwrap().coastal = true;
        state.faction_mut(FactionId(1)).unwrap().oil = 1_000;
        let outcome = apply(&mut state, &config, 2, 1, spawn(7, UnitClass::Destroyer, point(0, 10)));
        assert_eq!(outcome, ActionOutcome::Applied);
    }

    #[test]
    fn test_spawn_rejects_structures_and_taken_ids() {
        let (mut state, config) = setup();
        let outcome = apply(&mut state, &config, 1, 1, spawn(7, UnitClass::SamSite, point(0, 10)));
        assert_eq!(outcome, ActionOutcome::Rejected(RejectReason::WrongClass));
        let outcome = apply(&mut state, &config, 2, 1, spawn(100, UnitClass::Infantry, point(0, 10)));
        assert_eq!(outcome, ActionOutcome::Rejected(RejectReason::IdInUse));
    }

    #[test]
    fn test_move_only_affects_owned_units() {
        let (mut state, config) = setup();
        state.units.insert(Unit::new(1, UnitClass::Tank, FactionId(1), point(0, 0)));
        state.units.insert(Unit::new(2, UnitClass::Tank, FactionId(2), point(0, 0)));
        let outcome = apply(
            &mut state,
            &config,
            5,
            1,
            ActionKind::MoveUnits {
                unit_ids: vec![1, 2],
                destination: point(100, 100),
                formation: None,
                boost: true,
            },
        );
        assert_eq!(outcome, ActionOutcome::Applied);
        let mine = state.units.get(1).unwrap();
        assert_eq!(mine.destination, Some(point(100, 100)));
        assert!(mine.boosted);
        assert!(state.units.get(2).unwrap().destination.is_none());
    }

    #[test]
    fn test_move_with_formation_spreads_destinations() {
        let (mut state, config) = setup();
        for id in 1..=3 {
            state.units.insert(Unit::new(id, UnitClass::Infantry, FactionId(1), point(0, 0)));
        }
        apply(
            &mut state,
            &config,
            5,
            1,
            ActionKind::MoveUnits {
                unit_ids: vec![1, 2, 3],
                destination: point(100, 100),
                formation: Some(Formation::Line),
                boost: false,
            },
        );
        let destinations: Vec<_> = (1..=3).filter_map(|id| state.units.get(id)?.destination).collect();
        assert_eq!(destinations.len(), 3);
        assert_ne!(destinations[0], destinations[1]);
        assert_ne!(destinations[1], destinations[2]);
    }

    #[test]
    fn test_set_target_requires_hostile_target() {
        let (mut state, config) = setup();
        state.units.insert(Unit::new(1, UnitClass::Tank, FactionId(1), point(0, 0)));
        state.units.insert(Unit::new(2, UnitClass::Tank, FactionId(1), point(0, 0)));
        state.units.insert(Unit::new(3, UnitClass::Tank, FactionId(2), point(0, 0)));
        let own = ActionKind::SetTarget {
            unit_ids: vec![1],
            target: TargetRef::Unit(2),
        };
        assert_eq!(
            apply(&mut state, &config, 1, 1, own),
            ActionOutcome::Rejected(RejectReason::InvalidReference)
        );
        let enemy = ActionKind::SetTarget {
            unit_ids: vec![1],
            target: TargetRef::Unit(3),
        };
        assert_eq!(apply(&mut state, &config, 2, 1, enemy), ActionOutcome::Applied);
        assert_eq!(state.units.get(1).unwrap().target, Some(TargetRef::Unit(3)));
    }

    #[test]
    fn test_build_structure_near_city() {
        let (mut state, config) = setup();
        let build = |position| ActionKind::BuildStructure {
            unit_id: Some(50),
            class: UnitClass::MilitaryBase,
            position,
        };
        assert_eq!(
            apply(&mut state, &config, 1, 1, build(point(3_000, 0))),
            ActionOutcome::Rejected(RejectReason::InvalidPlacement)
        );
        assert_eq!(apply(&mut state, &config, 2, 1, build(point(0, 50))), ActionOutcome::Applied);
        assert_eq!(state.units.get(50).map(|u| u.class), Some(UnitClass::MilitaryBase));
        assert_eq!(state.faction(FactionId(1)).unwrap().gold, 200);
    }

    #[test]
    fn test_select_starting_base_creates_faction_and_garrison() {
        let (mut state, config) = setup();
        let outcome = apply(
            &mut state,
            &config,
            1,
            9,
            ActionKind::SelectStartingBase {
                poi_id: 101,
                name: "Green".into(),
                color: "#00ff00".into(),
            },
        );
        assert_eq!(outcome, ActionOutcome::Applied);
        let faction = state.faction(FactionId(9)).unwrap();
        assert_eq!(faction.kind, FactionKind::Player);
        assert!(faction.established);
        assert_eq!(faction.gold, config.starting_gold);
        assert_eq!(state.poi(101).unwrap().owner, FactionId(9));
        assert_eq!(state.unit_count(FactionId(9)), config.starting_garrison.len());
    }

    #[test]
    fn test_select_starting_base_only_once() {
        let (mut state, config) = setup();
        let outcome = apply(
            &mut state,
            &config,
            1,
            1,
            ActionKind::SelectStartingBase {
                poi_id: 101,
                name: "Red".into(),
                color: "#f00".into(),
            },
        );
        assert_eq!(outcome, ActionOutcome::Rejected(RejectReason::AlreadyClaimed));
    }

    #[test]
    fn test_claim_requires_presence_and_gold() {
        let (mut state, config) = setup();
        let claim = ActionKind::ClaimPoi { poi_id: 102 };
        assert_eq!(
            apply(&mut state, &config, 1, 1, claim.clone()),
            ActionOutcome::Rejected(RejectReason::InvalidPlacement)
        );
        state.units.insert(Unit::new(1, UnitClass::Infantry, FactionId(1), point(0, 20)));
        assert_eq!(apply(&mut state, &config, 2, 1, claim), ActionOutcome::Applied);
        assert_eq!(state.poi(102).unwrap().owner, FactionId(1));
        assert_eq!(state.faction(FactionId(1)).unwrap().gold, 800);
    }

    #[test]
    fn test_launch_missile_spawns_payload_and_sets_cooldown() {
        let (mut state, mut config) = setup();
        config.missile_cost_oil = 0;
        state.units.insert(Unit::new(1, UnitClass::MissileSilo, FactionId(1), point(0, 0)));
        let launch = ActionKind::LaunchMissile {
            silo_id: 1,
            target: point(500, 500),
        };
        assert_eq!(apply(&mut state, &config, 1, 1, launch.clone()), ActionOutcome::Applied);
        assert_eq!(state.projectiles.active_count(), 1);
        assert!(state.projectiles.active().all(|p| p.payload.is_some()));
        assert_eq!(
            apply(&mut state, &config, 2, 1, launch),
            ActionOutcome::Rejected(RejectReason::OnCooldown)
        );
    }

    #[test]
    fn test_hold_position_stops_and_holds_fire() {
        let (mut state, config) = setup();
        let mut unit = Unit::new(1, UnitClass::Infantry, FactionId(1), point(0, 0));
        unit.destination = Some(point(10, 10));
        state.units.insert(unit);
        apply(&mut state, &config, 1, 1, ActionKind::HoldPosition { unit_ids: vec![1] });
        let unit = state.units.get(1).unwrap();
        assert!(unit.destination.is_none());
        assert!(unit.hold_fire);
    }

    #[test]
    fn test_spawn_wave_only_for_bots() {
        let (mut state, config) = setup();
        let mut city = Poi::new(103, PoiKind::City, "Fort", point(-1_000, 0), 2);
        city.owner = FactionId(2);
        state.pois.insert(city);
        let wave = ActionKind::SpawnWave {
            unit_ids: vec![60, 61, 62],
            classes: vec![UnitClass::Infantry, UnitClass::Infantry, UnitClass::Tank],
            position: point(-1_000, 10),
            objective: 101,
        };
        assert_eq!(
            apply(&mut state, &config, 1, 1, wave.clone()),
            ActionOutcome::Rejected(RejectReason::Unauthorized)
        );
        assert_eq!(apply(&mut state, &config, 2, 2, wave), ActionOutcome::Applied);
        let free_city = state.poi(101).unwrap().position;
        assert_eq!(state.units.get(60).unwrap().destination, Some(free_city));
        assert_eq!(state.units.get(62).unwrap().target, Some(TargetRef::Poi(101)));
        assert_eq!(state.faction(FactionId(2)).unwrap().gold, 0);
    }

    #[test]
    fn test_unknown_action_type_is_ignored() {
        let json = r#"{"id":3,"actor":1,"timestamp_ms":0,"payload":{"type":"SUMMON_DRAGON","size":9}}"#;
        let action: GameAction = serde_json::from_str(json).unwrap();
        assert_eq!(action.payload, ActionKind::Unknown);
        let (mut state, config) = setup();
        let before = state.units.clone();
        let outcome = apply(&mut state, &config, action.id, 1, action.payload);
        assert_eq!(outcome, ActionOutcome::Rejected(RejectReason::UnknownAction));
        assert_eq!(state.units, before);
    }
}
