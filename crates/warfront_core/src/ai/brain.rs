//! Per-faction bot brain.
//!
//! Each think cycle runs five steps over a read-only view of the world:
//!
//! 1. **Analyze** - sort owned units, list cities, compare army power.
//! 2. **Plan** - prune finished task forces and open new ones.
//! 3. **Assign** - fill forming task forces from unassigned units.
//! 4. **Command** - turn task-force goals into per-unit orders.
//! 5. **Produce** - spend gold above the personality reserve.
//!
//! Orders come out as [`ActionKind`]s and only when they differ from what
//! the unit is already doing, so a steady plan produces no traffic.

use std::collections::BTreeSet;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::actions::ActionKind;
use crate::ai::AiConfig;
use crate::components::{AutoMode, Poi, PoiId, TargetRef, Unit, UnitId};
use crate::config::SimConfig;
use crate::factions::{FactionId, Personality};
use crate::math::{Fixed, GeoPoint, Vec2Fixed};
use crate::state::GameState;
use crate::unit_class::UnitClass;

// ============================================================================
// Task forces
// ============================================================================

/// Goal of a task force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskForceKind {
    /// Take a neutral city.
    Capture,
    /// Take an enemy city.
    Assault,
    /// Hold an owned city against nearby hostiles.
    Defense,
    /// Take an enemy oil rig or gold mine.
    Raid,
    /// Accompany another force. Reserved; the planner does not open these.
    Escort,
}

impl TaskForceKind {
    /// Infantry wanted, and the minimum before the force sets out.
    #[must_use]
    pub const fn infantry(self) -> (usize, usize) {
        match self {
            Self::Capture => (2, 1),
            Self::Assault => (3, 2),
            Self::Raid => (2, 1),
            Self::Defense | Self::Escort => (0, 0),
        }
    }

    /// Combat escorts wanted.
    #[must_use]
    pub const fn escorts(self) -> usize {
        match self {
            Self::Capture => 1,
            Self::Assault => 4,
            Self::Raid => 2,
            Self::Defense => 3,
            Self::Escort => 2,
        }
    }
}

/// Task force lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskForceStatus {
    /// Gathering members.
    Forming,
    /// Travelling to the target.
    Moving,
    /// At the target.
    Engaged,
    /// Goal reached.
    Complete,
    /// Every member died.
    Failed,
}

impl TaskForceStatus {
    /// Whether the force is finished.
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// A group of units with one objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskForce {
    /// Identifier, unique within the brain.
    pub id: u32,
    /// Goal.
    pub kind: TaskForceKind,
    /// POI the force works on.
    pub target: PoiId,
    /// Member units.
    pub members: Vec<UnitId>,
    /// Lifecycle state.
    pub status: TaskForceStatus,
    /// Where escorts gather, fixed when the force sets out.
    pub rally: Option<GeoPoint>,
}

impl TaskForce {
    /// Create an empty forming task force.
    #[must_use]
    pub fn new(id: u32, kind: TaskForceKind, target: PoiId) -> Self {
        Self {
            id,
            kind,
            target,
            members: Vec::new(),
            status: TaskForceStatus::Forming,
            rally: None,
        }
    }

    fn infantry_count(&self, state: &GameState) -> usize {
        self.members
            .iter()
            .filter_map(|id| state.units.get(*id))
            .filter(|u| u.class.is_infantry())
            .count()
    }

    fn escort_count(&self, state: &GameState) -> usize {
        self.members.len() - self.infantry_count(state)
    }

    fn is_ready(&self, state: &GameState) -> bool {
        let (_, minimum) = self.kind.infantry();
        !self.members.is_empty() && self.infantry_count(state) >= minimum
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// What the brain knows about the world this cycle.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// Owned living infantry.
    pub infantry: Vec<UnitId>,
    /// Owned living armed non-infantry mobile units.
    pub combat: Vec<UnitId>,
    /// Owned units without orders.
    pub idle: BTreeSet<UnitId>,
    /// Owned cities.
    pub own_cities: Vec<PoiId>,
    /// Neutral cities.
    pub neutral_cities: Vec<PoiId>,
    /// Cities of hostile factions.
    pub enemy_cities: Vec<PoiId>,
    /// Oil rigs and gold mines of hostile factions.
    pub enemy_resources: Vec<PoiId>,
    /// Neutral city closest to home.
    pub nearest_neutral: Option<PoiId>,
    /// Summed hp plus twice attack over owned units.
    pub own_power: i64,
    /// Same measure for the strongest hostile faction.
    pub rival_power: i64,
    /// Reference point for distance ordering.
    pub home: Option<GeoPoint>,
}

fn unit_power(unit: &Unit) -> i64 {
    (unit.hp + unit.attack * Fixed::from_num(2)).to_num::<i64>()
}

fn nearest_poi(state: &GameState, from: GeoPoint, ids: &[PoiId]) -> Option<PoiId> {
    ids.iter()
        .filter_map(|id| state.pois.get(*id))
        .min_by_key(|p| (from.distance_km(p.position), p.id))
        .map(|p| p.id)
}

/// Survey the world from `faction`'s point of view.
#[must_use]
pub fn analyze(state: &GameState, faction: FactionId, sim: &SimConfig) -> Analysis {
    let mut analysis = Analysis::default();

    for unit in state.units.iter().filter(|u| u.owner == faction && u.is_alive()) {
        if !unit.class.is_mobile() || unit.guard_poi.is_some() {
            continue;
        }
        if unit.class.is_infantry() {
            analysis.infantry.push(unit.id);
        } else if unit.is_armed() {
            analysis.combat.push(unit.id);
        }
        if unit.is_idle() {
            analysis.idle.insert(unit.id);
        }
        analysis.own_power += unit_power(unit);
    }

    let mut rival_power = std::collections::BTreeMap::<FactionId, i64>::new();
    for unit in state.units.iter().filter(|u| u.is_alive()) {
        if unit.owner.is_neutral() || !state.is_hostile(faction, unit.owner, sim) {
            continue;
        }
        if state.faction(unit.owner).is_some_and(|f| f.guard_of.is_some()) {
            continue;
        }
        *rival_power.entry(unit.owner).or_default() += unit_power(unit);
    }
    analysis.rival_power = rival_power.values().copied().max().unwrap_or(0);

    for poi in state.pois.iter() {
        if poi.owner == faction {
            if poi.is_city() {
                analysis.own_cities.push(poi.id);
            }
        } else if poi.owner.is_neutral() {
            if poi.is_city() {
                analysis.neutral_cities.push(poi.id);
            }
        } else if state.is_hostile(faction, poi.owner, sim) {
            if poi.is_city() {
                analysis.enemy_cities.push(poi.id);
            } else {
                analysis.enemy_resources.push(poi.id);
            }
        }
    }

    analysis.home = analysis
        .own_cities
        .first()
        .and_then(|id| state.pois.get(*id))
        .map(|p| p.position)
        .or_else(|| {
            let first = analysis.infantry.first().or(analysis.combat.first())?;
            state.units.get(*first).map(|u| u.position)
        });
    if let Some(home) = analysis.home {
        analysis.nearest_neutral = nearest_poi(state, home, &analysis.neutral_cities);
    }
    analysis
}

// ============================================================================
// Production
// ============================================================================

/// Inputs to a production decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductionInput {
    /// Treasury gold.
    pub gold: u32,
    /// Treasury oil.
    pub oil: u32,
    /// Spending style.
    pub personality: Personality,
    /// Owned infantry.
    pub infantry: usize,
    /// Whether some capture force lacks infantry.
    pub capture_short: bool,
    /// Whether the faction holds a coastal city or port.
    pub coastal: bool,
    /// Random roll for the weighted pick.
    pub roll: u32,
}

/// Pick the class to produce, or `None` to save up.
#[must_use]
pub fn choose_production(input: &ProductionInput) -> Option<UnitClass> {
    let reserve = u64::from(input.gold) * u64::from(input.personality.reserve_permille()) / 1000;
    let budget = input.gold.saturating_sub(reserve as u32);
    let affordable = |class: UnitClass| {
        let stats = class.stats();
        stats.gold <= budget && stats.oil <= input.oil
    };

    if input.capture_short || input.infantry < input.personality.infantry_floor() {
        return affordable(UnitClass::Infantry).then_some(UnitClass::Infantry);
    }

    let options: Vec<(UnitClass, u32)> = UnitClass::COMBAT
        .iter()
        .copied()
        .filter(|class| input.coastal || !class.is_naval())
        .filter(|class| affordable(*class))
        .map(|class| (class, input.personality.weight(class)))
        .filter(|(_, weight)| *weight > 0)
        .collect();
    let total: u32 = options.iter().map(|(_, w)| w).sum();
    if total == 0 {
        return affordable(UnitClass::Infantry).then_some(UnitClass::Infantry);
    }
    let mut roll = input.roll % total;
    for (class, weight) in options {
        if roll < weight {
            return Some(class);
        }
        roll -= weight;
    }
    None
}

// ============================================================================
// Brain
// ============================================================================

/// Scratch state of one bot faction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotBrain {
    /// Faction driven by this brain.
    pub faction: FactionId,
    /// Active task forces.
    pub task_forces: Vec<TaskForce>,
    /// Wall-clock time of the last think cycle.
    pub last_think_ms: Option<u64>,
    next_task_force_id: u32,
}

/// Orders produced in one cycle.
type Orders = Vec<ActionKind>;

impl BotBrain {
    /// Create a brain with no plans.
    #[must_use]
    pub fn new(faction: FactionId) -> Self {
        Self {
            faction,
            task_forces: Vec::new(),
            last_think_ms: None,
            next_task_force_id: 1,
        }
    }

    /// Whether the throttle allows a cycle now.
    #[must_use]
    pub fn is_due(&self, now_ms: u64, interval_ms: u64) -> bool {
        self.last_think_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= interval_ms)
    }

    /// Run one full think cycle.
    pub fn think(
        &mut self,
        state: &GameState,
        sim: &SimConfig,
        config: &AiConfig,
        now_ms: u64,
        rng: &mut ChaCha8Rng,
    ) -> Orders {
        self.last_think_ms = Some(now_ms);
        let Some(faction) = state.faction(self.faction) else {
            return Vec::new();
        };
        if faction.defeated {
            return Vec::new();
        }

        let analysis = analyze(state, self.faction, sim);
        self.plan(state, sim, config, &analysis);
        self.assign(state, &analysis);
        let mut orders = Vec::new();
        self.command(state, sim, config, rng, &mut orders);
        self.command_idle(state, sim, &analysis, &mut orders);
        if let Some(order) = self.produce(state, config, &analysis, rng) {
            orders.push(order);
        }
        tracing::debug!(faction = %self.faction, forces = self.task_forces.len(), orders = orders.len(), "bot thought");
        orders
    }

    fn open(&mut self, kind: TaskForceKind, target: PoiId) {
        let id = self.next_task_force_id;
        self.next_task_force_id += 1;
        self.task_forces.push(TaskForce::new(id, kind, target));
        tracing::debug!(faction = %self.faction, ?kind, target, "task force opened");
    }

    fn targets(&self, kind: TaskForceKind) -> BTreeSet<PoiId> {
        self.task_forces
            .iter()
            .filter(|tf| tf.kind == kind)
            .map(|tf| tf.target)
            .collect()
    }

    /// Prune finished forces and open new ones.
    pub fn plan(&mut self, state: &GameState, sim: &SimConfig, config: &AiConfig, analysis: &Analysis) {
        let faction = self.faction;
        for tf in &mut self.task_forces {
            tf.members
                .retain(|id| state.units.get(*id).is_some_and(|u| u.is_alive() && u.owner == faction));
            if tf.members.is_empty() && tf.status != TaskForceStatus::Forming {
                tf.status = TaskForceStatus::Failed;
                continue;
            }
            let Some(target) = state.pois.get(tf.target) else {
                tf.status = TaskForceStatus::Failed;
                continue;
            };
            let done = match tf.kind {
                TaskForceKind::Capture | TaskForceKind::Assault | TaskForceKind::Raid => target.owner == faction,
                TaskForceKind::Defense => {
                    target.owner != faction
                        || hostiles_near(state, sim, faction, target.position, config.detection_radius_km()).is_empty()
                }
                TaskForceKind::Escort => false,
            };
            if done {
                tf.status = TaskForceStatus::Complete;
            }
        }
        self.task_forces.retain(|tf| !tf.status.is_done());

        // Capture: nearest neutral cities first, capped by infantry / 2.
        let capturing = self.targets(TaskForceKind::Capture);
        let cap = analysis.infantry.len() / 2;
        let mut open_slots = cap.saturating_sub(capturing.len());
        if let Some(home) = analysis.home {
            let mut candidates: Vec<&Poi> = analysis
                .neutral_cities
                .iter()
                .filter(|id| !capturing.contains(id))
                .filter_map(|id| state.pois.get(*id))
                .collect();
            candidates.sort_by_key(|p| (home.distance_km(p.position), p.id));
            for poi in candidates {
                if open_slots == 0 {
                    break;
                }
                self.open(TaskForceKind::Capture, poi.id);
                open_slots -= 1;
            }
        }

        // Defense: owned cities with hostiles close by.
        let defended = self.targets(TaskForceKind::Defense);
        for id in &analysis.own_cities {
            if defended.contains(id) {
                continue;
            }
            let Some(city) = state.pois.get(*id) else { continue };
            let threats = hostiles_near(state, sim, faction, city.position, config.detection_radius_km());
            if threats.len() >= config.defense_trigger {
                self.open(TaskForceKind::Defense, *id);
            }
        }

        // Offense, scaled by aggression.
        let aggression = state.faction(faction).map_or(Fixed::ONE / 2, |f| f.aggression);
        let drive = Fixed::from_num(analysis.own_power) * aggression * Fixed::from_num(2);
        let rival = Fixed::from_num(analysis.rival_power.max(1));
        let ratio = |permille: u32| rival * Fixed::from_num(permille) / Fixed::from_num(1000);
        let Some(home) = analysis.home else { return };
        let has = |kind| self.task_forces.iter().any(|tf| tf.kind == kind);
        let assault = has(TaskForceKind::Assault);
        let raid = has(TaskForceKind::Raid);
        if !assault && drive >= ratio(config.assault_ratio_permille) {
            if let Some(id) = nearest_poi(state, home, &analysis.enemy_cities) {
                self.open(TaskForceKind::Assault, id);
            }
        } else if !raid && drive >= ratio(config.raid_ratio_permille) {
            if let Some(id) = nearest_poi(state, home, &analysis.enemy_resources) {
                self.open(TaskForceKind::Raid, id);
            }
        }
    }

    /// Hand unassigned units to forming or understaffed forces.
    pub fn assign(&mut self, state: &GameState, analysis: &Analysis) {
        let assigned: BTreeSet<UnitId> = self
            .task_forces
            .iter()
            .flat_map(|tf| tf.members.iter().copied())
            .collect();
        let mut free_infantry: Vec<UnitId> = analysis
            .infantry
            .iter()
            .copied()
            .filter(|id| !assigned.contains(id))
            .collect();
        let mut free_combat: Vec<UnitId> = analysis
            .combat
            .iter()
            .copied()
            .filter(|id| !assigned.contains(id))
            .collect();

        for tf in &mut self.task_forces {
            let Some(target) = state.pois.get(tf.target).map(|p| p.position) else {
                continue;
            };
            let (wanted_infantry, _) = tf.kind.infantry();
            let missing = wanted_infantry.saturating_sub(tf.infantry_count(state));
            take_nearest(state, target, &mut free_infantry, missing, &mut tf.members);
            let missing = tf.kind.escorts().saturating_sub(tf.escort_count(state));
            take_nearest(state, target, &mut free_combat, missing, &mut tf.members);

            let ready = tf.is_ready(state);
            match tf.status {
                TaskForceStatus::Forming if ready => tf.status = TaskForceStatus::Moving,
                TaskForceStatus::Moving if !ready => tf.status = TaskForceStatus::Forming,
                _ => {}
            }
        }
    }

    fn command(
        &mut self,
        state: &GameState,
        sim: &SimConfig,
        config: &AiConfig,
        rng: &mut ChaCha8Rng,
        orders: &mut Orders,
    ) {
        let faction = self.faction;
        for tf in &mut self.task_forces {
            if !matches!(tf.status, TaskForceStatus::Moving | TaskForceStatus::Engaged) {
                continue;
            }
            let Some(poi) = state.pois.get(tf.target) else { continue };
            let target_pos = poi.position;

            if tf.kind == TaskForceKind::Defense {
                let threats = hostiles_near(state, sim, faction, target_pos, config.defense_perimeter_km());
                for unit in tf.members.iter().filter_map(|id| state.units.get(*id)) {
                    match threats.iter().min_by_key(|t| (unit.position.distance_km(t.1), t.0)) {
                        Some((enemy, _)) => order_attack(unit, TargetRef::Unit(*enemy), orders),
                        None if !unit.position.within_km(target_pos, config.defense_perimeter_km() / 2) => {
                            order_move(unit, target_pos, sim, orders);
                        }
                        None => {}
                    }
                }
                continue;
            }

            let rally = *tf.rally.get_or_insert_with(|| jitter(target_pos, config.escort_jitter_km(), rng));
            let capture_radius = sim.capture_radius_km();
            let siege = state.is_hostile(faction, poi.owner, sim);
            for unit in tf.members.iter().filter_map(|id| state.units.get(*id)) {
                if unit.class.is_infantry() {
                    if unit.position.within_km(target_pos, capture_radius) {
                        tf.status = TaskForceStatus::Engaged;
                        if !(unit.hold_fire && unit.is_idle()) {
                            orders.push(ActionKind::HoldPosition { unit_ids: vec![unit.id] });
                        }
                    } else {
                        order_move(unit, target_pos, sim, orders);
                    }
                    continue;
                }

                let nearby = hostiles_near(state, sim, faction, unit.position, unit.vision);
                if let Some((enemy, _)) = nearby.iter().min_by_key(|t| (unit.position.distance_km(t.1), t.0)) {
                    order_attack(unit, TargetRef::Unit(*enemy), orders);
                } else if !unit.position.within_km(rally, capture_radius) {
                    order_move(unit, rally, sim, orders);
                } else if siege {
                    order_attack(unit, TargetRef::Poi(tf.target), orders);
                }
            }
        }
    }

    fn command_idle(&self, state: &GameState, sim: &SimConfig, analysis: &Analysis, orders: &mut Orders) {
        let assigned: BTreeSet<UnitId> = self
            .task_forces
            .iter()
            .flat_map(|tf| tf.members.iter().copied())
            .collect();
        let home_city = analysis.own_cities.first().and_then(|id| state.pois.get(*id));

        for id in analysis.idle.iter().filter(|id| !assigned.contains(id)) {
            let Some(unit) = state.units.get(*id) else { continue };
            if unit.class.is_infantry() {
                let goal = nearest_poi(state, unit.position, &analysis.neutral_cities)
                    .and_then(|poi| state.pois.get(poi));
                if let Some(goal) = goal {
                    if !unit.position.within_km(goal.position, sim.capture_radius_km()) {
                        order_move(unit, goal.position, sim, orders);
                    }
                }
            } else if let Some(city) = home_city {
                let mode = Some(AutoMode::Defend { anchor: city.position });
                if unit.auto_mode != mode {
                    orders.push(ActionKind::SetAutoMode {
                        unit_ids: vec![unit.id],
                        mode,
                    });
                }
            }
        }
    }

    fn produce(
        &self,
        state: &GameState,
        config: &AiConfig,
        analysis: &Analysis,
        rng: &mut ChaCha8Rng,
    ) -> Option<ActionKind> {
        let faction = state.faction(self.faction)?;
        let cities: Vec<&Poi> = analysis
            .own_cities
            .iter()
            .filter_map(|id| state.pois.get(*id))
            .collect();
        if cities.is_empty() {
            return None;
        }
        let coastal_cities: Vec<&Poi> = cities.iter().copied().filter(|c| c.coastal).collect();

        let capture_short = self.task_forces.iter().any(|tf| {
            tf.kind == TaskForceKind::Capture && tf.infantry_count(state) < tf.kind.infantry().0
        });
        let input = ProductionInput {
            gold: faction.gold,
            oil: faction.oil,
            personality: faction.personality.unwrap_or_default(),
            infantry: analysis.infantry.len(),
            capture_short,
            coastal: !coastal_cities.is_empty(),
            roll: rng.gen(),
        };
        let class = choose_production(&input)?;

        let pool = if class.is_naval() { &coastal_cities } else { &cities };
        let city = pool[rng.gen_range(0..pool.len())];
        let position = state.bounds.clamp(jitter(city.position, config.production_jitter_km(), rng));
        tracing::debug!(faction = %self.faction, ?class, city = city.id, "bot production");
        Some(ActionKind::SpawnUnit {
            unit_id: None,
            class,
            position,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Living hostile non-structure units within `radius` of `center`.
fn hostiles_near(
    state: &GameState,
    sim: &SimConfig,
    faction: FactionId,
    center: GeoPoint,
    radius: Fixed,
) -> Vec<(UnitId, GeoPoint)> {
    state
        .units
        .iter()
        .filter(|u| u.is_alive() && u.class.is_mobile())
        .filter(|u| state.is_hostile(faction, u.owner, sim))
        .filter(|u| u.position.within_km(center, radius))
        .map(|u| (u.id, u.position))
        .collect()
}

/// Move up to `count` units nearest to `target` from `pool` into `members`.
fn take_nearest(state: &GameState, target: GeoPoint, pool: &mut Vec<UnitId>, count: usize, members: &mut Vec<UnitId>) {
    if count == 0 || pool.is_empty() {
        return;
    }
    pool.sort_by_key(|id| {
        let distance = state
            .units
            .get(*id)
            .map_or(Fixed::MAX, |u| u.position.distance_km(target));
        (distance, *id)
    });
    let taken = count.min(pool.len());
    members.extend(pool.drain(..taken));
}

fn jitter(center: GeoPoint, spread: Fixed, rng: &mut ChaCha8Rng) -> GeoPoint {
    let bits = spread.to_bits().max(1);
    let dx = Fixed::from_bits(rng.gen_range(-bits..=bits));
    let dy = Fixed::from_bits(rng.gen_range(-bits..=bits));
    center.offset_km(Vec2Fixed::new(dx, dy))
}

fn order_move(unit: &Unit, destination: GeoPoint, sim: &SimConfig, orders: &mut Orders) {
    let settled = unit.target.is_none()
        && unit
            .destination
            .is_some_and(|d| d.within_km(destination, sim.arrival_epsilon_km()));
    if settled {
        return;
    }
    orders.push(ActionKind::MoveUnits {
        unit_ids: vec![unit.id],
        destination,
        formation: None,
        boost: false,
    });
}

fn order_attack(unit: &Unit, target: TargetRef, orders: &mut Orders) {
    if unit.target == Some(target) || unit.guard_poi.is_some_and(|g| target == TargetRef::Poi(g)) {
        return;
    }
    orders.push(ActionKind::SetTarget {
        unit_ids: vec![unit.id],
        target,
    });
}
