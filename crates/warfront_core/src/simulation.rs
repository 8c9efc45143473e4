//! Core simulation loop.
//!
//! The simulation runs at a fixed tick rate and processes all game logic
//! deterministically. [`Simulation`] owns the [`GameState`] together with
//! everything derived from it (the spatial grid) and the external oracles
//! it consults.
//!
//! # Determinism
//!
//! All operations in this module are fully deterministic:
//! - No floating-point math (uses fixed-point via [`Fixed`](crate::math::Fixed))
//! - No system randomness (the host AI brings its own seeded generator)
//! - Consistent iteration order (sorted entity ids)
//! - No clock reads: wall-clock time is passed in
//!
//! # Example
//!
//! ```
//! use warfront_core::simulation::Simulation;
//! use warfront_core::state::GameState;
//!
//! let mut sim = Simulation::new(GameState::default());
//! let events = sim.tick(Vec::new(), 0, None);
//! assert_eq!(sim.state().tick, 1);
//! assert!(events.deaths.is_empty());
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::actions::{ActionKind, ActionOutcome, GameAction, Resolver};
use crate::ai::AiContext;
use crate::capture::run_capture;
use crate::combat::{run_combat, CaptureEvent, CombatEvents, DamageEvent};
use crate::components::UnitId;
use crate::config::SimConfig;
use crate::economy::{run_income, Income};
use crate::error::Result;
use crate::factions::FactionId;
use crate::math::GeoPoint;
use crate::movement::run_movement;
use crate::projectiles::{advance_projectiles, age_explosions};
use crate::spatial::SpatialGrid;
use crate::state::GameState;
use crate::terrain::{NoTerritory, OpenTerrain, TerrainOracle, TerritoryOracle};
use crate::victory::run_victory_check;

/// Events generated during a single tick.
///
/// The network layer broadcasts `ai_actions`; everything else is for
/// presentation, logging and tests.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Outcome of every pending action, in input order.
    pub outcomes: Vec<(u64, ActionOutcome)>,
    /// Shots that connected.
    pub damage_events: Vec<DamageEvent>,
    /// `(killer, victim)` pairs.
    pub kills: Vec<(UnitId, UnitId)>,
    /// Units removed this tick.
    pub deaths: Vec<UnitId>,
    /// POIs that changed hands.
    pub captures: Vec<CaptureEvent>,
    /// Projectile impact points.
    pub impacts: Vec<GeoPoint>,
    /// Income paid, if this was an income tick.
    pub income: BTreeMap<FactionId, Income>,
    /// Factions defeated this tick.
    pub defeated: Vec<FactionId>,
    /// Actions issued by the host AI, with ids filled, for broadcast.
    pub ai_actions: Vec<GameAction>,
}

/// The authoritative game simulation.
///
/// # System Execution Order
///
/// Each tick runs, in order:
/// 1. **Actions** - pending player and peer actions
/// 2. **Projectiles** - flight, impacts, strategic payloads
/// 3. **Grid** - spatial index rebuild
/// 4. **Movement** - steering and terrain checks
/// 5. **Combat & Capture** - firing, siege, regeneration
/// 6. **Cleanup** - dead units removed
/// 7. **Income** - on income ticks
/// 8. **Victory** - on check ticks
/// 9. **AI** - host only
pub struct Simulation {
    state: GameState,
    config: SimConfig,
    grid: SpatialGrid,
    terrain: Arc<dyn TerrainOracle>,
    territory: Arc<dyn TerritoryOracle>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.state.tick)
            .field("units", &self.state.units.len())
            .field("pois", &self.state.pois.len())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Create a simulation with default configuration, open terrain and
    /// no territory.
    #[must_use]
    pub fn new(state: GameState) -> Self {
        Self::with_config(state, SimConfig::default())
    }

    /// Create a simulation with the given configuration.
    #[must_use]
    pub fn with_config(state: GameState, config: SimConfig) -> Self {
        let grid = SpatialGrid::new(config.cell_size_km(), &state.bounds);
        Self {
            state,
            config,
            grid,
            terrain: Arc::new(OpenTerrain),
            territory: Arc::new(NoTerritory),
        }
    }

    /// Replace the terrain oracle.
    #[must_use]
    pub fn with_terrain(mut self, terrain: Arc<dyn TerrainOracle>) -> Self {
        self.terrain = terrain;
        self
    }

    /// Replace the territory oracle.
    #[must_use]
    pub fn with_territory(mut self, territory: Arc<dyn TerritoryOracle>) -> Self {
        self.territory = territory;
        self
    }

    /// Current world state.
    #[must_use]
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Mutable world state, for scenario setup and tests.
    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.state.tick
    }

    /// Overwrite the world with an authoritative snapshot.
    pub fn replace_state(&mut self, state: GameState) {
        if state.bounds != self.state.bounds {
            self.grid = SpatialGrid::new(self.config.cell_size_km(), &state.bounds);
        }
        tracing::debug!(from = self.state.tick, to = state.tick, "state replaced by snapshot");
        self.state = state;
    }

    /// Apply one action outside the tick, as a peer does for its own
    /// optimistic commands.
    pub fn apply_action(&mut self, action: &GameAction) -> ActionOutcome {
        let resolver = Resolver {
            config: &self.config,
            terrain: self.terrain.as_ref(),
            territory: self.territory.as_ref(),
        };
        resolver.apply(&mut self.state, action)
    }

    /// Advance the simulation by one tick.
    ///
    /// Never fails: bad actions are dropped and reported in
    /// [`TickEvents::outcomes`]. Pass an [`AiContext`] only on the host.
    pub fn tick(&mut self, pending: Vec<GameAction>, now_ms: u64, ai: Option<&mut AiContext>) -> TickEvents {
        let mut events = TickEvents::default();

        // 1. Actions
        for action in &pending {
            let outcome = self.apply_action(action);
            events.outcomes.push((action.id, outcome));
        }

        // 2. Projectiles
        events.impacts = advance_projectiles(&mut self.state, &self.config);

        // 3. Grid
        self.grid.rebuild(self.state.units.as_slice());

        // 4. Movement
        run_movement(&mut self.state, &self.grid, self.terrain.as_ref(), &self.config);

        // 5. Combat and capture, against post-movement positions
        self.grid.rebuild(self.state.units.as_slice());
        let mut combat = CombatEvents::default();
        run_combat(&mut self.state, &self.grid, &self.config, &mut combat);
        run_capture(&mut self.state, &self.grid, &self.config, &mut combat);
        events.damage_events = combat.damage;
        events.kills = combat.kills;
        events.captures = combat.captures;

        // 6. Cleanup
        events.deaths = self
            .state
            .units
            .iter()
            .filter(|u| !u.is_alive())
            .map(|u| u.id)
            .collect();
        if !events.deaths.is_empty() {
            self.state.units.retain(|u| u.is_alive());
        }

        // 7. Income
        events.income = run_income(&mut self.state, &self.config);

        // 8. Victory
        events.defeated = run_victory_check(&mut self.state, &self.config);

        // 9. AI
        if let Some(ai) = ai {
            let issued = ai.think(&self.state, &self.config, now_ms);
            for mut action in issued {
                self.fill_ids(&mut action);
                let outcome = self.apply_action(&action);
                if outcome == ActionOutcome::Applied {
                    events.ai_actions.push(action);
                } else {
                    tracing::debug!(action = action.id, ?outcome, "AI action dropped");
                }
            }
        }

        age_explosions(&mut self.state);
        self.state.tick += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.state.tick, state_hash = hash, "Simulation state hash");
        }

        events
    }

    /// Mint ids for AI-issued spawns so every peer creates the same units.
    fn fill_ids(&mut self, action: &mut GameAction) {
        match &mut action.payload {
            ActionKind::SpawnUnit { unit_id, .. } | ActionKind::BuildStructure { unit_id, .. } => {
                if unit_id.is_none() {
                    *unit_id = Some(self.state.allocate_entity_id());
                }
            }
            ActionKind::SpawnWave { unit_ids, classes, .. } => {
                while unit_ids.len() < classes.len() {
                    unit_ids.push(self.state.allocate_entity_id());
                }
            }
            _ => {}
        }
    }

    /// Calculate a hash of the current simulation state.
    ///
    /// Used for desync detection. Covers everything that affects future
    /// ticks, in id order; the message log and id counters are excluded.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        state_hash(&self.state)
    }

    /// Serialize the world state for replay or network sync.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        self.state.to_bytes()
    }

    /// Rebuild a simulation from [`Self::serialize`] output.
    pub fn deserialize(data: &[u8], config: SimConfig) -> Result<Self> {
        Ok(Self::with_config(GameState::from_bytes(data)?, config))
    }
}

/// Hash of the simulation-relevant part of a state.
#[must_use]
pub fn state_hash(state: &GameState) -> u64 {
    let mut hasher = DefaultHasher::new();
    state.tick.hash(&mut hasher);

    state.units.len().hash(&mut hasher);
    for unit in state.units.iter() {
        unit.id.hash(&mut hasher);
        unit.class.hash(&mut hasher);
        unit.owner.hash(&mut hasher);
        unit.position.hash(&mut hasher);
        unit.hp.to_bits().hash(&mut hasher);
        unit.max_hp.to_bits().hash(&mut hasher);
        unit.attack.to_bits().hash(&mut hasher);
        unit.cooldown.hash(&mut hasher);
        unit.destination.hash(&mut hasher);
        unit.target.hash(&mut hasher);
        unit.kills.hash(&mut hasher);
        unit.hold_fire.hash(&mut hasher);
    }

    state.pois.len().hash(&mut hasher);
    for poi in state.pois.iter() {
        poi.id.hash(&mut hasher);
        poi.owner.hash(&mut hasher);
        poi.hp.to_bits().hash(&mut hasher);
    }

    for faction in state.factions.iter() {
        faction.id.hash(&mut hasher);
        faction.gold.hash(&mut hasher);
        faction.oil.hash(&mut hasher);
        faction.defeated.hash(&mut hasher);
        faction.relations.hash(&mut hasher);
    }

    for projectile in state.projectiles.active() {
        projectile.slot.hash(&mut hasher);
        projectile.progress.to_bits().hash(&mut hasher);
        projectile.to_pos.hash(&mut hasher);
    }

    hasher.finish()
}
