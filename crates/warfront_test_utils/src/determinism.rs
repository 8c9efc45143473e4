//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Every peer runs the same tick on the same action stream, so the
//! simulation must be bit-for-bit reproducible. Sources of
//! non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`warfront_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   State lives in id-sorted arenas and is always walked in id order.
//!
//! - **System randomness**: AI choices come from a seeded `ChaCha8Rng`.
//!
//! - **Wall clock**: The engine never reads the time; `now_ms` is an input.

use std::thread;

use warfront_core::actions::GameAction;
use warfront_core::ai::{AiConfig, AiContext};
use warfront_core::simulation::Simulation;
use warfront_core::state::GameState;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// `step` receives the state and the zero-based tick number.
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u64),
    HashFn: Fn(&S) -> u64,
{
    let hashes: Vec<u64> = (0..runs)
        .map(|_| {
            let mut state = setup();
            for tick in 0..ticks {
                step(&mut state, tick);
            }
            hash(&state)
        })
        .collect();

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// A simulation driven by the host AI, with a scripted action stream.
pub struct HostRun {
    /// The simulation.
    pub sim: Simulation,
    /// The host AI.
    pub ai: AiContext,
    script: Vec<(u64, GameAction)>,
}

impl HostRun {
    /// Start a run from `state` with an AI seeded by `seed`.
    #[must_use]
    pub fn new(state: GameState, seed: u64) -> Self {
        Self {
            sim: Simulation::new(state),
            ai: AiContext::new(seed, AiConfig::default()),
            script: Vec::new(),
        }
    }

    /// Queue `action` as pending input of `tick`.
    #[must_use]
    pub fn with_action(mut self, tick: u64, action: GameAction) -> Self {
        self.script.push((tick, action));
        self
    }

    /// Advance one tick, feeding scripted actions due now.
    pub fn step(&mut self) {
        let tick = self.sim.get_tick();
        let pending: Vec<GameAction> = self
            .script
            .iter()
            .filter(|(at, _)| *at == tick)
            .map(|(_, action)| action.clone())
            .collect();
        let now_ms = tick * self.sim.config().tick_ms;
        self.sim.tick(pending, now_ms, Some(&mut self.ai));
    }

    /// Advance `ticks` ticks.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }
}

/// Run an AI-driven world twice with the same seed and compare hashes.
pub fn verify_host_determinism<F>(setup_fn: F, seed: u64, num_ticks: u64) -> DeterminismResult
where
    F: Fn() -> GameState,
{
    verify_determinism(
        2,
        num_ticks,
        || HostRun::new(setup_fn(), seed),
        |run, _| run.step(),
        |run| run.sim.state_hash(),
    )
}

/// Run a world without AI twice and compare hashes.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim, tick| {
            let now_ms = tick * sim.config().tick_ms;
            sim.tick(Vec::new(), now_ms, None);
        },
        Simulation::state_hash,
    )
    .is_deterministic
}

/// Run `num_sims` AI-driven worlds on separate threads and collect the
/// final hashes.
///
/// Catches non-determinism that only shows under different thread
/// scheduling or memory layout.
pub fn run_parallel_hosts<F>(setup_fn: F, seed: u64, num_sims: usize, num_ticks: u64) -> Vec<u64>
where
    F: Fn() -> GameState + Sync,
{
    thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut run = HostRun::new(setup_fn(), seed);
                    run.run(num_ticks);
                    run.sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_default())
            .collect()
    })
}

/// Compare two AI-driven runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if the runs agree, `Some(tick)` for the first tick whose
/// resulting hash differs.
pub fn find_first_divergence<F>(setup_fn: F, seed: u64, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> GameState,
{
    let mut a = HostRun::new(setup_fn(), seed);
    let mut b = HostRun::new(setup_fn(), seed);

    if a.sim.state_hash() != b.sim.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        a.step();
        b.step();
        if a.sim.state_hash() != b.sim.state_hash() {
            tracing::warn!(tick, "runs diverged");
            return Some(tick);
        }
    }

    None
}

/// Verify that both state encodings preserve the simulation exactly.
pub fn verify_serialization_determinism<F>(setup_fn: F, seed: u64, num_ticks: u64) -> bool
where
    F: Fn() -> GameState,
{
    let mut run = HostRun::new(setup_fn(), seed);
    run.run(num_ticks);
    let state = run.sim.state();

    let Ok(bytes) = state.to_bytes() else {
        return false;
    };
    let Ok(from_bytes) = GameState::from_bytes(&bytes) else {
        return false;
    };
    let Ok(json) = state.to_json() else {
        return false;
    };
    let Ok(from_json) = GameState::from_json(&json) else {
        return false;
    };

    &from_bytes == state && &from_json == state
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of the simulation.
pub mod strategies {
    use proptest::prelude::*;
    use warfront_core::actions::{ActionKind, GameAction};
    use warfront_core::components::{Formation, TargetRef, UnitId};
    use warfront_core::factions::FactionId;
    use warfront_core::math::GeoPoint;
    use warfront_core::unit_class::UnitClass;

    use crate::fixtures::point;

    /// A point within two degrees of the origin.
    pub fn arb_point() -> impl Strategy<Value = GeoPoint> {
        (-2_000i32..2_000, -2_000i32..2_000).prop_map(|(lat, lng)| point(lat, lng))
    }

    /// A point within a few kilometres of `(lat, lng)` milli-degrees.
    pub fn arb_point_near(lat: i32, lng: i32) -> impl Strategy<Value = GeoPoint> {
        (-30i32..30, -30i32..30).prop_map(move |(dy, dx)| point(lat + dy, lng + dx))
    }

    /// Any mobile class.
    pub fn arb_mobile_class() -> impl Strategy<Value = UnitClass> {
        let mobile: Vec<UnitClass> = UnitClass::ALL.into_iter().filter(|c| c.is_mobile()).collect();
        proptest::sample::select(mobile)
    }

    /// Any class, mobile or structure.
    pub fn arb_unit_class() -> impl Strategy<Value = UnitClass> {
        proptest::sample::select(UnitClass::ALL.to_vec())
    }

    /// Any formation.
    pub fn arb_formation() -> impl Strategy<Value = Formation> {
        prop_oneof![
            Just(Formation::Line),
            Just(Formation::Column),
            Just(Formation::Wedge),
            Just(Formation::Box),
        ]
    }

    /// A payload touching the given units, valid or not.
    pub fn arb_action_kind(unit_ids: Vec<UnitId>) -> impl Strategy<Value = ActionKind> {
        let ids = proptest::sample::subsequence(unit_ids.clone(), 0..=unit_ids.len());
        let target_ids = proptest::sample::select(if unit_ids.is_empty() { vec![0] } else { unit_ids });
        prop_oneof![
            (arb_mobile_class(), arb_point_near(0, 0)).prop_map(|(class, position)| ActionKind::SpawnUnit {
                unit_id: None,
                class,
                position,
            }),
            (ids.clone(), arb_point(), proptest::option::of(arb_formation()), any::<bool>()).prop_map(
                |(unit_ids, destination, formation, boost)| ActionKind::MoveUnits {
                    unit_ids,
                    destination,
                    formation,
                    boost,
                }
            ),
            (ids.clone(), target_ids).prop_map(|(unit_ids, target)| ActionKind::SetTarget {
                unit_ids,
                target: TargetRef::Unit(target),
            }),
            ids.clone().prop_map(|unit_ids| ActionKind::HoldPosition { unit_ids }),
            (ids, arb_formation()).prop_map(|(unit_ids, formation)| ActionKind::SetFormation {
                unit_ids,
                formation,
            }),
            Just(ActionKind::Unknown),
        ]
    }

    /// A stream of actions from actors 1 and 2 with distinct dedup ids.
    pub fn arb_action_stream(unit_ids: Vec<UnitId>, max_len: usize) -> impl Strategy<Value = Vec<GameAction>> {
        proptest::collection::vec((1u16..=2, arb_action_kind(unit_ids)), 0..max_len).prop_map(|items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (actor, payload))| GameAction::new(i as u64 + 1, FactionId(actor), 0, payload))
                .collect()
        })
    }
}
