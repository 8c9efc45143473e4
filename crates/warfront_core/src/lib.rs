//! # Warfront Core
//!
//! Deterministic world simulation for Warfront, a real-time strategy game
//! played on a geographic map.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No transport
//! - No wall clock (callers pass `now_ms`)
//! - No system randomness (AI uses a seeded generator)
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - Optimistic peer-to-peer sync (every peer runs the same tick)
//! - A headless phantom host
//! - Replay systems
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`state`] - World state and id-sorted arenas
//! - [`simulation`] - The tick pipeline
//! - [`actions`] - Typed player and bot commands and their resolver
//! - [`movement`], [`combat`], [`capture`], [`economy`], [`victory`] - Tick stages
//! - [`ai`] - Wave director and faction bot brains
//! - [`spatial`] - Uniform spatial hash over the map
//! - [`terrain`] - Land/sea and territory oracles
//! - [`scenario`] - World seeding
//! - [`replay`] - Recording and verifying games
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod actions;
pub mod ai;
pub mod capture;
pub mod combat;
pub mod components;
pub mod config;
pub mod economy;
pub mod error;
pub mod factions;
pub mod math;
pub mod movement;
pub mod projectiles;
pub mod replay;
pub mod scenario;
pub mod simulation;
pub mod spatial;
pub mod state;
pub mod terrain;
pub mod unit_class;
pub mod victory;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::actions::{ActionKind, ActionOutcome, GameAction, RejectReason};
    pub use crate::ai::{AiConfig, AiContext};
    pub use crate::components::*;
    pub use crate::config::SimConfig;
    pub use crate::error::{GameError, Result};
    pub use crate::factions::{Faction, FactionId, FactionKind, Personality};
    pub use crate::math::{Fixed, GeoBounds, GeoPoint, Vec2Fixed};
    pub use crate::replay::{Replay, ReplayPlayer};
    pub use crate::scenario::{ScenarioData, WorldGenerator};
    pub use crate::simulation::{Simulation, TickEvents};
    pub use crate::state::GameState;
    pub use crate::terrain::{NoTerritory, OpenTerrain, TerrainOracle, TerritoryOracle};
    pub use crate::unit_class::UnitClass;
}
