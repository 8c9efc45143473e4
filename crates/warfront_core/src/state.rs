//! The authoritative world snapshot.
//!
//! [`GameState`] is the only structure that is ever persisted, broadcast
//! or restored. Units, POIs and factions live in [`Arena`]s: dense
//! vectors kept sorted by id, so every pass over them runs in ascending
//! id order on every peer.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::components::{GameMessage, GameResult, Explosion, Poi, PoiId, Unit, UnitId};
use crate::config::SimConfig;
use crate::error::{GameError, Result};
use crate::factions::{Faction, FactionId};
use crate::math::GeoBounds;
use crate::projectiles::ProjectilePool;

/// Exact ids kept per namespace before the oldest fold into its floor.
pub const APPLIED_WINDOW: usize = 1024;

/// Ids minted by the engine stay below this; peers mint above it.
pub const PEER_NAMESPACE_SHIFT: u32 = 40;

// ============================================================================
// Applied-action ledger
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct AppliedNamespace {
    /// Every id at or below this counts as applied.
    floor: Option<u64>,
    ids: BTreeSet<u64>,
}

/// Dedup ids of every action applied so far.
///
/// Ids are grouped by namespace (`id >> PEER_NAMESPACE_SHIFT`), and each
/// sender mints increasing ids within its namespace. A namespace keeps its
/// newest [`APPLIED_WINDOW`] ids exactly; older ones fold into a floor.
/// Nothing applied is ever forgotten: an id below the floor reads as
/// applied, so a very late action that was never seen is dropped rather
/// than a seen one running twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedActions {
    namespaces: BTreeMap<u64, AppliedNamespace>,
}

impl AppliedActions {
    /// Whether `id` has been applied.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.namespaces
            .get(&(id >> PEER_NAMESPACE_SHIFT))
            .is_some_and(|ns| ns.floor.is_some_and(|floor| id <= floor) || ns.ids.contains(&id))
    }

    /// Record `id`. Returns false if it was already applied.
    pub fn insert(&mut self, id: u64) -> bool {
        if self.contains(id) {
            return false;
        }
        let ns = self.namespaces.entry(id >> PEER_NAMESPACE_SHIFT).or_default();
        ns.ids.insert(id);
        if ns.ids.len() > APPLIED_WINDOW {
            if let Some(oldest) = ns.ids.pop_first() {
                ns.floor = Some(ns.floor.map_or(oldest, |floor| floor.max(oldest)));
            }
        }
        true
    }

    /// Ids tracked exactly, across namespaces.
    #[must_use]
    pub fn exact_len(&self) -> usize {
        self.namespaces.values().map(|ns| ns.ids.len()).sum()
    }
}

/// Anything stored in an [`Arena`].
pub trait Keyed {
    /// Stable identifier.
    fn key(&self) -> u64;
}

impl Keyed for Unit {
    fn key(&self) -> u64 {
        self.id
    }
}

impl Keyed for Poi {
    fn key(&self) -> u64 {
        self.id
    }
}

impl Keyed for Faction {
    fn key(&self) -> u64 {
        u64::from(self.id.0)
    }
}

/// Dense storage sorted by id.
///
/// Lookups are binary searches; indices are stable within a tick as
/// long as nothing is inserted or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T: Keyed> Arena<T> {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Position of `id`, if stored.
    #[must_use]
    pub fn index_of(&self, id: u64) -> Option<usize> {
        self.items.binary_search_by_key(&id, Keyed::key).ok()
    }

    /// Insert an item. Returns `false` and drops it if the id is taken.
    pub fn insert(&mut self, item: T) -> bool {
        match self.items.binary_search_by_key(&item.key(), Keyed::key) {
            Ok(_) => false,
            Err(index) => {
                self.items.insert(index, item);
                true
            }
        }
    }

    /// Remove an item by id.
    pub fn remove(&mut self, id: u64) -> Option<T> {
        self.index_of(id).map(|index| self.items.remove(index))
    }

    /// Get an item by id.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&T> {
        self.index_of(id).map(|index| &self.items[index])
    }

    /// Get a mutable item by id.
    pub fn get_mut(&mut self, id: u64) -> Option<&mut T> {
        self.index_of(id).map(move |index| &mut self.items[index])
    }

    /// Check if an id is stored.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.index_of(id).is_some()
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in ascending id order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Mutable items in ascending id order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    /// Ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<u64> {
        self.items.iter().map(Keyed::key).collect()
    }

    /// Items as a slice, indexable by [`Self::index_of`].
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Mutable slice view.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    /// Keep only the items matching the predicate. Order is preserved.
    pub fn retain(&mut self, f: impl FnMut(&T) -> bool) {
        self.items.retain(f);
    }
}

impl<T: Keyed> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize> Serialize for Arena<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de> + Keyed> Deserialize<'de> for Arena<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let mut items = Vec::<T>::deserialize(deserializer)?;
        items.sort_by_key(Keyed::key);
        items.dedup_by_key(|item| item.key());
        Ok(Self { items })
    }
}

/// The full authoritative snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Living units.
    pub units: Arena<Unit>,
    /// Points of interest.
    pub pois: Arena<Poi>,
    /// Every faction ever created, including neutral.
    pub factions: Arena<Faction>,
    /// Shots in flight.
    pub projectiles: ProjectilePool,
    /// Presentation-only impacts.
    pub explosions: Vec<Explosion>,
    /// Event log, newest last.
    pub messages: VecDeque<GameMessage>,
    /// Ticks simulated so far.
    pub tick: u64,
    /// Scenario bounds.
    pub bounds: GeoBounds,
    /// Match outcome for the local faction.
    pub result: GameResult,
    /// The faction this peer plays.
    pub local_faction: Option<FactionId>,
    /// Counter for engine-minted ids.
    pub next_entity_id: u64,
    /// Dedup ids of applied actions.
    #[serde(default)]
    pub applied_actions: AppliedActions,
}

impl GameState {
    /// Create an empty world with only the neutral faction.
    #[must_use]
    pub fn new(bounds: GeoBounds) -> Self {
        let mut factions = Arena::new();
        factions.insert(Faction::new(
            FactionId::NEUTRAL,
            "Neutral",
            crate::factions::FactionKind::Neutral,
        ));
        Self {
            units: Arena::new(),
            pois: Arena::new(),
            factions,
            projectiles: ProjectilePool::default(),
            explosions: Vec::new(),
            messages: VecDeque::new(),
            tick: 0,
            bounds,
            result: GameResult::None,
            local_faction: None,
            next_entity_id: 1,
            applied_actions: AppliedActions::default(),
        }
    }

    /// Mint an engine-owned entity id, skipping any already in use.
    pub fn allocate_entity_id(&mut self) -> u64 {
        loop {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            if !self.units.contains(id) && !self.pois.contains(id) {
                return id;
            }
        }
    }

    /// Whether an action id was ever applied.
    #[must_use]
    pub fn was_applied(&self, action_id: u64) -> bool {
        self.applied_actions.contains(action_id)
    }

    /// Remember an applied action id.
    pub fn record_applied(&mut self, action_id: u64) {
        self.applied_actions.insert(action_id);
    }

    /// Look up a faction.
    #[must_use]
    pub fn faction(&self, id: FactionId) -> Option<&Faction> {
        self.factions.get(u64::from(id.0))
    }

    /// Look up a faction mutably.
    pub fn faction_mut(&mut self, id: FactionId) -> Option<&mut Faction> {
        self.factions.get_mut(u64::from(id.0))
    }

    /// Lowest faction id not yet in use.
    #[must_use]
    pub fn next_faction_id(&self) -> FactionId {
        let mut candidate = 1u16;
        for faction in self.factions.iter() {
            if faction.id.0 == candidate {
                candidate += 1;
            } else if faction.id.0 > candidate {
                break;
            }
        }
        FactionId(candidate)
    }

    /// Relation between two factions, as seen by `a`.
    #[must_use]
    pub fn relation(&self, a: FactionId, b: FactionId, default_relation: i8) -> i8 {
        if a == b {
            return 100;
        }
        self.faction(a)
            .map_or(default_relation, |f| f.relation_to(b, default_relation))
    }

    /// Set the relation between two factions on both sides.
    pub fn set_relation(&mut self, a: FactionId, b: FactionId, value: i8) {
        if a == b {
            return;
        }
        let value = value.clamp(-100, 100);
        if let Some(faction) = self.faction_mut(a) {
            faction.relations.insert(b, value);
        }
        if let Some(faction) = self.faction_mut(b) {
            faction.relations.insert(a, value);
        }
    }

    /// Whether two factions are at war.
    #[must_use]
    pub fn is_hostile(&self, a: FactionId, b: FactionId, config: &SimConfig) -> bool {
        a != b && self.relation(a, b, config.default_relation) <= config.war_threshold
    }

    /// Append to the event log, dropping the oldest past `cap`.
    pub fn push_message(&mut self, text: impl Into<String>, cap: usize) {
        self.messages.push_back(GameMessage {
            tick: self.tick,
            text: text.into(),
        });
        while self.messages.len() > cap {
            self.messages.pop_front();
        }
    }

    /// Number of living units owned by `faction`.
    #[must_use]
    pub fn unit_count(&self, faction: FactionId) -> usize {
        self.units.iter().filter(|u| u.owner == faction).count()
    }

    /// Cities owned by `faction`.
    pub fn cities_of(&self, faction: FactionId) -> impl Iterator<Item = &Poi> {
        self.pois
            .iter()
            .filter(move |p| p.is_city() && p.owner == faction)
    }

    /// Look up a unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id)
    }

    /// Look up a POI.
    #[must_use]
    pub fn poi(&self, id: PoiId) -> Option<&Poi> {
        self.pois.get(id)
    }

    /// Serialize to compact bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| GameError::InvalidState(e.to_string()))
    }

    /// Restore from [`Self::to_bytes`] output.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| GameError::InvalidState(e.to_string()))
    }

    /// Serialize to JSON, the wire and snapshot format.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| GameError::InvalidState(e.to_string()))
    }

    /// Restore from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| GameError::InvalidState(e.to_string()))
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(GeoBounds::world())
    }
}
