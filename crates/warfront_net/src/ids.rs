//! Peer-side id minting.
//!
//! A peer stamps its own actions and the units they create with ids in
//! the namespace `faction << 40`, so two peers never mint the same id and
//! engine ids (below `1 << 40`) and AI ids (top bit set) stay disjoint.

use warfront_core::factions::FactionId;
use warfront_core::state::{GameState, PEER_NAMESPACE_SHIFT};

/// Mints action and unit ids for one faction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocator {
    faction: FactionId,
    next_action: u64,
    next_unit: u64,
}

impl IdAllocator {
    /// Allocator for `faction`, starting at sequence 1.
    #[must_use]
    pub fn new(faction: FactionId) -> Self {
        Self {
            faction,
            next_action: 1,
            next_unit: 1,
        }
    }

    /// Faction whose namespace this allocator mints in.
    #[must_use]
    pub fn faction(&self) -> FactionId {
        self.faction
    }

    /// Move to another faction's namespace, as after a join.
    pub fn rebind(&mut self, faction: FactionId) {
        *self = Self::new(faction);
    }

    fn base(&self) -> u64 {
        u64::from(self.faction.0) << PEER_NAMESPACE_SHIFT
    }

    /// Next dedup id for an outgoing action, skipping ids the state has
    /// already seen (a reloaded peer restarts its counter).
    pub fn next_action_id(&mut self, state: &GameState) -> u64 {
        loop {
            let id = self.base() | self.next_action;
            self.next_action += 1;
            if !state.was_applied(id) {
                return id;
            }
        }
    }

    /// Next unit id, skipping ids already present in the state.
    pub fn next_unit_id(&mut self, state: &GameState) -> u64 {
        loop {
            let id = self.base() | self.next_unit;
            self.next_unit += 1;
            if !state.units.contains(id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warfront_core::components::Unit;
    use warfront_core::math::{GeoBounds, GeoPoint};
    use warfront_core::unit_class::UnitClass;

    fn empty() -> GameState {
        GameState::new(GeoBounds::from_degrees(-1, 1, -1, 1))
    }

    #[test]
    fn test_namespaces_are_disjoint() {
        let state = empty();
        let mut red = IdAllocator::new(FactionId(1));
        let mut blue = IdAllocator::new(FactionId(2));
        let a = red.next_unit_id(&state);
        let b = blue.next_unit_id(&state);
        assert_eq!(a, (1 << 40) | 1);
        assert_eq!(b, (2 << 40) | 1);
        assert_eq!(red.next_unit_id(&state), (1 << 40) | 2);
    }

    #[test]
    fn test_skips_existing_units() {
        let mut state = empty();
        state.units.insert(Unit::new(
            (3 << 40) | 1,
            UnitClass::Infantry,
            FactionId(3),
            GeoPoint::from_micro_degrees(0, 0),
        ));
        let mut ids = IdAllocator::new(FactionId(3));
        assert_eq!(ids.next_unit_id(&state), (3 << 40) | 2);
    }

    #[test]
    fn test_skips_applied_actions() {
        let mut state = empty();
        state.record_applied((1 << 40) | 1);
        state.record_applied((1 << 40) | 2);
        let mut ids = IdAllocator::new(FactionId(1));
        assert_eq!(ids.next_action_id(&state), (1 << 40) | 3);
    }

    #[test]
    fn test_rebind_restarts() {
        let state = empty();
        let mut ids = IdAllocator::new(FactionId(1));
        ids.next_action_id(&state);
        ids.rebind(FactionId(9));
        assert_eq!(ids.faction(), FactionId(9));
        assert_eq!(ids.next_action_id(&state), (9 << 40) | 1);
    }
}
