//! Periodic resource income.
//!
//! All calculations use integer math for deterministic simulation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::PoiKind;
use crate::config::SimConfig;
use crate::factions::FactionId;
use crate::state::GameState;

/// Gold and oil paid to one faction in one income step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Income {
    /// Gold paid.
    pub gold: u32,
    /// Oil paid.
    pub oil: u32,
}

impl std::ops::AddAssign for Income {
    fn add_assign(&mut self, rhs: Self) {
        self.gold = self.gold.saturating_add(rhs.gold);
        self.oil = self.oil.saturating_add(rhs.oil);
    }
}

/// Income a POI of `kind` and `tier` pays per step.
#[must_use]
pub fn poi_income(kind: PoiKind, tier: u8, config: &SimConfig) -> Income {
    let multiplier = config.tier_multiplier(tier);
    match kind {
        PoiKind::City => Income {
            gold: config.city_gold * multiplier,
            oil: 0,
        },
        PoiKind::GoldMine => Income {
            gold: config.gold_mine_gold * multiplier,
            oil: 0,
        },
        PoiKind::OilRig => Income {
            gold: 0,
            oil: config.oil_rig_oil * multiplier,
        },
    }
}

/// Income every faction would receive from its current holdings.
#[must_use]
pub fn income_by_faction(state: &GameState, config: &SimConfig) -> BTreeMap<FactionId, Income> {
    let mut totals: BTreeMap<FactionId, Income> = BTreeMap::new();
    for poi in state.pois.iter().filter(|p| !p.owner.is_neutral()) {
        *totals.entry(poi.owner).or_default() += poi_income(poi.kind, poi.tier, config);
    }
    totals
}

/// Pay income if this tick is an income tick.
///
/// Returns the amounts paid, keyed by faction.
pub fn run_income(state: &mut GameState, config: &SimConfig) -> BTreeMap<FactionId, Income> {
    if state.tick == 0 || state.tick % config.income_interval_ticks != 0 {
        return BTreeMap::new();
    }
    let totals = income_by_faction(state, config);
    for (faction_id, income) in &totals {
        if let Some(faction) = state.faction_mut(*faction_id) {
            if faction.defeated {
                continue;
            }
            faction.gold = faction.gold.saturating_add(income.gold);
            faction.oil = faction.oil.saturating_add(income.oil);
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Poi;
    use crate::factions::{Faction, FactionKind};
    use crate::math::{Fixed, GeoPoint};

    fn setup() -> (GameState, SimConfig) {
        let mut state = GameState::default();
        state.factions.insert(Faction::new(FactionId(1), "A", FactionKind::Bot));
        let origin = GeoPoint::new(Fixed::ZERO, Fixed::ZERO);
        let mut capital = Poi::new(1, PoiKind::City, "Capital", origin, 1);
        capital.owner = FactionId(1);
        let mut rig = Poi::new(2, PoiKind::OilRig, "Rig", origin, 2);
        rig.owner = FactionId(1);
        state.pois.insert(capital);
        state.pois.insert(rig);
        state.pois.insert(Poi::new(3, PoiKind::GoldMine, "Unclaimed", origin, 1));
        (state, SimConfig::default())
    }

    #[test]
    fn test_income_is_tier_weighted() {
        let (state, config) = setup();
        let totals = income_by_faction(&state, &config);
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[&FactionId(1)], Income { gold: 30, oil: 16 });
    }

    #[test]
    fn test_income_only_on_interval() {
        let (mut state, config) = setup();
        state.tick = config.income_interval_ticks - 1;
        assert!(run_income(&mut state, &config).is_empty());
        state.tick = config.income_interval_ticks;
        run_income(&mut state, &config);
        let faction = state.faction(FactionId(1)).unwrap();
        assert_eq!((faction.gold, faction.oil), (30, 16));
    }
}
