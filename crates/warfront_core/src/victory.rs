//! Victory and defeat evaluation.

use crate::components::GameResult;
use crate::config::SimConfig;
use crate::factions::{FactionId, FactionKind};
use crate::state::GameState;

/// Mark defeated factions and settle the local result.
///
/// Only established factions (those that have owned a city) can be
/// defeated; neutral and guard factions never are. Returns the factions
/// newly defeated this call.
pub fn run_victory_check(state: &mut GameState, config: &SimConfig) -> Vec<FactionId> {
    if state.tick % config.victory_check_interval_ticks != 0 {
        return Vec::new();
    }

    let mut newly_defeated = Vec::new();
    for faction in state.factions.iter() {
        if faction.defeated
            || !faction.established
            || faction.kind == FactionKind::Neutral
            || faction.guard_of.is_some()
        {
            continue;
        }
        let has_units = state.units.iter().any(|u| u.owner == faction.id);
        let has_cities = state.cities_of(faction.id).next().is_some();
        if !has_units && !has_cities {
            newly_defeated.push(faction.id);
        }
    }

    for id in &newly_defeated {
        let name = match state.faction_mut(*id) {
            Some(faction) => {
                faction.defeated = true;
                faction.name.clone()
            }
            None => continue,
        };
        state.push_message(format!("{name} has been defeated"), config.max_messages);
        tracing::info!(faction = %id, "faction defeated");
    }

    if state.result == GameResult::None {
        if let Some(local) = state.local_faction {
            state.result = evaluate_result(state, local);
        }
    }

    newly_defeated
}

/// Outcome of the match as `local` sees it right now.
///
/// Used directly when a snapshot from another peer replaces the world,
/// since the stored result belongs to whoever produced the snapshot.
#[must_use]
pub fn evaluate_result(state: &GameState, local: FactionId) -> GameResult {
    if state.faction(local).is_some_and(|f| f.defeated) {
        return GameResult::Defeat;
    }
    let mut rivals = state.factions.iter().filter(|f| {
        f.id != local && f.established && f.kind != FactionKind::Neutral && f.guard_of.is_none()
    });
    let mut any = false;
    let all_down = rivals.all(|f| {
        any = true;
        f.defeated
    });
    if any && all_down {
        GameResult::Victory
    } else {
        GameResult::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Poi, PoiKind, Unit};
    use crate::factions::Faction;
    use crate::math::{Fixed, GeoPoint};
    use crate::unit_class::UnitClass;

    fn origin() -> GeoPoint {
        GeoPoint::new(Fixed::ZERO, Fixed::ZERO)
    }

    fn setup() -> (GameState, SimConfig) {
        let mut state = GameState::default();
        for (id, kind) in [(1, FactionKind::Player), (2, FactionKind::Bot)] {
            let mut faction = Faction::new(FactionId(id), format!("F{id}"), kind);
            faction.established = true;
            state.factions.insert(faction);
        }
        state.local_faction = Some(FactionId(1));
        (state, SimConfig::default())
    }

    #[test]
    fn test_faction_without_units_or_cities_is_defeated() {
        let (mut state, config) = setup();
        state.units.insert(Unit::new(1, UnitClass::Tank, FactionId(2), origin()));
        let defeated = run_victory_check(&mut state, &config);
        assert_eq!(defeated, vec![FactionId(1)]);
        assert_eq!(state.result, GameResult::Defeat);
    }

    #[test]
    fn test_last_faction_standing_wins() {
        let (mut state, config) = setup();
        let mut city = Poi::new(5, PoiKind::City, "Home", origin(), 1);
        city.owner = FactionId(1);
        state.pois.insert(city);
        run_victory_check(&mut state, &config);
        assert_eq!(state.result, GameResult::Victory);
    }

    #[test]
    fn test_unestablished_and_guard_factions_are_ignored() {
        let (mut state, config) = setup();
        state.units.insert(Unit::new(1, UnitClass::Tank, FactionId(1), origin()));
        state.units.insert(Unit::new(2, UnitClass::Tank, FactionId(2), origin()));
        state.factions.insert(Faction::new(FactionId(3), "Newcomer", FactionKind::Player));
        let mut guard = Faction::new(FactionId(4), "Guard", FactionKind::Neutral);
        guard.guard_of = Some(FactionId::NEUTRAL);
        state.factions.insert(guard);

        assert!(run_victory_check(&mut state, &config).is_empty());
        assert_eq!(state.result, GameResult::None);
    }

    #[test]
    fn test_evaluate_result_is_per_faction() {
        let (mut state, _) = setup();
        state.faction_mut(FactionId(2)).unwrap().defeated = true;
        assert_eq!(evaluate_result(&state, FactionId(1)), GameResult::Victory);
        assert_eq!(evaluate_result(&state, FactionId(2)), GameResult::Defeat);
    }

    #[test]
    fn test_only_runs_on_interval() {
        let (mut state, config) = setup();
        state.tick = 1;
        assert!(run_victory_check(&mut state, &config).is_empty());
        assert!(!state.faction(FactionId(1)).unwrap().defeated);
    }
}
