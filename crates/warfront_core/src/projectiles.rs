//! Projectile lifecycle.
//!
//! Shots are stored in a [`ProjectilePool`] whose slots are reused, so a
//! long battle does not grow the state. Damage from ordinary weapons is
//! applied when they fire; the projectile is a presentation record that
//! ends in an explosion. Strategic missiles carry a [`Payload`] and deal
//! their damage on arrival.

use serde::{Deserialize, Serialize};

use crate::components::{Explosion, Payload, Projectile, TargetRef, UnitId};
use crate::config::SimConfig;
use crate::math::{Fixed, GeoPoint};
use crate::state::GameState;
use crate::unit_class::WeaponType;

/// Reusable projectile slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectilePool {
    slots: Vec<Projectile>,
}

/// Parameters of a new shot.
#[derive(Debug, Clone, Copy)]
pub struct Launch {
    /// Firing unit.
    pub from_id: UnitId,
    /// Struck entity.
    pub to: Option<TargetRef>,
    /// Launch point.
    pub from_pos: GeoPoint,
    /// Impact point.
    pub to_pos: GeoPoint,
    /// Weapon family.
    pub weapon: WeaponType,
    /// Area damage on arrival.
    pub payload: Option<Payload>,
}

impl ProjectilePool {
    /// Occupy the lowest free slot (growing the pool if none) and return it.
    pub fn spawn(&mut self, launch: Launch, speed: Fixed) -> u32 {
        let projectile = |slot: u32| Projectile {
            slot,
            active: true,
            from_id: launch.from_id,
            to: launch.to,
            from_pos: launch.from_pos,
            to_pos: launch.to_pos,
            weapon: launch.weapon,
            progress: Fixed::ZERO,
            speed,
            hit: false,
            payload: launch.payload,
        };

        if let Some(index) = self.slots.iter().position(|p| !p.active) {
            let slot = index as u32;
            self.slots[index] = projectile(slot);
            slot
        } else {
            let slot = self.slots.len() as u32;
            self.slots.push(projectile(slot));
            slot
        }
    }

    /// Free a slot for reuse.
    pub fn release(&mut self, slot: u32) {
        if let Some(projectile) = self.slots.get_mut(slot as usize) {
            projectile.active = false;
        }
    }

    /// Shots in flight.
    pub fn active(&self) -> impl Iterator<Item = &Projectile> {
        self.slots.iter().filter(|p| p.active)
    }

    /// Number of shots in flight.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Allocated slots, in flight or not.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// Move every projectile one tick forward.
///
/// Returns the impact points of projectiles that landed this tick.
pub fn advance_projectiles(state: &mut GameState, config: &SimConfig) -> Vec<GeoPoint> {
    let mut impacts = Vec::new();
    let mut detonations: Vec<(GeoPoint, Payload)> = Vec::new();

    for projectile in state.projectiles.slots.iter_mut().filter(|p| p.active) {
        if projectile.weapon.is_hit_scan() {
            projectile.progress = Fixed::ONE;
        } else {
            projectile.progress = (projectile.progress + projectile.speed).min(Fixed::ONE);
        }
        if projectile.progress < Fixed::ONE {
            continue;
        }

        projectile.hit = true;
        projectile.active = false;
        impacts.push(projectile.to_pos);

        if projectile.weapon.is_hit_scan() {
            continue;
        }
        let radius = projectile
            .payload
            .map_or(Fixed::from_num(3) / Fixed::from_num(10), |p| p.radius);
        state.explosions.push(Explosion {
            position: projectile.to_pos,
            radius,
            remaining_ticks: config.explosion_ticks,
        });
        if let Some(payload) = projectile.payload {
            detonations.push((projectile.to_pos, payload));
        }
    }

    for (center, payload) in detonations {
        apply_area_damage(state, center, payload);
    }

    impacts
}

/// Damage falls off linearly from full at the centre to zero at the edge.
fn apply_area_damage(state: &mut GameState, center: GeoPoint, payload: Payload) {
    let falloff = |distance: Fixed| {
        if distance >= payload.radius || payload.radius == Fixed::ZERO {
            Fixed::ZERO
        } else {
            payload.damage * (Fixed::ONE - distance / payload.radius)
        }
    };

    let mut struck = 0usize;
    for unit in state.units.iter_mut() {
        if unit.owner == payload.owner {
            continue;
        }
        let damage = falloff(center.distance_km(unit.position));
        if damage > Fixed::ZERO {
            unit.take_damage(damage);
            struck += 1;
        }
    }

    let tick = state.tick;
    for poi in state.pois.iter_mut() {
        if poi.owner == payload.owner {
            continue;
        }
        let damage = falloff(center.distance_km(poi.position));
        if damage > Fixed::ZERO {
            poi.take_damage(damage);
            poi.last_damaged_tick = Some(tick);
        }
    }

    tracing::info!(owner = %payload.owner, struck, "strategic missile detonated");
}

/// Age explosions and drop the expired ones.
pub fn age_explosions(state: &mut GameState) {
    for explosion in &mut state.explosions {
        explosion.remaining_ticks = explosion.remaining_ticks.saturating_sub(1);
    }
    state.explosions.retain(|e| e.remaining_ticks > 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Unit;
    use crate::factions::FactionId;
    use crate::unit_class::UnitClass;

    fn point(lat: i32, lng: i32) -> GeoPoint {
        GeoPoint::new(Fixed::from_num(lat), Fixed::from_num(lng))
    }

    fn launch(weapon: WeaponType, payload: Option<Payload>) -> Launch {
        Launch {
            from_id: 1,
            to: None,
            from_pos: point(0, 0),
            to_pos: point(0, 1),
            weapon,
            payload,
        }
    }

    #[test]
    fn test_slots_are_reused() {
        let mut pool = ProjectilePool::default();
        let a = pool.spawn(launch(WeaponType::Cannon, None), Fixed::ONE);
        let b = pool.spawn(launch(WeaponType::Cannon, None), Fixed::ONE);
        assert_eq!((a, b), (0, 1));
        pool.release(a);
        let c = pool.spawn(launch(WeaponType::Shell, None), Fixed::ONE);
        assert_eq!(c, 0);
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn test_hit_scan_resolves_in_one_tick() {
        let mut state = GameState::default();
        let config = SimConfig::default();
        state
            .projectiles
            .spawn(launch(WeaponType::Rifle, None), Fixed::from_num(1) / Fixed::from_num(100));
        let impacts = advance_projectiles(&mut state, &config);
        assert_eq!(impacts.len(), 1);
        assert_eq!(state.projectiles.active_count(), 0);
        assert!(state.explosions.is_empty());
    }

    #[test]
    fn test_physical_projectile_explodes_on_arrival() {
        let mut state = GameState::default();
        let config = SimConfig::default();
        state
            .projectiles
            .spawn(launch(WeaponType::Cannon, None), Fixed::from_num(1) / Fixed::from_num(4));
        for _ in 0..3 {
            assert!(advance_projectiles(&mut state, &config).is_empty());
        }
        assert_eq!(advance_projectiles(&mut state, &config).len(), 1);
        assert_eq!(state.explosions.len(), 1);
        assert_eq!(state.projectiles.active_count(), 0);
    }

    #[test]
    fn test_strategic_payload_spares_owner() {
        let mut state = GameState::default();
        let config = SimConfig::default();
        let target = point(0, 1);
        state.units.insert(Unit::new(10, UnitClass::Tank, FactionId(2), target));
        state.units.insert(Unit::new(11, UnitClass::Tank, FactionId(1), target));
        let payload = Payload {
            radius: Fixed::from_num(15),
            damage: Fixed::from_num(100),
            owner: FactionId(1),
        };
        state.projectiles.spawn(launch(WeaponType::Strategic, Some(payload)), Fixed::ONE);
        advance_projectiles(&mut state, &config);
        assert_eq!(state.units.get(10).map(|u| u.hp), Some(Fixed::from_num(300)));
        assert_eq!(state.units.get(11).map(|u| u.hp), Some(Fixed::from_num(400)));
    }

    #[test]
    fn test_explosions_expire() {
        let mut state = GameState::default();
        state.explosions.push(Explosion {
            position: point(0, 0),
            radius: Fixed::ONE,
            remaining_ticks: 2,
        });
        age_explosions(&mut state);
        assert_eq!(state.explosions.len(), 1);
        age_explosions(&mut state);
        assert!(state.explosions.is_empty());
    }
}
