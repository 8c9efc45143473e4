//! Unit classes and their base statistics.
//!
//! Every mobile unit and structure belongs to exactly one [`UnitClass`].
//! The class decides movement domain, weapon, cost and whether the unit
//! can take a POI by force. Stats are a static table so that every peer
//! derives identical units from the same spawn action.

use serde::{Deserialize, Serialize};

use crate::math::Fixed;

/// Unit class identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitClass {
    /// Line infantry. Cheap, slow, captures POIs.
    Infantry,
    /// Elite infantry. Captures POIs.
    SpecialForces,
    /// Main battle tank.
    Tank,
    /// Long-range ground artillery.
    Artillery,
    /// Attack helicopter.
    Helicopter,
    /// Air superiority fighter.
    Fighter,
    /// Strategic bomber.
    Bomber,
    /// Surface warship.
    Destroyer,
    /// Attack submarine.
    Submarine,
    /// Faction headquarters.
    CommandCenter,
    /// Ground production structure.
    MilitaryBase,
    /// Air production structure.
    Airbase,
    /// Naval production structure.
    Port,
    /// Launches strategic missiles.
    MissileSilo,
    /// Static anti-air battery.
    SamSite,
}

/// Where a class lives and moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitDomain {
    /// Moves over land and coast.
    Ground,
    /// Flies anywhere.
    Air,
    /// Moves over ocean and coast.
    Naval,
    /// Never moves.
    Structure,
}

/// Weapon family, which decides projectile behavior and valid targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeaponType {
    /// Small arms. Hit-scan.
    Rifle,
    /// Direct-fire gun.
    Cannon,
    /// Indirect artillery shell.
    Shell,
    /// Guided missile.
    Missile,
    /// Anti-ship torpedo.
    Torpedo,
    /// Gravity bomb.
    Bomb,
    /// Surface-to-air fire. Hit-scan.
    AntiAir,
    /// Silo-launched area weapon.
    Strategic,
}

impl WeaponType {
    /// Hit-scan weapons resolve in the tick they are fired.
    #[must_use]
    pub const fn is_hit_scan(self) -> bool {
        matches!(self, Self::Rifle | Self::AntiAir)
    }

    /// Progress per tick of a physical projectile, in permille.
    #[must_use]
    pub const fn projectile_speed_permille(self) -> u32 {
        match self {
            Self::Rifle | Self::AntiAir => 1000,
            Self::Cannon => 250,
            Self::Bomb => 200,
            Self::Missile => 150,
            Self::Shell => 100,
            Self::Torpedo => 80,
            Self::Strategic => 20,
        }
    }

    /// Whether this weapon can engage a unit of the given domain.
    #[must_use]
    pub const fn can_target(self, domain: UnitDomain) -> bool {
        match self {
            Self::Rifle => matches!(domain, UnitDomain::Ground | UnitDomain::Structure),
            Self::Cannon | Self::Shell | Self::Bomb => !matches!(domain, UnitDomain::Air),
            Self::Missile | Self::Strategic => true,
            Self::Torpedo => matches!(domain, UnitDomain::Naval),
            Self::AntiAir => matches!(domain, UnitDomain::Air),
        }
    }

    /// Whether this weapon can shell a POI. Torpedoes only reach offshore rigs.
    #[must_use]
    pub const fn can_target_poi(self, offshore: bool) -> bool {
        match self {
            Self::AntiAir => false,
            Self::Torpedo => offshore,
            _ => true,
        }
    }
}

/// Base statistics for a class, in integer units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitStats {
    /// Hit points.
    pub max_hp: u32,
    /// Attack value; zero means unarmed.
    pub attack: u32,
    /// Weapon range in metres.
    pub range_m: u32,
    /// Travel per tick in metres.
    pub speed_m: u32,
    /// Sight radius in metres.
    pub vision_m: u32,
    /// Ticks between shots.
    pub cooldown_ticks: u32,
    /// Gold cost.
    pub gold: u32,
    /// Oil cost.
    pub oil: u32,
    /// Weapon family.
    pub weapon: WeaponType,
}

const fn stats(
    max_hp: u32,
    attack: u32,
    range_m: u32,
    speed_m: u32,
    vision_m: u32,
    cooldown_ticks: u32,
    gold: u32,
    oil: u32,
    weapon: WeaponType,
) -> UnitStats {
    UnitStats {
        max_hp,
        attack,
        range_m,
        speed_m,
        vision_m,
        cooldown_ticks,
        gold,
        oil,
        weapon,
    }
}

impl UnitClass {
    /// Every class, in declaration order.
    pub const ALL: [Self; 15] = [
        Self::Infantry,
        Self::SpecialForces,
        Self::Tank,
        Self::Artillery,
        Self::Helicopter,
        Self::Fighter,
        Self::Bomber,
        Self::Destroyer,
        Self::Submarine,
        Self::CommandCenter,
        Self::MilitaryBase,
        Self::Airbase,
        Self::Port,
        Self::MissileSilo,
        Self::SamSite,
    ];

    /// Movement domain.
    #[must_use]
    pub const fn domain(self) -> UnitDomain {
        match self {
            Self::Infantry | Self::SpecialForces | Self::Tank | Self::Artillery => {
                UnitDomain::Ground
            }
            Self::Helicopter | Self::Fighter | Self::Bomber => UnitDomain::Air,
            Self::Destroyer | Self::Submarine => UnitDomain::Naval,
            Self::CommandCenter
            | Self::MilitaryBase
            | Self::Airbase
            | Self::Port
            | Self::MissileSilo
            | Self::SamSite => UnitDomain::Structure,
        }
    }

    /// Base statistics.
    #[must_use]
    pub const fn stats(self) -> UnitStats {
        use WeaponType::{AntiAir, Bomb, Cannon, Missile, Rifle, Shell, Torpedo};
        match self {
            Self::Infantry => stats(120, 10, 3_000, 40, 8_000, 30, 100, 0, Rifle),
            Self::SpecialForces => stats(150, 18, 4_000, 55, 12_000, 25, 250, 0, Rifle),
            Self::Tank => stats(400, 35, 6_000, 50, 10_000, 45, 300, 50, Cannon),
            Self::Artillery => stats(200, 50, 25_000, 30, 12_000, 90, 400, 60, Shell),
            Self::Helicopter => stats(250, 30, 8_000, 120, 20_000, 40, 500, 100, Missile),
            Self::Fighter => stats(220, 28, 15_000, 300, 40_000, 30, 700, 150, Missile),
            Self::Bomber => stats(350, 80, 5_000, 200, 30_000, 120, 900, 200, Bomb),
            Self::Destroyer => stats(800, 45, 20_000, 80, 30_000, 60, 800, 150, Cannon),
            Self::Submarine => stats(500, 60, 12_000, 70, 15_000, 90, 700, 120, Torpedo),
            Self::CommandCenter => stats(2_000, 20, 8_000, 0, 20_000, 40, 2_000, 0, Cannon),
            Self::MilitaryBase => stats(1_500, 0, 0, 0, 10_000, 0, 800, 0, Cannon),
            Self::Airbase => stats(1_500, 0, 0, 0, 10_000, 0, 1_000, 100, Cannon),
            Self::Port => stats(1_500, 0, 0, 0, 10_000, 0, 900, 50, Cannon),
            Self::MissileSilo => stats(1_000, 0, 0, 0, 10_000, 0, 1_500, 300, Cannon),
            Self::SamSite => stats(600, 40, 30_000, 0, 40_000, 30, 600, 50, AntiAir),
        }
    }

    /// Whether the class can move.
    #[must_use]
    pub const fn is_mobile(self) -> bool {
        !matches!(self.domain(), UnitDomain::Structure)
    }

    /// Whether the class is a structure.
    #[must_use]
    pub const fn is_structure(self) -> bool {
        matches!(self.domain(), UnitDomain::Structure)
    }

    /// Whether the class is naval.
    #[must_use]
    pub const fn is_naval(self) -> bool {
        matches!(self.domain(), UnitDomain::Naval)
    }

    /// Whether the class counts as infantry for planning and capture.
    #[must_use]
    pub const fn is_infantry(self) -> bool {
        matches!(self, Self::Infantry | Self::SpecialForces)
    }

    /// Whether units of this class take POIs by force.
    #[must_use]
    pub const fn can_capture(self) -> bool {
        self.is_infantry()
    }

    /// Travel per tick in km.
    #[must_use]
    pub fn speed_km(self) -> Fixed {
        Fixed::from_num(self.stats().speed_m) / Fixed::from_num(1000)
    }

    /// Weapon range in km.
    #[must_use]
    pub fn range_km(self) -> Fixed {
        Fixed::from_num(self.stats().range_m) / Fixed::from_num(1000)
    }

    /// Sight radius in km.
    #[must_use]
    pub fn vision_km(self) -> Fixed {
        Fixed::from_num(self.stats().vision_m) / Fixed::from_num(1000)
    }

    /// Combat classes a bot may produce.
    pub const COMBAT: [Self; 7] = [
        Self::Tank,
        Self::Artillery,
        Self::Helicopter,
        Self::Fighter,
        Self::Bomber,
        Self::Destroyer,
        Self::Submarine,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_infantry_captures() {
        for class in UnitClass::ALL {
            assert_eq!(class.can_capture(), class.is_infantry(), "{class:?}");
        }
    }

    #[test]
    fn test_structures_do_not_move() {
        for class in UnitClass::ALL {
            if class.is_structure() {
                assert_eq!(class.stats().speed_m, 0, "{class:?}");
            } else {
                assert!(class.stats().speed_m > 0, "{class:?}");
            }
        }
    }

    #[test]
    fn test_weapon_targeting_matrix() {
        assert!(!WeaponType::Rifle.can_target(UnitDomain::Air));
        assert!(WeaponType::AntiAir.can_target(UnitDomain::Air));
        assert!(!WeaponType::AntiAir.can_target(UnitDomain::Ground));
        assert!(WeaponType::Torpedo.can_target(UnitDomain::Naval));
        assert!(!WeaponType::Torpedo.can_target(UnitDomain::Ground));
        assert!(WeaponType::Torpedo.can_target_poi(true));
        assert!(!WeaponType::Torpedo.can_target_poi(false));
    }

    #[test]
    fn test_class_serializes_screaming_snake() {
        let json = serde_json::to_string(&UnitClass::MilitaryBase).unwrap();
        assert_eq!(json, "\"MILITARY_BASE\"");
    }
}
