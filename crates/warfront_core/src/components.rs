//! World entity definitions.
//!
//! Entities are plain data. Behavior lives in the systems that run
//! during [`crate::simulation::Simulation::tick`].

use serde::{Deserialize, Serialize};

use crate::factions::FactionId;
use crate::math::{fixed_serde, Fixed, GeoPoint, Vec2Fixed};
use crate::unit_class::{UnitClass, WeaponType};

/// Unique identifier for units.
pub type UnitId = u64;

/// Unique identifier for points of interest.
pub type PoiId = u64;

// ============================================================================
// Units
// ============================================================================

/// What a unit is shooting at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetRef {
    /// Another unit.
    Unit(UnitId),
    /// A point of interest.
    Poi(PoiId),
}

/// Standing behavior for units without explicit orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutoMode {
    /// Engage anything hostile within vision.
    Aggressive,
    /// Engage within range, walk back to the anchor when idle.
    Defend {
        /// Point to return to.
        anchor: GeoPoint,
    },
}

/// Group arrangement for move orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Formation {
    /// Side by side.
    #[default]
    Line,
    /// One behind another.
    Column,
    /// Arrowhead with the first unit at the tip.
    Wedge,
    /// Square block.
    Box,
}

impl Formation {
    /// Offsets (km east, km north) for `count` units, relative to the
    /// order's destination.
    #[must_use]
    pub fn offsets(self, count: usize, spacing: Fixed) -> Vec<Vec2Fixed> {
        let half = spacing / Fixed::from_num(2);
        (0..count)
            .map(|i| {
                let i = i as i32;
                let n = count as i32;
                match self {
                    Self::Line => Vec2Fixed::new(half * Fixed::from_num(2 * i - (n - 1)), Fixed::ZERO),
                    Self::Column => Vec2Fixed::new(Fixed::ZERO, -spacing * Fixed::from_num(i)),
                    Self::Wedge => {
                        let rank = (i + 1) / 2;
                        let side = if i % 2 == 1 { -1 } else { 1 };
                        Vec2Fixed::new(
                            spacing * Fixed::from_num(side * rank),
                            -spacing * Fixed::from_num(rank),
                        )
                    }
                    Self::Box => {
                        let mut cols = 1;
                        while cols * cols < n {
                            cols += 1;
                        }
                        Vec2Fixed::new(
                            half * Fixed::from_num(2 * (i % cols) - (cols - 1)),
                            -spacing * Fixed::from_num(i / cols),
                        )
                    }
                }
            })
            .collect()
    }
}

/// A mobile or static military asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Identifier, assigned by the sender of the creating action.
    pub id: UnitId,
    /// Class.
    pub class: UnitClass,
    /// Owning faction.
    pub owner: FactionId,
    /// Current location.
    pub position: GeoPoint,
    /// Compass heading in degrees.
    #[serde(with = "fixed_serde")]
    pub heading: Fixed,
    /// Current hit points.
    #[serde(with = "fixed_serde")]
    pub hp: Fixed,
    /// Maximum hit points.
    #[serde(with = "fixed_serde")]
    pub max_hp: Fixed,
    /// Attack value.
    #[serde(with = "fixed_serde")]
    pub attack: Fixed,
    /// Weapon range in km.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Travel per tick in km.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Sight radius in km.
    #[serde(with = "fixed_serde")]
    pub vision: Fixed,
    /// Ticks until the weapon is ready.
    pub cooldown: u32,
    /// Where the unit is walking to.
    pub destination: Option<GeoPoint>,
    /// What the unit is attacking.
    pub target: Option<TargetRef>,
    /// Standing behavior.
    pub auto_mode: Option<AutoMode>,
    /// Offset from the group destination of the last move order.
    pub formation_offset: Option<Vec2Fixed>,
    /// Whether the unit takes POIs by force.
    pub can_capture: bool,
    /// Confirmed kills.
    pub kills: u32,
    /// Veterancy rank, 0 to 3.
    pub veterancy: u8,
    /// Last unit that damaged this one.
    pub last_attacker: Option<UnitId>,
    /// Double speed for the current move order.
    pub boosted: bool,
    /// Do not acquire targets.
    pub hold_fire: bool,
    /// POI this unit defends and never attacks.
    pub guard_poi: Option<PoiId>,
}

impl Unit {
    /// Create a unit with the base statistics of its class.
    #[must_use]
    pub fn new(id: UnitId, class: UnitClass, owner: FactionId, position: GeoPoint) -> Self {
        let stats = class.stats();
        Self {
            id,
            class,
            owner,
            position,
            heading: Fixed::ZERO,
            hp: Fixed::from_num(stats.max_hp),
            max_hp: Fixed::from_num(stats.max_hp),
            attack: Fixed::from_num(stats.attack),
            range: class.range_km(),
            speed: class.speed_km(),
            vision: class.vision_km(),
            cooldown: 0,
            destination: None,
            target: None,
            auto_mode: None,
            formation_offset: None,
            can_capture: class.can_capture(),
            kills: 0,
            veterancy: 0,
            last_attacker: None,
            boosted: false,
            hold_fire: false,
            guard_poi: None,
        }
    }

    /// Whether the unit is still in play.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.hp > Fixed::ZERO
    }

    /// Whether the unit has a working weapon.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.attack > Fixed::ZERO && self.range > Fixed::ZERO
    }

    /// Weapon family of the unit's class.
    #[must_use]
    pub fn weapon(&self) -> WeaponType {
        self.class.stats().weapon
    }

    /// Whether the unit has nothing to do.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.destination.is_none() && self.target.is_none()
    }

    /// Drop every standing order.
    pub fn stop(&mut self) {
        self.destination = None;
        self.target = None;
        self.boosted = false;
    }

    /// Apply damage, saturating at zero.
    pub fn take_damage(&mut self, amount: Fixed) {
        self.hp = (self.hp - amount).max(Fixed::ZERO);
    }

    /// Whether the unit may take a POI of the given kind by force.
    #[must_use]
    pub fn can_capture_poi(&self, kind: PoiKind) -> bool {
        match kind {
            PoiKind::City | PoiKind::GoldMine => self.can_capture,
            PoiKind::OilRig => self.can_capture || self.class.is_naval(),
        }
    }
}

// ============================================================================
// Points of interest
// ============================================================================

/// POI category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoiKind {
    /// Population centre. Pays gold, anchors production and victory.
    City,
    /// Offshore platform. Pays oil.
    OilRig,
    /// Pays gold.
    GoldMine,
}

/// A capturable location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poi {
    /// Identifier.
    pub id: PoiId,
    /// Category.
    pub kind: PoiKind,
    /// Display name.
    pub name: String,
    /// Location.
    pub position: GeoPoint,
    /// Owning faction, [`FactionId::NEUTRAL`] when unclaimed.
    pub owner: FactionId,
    /// 1 is capital-grade, 3 is a village.
    pub tier: u8,
    /// Current hit points.
    #[serde(with = "fixed_serde")]
    pub hp: Fixed,
    /// Maximum hit points.
    #[serde(with = "fixed_serde")]
    pub max_hp: Fixed,
    /// Whether ships can reach it.
    pub coastal: bool,
    /// Tick of the last hit by a weapon.
    pub last_damaged_tick: Option<u64>,
}

impl Poi {
    /// Create a neutral POI at full health.
    #[must_use]
    pub fn new(id: PoiId, kind: PoiKind, name: impl Into<String>, position: GeoPoint, tier: u8) -> Self {
        let tier = tier.clamp(1, 3);
        let max_hp = match kind {
            PoiKind::City => [1_000, 700, 400][usize::from(tier) - 1],
            PoiKind::OilRig | PoiKind::GoldMine => 300,
        };
        Self {
            id,
            kind,
            name: name.into(),
            position,
            owner: FactionId::NEUTRAL,
            tier,
            hp: Fixed::from_num(max_hp),
            max_hp: Fixed::from_num(max_hp),
            coastal: false,
            last_damaged_tick: None,
        }
    }

    /// Whether this is a city.
    #[must_use]
    pub fn is_city(&self) -> bool {
        self.kind == PoiKind::City
    }

    /// Whether only torpedoes and guns at sea can reach it.
    #[must_use]
    pub fn is_offshore(&self) -> bool {
        self.kind == PoiKind::OilRig
    }

    /// Apply damage, clamped to [0, max_hp].
    pub fn take_damage(&mut self, amount: Fixed) {
        self.hp = (self.hp - amount).clamp(Fixed::ZERO, self.max_hp);
    }

    /// Regenerate, clamped to max_hp.
    pub fn repair(&mut self, amount: Fixed) {
        self.hp = (self.hp + amount).min(self.max_hp);
    }
}

// ============================================================================
// Effects
// ============================================================================

/// Area payload carried by a strategic missile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Blast radius in km.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Damage at the centre.
    #[serde(with = "fixed_serde")]
    pub damage: Fixed,
    /// Launching faction, spared by the blast.
    pub owner: FactionId,
}

/// A shot in flight. Slots are reused by [`crate::projectiles::ProjectilePool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projectile {
    /// Pool slot index.
    pub slot: u32,
    /// Whether the slot is in use.
    pub active: bool,
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
    /// Flight progress, 0..=1.
    #[serde(with = "fixed_serde")]
    pub progress: Fixed,
    /// Progress per tick.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Whether the shot has landed.
    pub hit: bool,
    /// Area damage applied on arrival.
    pub payload: Option<Payload>,
}

impl Projectile {
    /// Current interpolated position.
    #[must_use]
    pub fn position(&self) -> GeoPoint {
        let t = self.progress;
        GeoPoint::new(
            self.from_pos.lat + (self.to_pos.lat - self.from_pos.lat) * t,
            self.from_pos.lng + (self.to_pos.lng - self.from_pos.lng) * t,
        )
    }
}

/// Presentation record of an impact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explosion {
    /// Centre.
    pub position: GeoPoint,
    /// Radius in km.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Ticks until it disappears.
    pub remaining_ticks: u32,
}

/// A line in the game's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMessage {
    /// Tick the event happened.
    pub tick: u64,
    /// Human-readable text.
    pub text: String,
}

/// Outcome of the match from the local faction's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameResult {
    /// Still running.
    #[default]
    None,
    /// Every other established faction is defeated.
    Victory,
    /// The local faction is defeated.
    Defeat,
}
