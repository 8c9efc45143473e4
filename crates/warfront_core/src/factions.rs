//! Faction definitions, relations and bot personalities.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed};
use crate::unit_class::UnitClass;

/// Unique identifier for factions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct FactionId(pub u16);

impl FactionId {
    /// The pure-neutral owner of unclaimed POIs.
    pub const NEUTRAL: Self = Self(0);

    /// Raw numeric value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Whether this is the neutral faction.
    #[must_use]
    pub const fn is_neutral(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for FactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "faction#{}", self.0)
    }
}

/// Who controls a faction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FactionKind {
    /// A connected human.
    Player,
    /// Driven by a bot brain on the host.
    Bot,
    /// Owns unclaimed POIs, or guards them.
    Neutral,
}

/// Bot play style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Personality {
    /// Even spending, even army.
    #[default]
    Balanced,
    /// Spends nearly everything on armor and air.
    Aggressor,
    /// Keeps a large reserve, favors artillery.
    Turtle,
    /// Grabs land with lots of infantry.
    Expansionist,
    /// Leans on ships.
    Admiral,
}

impl Personality {
    /// Gold kept back from production, in permille of the treasury.
    #[must_use]
    pub const fn reserve_permille(self) -> u32 {
        match self {
            Self::Aggressor => 100,
            Self::Expansionist => 200,
            Self::Balanced | Self::Admiral => 300,
            Self::Turtle => 500,
        }
    }

    /// Infantry count below which production always picks infantry.
    #[must_use]
    pub const fn infantry_floor(self) -> usize {
        match self {
            Self::Expansionist => 8,
            Self::Turtle => 6,
            _ => 4,
        }
    }

    /// Relative production weight of a combat class.
    #[must_use]
    pub const fn weight(self, class: UnitClass) -> u32 {
        match (self, class) {
            (Self::Aggressor, UnitClass::Tank | UnitClass::Bomber) => 5,
            (Self::Aggressor, UnitClass::Helicopter | UnitClass::Fighter) => 3,
            (Self::Turtle, UnitClass::Artillery) => 5,
            (Self::Turtle, UnitClass::Tank) => 3,
            (Self::Admiral, UnitClass::Destroyer | UnitClass::Submarine) => 6,
            (Self::Expansionist, UnitClass::Tank | UnitClass::Helicopter) => 3,
            (_, UnitClass::Tank) => 3,
            (_, UnitClass::Artillery | UnitClass::Helicopter) => 2,
            (_, UnitClass::Fighter | UnitClass::Bomber) => 1,
            (_, UnitClass::Destroyer | UnitClass::Submarine) => 1,
            _ => 0,
        }
    }

    /// Pick a personality from a seed value.
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        match index % 5 {
            0 => Self::Balanced,
            1 => Self::Aggressor,
            2 => Self::Turtle,
            3 => Self::Expansionist,
            _ => Self::Admiral,
        }
    }
}

/// A player, bot or neutral party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faction {
    /// Identifier.
    pub id: FactionId,
    /// Display name.
    pub name: String,
    /// Display color, as a CSS string.
    pub color: String,
    /// Controller.
    pub kind: FactionKind,
    /// Gold treasury.
    pub gold: u32,
    /// Oil treasury.
    pub oil: u32,
    /// Relation scores towards other factions, kept symmetric by
    /// [`crate::state::GameState::set_relation`].
    pub relations: BTreeMap<FactionId, i8>,
    /// Bot play style.
    pub personality: Option<Personality>,
    /// Bot eagerness to attack, 0..=1.
    #[serde(with = "fixed_serde")]
    pub aggression: Fixed,
    /// The faction this one defends, for neutral guards.
    pub guard_of: Option<FactionId>,
    /// Set once the faction has owned a city; only established
    /// factions can be defeated.
    pub established: bool,
    /// Set by the victory check.
    pub defeated: bool,
}

impl Faction {
    /// Create a faction with an empty treasury.
    #[must_use]
    pub fn new(id: FactionId, name: impl Into<String>, kind: FactionKind) -> Self {
        Self {
            id,
            name: name.into(),
            color: "#888888".to_string(),
            kind,
            gold: 0,
            oil: 0,
            relations: BTreeMap::new(),
            personality: None,
            aggression: Fixed::from_num(1) / Fixed::from_num(2),
            guard_of: None,
            established: false,
            defeated: false,
        }
    }

    /// Relation score towards `other`.
    #[must_use]
    pub fn relation_to(&self, other: FactionId, default_relation: i8) -> i8 {
        self.relations
            .get(&other)
            .copied()
            .unwrap_or(default_relation)
    }

    /// Whether a bot brain should drive this faction.
    #[must_use]
    pub fn is_bot(&self) -> bool {
        self.kind == FactionKind::Bot && !self.defeated
    }

    /// Whether the faction can pay the given costs.
    #[must_use]
    pub fn can_afford(&self, gold: u32, oil: u32) -> bool {
        self.gold >= gold && self.oil >= oil
    }

    /// Deduct costs if affordable. Returns whether payment happened.
    pub fn try_pay(&mut self, gold: u32, oil: u32) -> bool {
        if !self.can_afford(gold, oil) {
            return false;
        }
        self.gold -= gold;
        self.oil -= oil;
        true
    }
}
