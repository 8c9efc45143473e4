//! Wire protocol between peers.
//!
//! Messages are JSON objects, one per line:
//!
//! ```json
//! {"type":"HEARTBEAT","body":{"host":3,"tick":120,"timestamp_ms":1700000000000}}
//! {"type":"ACTION","body":{"action":{"id":1099511627777,"actor":1,"timestamp_ms":0,"payload":{"type":"HOLD_POSITION","unit_ids":[7]}}}}
//! ```
//!
//! The body sits beside the tag rather than inside it so a full
//! [`GameState`] decodes without being buffered first; buffered decoding
//! loses the integer keys of faction relation maps.

use serde::{Deserialize, Serialize};
use warfront_core::actions::GameAction;
use warfront_core::components::PoiId;
use warfront_core::factions::FactionId;
use warfront_core::math::GeoPoint;
use warfront_core::state::GameState;

use crate::error::Result;

/// Transport-level identity of a connected peer.
pub type PeerId = u32;

/// Peer id used by the phantom host. Humans always sort below it, so any
/// connected human wins a host election.
pub const PHANTOM_PEER: PeerId = PeerId::MAX;

/// A bot faction a joining human may take over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotSlot {
    /// Faction to take over.
    pub faction: FactionId,
    /// Faction name.
    pub name: String,
    /// Cities it holds.
    pub cities: usize,
    /// Units it fields.
    pub units: usize,
}

/// A neutral city a joining human may start from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitySlot {
    /// City POI.
    pub poi_id: PoiId,
    /// City name.
    pub name: String,
    /// Location.
    pub position: GeoPoint,
}

/// What a joining human picked from [`WireMessage::JoinOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "option", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinChoice {
    /// Take control of an existing bot faction.
    TakeOverBot {
        /// Bot faction to take.
        faction: FactionId,
    },
    /// Found a new faction at a neutral city.
    NewFaction {
        /// Starting city.
        poi_id: PoiId,
    },
}

/// Every message exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireMessage {
    /// One command, applied by every receiver at its next tick.
    Action {
        /// The command.
        action: GameAction,
    },
    /// Authoritative snapshot for join and resync.
    FullState {
        /// World state.
        state: Box<GameState>,
        /// Host wall clock when taken.
        timestamp_ms: u64,
    },
    /// Host liveness.
    Heartbeat {
        /// Sender, the current host.
        host: PeerId,
        /// Host tick.
        tick: u64,
        /// Host wall clock.
        timestamp_ms: u64,
    },
    /// A peer took over as host.
    NewHost {
        /// The new host.
        host: PeerId,
        /// Tick of the new host's state.
        tick: u64,
    },
    /// A human asks the phantom host for a seat.
    JoinRequest {
        /// Requesting peer.
        peer: PeerId,
        /// Display name for a new faction.
        name: String,
        /// Color for a new faction.
        color: String,
    },
    /// The seats on offer.
    JoinOptions {
        /// Requesting peer.
        peer: PeerId,
        /// Bot factions available for takeover.
        bots: Vec<BotSlot>,
        /// Neutral cities available for a new faction.
        cities: Vec<CitySlot>,
    },
    /// The seat a human picked.
    JoinChoice {
        /// Choosing peer.
        peer: PeerId,
        /// The pick.
        choice: JoinChoice,
    },
    /// The human now controls `faction`.
    JoinAccepted {
        /// Joined peer.
        peer: PeerId,
        /// Faction under its control.
        faction: FactionId,
        /// World to start from.
        state: Box<GameState>,
    },
    /// The pick was not possible.
    JoinRejected {
        /// Requesting peer.
        peer: PeerId,
        /// Human-readable reason.
        reason: String,
    },
}

impl WireMessage {
    /// Parse one JSON line.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize as a single JSON line ending in `\n`.
    pub fn to_json_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Short name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Action { .. } => "ACTION",
            Self::FullState { .. } => "FULL_STATE",
            Self::Heartbeat { .. } => "HEARTBEAT",
            Self::NewHost { .. } => "NEW_HOST",
            Self::JoinRequest { .. } => "JOIN_REQUEST",
            Self::JoinOptions { .. } => "JOIN_OPTIONS",
            Self::JoinChoice { .. } => "JOIN_CHOICE",
            Self::JoinAccepted { .. } => "JOIN_ACCEPTED",
            Self::JoinRejected { .. } => "JOIN_REJECTED",
        }
    }
}

/// An outbound message and who should get it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Recipient, or `None` for every connected peer.
    pub to: Option<PeerId>,
    /// Payload.
    pub message: WireMessage,
}

impl Envelope {
    /// Address a message to everyone.
    #[must_use]
    pub fn broadcast(message: WireMessage) -> Self {
        Self { to: None, message }
    }

    /// Address a message to one peer.
    #[must_use]
    pub fn to_peer(peer: PeerId, message: WireMessage) -> Self {
        Self {
            to: Some(peer),
            message,
        }
    }
}
