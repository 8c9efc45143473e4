//! Optimistic peer synchronization with host migration.
//!
//! Every peer holds a full copy of the world:
//!
//! - **Local commands** are applied at once and broadcast as `ACTION`.
//! - **Remote actions** are queued and drained into the next tick. Duplicate
//!   delivery is harmless: the resolver dedups on action id.
//! - **The host** also runs the AI, broadcasts what it decided, sends
//!   `HEARTBEAT`s and a periodic `FULL_STATE` that resyncs everyone.
//! - **Migration**: a peer that hears no heartbeat for `host_timeout_ms`
//!   elects the lowest connected peer id. If that is itself it takes over
//!   and announces `NEW_HOST`.
//!
//! The session is transport-agnostic: it takes decoded messages and
//! returns [`Envelope`]s for the caller to send.

use std::collections::BTreeSet;

use warfront_core::actions::{ActionKind, ActionOutcome, GameAction};
use warfront_core::ai::{AiConfig, AiContext};
use warfront_core::components::GameResult;
use warfront_core::factions::FactionId;
use warfront_core::simulation::{Simulation, TickEvents};
use warfront_core::state::GameState;
use warfront_core::victory::evaluate_result;

use crate::config::HostConfig;
use crate::ids::IdAllocator;
use crate::protocol::{Envelope, PeerId, WireMessage};

/// What one session tick produced.
#[derive(Debug, Default)]
pub struct SessionTick {
    /// Events from the simulation tick.
    pub events: TickEvents,
    /// Messages to send.
    pub outbound: Vec<Envelope>,
}

/// One peer's view of a shared match.
#[derive(Debug)]
pub struct SyncSession {
    peer: PeerId,
    host: Option<PeerId>,
    peers: BTreeSet<PeerId>,
    sim: Simulation,
    ai: Option<AiContext>,
    ai_config: AiConfig,
    inbound: Vec<GameAction>,
    ids: IdAllocator,
    config: HostConfig,
    last_heard_ms: u64,
    next_heartbeat_ms: u64,
    next_full_state_ms: u64,
    resync_requested: bool,
}

impl SyncSession {
    /// Join a match as a non-host peer playing `faction`.
    ///
    /// The host is unknown until its first heartbeat; if none arrives
    /// within the timeout, an election runs.
    #[must_use]
    pub fn new(peer: PeerId, faction: FactionId, sim: Simulation, config: HostConfig, now_ms: u64) -> Self {
        let mut sim = sim;
        if !faction.is_neutral() {
            sim.state_mut().local_faction = Some(faction);
        }
        Self {
            peer,
            host: None,
            peers: BTreeSet::from([peer]),
            sim,
            ai: None,
            ai_config: AiConfig::default(),
            inbound: Vec::new(),
            ids: IdAllocator::new(faction),
            config,
            last_heard_ms: now_ms,
            next_heartbeat_ms: now_ms,
            next_full_state_ms: now_ms,
            resync_requested: false,
        }
    }

    /// Use a custom AI configuration once this peer hosts.
    #[must_use]
    pub fn with_ai_config(mut self, ai_config: AiConfig) -> Self {
        self.ai_config = ai_config;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// This peer's id.
    #[must_use]
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// The current host, if known.
    #[must_use]
    pub fn host(&self) -> Option<PeerId> {
        self.host
    }

    /// Whether this peer runs the authoritative AI.
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.host == Some(self.peer)
    }

    /// Connected peers, this one included.
    #[must_use]
    pub fn peers(&self) -> &BTreeSet<PeerId> {
        &self.peers
    }

    /// Faction this peer commands.
    #[must_use]
    pub fn faction(&self) -> FactionId {
        self.ids.faction()
    }

    /// Command a different faction from now on.
    pub fn set_faction(&mut self, faction: FactionId) {
        self.ids.rebind(faction);
        let state = self.sim.state_mut();
        state.local_faction = (!faction.is_neutral()).then_some(faction);
        settle_local_result(state);
    }

    /// The local world copy.
    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Mutable world copy, for host-side edits that are then resynced
    /// with [`Self::request_full_state`].
    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    /// Remote actions waiting for the next tick.
    #[must_use]
    pub fn pending_actions(&self) -> usize {
        self.inbound.len()
    }

    /// Host AI, present only while hosting.
    #[must_use]
    pub fn ai(&self) -> Option<&AiContext> {
        self.ai.as_ref()
    }

    /// Send a `FULL_STATE` on the next host tick.
    pub fn request_full_state(&mut self) {
        self.resync_requested = true;
    }

    // ========================================================================
    // Peers and hosting
    // ========================================================================

    /// A peer joined the transport.
    pub fn peer_connected(&mut self, peer: PeerId) {
        if self.peers.insert(peer) {
            tracing::info!(peer, "peer connected");
        }
    }

    /// A peer left the transport. Losing the host starts the timeout clock;
    /// the election itself runs from [`Self::tick`].
    pub fn peer_disconnected(&mut self, peer: PeerId) {
        if peer == self.peer || !self.peers.remove(&peer) {
            return;
        }
        tracing::info!(peer, "peer disconnected");
        if self.host == Some(peer) {
            self.host = None;
        }
    }

    /// Take over as host and announce it.
    pub fn become_host(&mut self, now_ms: u64) -> Envelope {
        let tick = self.sim.get_tick();
        self.host = Some(self.peer);
        if self.ai.is_none() {
            let seed = self.config.seed ^ tick;
            self.ai = Some(AiContext::new(seed, self.ai_config.clone()));
        }
        self.next_heartbeat_ms = now_ms;
        self.next_full_state_ms = now_ms;
        tracing::info!(peer = self.peer, tick, "hosting");
        Envelope::broadcast(WireMessage::NewHost { host: self.peer, tick })
    }

    fn follow(&mut self, host: PeerId, now_ms: u64) {
        if self.host != Some(host) {
            tracing::info!(peer = self.peer, host, "following host");
        }
        if self.is_host() && host != self.peer {
            self.ai = None;
        }
        self.host = Some(host);
        self.peers.insert(host);
        self.last_heard_ms = now_ms;
    }

    /// Handle a claim to hosting. Two hosts resolve to the lower id.
    fn on_host_claim(&mut self, host: PeerId, now_ms: u64) -> Vec<Envelope> {
        if host == self.peer {
            return Vec::new();
        }
        if self.is_host() && self.peer < host {
            tracing::warn!(peer = self.peer, rival = host, "rival host, reasserting");
            return vec![self.become_host(now_ms)];
        }
        self.follow(host, now_ms);
        Vec::new()
    }

    fn elect(&mut self, now_ms: u64) -> Vec<Envelope> {
        let Some(&lowest) = self.peers.first() else {
            return Vec::new();
        };
        tracing::warn!(peer = self.peer, lost = ?self.host, elected = lowest, "host timed out");
        if lowest == self.peer {
            vec![self.become_host(now_ms)]
        } else {
            self.host = Some(lowest);
            self.last_heard_ms = now_ms;
            Vec::new()
        }
    }

    // ========================================================================
    // Commands and messages
    // ========================================================================

    /// Apply a local command now and, if it took, produce the broadcast.
    ///
    /// Unit ids left empty are minted in this peer's namespace first, so
    /// every receiver creates the same units.
    pub fn issue(&mut self, payload: ActionKind, now_ms: u64) -> (ActionOutcome, Option<Envelope>) {
        let mut payload = payload;
        if let ActionKind::SpawnUnit { unit_id, .. } | ActionKind::BuildStructure { unit_id, .. } = &mut payload {
            if unit_id.is_none() {
                *unit_id = Some(self.ids.next_unit_id(self.sim.state()));
            }
        }
        let id = self.ids.next_action_id(self.sim.state());
        let action = GameAction::new(id, self.ids.faction(), now_ms, payload);
        let outcome = self.sim.apply_action(&action);
        tracing::debug!(action = id, ?outcome, "local command");
        let envelope = (outcome == ActionOutcome::Applied).then(|| Envelope::broadcast(WireMessage::Action { action }));
        (outcome, envelope)
    }

    /// Handle one decoded message from `from`.
    pub fn receive(&mut self, from: PeerId, message: WireMessage, now_ms: u64) -> Vec<Envelope> {
        self.peers.insert(from);
        match message {
            WireMessage::Action { action } => {
                self.inbound.push(action);
                Vec::new()
            }
            WireMessage::FullState { state, .. } => {
                if self.is_host() {
                    tracing::warn!(from, "host ignoring FULL_STATE");
                } else if self.host.is_none() || self.host == Some(from) {
                    let local = self.sim.state().local_faction;
                    let mut state = *state;
                    state.local_faction = local;
                    settle_local_result(&mut state);
                    self.sim.replace_state(state);
                    self.last_heard_ms = now_ms;
                } else {
                    tracing::debug!(from, "FULL_STATE from a non-host dropped");
                }
                Vec::new()
            }
            WireMessage::Heartbeat { host, .. } | WireMessage::NewHost { host, .. } => self.on_host_claim(host, now_ms),
            other => {
                tracing::debug!(from, kind = other.kind(), "message not for a sync session");
                Vec::new()
            }
        }
    }

    /// Advance one tick: drain remote actions, run the world (and the AI
    /// when hosting), then emit host traffic or run an election.
    pub fn tick(&mut self, now_ms: u64) -> SessionTick {
        let pending = std::mem::take(&mut self.inbound);
        let events = self.sim.tick(pending, now_ms, self.ai.as_mut());
        let mut outbound = Vec::new();

        if self.is_host() {
            outbound.extend(
                events
                    .ai_actions
                    .iter()
                    .map(|action| Envelope::broadcast(WireMessage::Action { action: action.clone() })),
            );
            if now_ms >= self.next_heartbeat_ms {
                outbound.push(Envelope::broadcast(WireMessage::Heartbeat {
                    host: self.peer,
                    tick: self.sim.get_tick(),
                    timestamp_ms: now_ms,
                }));
                self.next_heartbeat_ms = now_ms + self.config.heartbeat_interval_ms;
            }
            if self.resync_requested || now_ms >= self.next_full_state_ms {
                outbound.push(Envelope::broadcast(self.full_state(now_ms)));
                self.next_full_state_ms = now_ms + self.config.full_state_interval_ms;
                self.resync_requested = false;
            }
        } else if now_ms.saturating_sub(self.last_heard_ms) >= self.config.host_timeout_ms {
            outbound.extend(self.elect(now_ms));
        }

        SessionTick { events, outbound }
    }

    /// Snapshot message of the current world.
    #[must_use]
    pub fn full_state(&self, now_ms: u64) -> WireMessage {
        let mut state = self.sim.state().clone();
        state.local_faction = None;
        state.result = GameResult::None;
        WireMessage::FullState {
            state: Box::new(state),
            timestamp_ms: now_ms,
        }
    }
}

/// Recompute the stored result for this peer's own faction.
fn settle_local_result(state: &mut GameState) {
    state.result = match state.local_faction {
        Some(local) => evaluate_result(state, local),
        None => GameResult::None,
    };
}
