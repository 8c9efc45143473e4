//! The phantom host: keeps a room alive with bots when no human hosts.
//!
//! It is an ordinary [`SyncSession`] under the peer id [`PHANTOM_PEER`],
//! which sorts above every human, so a human host always wins an election
//! and the phantom only drives the world while none is around. On top of
//! the session it:
//!
//! - resumes the last snapshot, or starts a fresh round when there is none
//!   or it is older than `snapshot_max_age_ms`
//! - seats joining humans, either on a bot faction or on a new faction at
//!   a neutral city
//! - hands a departed human's faction back to a bot and tops bot factions
//!   up to `min_bots`
//! - saves a snapshot every `save_interval_ms`

use std::collections::BTreeMap;

use warfront_core::actions::{ActionKind, ActionOutcome, GameAction};
use warfront_core::config::SimConfig;
use warfront_core::factions::{Faction, FactionId, FactionKind, Personality};
use warfront_core::scenario::WorldGenerator;
use warfront_core::simulation::Simulation;
use warfront_core::state::GameState;

use crate::config::HostConfig;
use crate::error::Result;
use crate::ids::IdAllocator;
use crate::persistence::{RoomState, Snapshot, SnapshotStore};
use crate::protocol::{BotSlot, CitySlot, Envelope, JoinChoice, PeerId, WireMessage, PHANTOM_PEER};
use crate::sync::SyncSession;

const BOT_COLORS: [&str; 6] = ["#d94f4f", "#4f7fd9", "#d9b84f", "#5fb85f", "#a05fd9", "#4fc8c8"];

#[derive(Debug, Clone)]
struct PendingJoin {
    name: String,
    color: String,
}

/// Bot-driven host for a room with no human host.
#[derive(Debug)]
pub struct PhantomHost<S, G> {
    config: HostConfig,
    sim_config: SimConfig,
    store: S,
    generator: G,
    session: SyncSession,
    room: RoomState,
    humans: BTreeMap<PeerId, FactionId>,
    pending_joins: BTreeMap<PeerId, PendingJoin>,
    next_save_ms: u64,
}

impl<S: SnapshotStore, G: WorldGenerator> PhantomHost<S, G> {
    /// Resume or start the room and take over as host.
    ///
    /// Returns the host and its opening broadcast.
    pub fn start(
        config: HostConfig,
        sim_config: SimConfig,
        mut store: S,
        generator: G,
        now_ms: u64,
    ) -> Result<(Self, Vec<Envelope>)> {
        let mut room = RoomState {
            room_id: config.room_id.clone(),
            seed: config.seed,
            ..RoomState::default()
        };

        let snapshot = match store.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable snapshot, starting fresh");
                None
            }
        };

        let state = match snapshot {
            Some(snapshot) if !snapshot.is_stale(now_ms, config.snapshot_max_age_ms) => {
                tracing::info!(
                    tick = snapshot.game_state.tick,
                    age_ms = snapshot.age_ms(now_ms),
                    "resuming snapshot"
                );
                let mut state = snapshot.game_state;
                room = snapshot.room_state;
                for faction in std::mem::take(&mut room.human_factions) {
                    hand_to_bot(&mut state, faction, room.seed, sim_config.max_messages);
                }
                state
            }
            stale => {
                if let Some(snapshot) = stale {
                    tracing::info!(age_ms = snapshot.age_ms(now_ms), "discarding stale snapshot");
                    room.round = snapshot.room_state.round;
                    store.clear()?;
                }
                room.round += 1;
                room.seed = config.seed.wrapping_add(u64::from(room.round));
                tracing::info!(round = room.round, seed = room.seed, "generating fresh world");
                generator.generate(room.seed, &sim_config)?
            }
        };

        let sim = Simulation::with_config(state, sim_config.clone());
        let mut session = SyncSession::new(PHANTOM_PEER, FactionId::NEUTRAL, sim, config.clone(), now_ms);
        let announce = session.become_host(now_ms);

        let mut host = Self {
            next_save_ms: now_ms + config.save_interval_ms,
            config,
            sim_config,
            store,
            generator,
            session,
            room,
            humans: BTreeMap::new(),
            pending_joins: BTreeMap::new(),
        };
        host.top_up_bots(now_ms);
        Ok((host, vec![announce]))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The underlying session.
    #[must_use]
    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    /// The world.
    #[must_use]
    pub fn state(&self) -> &GameState {
        self.session.simulation().state()
    }

    /// Room bookkeeping.
    #[must_use]
    pub fn room(&self) -> &RoomState {
        &self.room
    }

    /// Seated humans and their factions.
    #[must_use]
    pub fn humans(&self) -> &BTreeMap<PeerId, FactionId> {
        &self.humans
    }

    /// The snapshot store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Live bot factions, guards excluded.
    #[must_use]
    pub fn bot_count(&self) -> usize {
        self.state()
            .factions
            .iter()
            .filter(|f| f.is_bot() && f.guard_of.is_none())
            .count()
    }

    // ========================================================================
    // Transport events
    // ========================================================================

    /// A peer connected. It gets the current world right away.
    pub fn peer_connected(&mut self, peer: PeerId, now_ms: u64) -> Vec<Envelope> {
        self.session.peer_connected(peer);
        if self.session.is_host() {
            vec![Envelope::to_peer(peer, self.session.full_state(now_ms))]
        } else {
            Vec::new()
        }
    }

    /// A peer left. A seated human's faction goes back to a bot.
    pub fn peer_disconnected(&mut self, peer: PeerId, now_ms: u64) {
        self.session.peer_disconnected(peer);
        self.pending_joins.remove(&peer);
        let Some(faction) = self.humans.remove(&peer) else {
            return;
        };
        tracing::info!(peer, %faction, "human left, bot takes over");
        let seed = self.room.seed;
        let cap = self.sim_config.max_messages;
        hand_to_bot(self.session.simulation_mut().state_mut(), faction, seed, cap);
        self.top_up_bots(now_ms);
        self.session.request_full_state();
    }

    /// Handle one message from `from`. Join traffic is answered here;
    /// everything else goes to the session.
    pub fn receive(&mut self, from: PeerId, message: WireMessage, now_ms: u64) -> Vec<Envelope> {
        match message {
            WireMessage::JoinRequest { name, color, .. } => self.on_join_request(from, name, color),
            WireMessage::JoinChoice { choice, .. } => self.on_join_choice(from, choice, now_ms),
            other => self.session.receive(from, other, now_ms),
        }
    }

    /// Advance one tick, then start a new round or save as due.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Envelope> {
        let was_host = self.session.is_host();
        let mut outbound = self.session.tick(now_ms).outbound;
        if !was_host && self.session.is_host() {
            // Regained the room after a human host vanished.
            self.top_up_bots(now_ms);
        }

        if self.session.is_host() && self.config.restart_finished_rounds && self.round_over() {
            match self.new_round(now_ms) {
                Ok(()) => outbound.push(Envelope::broadcast(self.session.full_state(now_ms))),
                Err(e) => tracing::warn!(error = %e, "could not start a new round"),
            }
        }

        if now_ms >= self.next_save_ms {
            if let Err(e) = self.save(now_ms) {
                tracing::warn!(error = %e, "snapshot save failed");
            }
            self.next_save_ms = now_ms + self.config.save_interval_ms;
        }
        outbound
    }

    /// Persist the room now.
    pub fn save(&mut self, now_ms: u64) -> Result<()> {
        let mut game_state = self.state().clone();
        game_state.local_faction = None;
        let mut room_state = self.room.clone();
        room_state.human_factions = self.humans.values().copied().collect();
        self.store.save(&Snapshot {
            game_state,
            room_state,
            saved_at_ms: now_ms,
        })
    }

    // ========================================================================
    // Join flow
    // ========================================================================

    fn reject(peer: PeerId, reason: impl Into<String>) -> Vec<Envelope> {
        let reason = reason.into();
        tracing::info!(peer, %reason, "join rejected");
        vec![Envelope::to_peer(peer, WireMessage::JoinRejected { peer, reason })]
    }

    fn on_join_request(&mut self, peer: PeerId, name: String, color: String) -> Vec<Envelope> {
        if !self.session.is_host() {
            return Self::reject(peer, "room is hosted by a player");
        }
        if self.humans.contains_key(&peer) {
            return Self::reject(peer, "already seated");
        }
        self.pending_joins.insert(peer, PendingJoin { name, color });

        let state = self.state();
        let bots = state
            .factions
            .iter()
            .filter(|f| f.is_bot() && f.guard_of.is_none())
            .map(|f| BotSlot {
                faction: f.id,
                name: f.name.clone(),
                cities: state.cities_of(f.id).count(),
                units: state.unit_count(f.id),
            })
            .collect();
        let cities = state
            .pois
            .iter()
            .filter(|p| p.is_city() && p.owner.is_neutral())
            .map(|p| CitySlot {
                poi_id: p.id,
                name: p.name.clone(),
                position: p.position,
            })
            .collect();
        vec![Envelope::to_peer(peer, WireMessage::JoinOptions { peer, bots, cities })]
    }

    fn on_join_choice(&mut self, peer: PeerId, choice: JoinChoice, now_ms: u64) -> Vec<Envelope> {
        if !self.session.is_host() {
            return Self::reject(peer, "room is hosted by a player");
        }
        let Some(join) = self.pending_joins.remove(&peer) else {
            return Self::reject(peer, "no join request");
        };

        let mut outbound = Vec::new();
        let faction = match choice {
            JoinChoice::TakeOverBot { faction } => {
                let state = self.session.simulation_mut().state_mut();
                match state.faction_mut(faction) {
                    Some(f) if f.is_bot() && f.guard_of.is_none() => {
                        f.kind = FactionKind::Player;
                        let text = format!("{} joined as {}", join.name, f.name);
                        let cap = self.sim_config.max_messages;
                        state.push_message(text, cap);
                    }
                    _ => return Self::reject(peer, format!("{faction} is not an available bot")),
                }
                self.session.request_full_state();
                faction
            }
            JoinChoice::NewFaction { poi_id } => {
                let state = self.state();
                let faction = state.next_faction_id();
                let id = IdAllocator::new(faction).next_action_id(state);
                let action = GameAction::new(
                    id,
                    faction,
                    now_ms,
                    ActionKind::SelectStartingBase {
                        poi_id,
                        name: join.name.clone(),
                        color: join.color.clone(),
                    },
                );
                let outcome = self.session.simulation_mut().apply_action(&action);
                if let ActionOutcome::Rejected(reason) = outcome {
                    return Self::reject(peer, format!("cannot start at {poi_id}: {reason:?}"));
                }
                outbound.push(Envelope::broadcast(WireMessage::Action { action }));
                faction
            }
        };

        self.humans.insert(peer, faction);
        tracing::info!(peer, %faction, name = %join.name, "human seated");
        outbound.push(Envelope::to_peer(
            peer,
            WireMessage::JoinAccepted {
                peer,
                faction,
                state: Box::new(self.state().clone()),
            },
        ));
        outbound
    }

    // ========================================================================
    // Bots and rounds
    // ========================================================================

    /// Seat new bot factions at neutral cities until `min_bots` are alive.
    fn top_up_bots(&mut self, now_ms: u64) {
        if !self.session.is_host() {
            return;
        }
        let mut added = 0;
        while self.bot_count() < self.config.min_bots {
            let state = self.session.simulation_mut().state_mut();
            let Some(city) = state.pois.iter().find(|p| p.is_city() && p.owner.is_neutral()).map(|p| p.id)
            else {
                tracing::warn!(bots = self.bot_count(), "no neutral city left for a bot");
                break;
            };

            let id = state.next_faction_id();
            let name = format!("Bot {}", id.0);
            let color = BOT_COLORS[usize::from(id.0) % BOT_COLORS.len()].to_string();
            let mut faction = Faction::new(id, name.clone(), FactionKind::Bot);
            faction.color.clone_from(&color);
            faction.gold = self.sim_config.starting_gold;
            faction.oil = self.sim_config.starting_oil;
            faction.personality = Some(personality_for(self.room.seed, id));
            state.factions.insert(faction);

            let action_id = IdAllocator::new(id).next_action_id(state);
            let action = GameAction::new(
                action_id,
                id,
                now_ms,
                ActionKind::SelectStartingBase {
                    poi_id: city,
                    name,
                    color,
                },
            );
            let outcome = self.session.simulation_mut().apply_action(&action);
            if outcome != ActionOutcome::Applied {
                tracing::warn!(faction = %id, city, ?outcome, "bot could not take a city");
                self.session.simulation_mut().state_mut().factions.remove(u64::from(id.0));
                break;
            }
            tracing::info!(faction = %id, city, "bot added");
            added += 1;
        }
        if added > 0 {
            self.session.request_full_state();
        }
    }

    /// Someone lost and at most one contender is left, with nobody seated.
    fn round_over(&self) -> bool {
        if !self.humans.is_empty() {
            return false;
        }
        let contenders = self.state().factions.iter().filter(|f| f.kind != FactionKind::Neutral);
        let (alive, defeated) = contenders.fold((0, 0), |(alive, defeated), f| {
            if f.defeated {
                (alive, defeated + 1)
            } else if f.established {
                (alive + 1, defeated)
            } else {
                (alive, defeated)
            }
        });
        defeated > 0 && alive <= 1
    }

    fn new_round(&mut self, now_ms: u64) -> Result<()> {
        self.room.round += 1;
        self.room.seed = self.config.seed.wrapping_add(u64::from(self.room.round));
        tracing::info!(round = self.room.round, seed = self.room.seed, "round over, starting a new one");
        let state = self.generator.generate(self.room.seed, &self.sim_config)?;
        self.session.simulation_mut().replace_state(state);
        self.top_up_bots(now_ms);
        self.save(now_ms)
    }
}

fn personality_for(seed: u64, faction: FactionId) -> Personality {
    Personality::from_index((seed.wrapping_add(u64::from(faction.0)) % 5) as u32)
}

/// Put a faction back under bot control.
fn hand_to_bot(state: &mut GameState, faction: FactionId, seed: u64, max_messages: usize) {
    let Some(f) = state.faction_mut(faction) else {
        return;
    };
    if f.kind == FactionKind::Neutral {
        return;
    }
    f.kind = FactionKind::Bot;
    if f.personality.is_none() {
        f.personality = Some(personality_for(seed, faction));
    }
    let text = format!("{} is now led by a bot", f.name);
    state.push_message(text, max_messages);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemorySnapshotStore;
    use warfront_core::components::PoiKind;
    use warfront_core::error::Result as GameResult;
    use warfront_test_utils::fixtures::{point, WorldBuilder};

    /// Five neutral cities and a gold mine, no factions.
    struct OpenMap;

    impl WorldGenerator for OpenMap {
        fn generate(&self, _seed: u64, _config: &SimConfig) -> GameResult<GameState> {
            Ok(WorldBuilder::new()
                .city(1, point(0, 0), 0)
                .city(2, point(2_000, 0), 0)
                .city(3, point(-2_000, 0), 0)
                .city(4, point(0, 2_000), 0)
                .city(5, point(0, -2_000), 0)
                .poi(6, PoiKind::GoldMine, point(300, 300), 0)
                .build())
        }
    }

    const NOW: u64 = 1_700_000_000_000;

    fn start(store: MemorySnapshotStore) -> PhantomHost<MemorySnapshotStore, OpenMap> {
        let (host, opening) =
            PhantomHost::start(HostConfig::default(), SimConfig::default(), store, OpenMap, NOW).expect("start");
        assert!(matches!(opening[0].message, WireMessage::NewHost { host: PHANTOM_PEER, .. }));
        host
    }

    fn join(host: &mut PhantomHost<MemorySnapshotStore, OpenMap>, peer: PeerId, choice: JoinChoice) -> Vec<Envelope> {
        let options = host.receive(
            peer,
            WireMessage::JoinRequest {
                peer,
                name: "Ada".into(),
                color: "#ffffff".into(),
            },
            NOW,
        );
        assert!(matches!(options[0].message, WireMessage::JoinOptions { .. }));
        host.receive(peer, WireMessage::JoinChoice { peer, choice }, NOW)
    }

    #[test]
    fn test_fresh_start_seeds_bots() {
        let host = start(MemorySnapshotStore::new());
        assert!(host.session().is_host());
        assert_eq!(host.room().round, 1);
        assert_eq!(host.bot_count(), 2);
        assert_eq!(host.state().cities_of(FactionId(1)).count(), 1);
        assert!(host.state().unit_count(FactionId(1)) > 0);
    }

    #[test]
    fn test_fifteen_minute_old_snapshot_is_discarded() {
        let mut old = WorldBuilder::new().city(1, point(0, 0), 0).build();
        old.tick = 50_000;
        let snapshot = Snapshot {
            game_state: old,
            room_state: RoomState {
                room_id: "default".into(),
                seed: 7,
                round: 4,
                ..RoomState::default()
            },
            saved_at_ms: NOW - 15 * 60 * 1000,
        };
        let store = MemorySnapshotStore::with_snapshot(&snapshot).expect("store");
        let host = start(store);

        assert_eq!(host.state().tick, 0);
        assert_eq!(host.state().pois.len(), 6);
        assert_eq!(host.room().round, 5);
        assert!(host.store().load().expect("load").is_none());
    }

    #[test]
    fn test_recent_snapshot_resumes_with_humans_as_bots() {
        let mut world = OpenMap.generate(0, &SimConfig::default()).expect("world");
        world.factions.insert(Faction::new(FactionId(1), "Ada", FactionKind::Player));
        world.tick = 900;
        let snapshot = Snapshot {
            game_state: world,
            room_state: RoomState {
                room_id: "default".into(),
                seed: 7,
                round: 2,
                human_factions: [FactionId(1)].into(),
            },
            saved_at_ms: NOW - 5 * 60 * 1000,
        };
        let host = start(MemorySnapshotStore::with_snapshot(&snapshot).expect("store"));

        assert_eq!(host.state().tick, 900);
        assert_eq!(host.room().round, 2);
        assert_eq!(host.state().faction(FactionId(1)).map(|f| f.kind), Some(FactionKind::Bot));
        assert!(host.room().human_factions.is_empty());
    }

    #[test]
    fn test_human_takes_over_a_bot_and_leaves() {
        let mut host = start(MemorySnapshotStore::new());
        let replies = join(&mut host, 3, JoinChoice::TakeOverBot { faction: FactionId(1) });
        assert!(matches!(
            replies.last().map(|e| &e.message),
            Some(WireMessage::JoinAccepted { faction: FactionId(1), .. })
        ));
        assert_eq!(host.state().faction(FactionId(1)).map(|f| f.kind), Some(FactionKind::Player));
        // Takeover alone adds no bot; top-up runs when a human leaves.
        assert_eq!(host.bot_count(), 1);

        host.peer_disconnected(3, NOW + 10);
        assert!(host.humans().is_empty());
        assert_eq!(host.state().faction(FactionId(1)).map(|f| f.kind), Some(FactionKind::Bot));
        assert_eq!(host.bot_count(), 2);
    }

    #[test]
    fn test_human_founds_a_new_faction() {
        let mut host = start(MemorySnapshotStore::new());
        let replies = join(&mut host, 8, JoinChoice::NewFaction { poi_id: 5 });
        assert!(replies
            .iter()
            .any(|e| e.to.is_none() && e.message.kind() == "ACTION"));
        let faction = host.humans().get(&8).copied().expect("seated");
        assert_eq!(host.state().poi(5).map(|p| p.owner), Some(faction));
        assert_eq!(host.state().faction(faction).map(|f| f.name.as_str()), Some("Ada"));

        // Leaving turns the new faction into a third bot.
        host.peer_disconnected(8, NOW);
        assert_eq!(host.bot_count(), 3);
    }

    #[test]
    fn test_join_rejections() {
        let mut host = start(MemorySnapshotStore::new());
        let no_request = host.receive(
            2,
            WireMessage::JoinChoice {
                peer: 2,
                choice: JoinChoice::NewFaction { poi_id: 3 },
            },
            NOW,
        );
        assert!(matches!(no_request[0].message, WireMessage::JoinRejected { .. }));

        let owned = join(&mut host, 2, JoinChoice::NewFaction { poi_id: 1 });
        assert!(matches!(owned[0].message, WireMessage::JoinRejected { .. }));
        assert!(host.humans().is_empty());

        let not_a_bot = join(&mut host, 2, JoinChoice::TakeOverBot { faction: FactionId(0) });
        assert!(matches!(not_a_bot[0].message, WireMessage::JoinRejected { .. }));
    }

    #[test]
    fn test_periodic_save() {
        let mut host = start(MemorySnapshotStore::new());
        host.tick(NOW);
        assert_eq!(host.store().saves(), 0);
        let due = NOW + HostConfig::default().save_interval_ms;
        host.tick(due);
        assert_eq!(host.store().saves(), 1);
        let saved = host.store().load().expect("load").expect("snapshot");
        assert_eq!(saved.saved_at_ms, due);
        assert_eq!(saved.game_state.tick, 2);
    }

    #[test]
    fn test_steps_aside_for_a_human_host() {
        let mut host = start(MemorySnapshotStore::new());
        host.peer_connected(4, NOW);
        host.receive(4, WireMessage::Heartbeat { host: 4, tick: 0, timestamp_ms: NOW }, NOW);
        assert!(!host.session().is_host());
        let refused = host.receive(
            6,
            WireMessage::JoinRequest {
                peer: 6,
                name: "Bo".into(),
                color: "#000000".into(),
            },
            NOW,
        );
        assert!(matches!(refused[0].message, WireMessage::JoinRejected { .. }));
    }
}
