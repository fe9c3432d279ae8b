//! Authoritative session task and its handle
//!
//! One task owns the server `Scene`. Transport adapters feed it peer
//! events over an mpsc channel and receive encoded frames either through
//! the shared broadcast channel or through their own outbox.
//!
//! A joining peer gets its broadcast subscription from the session, taken
//! after the greeting is queued on its outbox. Nothing broadcast can
//! therefore overtake the terrain info.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SimConfig;
use crate::game::snapshot::SnapshotSchedule;
use crate::game::{Authority, PlayerState, Scene, SceneEvent};
use crate::util::pool::Handle;
use crate::util::time::FixedStep;

use super::codec;
use super::protocol::Message;

const EVENT_CHANNEL: usize = 1024;
const BROADCAST_CHANNEL: usize = 256;
/// Ticks run one by one after a stall; beyond this they are merged into a
/// single step that the scene splits itself
const MAX_CATCH_UP: u32 = 5;

/// What transport adapters tell the session
#[derive(Debug)]
pub enum PeerEvent {
    Connected {
        guid: u64,
        name: String,
        /// Frames meant only for this peer
        outbox: mpsc::Sender<Bytes>,
        /// Receives the broadcast subscription once the peer is in. Dropped
        /// unanswered when the session rejects the peer.
        accepted: oneshot::Sender<broadcast::Receiver<Bytes>>,
    },
    Frame {
        guid: u64,
        data: Bytes,
    },
    Disconnected {
        guid: u64,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub tick: u32,
    pub players: usize,
    pub projectiles: usize,
    pub match_remaining: f32,
}

/// Cheap clonable handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::Sender<PeerEvent>,
    frames: broadcast::Sender<Bytes>,
    stats: Arc<RwLock<SessionStats>>,
}

impl SessionHandle {
    /// Returns false once the session has stopped
    pub async fn send(&self, event: PeerEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Broadcast feed for observers that never join
    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.frames.subscribe()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.read().clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Score {
    pub kills: u32,
    pub deaths: u32,
}

struct Peer {
    name: String,
    car: Handle,
    slot: u8,
    outbox: mpsc::Sender<Bytes>,
    last_control_tick: Option<u32>,
    score: Score,
}

pub struct GameSession {
    scene: Scene,
    seed: u64,
    peers: HashMap<u64, Peer>,
    events: mpsc::Receiver<PeerEvent>,
    frames: broadcast::Sender<Bytes>,
    stats: Arc<RwLock<SessionStats>>,
    clock: FixedStep,
    schedule: SnapshotSchedule,
    match_remaining: f32,
}

impl GameSession {
    pub fn new(config: SimConfig, seed: u64) -> (Self, SessionHandle) {
        let (events_tx, events) = mpsc::channel(EVENT_CHANNEL);
        let (frames, _) = broadcast::channel(BROADCAST_CHANNEL);
        let stats = Arc::new(RwLock::new(SessionStats::default()));

        let handle = SessionHandle {
            events: events_tx,
            frames: frames.clone(),
            stats: stats.clone(),
        };

        let physics = &config.physics;
        let session = Self {
            clock: FixedStep::new(physics.fixed_dt),
            schedule: SnapshotSchedule::new(physics.snapshot_interval),
            match_remaining: physics.match_duration,
            scene: Scene::new(config, Authority::Server, seed),
            seed,
            peers: HashMap::new(),
            events,
            frames,
            stats,
        };
        session.publish_stats();

        (session, handle)
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn score(&self, guid: u64) -> Option<&Score> {
        self.peers.get(&guid).map(|p| &p.score)
    }

    /// Run until every `SessionHandle` is dropped
    pub async fn run(mut self) {
        info!(seed = self.seed, "Session started");

        let dt = self.clock.dt();
        let mut ticker = interval(Duration::from_secs_f32(dt));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let due = self.clock.advance((now - last).as_secs_f32());
                    last = now;
                    if due > MAX_CATCH_UP {
                        warn!(due, "Session fell behind, merging ticks");
                        self.step(dt * due as f32);
                    } else {
                        for _ in 0..due {
                            self.step(dt);
                        }
                    }
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }

        info!(seed = self.seed, "Session stopped");
    }

    pub fn handle_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Connected {
                guid,
                name,
                outbox,
                accepted,
            } => self.handle_connect(guid, name, outbox, accepted),
            PeerEvent::Frame { guid, data } => self.handle_frame(guid, &data),
            PeerEvent::Disconnected { guid } => self.handle_disconnect(guid),
        }
    }

    fn handle_connect(
        &mut self,
        guid: u64,
        name: String,
        outbox: mpsc::Sender<Bytes>,
        accepted: oneshot::Sender<broadcast::Receiver<Bytes>>,
    ) {
        if self.peers.contains_key(&guid) {
            warn!(guid, "Peer already connected");
            return;
        }
        let Some(slot) = self.free_slot() else {
            warn!(guid, "No wire slot left, rejecting peer");
            return;
        };
        let Some(car) = self.scene.add_car(guid, &name) else {
            // Dropping the outbox closes the peer's connection
            warn!(guid, "Session full, rejecting peer");
            return;
        };

        let greeting = self.greeting(car, slot);
        self.peers.insert(
            guid,
            Peer {
                name,
                car,
                slot,
                outbox,
                last_control_tick: None,
                score: Score::default(),
            },
        );
        for message in &greeting {
            self.unicast(guid, message);
        }

        if accepted.send(self.frames.subscribe()).is_err() {
            debug!(guid, "Peer left before the join completed");
            self.peers.remove(&guid);
            self.scene.remove_car(car);
            return;
        }

        if let Some(join) = self.join_message(car, slot) {
            self.broadcast(&join);
        }
        if let Some(peer) = self.peers.get(&guid) {
            info!(guid, slot, name = %peer.name, players = self.peers.len(), "Player joined");
        }
        self.schedule.force_next();
        self.publish_stats();
    }

    /// Lowest slot no connected peer holds
    fn free_slot(&self) -> Option<u8> {
        (0..=u8::MAX).find(|slot| !self.peers.values().any(|p| p.slot == *slot))
    }

    /// Terrain, own join, everyone already present, then the match clock
    fn greeting(&self, car: Handle, slot: u8) -> Vec<Message> {
        let mut messages = vec![Message::TerrainInfo {
            seed: self.seed,
            mode: self.scene.terrain().mode(),
        }];
        messages.extend(self.join_message(car, slot));
        for peer in self.peers.values() {
            messages.extend(self.join_message(peer.car, peer.slot));
            if let Some(car) = self.scene.car(peer.car) {
                messages.push(Message::PlayerState(PlayerState::capture(
                    peer.slot,
                    self.scene.tick(),
                    car,
                )));
            }
        }
        messages.push(Message::MatchState {
            timeout: self.match_remaining,
            reset_stats: false,
        });
        messages
    }

    fn handle_frame(&mut self, guid: u64, data: &[u8]) {
        let Some(peer) = self.peers.get_mut(&guid) else {
            return;
        };

        let message = match codec::decode(data) {
            Ok(message) => message,
            Err(e) => {
                debug!(guid, error = %e, "Dropping malformed frame");
                return;
            }
        };

        match message {
            Message::PlayerControl(control) => {
                if control.slot != peer.slot {
                    debug!(guid, slot = control.slot, "Control for a foreign slot ignored");
                    return;
                }
                if peer.last_control_tick.is_some_and(|last| control.tick <= last) {
                    return;
                }
                peer.last_control_tick = Some(control.tick);
                let car = peer.car;
                self.scene.set_input(car, control.to_input());
            }
            other => {
                debug!(guid, tag = ?other.tag(), "Unexpected message from peer");
            }
        }
    }

    fn handle_disconnect(&mut self, guid: u64) {
        let Some(peer) = self.peers.remove(&guid) else {
            return;
        };
        self.scene.remove_car(peer.car);
        self.broadcast(&Message::PlayerLeave { slot: peer.slot });
        info!(guid, slot = peer.slot, name = %peer.name, "Player left");
        self.publish_stats();
    }

    /// One authoritative tick of `dt` seconds, plus whatever it has to say
    pub fn step(&mut self, dt: f32) {
        self.scene.update(dt);

        for event in self.scene.drain_events() {
            match event {
                SceneEvent::Hit {
                    tick,
                    victim,
                    attacker,
                    damage,
                } => self.broadcast(&Message::PlayerHit {
                    tick,
                    victim,
                    attacker,
                    damage,
                }),
                SceneEvent::Kill(kill) => {
                    if let Some(peer) = self.peers.get_mut(&kill.victim) {
                        peer.score.deaths += 1;
                    }
                    if kill.killer != kill.victim {
                        if let Some(peer) = self.peers.get_mut(&kill.killer) {
                            peer.score.kills += 1;
                        }
                    }
                    self.broadcast(&Message::PlayerKill {
                        tick: kill.tick,
                        victim: kill.victim,
                        killer: kill.killer,
                    });
                    self.schedule.force_next();
                }
                SceneEvent::Respawned { .. } | SceneEvent::Activated { .. } => {
                    self.schedule.force_next();
                }
                SceneEvent::Fired { .. } | SceneEvent::Explosion { .. } => {}
            }
        }

        self.match_remaining -= dt;
        if self.match_remaining <= 0.0 {
            self.reset_match();
        }

        if self.schedule.should_send() {
            self.broadcast_states();
        }
        self.publish_stats();
    }

    fn reset_match(&mut self) {
        self.match_remaining = self.scene.config().physics.match_duration;
        for peer in self.peers.values_mut() {
            peer.score = Score::default();
        }
        self.scene.respawn_all();
        // Respawn events from this reset are reported on the next step
        self.broadcast(&Message::MatchState {
            timeout: self.match_remaining,
            reset_stats: true,
        });
        info!(players = self.peers.len(), "Match reset");
    }

    fn broadcast_states(&self) {
        let tick = self.scene.tick();
        for peer in self.peers.values() {
            if let Some(car) = self.scene.car(peer.car) {
                self.broadcast(&Message::PlayerState(PlayerState::capture(peer.slot, tick, car)));
            }
        }
    }

    fn join_message(&self, handle: Handle, slot: u8) -> Option<Message> {
        self.scene.car(handle).map(|car| Message::PlayerJoin {
            slot,
            guid: car.guid,
            name: car.name.clone(),
            position: car.body.position,
            rotation: car.body.rotation,
            tick: self.scene.tick(),
        })
    }

    fn broadcast(&self, message: &Message) {
        match codec::encode(message) {
            // No subscribers is not an error
            Ok(frame) => {
                let _ = self.frames.send(frame);
            }
            Err(e) => warn!(tag = ?message.tag(), error = %e, "Failed to encode broadcast"),
        }
    }

    fn unicast(&self, guid: u64, message: &Message) {
        let Some(peer) = self.peers.get(&guid) else {
            return;
        };
        let frame = match codec::encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(guid, tag = ?message.tag(), error = %e, "Failed to encode unicast");
                return;
            }
        };
        if peer.outbox.try_send(frame).is_err() {
            debug!(guid, tag = ?message.tag(), "Peer outbox full or closed");
        }
    }

    fn publish_stats(&self) {
        let mut stats = self.stats.write();
        stats.tick = self.scene.tick();
        stats.players = self.peers.len();
        stats.projectiles = self.scene.projectile_count();
        stats.match_remaining = self.match_remaining.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TerrainConfig, TerrainMode};
    use crate::net::protocol::{FireFlags, PlayerControl};
    use glam::Vec3;

    fn small_config() -> SimConfig {
        let mut config = SimConfig::default();
        config.terrain = TerrainConfig {
            size: 80.0,
            resolution: 17,
            mode: TerrainMode::Flat,
            object_density: 0.0,
            ..TerrainConfig::default()
        };
        config.capacity.cars = 2;
        config
    }

    fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(codec::decode(&frame).expect("valid frame"));
        }
        out
    }

    struct Joined {
        outbox: mpsc::Receiver<Bytes>,
        accepted: oneshot::Receiver<broadcast::Receiver<Bytes>>,
    }

    fn connect(session: &mut GameSession, guid: u64) -> Joined {
        let (outbox, outbox_rx) = mpsc::channel(64);
        let (accepted, accepted_rx) = oneshot::channel();
        session.handle_event(PeerEvent::Connected {
            guid,
            name: format!("p{guid}"),
            outbox,
            accepted,
        });
        Joined {
            outbox: outbox_rx,
            accepted: accepted_rx,
        }
    }

    fn control(tick: u32, slot: u8, accel: f32) -> Bytes {
        codec::encode(&Message::PlayerControl(PlayerControl {
            tick,
            slot,
            steering: 0.0,
            accel,
            thrust: 0.0,
            aim: Vec3::ZERO,
            fire: FireFlags::default(),
            handbrake: false,
        }))
        .expect("encodable control")
    }

    #[test]
    fn test_join_sends_terrain_first() {
        let (mut session, _handle) = GameSession::new(small_config(), 5);
        let mut first = connect(&mut session, 10);
        let messages = drain(&mut first.outbox);
        assert!(matches!(messages[0], Message::TerrainInfo { seed: 5, .. }));
        assert!(matches!(messages[1], Message::PlayerJoin { guid: 10, .. }));
        assert!(matches!(messages.last(), Some(Message::MatchState { reset_stats: false, .. })));

        let mut second = connect(&mut session, 11);
        let messages = drain(&mut second.outbox);
        let joins: Vec<u64> = messages
            .iter()
            .filter_map(|m| match m {
                Message::PlayerJoin { guid, .. } => Some(*guid),
                _ => None,
            })
            .collect();
        assert_eq!(joins, vec![11, 10]);
    }

    #[test]
    fn test_full_session_closes_outbox() {
        let (mut session, _handle) = GameSession::new(small_config(), 5);
        let _a = connect(&mut session, 1);
        let _b = connect(&mut session, 2);
        let mut rejected = connect(&mut session, 3);
        assert!(drain(&mut rejected.outbox).is_empty());
        assert!(rejected.outbox.try_recv().is_err());
        assert!(rejected.accepted.try_recv().is_err());
        assert_eq!(session.scene().cars().len(), 2);
    }

    #[test]
    fn test_subscription_starts_after_greeting() {
        let (mut session, _handle) = GameSession::new(small_config(), 5);
        let mut a = connect(&mut session, 1);
        let mut a_frames = a.accepted.try_recv().expect("first peer accepted");
        drain(&mut a.outbox);

        // Broadcast traffic from before the second join
        session.schedule.force_next();
        session.step(0.02);

        let mut b = connect(&mut session, 2);
        let mut b_frames = b.accepted.try_recv().expect("second peer accepted");
        let greeting = drain(&mut b.outbox);
        assert!(matches!(greeting[0], Message::TerrainInfo { .. }));

        let first_shared = codec::decode(&b_frames.try_recv().expect("own join broadcast"))
            .expect("valid frame");
        assert!(matches!(first_shared, Message::PlayerJoin { guid: 2, .. }));
        assert!(b_frames.try_recv().is_err());

        let mut seen_by_a = Vec::new();
        while let Ok(frame) = a_frames.try_recv() {
            seen_by_a.push(codec::decode(&frame).expect("valid frame"));
        }
        assert!(seen_by_a.iter().any(|m| matches!(m, Message::PlayerState(_))));
        assert!(matches!(seen_by_a.last(), Some(Message::PlayerJoin { guid: 2, .. })));
    }

    #[test]
    fn test_peer_gone_before_accept_is_removed() {
        let (mut session, _handle) = GameSession::new(small_config(), 5);
        let (outbox, _outbox_rx) = mpsc::channel(64);
        let (accepted, accepted_rx) = oneshot::channel();
        drop(accepted_rx);
        session.handle_event(PeerEvent::Connected {
            guid: 9,
            name: "gone".to_string(),
            outbox,
            accepted,
        });
        assert!(session.scene().cars().is_empty());
        assert!(session.score(9).is_none());
    }

    #[test]
    fn test_slots_are_reused_lowest_first() {
        let (mut session, _handle) = GameSession::new(small_config(), 5);
        let _a = connect(&mut session, 1);
        let _b = connect(&mut session, 2);
        assert_eq!(session.peers[&1].slot, 0);
        assert_eq!(session.peers[&2].slot, 1);

        session.handle_event(PeerEvent::Disconnected { guid: 1 });
        let _c = connect(&mut session, 3);
        assert_eq!(session.peers[&3].slot, 0);
    }

    #[test]
    fn test_controls_only_for_own_slot_and_newer_tick() {
        let (mut session, _handle) = GameSession::new(small_config(), 5);
        let _a = connect(&mut session, 1);
        let _b = connect(&mut session, 2);
        let car_a = session.scene().find_car(1).expect("car a");
        let car_b = session.scene().find_car(2).expect("car b");
        let slot_b = session.peers[&2].slot;

        session.handle_event(PeerEvent::Frame {
            guid: 1,
            data: control(1, slot_b, 1.0),
        });
        assert_eq!(session.scene().car(car_b).map(|c| c.input.accel), Some(0.0));

        let slot_a = session.peers[&1].slot;
        session.handle_event(PeerEvent::Frame {
            guid: 1,
            data: control(5, slot_a, 1.0),
        });
        session.handle_event(PeerEvent::Frame {
            guid: 1,
            data: control(4, slot_a, -1.0),
        });
        assert_eq!(session.scene().car(car_a).map(|c| c.input.accel), Some(1.0));
    }

    #[test]
    fn test_disconnect_frees_slot_and_broadcasts_leave() {
        let (mut session, handle) = GameSession::new(small_config(), 5);
        let mut frames = handle.subscribe();
        let _a = connect(&mut session, 1);
        session.handle_event(PeerEvent::Disconnected { guid: 1 });
        assert!(session.scene().cars().is_empty());

        let mut saw_leave = false;
        while let Ok(frame) = frames.try_recv() {
            if let Ok(Message::PlayerLeave { .. }) = codec::decode(&frame) {
                saw_leave = true;
            }
        }
        assert!(saw_leave);
        assert_eq!(handle.stats().players, 0);
    }

    #[test]
    fn test_match_timer_resets_and_broadcasts() {
        let mut config = small_config();
        config.physics.match_duration = 0.1;
        let (mut session, handle) = GameSession::new(config, 5);
        let mut frames = handle.subscribe();
        let _a = connect(&mut session, 1);

        for _ in 0..6 {
            session.step(0.02);
        }
        let mut resets = 0;
        while let Ok(frame) = frames.try_recv() {
            if let Ok(Message::MatchState {
                reset_stats: true, ..
            }) = codec::decode(&frame)
            {
                resets += 1;
            }
        }
        assert_eq!(resets, 1);
        assert_eq!(session.score(1), Some(&Score::default()));
    }
}
