//! Predicting client world
//!
//! Runs the same scene as the server, without damage authority. Incoming
//! player states blend local cars toward the server by the configured sync
//! factor; the local car is predicted from local controls in between.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::SimConfig;
use crate::game::{Authority, CarInput, Scene, SceneEvent};
use crate::util::pool::Handle;
use crate::util::time::FixedStep;

use super::protocol::{Message, PlayerControl};
use super::session::Score;

pub struct ClientWorld {
    scene: Scene,
    clock: FixedStep,
    sync_factor: f32,
    slots: HashMap<u8, Handle>,
    /// Newest player-state tick applied per slot
    newest_state: HashMap<u8, u32>,
    local_guid: Option<u64>,
    local_slot: Option<u8>,
    input: CarInput,
    terrain_ready: bool,
    match_remaining: f32,
    scores: HashMap<u64, Score>,
    events: Vec<SceneEvent>,
}

impl ClientWorld {
    /// `local_guid` may be unknown; the first join after terrain info is
    /// then taken to be this client's own car.
    pub fn new(config: SimConfig, local_guid: Option<u64>) -> Self {
        let clock = FixedStep::new(config.physics.fixed_dt);
        let sync_factor = config.physics.sync_factor;
        let match_remaining = config.physics.match_duration;
        Self {
            scene: Scene::new(config, Authority::Client, 0),
            clock,
            sync_factor,
            slots: HashMap::new(),
            newest_state: HashMap::new(),
            local_guid,
            local_slot: None,
            input: CarInput::default(),
            terrain_ready: false,
            match_remaining,
            scores: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn is_ready(&self) -> bool {
        self.terrain_ready && self.local_slot.is_some()
    }

    pub fn local_slot(&self) -> Option<u8> {
        self.local_slot
    }

    pub fn local_car(&self) -> Option<Handle> {
        self.local_slot.and_then(|slot| self.slots.get(&slot).copied())
    }

    pub fn car_for_slot(&self, slot: u8) -> Option<Handle> {
        self.slots.get(&slot).copied()
    }

    pub fn match_remaining(&self) -> f32 {
        self.match_remaining
    }

    pub fn score(&self, guid: u64) -> Score {
        self.scores.get(&guid).cloned().unwrap_or_default()
    }

    /// Interpolation fraction between the last two ticks, render only
    pub fn alpha(&self) -> f32 {
        self.clock.alpha()
    }

    /// Scene events since the last call, e.g. explosions to draw
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn set_local_input(&mut self, input: CarInput) {
        self.input = input.sanitized();
    }

    /// Control message for the current tick, once the local car is known
    pub fn control_message(&self) -> Option<Message> {
        let slot = self.local_slot?;
        Some(Message::PlayerControl(PlayerControl::from_input(
            self.scene.tick(),
            slot,
            &self.input,
        )))
    }

    pub fn handle_message(&mut self, message: Message) {
        match message {
            Message::TerrainInfo { seed, mode } => {
                self.scene.regenerate_terrain(seed, mode);
                self.terrain_ready = true;
            }
            Message::PlayerJoin {
                slot,
                guid,
                name,
                position,
                rotation,
                tick,
            } => {
                let handle = match self.slots.get(&slot).copied() {
                    Some(handle) if self.scene.car(handle).is_some_and(|c| c.guid == guid) => {
                        Some(handle)
                    }
                    Some(stale) => {
                        self.scene.remove_car(stale);
                        self.newest_state.remove(&slot);
                        self.scene.add_car(guid, &name)
                    }
                    None => self.scene.add_car(guid, &name),
                };
                let Some(handle) = handle else {
                    debug!(slot, guid, "No room for joining car");
                    return;
                };
                self.slots.insert(slot, handle);
                self.scene.place_car(handle, position, rotation);

                if self.local_guid.is_none() && self.local_slot.is_none() && self.terrain_ready {
                    self.local_guid = Some(guid);
                }
                if self.local_guid == Some(guid) {
                    self.local_slot = Some(slot);
                    self.scene.set_tick(tick);
                    info!(slot, guid, "Joined session");
                }
            }
            Message::PlayerLeave { slot } => {
                if let Some(handle) = self.slots.remove(&slot) {
                    self.scene.remove_car(handle);
                }
                self.newest_state.remove(&slot);
                if self.local_slot == Some(slot) {
                    self.local_slot = None;
                }
            }
            Message::PlayerState(state) => {
                let Some(handle) = self.slots.get(&state.slot).copied() else {
                    return;
                };
                if self
                    .newest_state
                    .get(&state.slot)
                    .is_some_and(|&newest| state.tick <= newest)
                {
                    return;
                }
                self.newest_state.insert(state.slot, state.tick);
                if let Some(car) = self.scene.car_mut(handle) {
                    state.apply(car, self.sync_factor);
                }
            }
            Message::PlayerHit { victim, damage, .. } => {
                self.scene.apply_remote_hit(victim, damage);
            }
            Message::PlayerKill { victim, killer, .. } => {
                self.scene.apply_remote_kill(victim);
                self.scores.entry(victim).or_default().deaths += 1;
                if killer != victim {
                    self.scores.entry(killer).or_default().kills += 1;
                }
            }
            Message::MatchState {
                timeout,
                reset_stats,
            } => {
                self.match_remaining = timeout;
                if reset_stats {
                    self.scores.clear();
                }
            }
            Message::PlayerControl(_) => {}
        }
    }

    /// Feed render time; runs due fixed ticks and returns how many ran
    pub fn frame(&mut self, elapsed: f32) -> u32 {
        let ticks = self.clock.advance(elapsed);
        let dt = self.clock.dt();
        for _ in 0..ticks {
            if let Some(handle) = self.local_car() {
                self.scene.set_input(handle, self.input);
            }
            self.scene.update(dt);
            self.events.extend(self.scene.drain_events());
            self.match_remaining = (self.match_remaining - dt).max(0.0);
        }
        ticks
    }
}
