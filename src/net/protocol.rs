//! Wire messages exchanged between server and clients
//!
//! Every frame carries exactly one message, identified by a one-byte tag.
//! Payload structs derive serde so the codec can write them with bincode.
//! Frequent messages address cars by their one-byte slot; hit and kill
//! reports use the stable 64-bit player id so they stay correct when a slot
//! is reused.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::TerrainMode;
use crate::game::snapshot::PlayerState;
use crate::game::CarInput;

/// Message type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageTag {
    TerrainInfo = 1,
    PlayerJoin = 2,
    PlayerLeave = 3,
    PlayerControl = 4,
    PlayerState = 5,
    PlayerHit = 6,
    PlayerKill = 7,
    MatchState = 8,
}

impl MessageTag {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::TerrainInfo,
            2 => Self::PlayerJoin,
            3 => Self::PlayerLeave,
            4 => Self::PlayerControl,
            5 => Self::PlayerState,
            6 => Self::PlayerHit,
            7 => Self::PlayerKill,
            8 => Self::MatchState,
            _ => return None,
        })
    }
}

/// Fire button bits of a control message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FireFlags(pub u8);

impl FireFlags {
    pub const GUN: u8 = 1 << 0;
    pub const CANNON: u8 = 1 << 1;

    pub fn new(gun: bool, cannon: bool) -> Self {
        let mut bits = 0;
        if gun {
            bits |= Self::GUN;
        }
        if cannon {
            bits |= Self::CANNON;
        }
        Self(bits)
    }

    pub fn gun(self) -> bool {
        self.0 & Self::GUN != 0
    }

    pub fn cannon(self) -> bool {
        self.0 & Self::CANNON != 0
    }
}

/// Driver input for one tick, client to server
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerControl {
    pub tick: u32,
    pub slot: u8,
    pub steering: f32,
    pub accel: f32,
    pub thrust: f32,
    pub aim: Vec3,
    pub fire: FireFlags,
    pub handbrake: bool,
}

impl PlayerControl {
    pub fn from_input(tick: u32, slot: u8, input: &CarInput) -> Self {
        Self {
            tick,
            slot,
            steering: input.steering,
            accel: input.accel,
            thrust: input.thrust,
            aim: input.aim,
            fire: FireFlags::new(input.fire_gun, input.fire_cannon),
            handbrake: input.handbrake,
        }
    }

    pub fn to_input(&self) -> CarInput {
        CarInput {
            steering: self.steering,
            accel: self.accel,
            thrust: self.thrust,
            aim: self.aim,
            fire_gun: self.fire.gun(),
            fire_cannon: self.fire.cannon(),
            handbrake: self.handbrake,
        }
        .sanitized()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Terrain parameters, sent before any join so the client can build
    /// the same terrain
    TerrainInfo { seed: u64, mode: TerrainMode },
    PlayerJoin {
        slot: u8,
        guid: u64,
        name: String,
        position: Vec3,
        rotation: Quat,
        tick: u32,
    },
    PlayerLeave { slot: u8 },
    PlayerControl(PlayerControl),
    PlayerState(PlayerState),
    PlayerHit {
        tick: u32,
        victim: u64,
        attacker: u64,
        damage: i32,
    },
    PlayerKill { tick: u32, victim: u64, killer: u64 },
    /// Seconds left in the match; `reset_stats` marks a new match
    MatchState { timeout: f32, reset_stats: bool },
}

impl Message {
    pub fn tag(&self) -> MessageTag {
        match self {
            Message::TerrainInfo { .. } => MessageTag::TerrainInfo,
            Message::PlayerJoin { .. } => MessageTag::PlayerJoin,
            Message::PlayerLeave { .. } => MessageTag::PlayerLeave,
            Message::PlayerControl(_) => MessageTag::PlayerControl,
            Message::PlayerState(_) => MessageTag::PlayerState,
            Message::PlayerHit { .. } => MessageTag::PlayerHit,
            Message::PlayerKill { .. } => MessageTag::PlayerKill,
            Message::MatchState { .. } => MessageTag::MatchState,
        }
    }

    /// Messages that may be dropped without lasting effect
    pub fn is_unreliable(&self) -> bool {
        matches!(self, Message::PlayerControl(_) | Message::PlayerState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_flags() {
        let flags = FireFlags::new(true, false);
        assert!(flags.gun());
        assert!(!flags.cannon());
        assert_eq!(FireFlags::new(true, true).0, 0b11);
    }

    #[test]
    fn test_control_input_conversion_sanitizes() {
        let control = PlayerControl {
            tick: 4,
            slot: 1,
            steering: 3.0,
            accel: f32::NAN,
            thrust: -1.0,
            aim: Vec3::new(1.0, 2.0, 3.0),
            fire: FireFlags::new(false, true),
            handbrake: true,
        };
        let input = control.to_input();
        assert_eq!(input.steering, 1.0);
        assert_eq!(input.accel, 0.0);
        assert_eq!(input.thrust, 0.0);
        assert!(input.fire_cannon && !input.fire_gun);
        assert_eq!(PlayerControl::from_input(4, 1, &input).fire, control.fire);
    }

    #[test]
    fn test_tags_round_trip() {
        for tag in 1..=8u8 {
            assert_eq!(MessageTag::from_u8(tag).map(|t| t as u8), Some(tag));
        }
        assert_eq!(MessageTag::from_u8(0), None);
    }
}
