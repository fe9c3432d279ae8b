//! Length-prefixed binary framing
//!
//! A frame is a little-endian `u32` body length followed by the body: the
//! one-byte message tag, then the message fields as a bincode tuple in
//! declaration order. Decoded states and joins are checked for non-finite
//! numbers and degenerate rotations before they reach the simulation.

use bincode::Options;
use bytes::{BufMut, Bytes, BytesMut};
use glam::{Quat, Vec3};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::TerrainMode;
use crate::game::snapshot::PlayerState;

use super::protocol::{Message, MessageTag, PlayerControl};

/// Bytes in the length prefix
pub const LENGTH_PREFIX: usize = 4;
/// Largest body accepted from a peer
pub const MAX_FRAME_LEN: usize = 16 * 1024;
/// Names longer than this are cut at a character boundary when encoding
pub const MAX_NAME_LEN: usize = 32;

/// Rotations shorter than this cannot be normalized
const MIN_QUAT_LENGTH_SQ: f32 = 1e-6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame truncated: needed {needed} more bytes")]
    Truncated { needed: usize },

    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    #[error("length prefix says {declared} bytes but body has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("frame of {0} bytes exceeds the limit")]
    TooLarge(usize),

    #[error("player name is not valid UTF-8 or is too long")]
    InvalidName,

    #[error("invalid value for {0}")]
    InvalidField(&'static str),

    #[error("malformed message body: {0}")]
    Body(String),
}

impl From<bincode::Error> for CodecError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::InvalidUtf8Encoding(_) => CodecError::InvalidName,
            other => CodecError::Body(other.to_string()),
        }
    }
}

fn options() -> impl Options {
    bincode::options()
        .with_limit(MAX_FRAME_LEN as u64)
        .reject_trailing_bytes()
}

/// Encode one message into a standalone frame
pub fn encode(message: &Message) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(64);
    encode_into(message, &mut buf)?;
    Ok(buf.freeze())
}

/// Append one framed message to `buf`. On error `buf` is left unchanged.
pub fn encode_into(message: &Message, buf: &mut BytesMut) -> Result<(), CodecError> {
    let body = match message {
        Message::TerrainInfo { seed, mode } => options().serialize(&(seed, mode.to_u8()))?,
        Message::PlayerJoin {
            slot,
            guid,
            name,
            position,
            rotation,
            tick,
        } => options().serialize(&(slot, guid, clip_name(name), position, rotation, tick))?,
        Message::PlayerLeave { slot } => options().serialize(slot)?,
        Message::PlayerControl(control) => options().serialize(control)?,
        Message::PlayerState(state) => options().serialize(state)?,
        Message::PlayerHit {
            tick,
            victim,
            attacker,
            damage,
        } => options().serialize(&(tick, victim, attacker, damage))?,
        Message::PlayerKill {
            tick,
            victim,
            killer,
        } => options().serialize(&(tick, victim, killer))?,
        Message::MatchState {
            timeout,
            reset_stats,
        } => options().serialize(&(timeout, reset_stats))?,
    };

    let body_len = body.len() + 1;
    if body_len > MAX_FRAME_LEN {
        return Err(CodecError::TooLarge(body_len));
    }
    buf.reserve(LENGTH_PREFIX + body_len);
    buf.put_u32_le(body_len as u32);
    buf.put_u8(message.tag() as u8);
    buf.put_slice(&body);
    Ok(())
}

/// Decode a buffer holding exactly one frame
pub fn decode(frame: &[u8]) -> Result<Message, CodecError> {
    if frame.len() < LENGTH_PREFIX + 1 {
        return Err(CodecError::Truncated {
            needed: LENGTH_PREFIX + 1 - frame.len(),
        });
    }
    let declared = read_prefix(frame);
    if declared > MAX_FRAME_LEN {
        return Err(CodecError::TooLarge(declared));
    }
    let actual = frame.len() - LENGTH_PREFIX;
    if declared != actual {
        return Err(CodecError::LengthMismatch { declared, actual });
    }

    let raw_tag = frame[LENGTH_PREFIX];
    let tag = MessageTag::from_u8(raw_tag).ok_or(CodecError::UnknownTag(raw_tag))?;
    decode_body(tag, &frame[LENGTH_PREFIX + 1..])
}

/// Pop the next complete frame off a stream buffer. `Ok(None)` means more
/// bytes are needed.
pub fn decode_stream(buf: &mut BytesMut) -> Result<Option<Message>, CodecError> {
    if buf.len() < LENGTH_PREFIX {
        return Ok(None);
    }
    let declared = read_prefix(buf);
    if declared > MAX_FRAME_LEN {
        return Err(CodecError::TooLarge(declared));
    }
    if buf.len() < LENGTH_PREFIX + declared {
        return Ok(None);
    }
    let frame = buf.split_to(LENGTH_PREFIX + declared);
    decode(&frame).map(Some)
}

fn read_prefix(buf: &[u8]) -> usize {
    let mut prefix = [0u8; LENGTH_PREFIX];
    prefix.copy_from_slice(&buf[..LENGTH_PREFIX]);
    u32::from_le_bytes(prefix) as usize
}

fn body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(options().deserialize(bytes)?)
}

fn decode_body(tag: MessageTag, bytes: &[u8]) -> Result<Message, CodecError> {
    Ok(match tag {
        MessageTag::TerrainInfo => {
            let (seed, mode): (u64, u8) = body(bytes)?;
            Message::TerrainInfo {
                seed,
                mode: TerrainMode::from_u8(mode).ok_or(CodecError::InvalidField("terrain mode"))?,
            }
        }
        MessageTag::PlayerJoin => {
            let (slot, guid, name, position, rotation, tick): (u8, u64, String, Vec3, Quat, u32) =
                body(bytes)?;
            if name.len() > MAX_NAME_LEN {
                return Err(CodecError::InvalidName);
            }
            Message::PlayerJoin {
                slot,
                guid,
                name,
                position: finite(position, "join position")?,
                rotation: rotation_checked(rotation, "join rotation")?,
                tick,
            }
        }
        MessageTag::PlayerLeave => Message::PlayerLeave { slot: body(bytes)? },
        MessageTag::PlayerControl => Message::PlayerControl(body::<PlayerControl>(bytes)?),
        MessageTag::PlayerState => Message::PlayerState(checked_state(body(bytes)?)?),
        MessageTag::PlayerHit => {
            let (tick, victim, attacker, damage): (u32, u64, u64, i32) = body(bytes)?;
            Message::PlayerHit {
                tick,
                victim,
                attacker,
                damage,
            }
        }
        MessageTag::PlayerKill => {
            let (tick, victim, killer): (u32, u64, u64) = body(bytes)?;
            Message::PlayerKill {
                tick,
                victim,
                killer,
            }
        }
        MessageTag::MatchState => {
            let (timeout, reset_stats): (f32, bool) = body(bytes)?;
            if !timeout.is_finite() {
                return Err(CodecError::InvalidField("match timeout"));
            }
            Message::MatchState {
                timeout,
                reset_stats,
            }
        }
    })
}

fn finite(v: Vec3, field: &'static str) -> Result<Vec3, CodecError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CodecError::InvalidField(field))
    }
}

fn rotation_checked(q: Quat, field: &'static str) -> Result<Quat, CodecError> {
    if q.is_finite() && q.length_squared() > MIN_QUAT_LENGTH_SQ {
        Ok(q)
    } else {
        Err(CodecError::InvalidField(field))
    }
}

fn checked_state(state: PlayerState) -> Result<PlayerState, CodecError> {
    finite(state.position, "state position")?;
    rotation_checked(state.rotation, "state rotation")?;
    finite(state.velocity, "state velocity")?;
    finite(state.angular_velocity, "state angular velocity")?;

    let scalars_finite = state.steering.is_finite()
        && state.wheels.iter().all(|w| {
            w.suspension_offset.is_finite()
                && w.suspension_speed.is_finite()
                && w.spin_speed.is_finite()
        })
        && state.turrets.iter().all(|t| t.yaw.is_finite() && t.pitch.is_finite());
    if !scalars_finite {
        return Err(CodecError::InvalidField("state scalars"));
    }
    Ok(state)
}

fn clip_name(name: &str) -> &str {
    let mut end = name.len().min(MAX_NAME_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Frame a hand-built body, for feeding the decoder bytes the encoder
/// would never produce
#[cfg(test)]
pub(crate) fn frame_raw<T: serde::Serialize>(tag: MessageTag, value: &T) -> Vec<u8> {
    let body = bincode::options().serialize(value).expect("serializable");
    let mut frame = Vec::with_capacity(LENGTH_PREFIX + 1 + body.len());
    frame.extend_from_slice(&((body.len() + 1) as u32).to_le_bytes());
    frame.push(tag as u8);
    frame.extend_from_slice(&body);
    frame
}
