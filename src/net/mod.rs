//! Wire protocol, the authoritative session and the client world

pub mod client;
pub mod codec;
pub mod protocol;
pub mod session;

pub use client::ClientWorld;
pub use codec::CodecError;
pub use protocol::Message;
pub use session::{GameSession, PeerEvent, SessionHandle, SessionStats};
