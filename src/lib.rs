//! Tank Arena - armed vehicles on procedural terrain
//!
//! The simulation core (`game`, `geom`) runs identically on the
//! authoritative server and on predicting clients. `net` carries the wire
//! protocol, the server session task and the client world; `ws`, `http`
//! and `app` expose the session over WebSockets.

pub mod app;
pub mod config;
pub mod game;
pub mod geom;
pub mod http;
pub mod net;
pub mod util;
pub mod ws;
