//! WebSocket transport adapter

pub mod handler;

pub use handler::ws_handler;
