//! Application state shared across routes

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::{Config, SimConfig};
use crate::net::SessionHandle;

/// A live transport connection
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub name: String,
    pub connected_at: u64,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sim: Arc<SimConfig>,
    pub session: SessionHandle,
    /// Connected peers keyed by guid
    pub peers: Arc<DashMap<u64, PeerInfo>>,
}

impl AppState {
    pub fn new(config: Config, sim: SimConfig, session: SessionHandle) -> Self {
        Self {
            config: Arc::new(config),
            sim: Arc::new(sim),
            session,
            peers: Arc::new(DashMap::new()),
        }
    }

    /// Draw a guid no connected peer is using
    pub fn fresh_guid(&self) -> u64 {
        loop {
            let guid = rand::random::<u64>();
            if guid != 0 && !self.peers.contains_key(&guid) {
                return guid;
            }
        }
    }
}
