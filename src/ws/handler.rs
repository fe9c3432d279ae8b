//! WebSocket upgrade handler
//!
//! Each socket carries binary codec frames. The adapter forwards inbound
//! frames to the session and writes out the peer's own outbox plus the
//! broadcast subscription the session hands back on join.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::app::{AppState, PeerInfo};
use crate::net::codec::MAX_NAME_LEN;
use crate::net::PeerEvent;
use crate::util::rate_limit::PeerRateLimiter;
use crate::util::time::unix_millis;

/// Frames queued for one peer before unicasts are dropped
const OUTBOX_CAPACITY: usize = 256;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Display name
    pub name: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let guid = state.fresh_guid();
    let name = display_name(query.name.as_deref(), guid);
    ws.on_upgrade(move |socket| handle_socket(socket, guid, name, state))
}

fn display_name(requested: Option<&str>, guid: u64) -> String {
    let trimmed = requested.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return format!("Player_{:04x}", guid & 0xffff);
    }
    trimmed.chars().take(MAX_NAME_LEN).collect()
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, guid: u64, name: String, state: AppState) {
    info!(guid, name = %name, "New WebSocket connection");

    state.peers.insert(
        guid,
        PeerInfo {
            name: name.clone(),
            connected_at: unix_millis(),
        },
    );

    let (ws_sink, ws_stream) = socket.split();
    let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
    let (accepted_tx, accepted_rx) = oneshot::channel();

    let sent = state
        .session
        .send(PeerEvent::Connected {
            guid,
            name,
            outbox: outbox_tx,
            accepted: accepted_tx,
        })
        .await;
    let frames = if sent { accepted_rx.await.ok() } else { None };

    if let Some(frames) = frames {
        let mut writer = tokio::spawn(write_frames(guid, ws_sink, outbox_rx, frames));
        let timeout = Duration::from_secs_f32(state.sim.physics.peer_timeout.max(0.1));

        tokio::select! {
            _ = read_frames(guid, ws_stream, &state, timeout) => {}
            _ = &mut writer => {
                debug!(guid, "Writer finished, closing connection");
            }
        }

        let _ = state.session.send(PeerEvent::Disconnected { guid }).await;
        writer.abort();
    } else if sent {
        warn!(guid, "Session rejected peer");
    } else {
        warn!(guid, "Session is not running");
    }

    state.peers.remove(&guid);
    info!(guid, "WebSocket connection closed");
}

/// Socket -> session, until close, error or silence
async fn read_frames(
    guid: u64,
    mut ws_stream: SplitStream<WebSocket>,
    state: &AppState,
    timeout: Duration,
) {
    let rate_limiter = PeerRateLimiter::new();

    loop {
        let result = match tokio::time::timeout(timeout, ws_stream.next()).await {
            Ok(Some(result)) => result,
            Ok(None) => break,
            Err(_) => {
                info!(guid, "Peer timed out");
                break;
            }
        };

        match result {
            Ok(Message::Binary(data)) => {
                if !rate_limiter.check_input() {
                    debug!(guid, "Rate limited inbound frame");
                    continue;
                }
                let event = PeerEvent::Frame {
                    guid,
                    data: Bytes::from(data),
                };
                if !state.session.send(event).await {
                    debug!(guid, "Session channel closed");
                    break;
                }
            }
            Ok(Message::Text(_)) => {
                warn!(guid, "Received text message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(guid, "Client initiated close");
                break;
            }
            Err(e) => {
                warn!(guid, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Session -> socket. The subscription only starts after the greeting is
/// queued, and unicasts are polled first, so terrain info always leads.
async fn write_frames(
    guid: u64,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::Receiver<Bytes>,
    mut frames: broadcast::Receiver<Bytes>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            unicast = outbox.recv() => match unicast {
                Some(frame) => frame,
                None => {
                    debug!(guid, "Outbox closed by session");
                    break;
                }
            },
            shared = frames.recv() => match shared {
                Ok(frame) => frame,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(guid, lagged_count = n, "Peer lagged, skipping {} frames", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        if let Err(e) = ws_sink.send(Message::Binary(frame.to_vec())).await {
            debug!(guid, error = %e, "WebSocket send failed");
            break;
        }
    }

    let _ = ws_sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_defaults_and_truncates() {
        assert_eq!(display_name(None, 0xabcd_1234), "Player_1234");
        assert_eq!(display_name(Some("   "), 0x1), "Player_0001");
        assert_eq!(display_name(Some(" ace "), 1), "ace");
        let long = "x".repeat(100);
        assert_eq!(display_name(Some(&long), 1).len(), MAX_NAME_LEN);
    }
}
