//! The session task driven through its handle, as the transport does

use std::time::Duration;

use bytes::Bytes;
use glam::Vec3;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tokio_test::assert_ok;

use tank_arena::config::{SimConfig, TerrainConfig, TerrainMode};
use tank_arena::net::codec::{decode, encode};
use tank_arena::net::protocol::{FireFlags, PlayerControl};
use tank_arena::net::{GameSession, Message, PeerEvent};

const WAIT: Duration = Duration::from_secs(5);

fn config() -> SimConfig {
    let mut config = SimConfig::default();
    config.terrain = TerrainConfig {
        size: 100.0,
        resolution: 33,
        mode: TerrainMode::Flat,
        object_density: 0.0,
        ..TerrainConfig::default()
    };
    config.capacity.cars = 1;
    config
}

async fn next_unicast(rx: &mut mpsc::Receiver<Bytes>) -> Message {
    let frame = assert_ok!(timeout(WAIT, rx.recv()).await).expect("outbox open");
    assert_ok!(decode(&frame))
}

async fn next_broadcast(rx: &mut broadcast::Receiver<Bytes>, want: impl Fn(&Message) -> bool) -> Message {
    loop {
        let frame = assert_ok!(assert_ok!(timeout(WAIT, rx.recv()).await));
        let message = assert_ok!(decode(&frame));
        if want(&message) {
            return message;
        }
    }
}

#[tokio::test]
async fn peer_joins_drives_and_leaves() {
    let (session, handle) = GameSession::new(config(), 99);
    let task = tokio::spawn(session.run());

    let (outbox, mut unicast) = mpsc::channel(64);
    let (accepted, accepted_rx) = oneshot::channel();
    assert!(
        handle
            .send(PeerEvent::Connected {
                guid: 5,
                name: "driver".to_string(),
                outbox,
                accepted,
            })
            .await
    );
    let mut frames = assert_ok!(assert_ok!(timeout(WAIT, accepted_rx).await));
    let own_join = next_broadcast(&mut frames, |_| true).await;
    assert!(matches!(own_join, Message::PlayerJoin { guid: 5, .. }));

    let first = next_unicast(&mut unicast).await;
    assert_eq!(
        first,
        Message::TerrainInfo {
            seed: 99,
            mode: TerrainMode::Flat
        }
    );
    let Message::PlayerJoin { slot, guid, .. } = next_unicast(&mut unicast).await else {
        panic!("expected own join");
    };
    assert_eq!(guid, 5);

    let control = Message::PlayerControl(PlayerControl {
        tick: 1,
        slot,
        steering: 0.0,
        accel: 1.0,
        thrust: 0.0,
        aim: Vec3::ZERO,
        fire: FireFlags::default(),
        handbrake: false,
    });
    assert!(
        handle
            .send(PeerEvent::Frame {
                guid: 5,
                data: assert_ok!(encode(&control)),
            })
            .await
    );

    let state = next_broadcast(&mut frames, |m| matches!(m, Message::PlayerState(_))).await;
    let Message::PlayerState(state) = state else {
        unreachable!();
    };
    assert_eq!(state.slot, slot);
    assert!(handle.stats().players == 1);

    // A second peer turned away once the first holds every car
    let (outbox, mut rejected) = mpsc::channel(64);
    let (accepted, refused) = oneshot::channel();
    assert!(
        handle
            .send(PeerEvent::Connected {
                guid: 6,
                name: "late".to_string(),
                outbox,
                accepted,
            })
            .await
    );
    assert!(assert_ok!(timeout(WAIT, refused).await).is_err());
    assert!(assert_ok!(timeout(WAIT, rejected.recv()).await).is_none());

    assert!(handle.send(PeerEvent::Disconnected { guid: 5 }).await);
    let leave = next_broadcast(&mut frames, |m| matches!(m, Message::PlayerLeave { .. })).await;
    assert_eq!(leave, Message::PlayerLeave { slot });

    drop(frames);
    drop(handle);
    assert_ok!(timeout(WAIT, task).await).expect("session task");
}
