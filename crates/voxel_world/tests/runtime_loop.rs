//! End-to-end runtime: the loop thread, join/attach over request channels,
//! OBS delivery on outbound byte channels, and cross-world transfer.

use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;
use std::time::Duration;

use voxel_world::catalogs::Catalogs;
use voxel_world::engine::{RequestError, World, WorldConfig, WorldHandle, WorldRunner};
use voxel_world_proto::{ActMsg, InstantReq};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn spawn_world(id: &str) -> (WorldHandle, std::thread::JoinHandle<()>) {
    let cfg = WorldConfig {
        id: id.to_string(),
        seed: 11,
        tick_rate_hz: 100,
        ..Default::default()
    };
    let world = World::new(cfg, Arc::new(Catalogs::builtin()), None).expect("world");
    WorldRunner::spawn(world)
}

fn next_obs(rx: &Receiver<Vec<u8>>) -> serde_json::Value {
    let bytes = rx.recv_timeout(REQUEST_TIMEOUT).expect("obs frame");
    serde_json::from_slice(&bytes).expect("valid json frame")
}

/// Reads OBS frames until one carries an event of the wanted type.
fn wait_for_event(rx: &Receiver<Vec<u8>>, event_type: &str) -> serde_json::Value {
    for _ in 0..500 {
        let obs = next_obs(rx);
        if let Some(events) = obs.get("events").and_then(|e| e.as_array()) {
            if let Some(ev) = events
                .iter()
                .find(|e| e.get("type").and_then(|t| t.as_str()) == Some(event_type))
            {
                return ev.clone();
            }
        }
    }
    panic!("no {event_type} event observed");
}

#[test]
fn join_obs_and_chat_round_trip() {
    let (handle, join_handle) = spawn_world("live");

    let (out_tx, out_rx) = sync_channel::<Vec<u8>>(64);
    let resp = handle
        .join("alice", false, Some(out_tx), REQUEST_TIMEOUT)
        .expect("join");
    let agent_id = resp.welcome.agent_id.clone();
    assert!(agent_id.starts_with('A'));
    assert_eq!(resp.catalogs.len(), 7);

    let obs = next_obs(&out_rx);
    assert_eq!(obs.get("type").and_then(|t| t.as_str()), Some("OBS"));
    assert_eq!(
        obs.get("agent_id").and_then(|t| t.as_str()),
        Some(agent_id.as_str())
    );
    let tick = obs.get("tick").and_then(|t| t.as_u64()).unwrap_or(0);

    let act = ActMsg {
        msg_type: "ACT".to_string(),
        tick,
        agent_id: agent_id.clone(),
        instants: vec![InstantReq {
            id: "say1".to_string(),
            req_type: "SAY".to_string(),
            text: "hello world".to_string(),
            ..Default::default()
        }],
        ..Default::default()
    };
    handle.submit_act(&agent_id, act).expect("submit");

    let chat = wait_for_event(&out_rx, "CHAT");
    assert_eq!(chat.get("text").and_then(|t| t.as_str()), Some("hello world"));
    assert_eq!(
        chat.get("from").and_then(|t| t.as_str()),
        Some(agent_id.as_str())
    );

    handle.stop();
    join_handle.join().expect("loop thread");
}

#[test]
fn attach_rebinds_with_rotated_token() {
    let (handle, join_handle) = spawn_world("attach");

    let (out_tx, _out_rx) = sync_channel::<Vec<u8>>(8);
    let resp = handle
        .join("bob", false, Some(out_tx), REQUEST_TIMEOUT)
        .expect("join");
    let token = resp.welcome.resume_token.clone();

    let (out_tx2, out_rx2) = sync_channel::<Vec<u8>>(8);
    let resp2 = handle
        .attach(&token, false, Some(out_tx2), REQUEST_TIMEOUT)
        .expect("attach");
    assert_eq!(resp2.welcome.agent_id, resp.welcome.agent_id);
    assert_ne!(resp2.welcome.resume_token, token);

    // The rebound channel receives frames.
    let obs = next_obs(&out_rx2);
    assert_eq!(obs.get("type").and_then(|t| t.as_str()), Some("OBS"));

    // An unknown token yields an empty response, not an error.
    let resp3 = handle
        .attach("resume_bogus_0", false, None, REQUEST_TIMEOUT)
        .expect("attach reply");
    assert!(resp3.welcome.agent_id.is_empty());

    handle.stop();
    join_handle.join().expect("loop thread");
}

#[test]
fn transfer_moves_agent_between_worlds() {
    let (h1, j1) = spawn_world("w-from");
    let (h2, j2) = spawn_world("w-to");

    let (out_tx, _out_rx) = sync_channel::<Vec<u8>>(8);
    let resp = h1
        .join("migrant", false, Some(out_tx), REQUEST_TIMEOUT)
        .expect("join");
    let agent_id = resp.welcome.agent_id.clone();

    let transfer = h1.transfer_out(&agent_id, REQUEST_TIMEOUT).expect("out");
    assert_eq!(transfer.id, agent_id);
    assert_eq!(transfer.from_world_id, "w-from");

    // A second transfer-out of the same agent fails: it is gone.
    match h1.transfer_out(&agent_id, REQUEST_TIMEOUT) {
        Err(RequestError::Engine(msg)) => assert!(msg.contains("not found")),
        other => panic!("expected engine error, got {other:?}"),
    }

    let (out_tx2, out_rx2) = sync_channel::<Vec<u8>>(8);
    h2.transfer_in(transfer, Some(out_tx2), false, REQUEST_TIMEOUT)
        .expect("in");
    let obs = next_obs(&out_rx2);
    assert_eq!(
        obs.get("agent_id").and_then(|t| t.as_str()),
        Some(agent_id.as_str())
    );
    assert_eq!(obs.get("world_id").and_then(|t| t.as_str()), Some("w-to"));

    h1.stop();
    h2.stop();
    j1.join().expect("loop 1");
    j2.join().expect("loop 2");
}
