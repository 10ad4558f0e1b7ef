//! Minimal world demo: spawns an engine, joins two scripted agents and
//! prints their observations for a few seconds.

use std::sync::mpsc::sync_channel;
use std::sync::Arc;
use std::time::Duration;

use voxel_world::catalogs::Catalogs;
use voxel_world::engine::{World, WorldConfig, WorldRunner};
use voxel_world_proto::{ActMsg, InstantReq, TaskReq};

fn main() {
    let cfg = WorldConfig {
        id: "demo".to_string(),
        seed: 42,
        ..Default::default()
    };
    let world = match World::new(cfg, Arc::new(Catalogs::builtin()), None) {
        Ok(w) => w,
        Err(err) => {
            eprintln!("world init failed: {err}");
            std::process::exit(1);
        }
    };
    let (handle, loop_thread) = WorldRunner::spawn(world);

    let (out_a, rx_a) = sync_channel::<Vec<u8>>(32);
    let (out_b, _rx_b) = sync_channel::<Vec<u8>>(32);
    let timeout = Duration::from_secs(5);

    let resp_a = handle
        .join("scout", false, Some(out_a), timeout)
        .expect("join scout");
    let resp_b = handle
        .join("trader", false, Some(out_b), timeout)
        .expect("join trader");
    let scout = resp_a.welcome.agent_id.clone();
    let trader = resp_b.welcome.agent_id.clone();
    println!(
        "joined {scout} and {trader} into world {} ({} catalogs)",
        resp_a.welcome.current_world_id,
        resp_a.catalogs.len()
    );

    let mut sent_actions = false;
    for _ in 0..25 {
        let Ok(frame) = rx_a.recv_timeout(timeout) else {
            break;
        };
        let Ok(obs) = serde_json::from_slice::<serde_json::Value>(&frame) else {
            continue;
        };
        let tick = obs.get("tick").and_then(|t| t.as_u64()).unwrap_or(0);
        let events = obs
            .get("events")
            .and_then(|e| e.as_array())
            .map(|e| e.len())
            .unwrap_or(0);
        println!("tick {tick}: obs {} bytes, {events} events", frame.len());

        if !sent_actions {
            sent_actions = true;
            let act = ActMsg {
                msg_type: "ACT".to_string(),
                tick,
                agent_id: scout.clone(),
                instants: vec![InstantReq {
                    id: "hello".to_string(),
                    req_type: "SAY".to_string(),
                    text: "anyone around?".to_string(),
                    ..Default::default()
                }],
                tasks: vec![TaskReq {
                    id: "walk".to_string(),
                    req_type: "MOVE_TO".to_string(),
                    target: [20, 0, -20],
                    ..Default::default()
                }],
                ..Default::default()
            };
            if let Err(err) = handle.submit_act(&scout, act) {
                eprintln!("submit failed: {err}");
            }
        }
    }

    handle.stop();
    let _ = loop_thread.join();
}
