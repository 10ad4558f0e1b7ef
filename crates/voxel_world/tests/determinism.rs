//! Replay determinism: two engines fed the same seed and the same ordered
//! action stream must report identical state digests at every tick.

use std::sync::mpsc::channel;
use std::sync::Arc;

use voxel_world::catalogs::Catalogs;
use voxel_world::engine::{ActionEnvelope, JoinRequest, World, WorldConfig};
use voxel_world_proto::{ActMsg, InstantReq, ItemStack, TaskReq};

fn new_world() -> World {
    let cfg = WorldConfig {
        id: "det".to_string(),
        seed: 7,
        ..Default::default()
    };
    World::new(cfg, Arc::new(Catalogs::builtin()), None).expect("world")
}

fn join(world: &mut World, name: &str) -> String {
    let (tx, rx) = channel();
    world.step_once(
        vec![JoinRequest {
            name: name.to_string(),
            delta_voxels: false,
            out: None,
            resp: Some(tx),
        }],
        Vec::new(),
        Vec::new(),
    );
    rx.recv().expect("join response").welcome.agent_id
}

/// A scripted stream of per-tick action bundles for two agents.
fn scripted_act(tick: u64, agent_id: &str, other_id: &str) -> Option<ActMsg> {
    let mut act = ActMsg {
        msg_type: "ACT".to_string(),
        tick,
        agent_id: agent_id.to_string(),
        ..Default::default()
    };
    match tick % 10 {
        2 => act.tasks.push(TaskReq {
            id: format!("mv-{tick}"),
            req_type: "MOVE_TO".to_string(),
            target: [((tick as i32) % 40) - 20, 0, 10],
            ..Default::default()
        }),
        4 => act.instants.push(InstantReq {
            id: format!("say-{tick}"),
            req_type: "SAY".to_string(),
            text: format!("tick {tick}"),
            ..Default::default()
        }),
        6 => act.instants.push(InstantReq {
            id: format!("w-{tick}"),
            req_type: "WHISPER".to_string(),
            to: other_id.to_string(),
            text: "psst".to_string(),
            ..Default::default()
        }),
        8 => act.instants.push(InstantReq {
            id: format!("tr-{tick}"),
            req_type: "OFFER_TRADE".to_string(),
            to: other_id.to_string(),
            offer: vec![ItemStack {
                item: "PLANK".to_string(),
                count: 1,
            }],
            request: vec![ItemStack {
                item: "COAL".to_string(),
                count: 1,
            }],
            ..Default::default()
        }),
        _ => return None,
    }
    Some(act)
}

#[test]
fn digests_match_across_replicas() {
    let mut w1 = new_world();
    let mut w2 = new_world();

    let a1 = join(&mut w1, "alpha");
    let b1 = join(&mut w1, "beta");
    let a2 = join(&mut w2, "alpha");
    let b2 = join(&mut w2, "beta");
    assert_eq!(a1, a2);
    assert_eq!(b1, b2);

    for _ in 0..60 {
        let tick = w1.tick();
        let mut acts1 = Vec::new();
        let mut acts2 = Vec::new();
        for (agent, other) in [(&a1, &b1), (&b1, &a1)] {
            if let Some(act) = scripted_act(tick, agent, other) {
                acts1.push(ActionEnvelope {
                    agent_id: agent.clone(),
                    act: act.clone(),
                });
                acts2.push(ActionEnvelope {
                    agent_id: agent.clone(),
                    act,
                });
            }
        }
        let (t1, d1) = w1.step_once(Vec::new(), Vec::new(), acts1);
        let (t2, d2) = w2.step_once(Vec::new(), Vec::new(), acts2);
        assert_eq!(t1, t2);
        assert_eq!(d1, d2, "digest diverged at tick {t1}");
    }
}

#[test]
fn digest_is_sensitive_to_state_changes() {
    let mut w = new_world();
    let a = join(&mut w, "alpha");
    let before = w.state_digest(w.tick());
    w.spawn_item_entity(w.tick(), &a, voxel_world::geometry::Vec3i::new(5, 1, 5), "COAL", 1, "TEST");
    let after = w.state_digest(w.tick());
    assert_ne!(before, after);
}
