//! Engine unit tests: permission layering, trades, blueprints, survival,
//! law lifecycle and snapshot round-trips.

use std::collections::BTreeMap;
use std::sync::Arc;

use voxel_world_proto::{ActMsg, InstantReq, ItemStack, TaskReq};

use super::*;
use crate::catalogs::Catalogs;
use crate::engine::inventory;
use crate::geometry::Vec3i;

fn test_config(id: &str) -> WorldConfig {
    WorldConfig {
        id: id.to_string(),
        seed: 42,
        ..Default::default()
    }
}

fn test_world(id: &str) -> World {
    match World::new(test_config(id), Arc::new(Catalogs::builtin()), None) {
        Ok(w) => w,
        Err(err) => panic!("world: {err}"),
    }
}

fn join(w: &mut World, name: &str) -> String {
    let resp = w.join_agent(name, false, None);
    resp.welcome.agent_id
}

fn make_claim(w: &mut World, owner: &str, anchor: Vec3i, radius: i32) -> String {
    let land_id = w.next_land_id(owner);
    w.claims.insert(
        land_id.clone(),
        LandClaim {
            land_id: land_id.clone(),
            owner: owner.to_string(),
            anchor,
            radius,
            flags: ClaimFlags {
                allow_build: false,
                allow_break: false,
                allow_damage: false,
                allow_trade: true,
            },
            members: BTreeMap::new(),
            market_tax: 0.0,
            curfew_enabled: false,
            curfew_start: 0.0,
            curfew_end: 0.0,
            fine_break_enabled: false,
            fine_break_item: String::new(),
            fine_break_per_block: 0,
            access_pass_enabled: false,
            access_ticket_item: String::new(),
            access_ticket_cost: 0,
            maintenance_stage: 0,
            maintenance_due_tick: u64::MAX,
        },
    );
    land_id
}

fn last_event(w: &World, agent_id: &str) -> serde_json::Value {
    w.agent(agent_id)
        .and_then(|a| a.events.last().cloned())
        .unwrap_or_default()
}

fn find_event(w: &World, agent_id: &str, event_type: &str) -> Option<serde_json::Value> {
    w.agent(agent_id).and_then(|a| {
        a.events
            .iter()
            .find(|e| e.get("type").and_then(|t| t.as_str()) == Some(event_type))
            .cloned()
    })
}

#[test]
fn curfew_blocks_build_and_break() {
    let mut w = World::new(
        WorldConfig {
            id: "t".to_string(),
            seed: 42,
            day_ticks: 100,
            ..Default::default()
        },
        Arc::new(Catalogs::builtin()),
        None,
    )
    .unwrap();
    let visitor = join(&mut w, "visitor");
    let land_id = make_claim(&mut w, "A9999", Vec3i::new(0, 1, 0), 8);
    {
        let land = w.claims.get_mut(&land_id).unwrap();
        land.flags.allow_build = true;
        land.flags.allow_break = true;
        land.curfew_enabled = true;
        land.curfew_start = 0.0;
        land.curfew_end = 0.1;
    }
    let inside = Vec3i::new(1, 1, 1);

    // tick 5 -> time 0.05, inside the curfew window.
    assert!(!w.can_build_at(&visitor, inside, 5));
    assert!(!w.can_break_at(&visitor, inside, 5));
    // tick 20 -> time 0.2, outside.
    assert!(w.can_build_at(&visitor, inside, 20));
    assert!(w.can_break_at(&visitor, inside, 20));
}

#[test]
fn trade_with_market_tax_routes_cut_to_owner() {
    let (sink, entries) = MemoryAuditSink::new();
    let mut w = World::new(
        test_config("t"),
        Arc::new(Catalogs::builtin()),
        Some(Box::new(sink)),
    )
    .unwrap();
    let seller = join(&mut w, "seller");
    let buyer = join(&mut w, "buyer");
    let owner = join(&mut w, "owner");

    let land_id = make_claim(&mut w, &owner, Vec3i::new(0, 1, 0), 8);
    w.claims.get_mut(&land_id).unwrap().market_tax = 0.10;

    w.agent_mut(&seller).unwrap().pos = Vec3i::new(1, 1, 0);
    w.agent_mut(&buyer).unwrap().pos = Vec3i::new(0, 1, 1);
    w.agent_mut(&owner).unwrap().pos = Vec3i::new(500, 1, 500);
    w.agent_mut(&seller).unwrap().inventory = Inventory::from([("PLANK".to_string(), 10)]);
    w.agent_mut(&buyer).unwrap().inventory = Inventory::from([("IRON_INGOT".to_string(), 10)]);

    let offer = InstantReq {
        id: "i1".to_string(),
        req_type: "OFFER_TRADE".to_string(),
        to: buyer.clone(),
        offer: vec![ItemStack {
            item: "PLANK".to_string(),
            count: 10,
        }],
        request: vec![ItemStack {
            item: "IRON_INGOT".to_string(),
            count: 10,
        }],
        ..Default::default()
    };
    w.apply_instant(&seller, &offer, 0);
    let trade_id = last_event(&w, &seller)
        .get("trade_id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .expect("trade id in offer ack");

    let accept = InstantReq {
        id: "i2".to_string(),
        req_type: "ACCEPT_TRADE".to_string(),
        trade_id: trade_id.clone(),
        ..Default::default()
    };
    w.apply_instant(&buyer, &accept, 0);

    let seller_inv = &w.agent(&seller).unwrap().inventory;
    assert_eq!(inventory::count(seller_inv, "PLANK"), 0);
    assert_eq!(inventory::count(seller_inv, "IRON_INGOT"), 9);
    let buyer_inv = &w.agent(&buyer).unwrap().inventory;
    assert_eq!(inventory::count(buyer_inv, "IRON_INGOT"), 0);
    assert_eq!(inventory::count(buyer_inv, "PLANK"), 9);
    let owner_inv = &w.agent(&owner).unwrap().inventory;
    assert_eq!(inventory::count(owner_inv, "PLANK"), 1);
    assert_eq!(inventory::count(owner_inv, "IRON_INGOT"), 1);
    assert!(w.trades.is_empty());

    let entries = entries.lock().unwrap();
    let trade_audit = entries
        .iter()
        .find(|e| e.action == "TRADE")
        .expect("trade audit entry");
    assert_eq!(trade_audit.reason, "ACCEPT_TRADE");
    assert_eq!(
        trade_audit.details.get("trade_id").and_then(|v| v.as_str()),
        Some(trade_id.as_str())
    );
    assert_eq!(
        trade_audit.details.get("tax_rate").and_then(|v| v.as_f64()),
        Some(0.10)
    );
}

#[test]
fn trade_tax_to_org_treasury() {
    let mut w = test_world("t");
    let seller = join(&mut w, "seller");
    let buyer = join(&mut w, "buyer");

    w.orgs.insert(
        "O0042".to_string(),
        Organization {
            org_id: "O0042".to_string(),
            kind: OrgKind::City,
            name: "harbor".to_string(),
            created_tick: 0,
            members: BTreeMap::new(),
            treasury: Inventory::new(),
        },
    );
    let land_id = make_claim(&mut w, "O0042", Vec3i::new(0, 1, 0), 8);
    w.claims.get_mut(&land_id).unwrap().market_tax = 0.10;

    w.agent_mut(&seller).unwrap().pos = Vec3i::new(1, 1, 0);
    w.agent_mut(&buyer).unwrap().pos = Vec3i::new(0, 1, 1);
    w.agent_mut(&seller).unwrap().inventory = Inventory::from([("PLANK".to_string(), 10)]);
    w.agent_mut(&buyer).unwrap().inventory = Inventory::from([("COAL".to_string(), 10)]);

    let offer = InstantReq {
        id: "i1".to_string(),
        req_type: "OFFER_TRADE".to_string(),
        to: buyer.clone(),
        offer: vec![ItemStack {
            item: "PLANK".to_string(),
            count: 10,
        }],
        request: vec![ItemStack {
            item: "COAL".to_string(),
            count: 10,
        }],
        ..Default::default()
    };
    w.apply_instant(&seller, &offer, 0);
    let trade_id = last_event(&w, &seller)
        .get("trade_id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap();
    let accept = InstantReq {
        id: "i2".to_string(),
        req_type: "ACCEPT_TRADE".to_string(),
        trade_id,
        ..Default::default()
    };
    w.apply_instant(&buyer, &accept, 0);

    let treasury = &w.org("O0042").unwrap().treasury;
    assert_eq!(inventory::count(treasury, "PLANK"), 1);
    assert_eq!(inventory::count(treasury, "COAL"), 1);
}

#[test]
fn blueprint_auto_pull_from_nearby_chest() {
    let mut w = test_world("t");
    let builder = join(&mut w, "builder");
    let base = w.agent(&builder).unwrap().pos;
    let anchor = Vec3i::new(base.x, 3, base.z);
    let chest_pos = Vec3i::new(anchor.x + 5, anchor.y, anchor.z);
    w.containers.insert(
        chest_pos,
        Container {
            kind: "CHEST".to_string(),
            pos: chest_pos,
            inventory: Inventory::from([("PLANK".to_string(), 10)]),
        },
    );

    let act = ActMsg {
        msg_type: "ACT".to_string(),
        tick: 0,
        agent_id: builder.clone(),
        tasks: vec![TaskReq {
            id: "k1".to_string(),
            req_type: "BUILD_BLUEPRINT".to_string(),
            blueprint_id: "road_segment".to_string(),
            anchor: anchor.to_array(),
            ..Default::default()
        }],
        ..Default::default()
    };
    w.step_once(
        Vec::new(),
        Vec::new(),
        vec![ActionEnvelope {
            agent_id: builder.clone(),
            act,
        }],
    );
    // 5 blocks at 2 per tick: the submission tick places 2, then 2, then 1.
    w.step_once(Vec::new(), Vec::new(), Vec::new());
    w.step_once(Vec::new(), Vec::new(), Vec::new());

    assert!(w.agent(&builder).unwrap().work_task.is_none());
    let chest = w.containers.get(&chest_pos).unwrap();
    assert_eq!(inventory::count(&chest.inventory, "PLANK"), 5);
    assert_eq!(
        inventory::count(&w.agent(&builder).unwrap().inventory, "PLANK"),
        0
    );
    let road = w.catalogs().block_id("ROAD").unwrap();
    for i in 0..5 {
        assert_eq!(
            w.chunks.get_block(Vec3i::new(anchor.x + i, anchor.y, anchor.z)),
            road
        );
    }
}

#[test]
fn blueprint_pull_is_same_land_only() {
    let mut w = test_world("t");
    let builder = join(&mut w, "builder");
    let base = w.agent(&builder).unwrap().pos;
    let anchor = Vec3i::new(base.x, 3, base.z);

    // Anchor sits inside the builder's claim; the stocked chest does not.
    make_claim(&mut w, &builder, Vec3i::new(anchor.x, 1, anchor.z), 3);
    let chest_pos = Vec3i::new(anchor.x + 5, anchor.y, anchor.z);
    w.containers.insert(
        chest_pos,
        Container {
            kind: "CHEST".to_string(),
            pos: chest_pos,
            inventory: Inventory::from([("PLANK".to_string(), 10)]),
        },
    );

    let act = ActMsg {
        msg_type: "ACT".to_string(),
        tick: 0,
        agent_id: builder.clone(),
        tasks: vec![TaskReq {
            id: "k1".to_string(),
            req_type: "BUILD_BLUEPRINT".to_string(),
            blueprint_id: "road_segment".to_string(),
            anchor: anchor.to_array(),
            ..Default::default()
        }],
        ..Default::default()
    };
    w.step_once(
        Vec::new(),
        Vec::new(),
        vec![ActionEnvelope {
            agent_id: builder.clone(),
            act,
        }],
    );

    assert!(w.agent(&builder).unwrap().work_task.is_none());
    let fail = find_event(&w, &builder, "TASK_FAIL").expect("task fail event");
    assert_eq!(fail.get("code").and_then(|v| v.as_str()), Some("E_NO_RESOURCE"));
    assert_eq!(
        fail.get("message").and_then(|v| v.as_str()),
        Some("missing PLANK x5")
    );
    // Nothing was pulled.
    assert_eq!(
        inventory::count(&w.containers.get(&chest_pos).unwrap().inventory, "PLANK"),
        10
    );
}

#[test]
fn respawn_drops_thirty_percent_as_item_entities() {
    let mut w = test_world("t");
    let agent = join(&mut w, "mortal");
    let death_pos = Vec3i::new(123, 40, -321);
    {
        let a = w.agent_mut(&agent).unwrap();
        a.inventory = Inventory::from([("PLANK".to_string(), 10), ("COAL".to_string(), 10)]);
        a.pos = death_pos;
        a.hp = 0;
    }
    w.step_once(Vec::new(), Vec::new(), Vec::new());

    let a = w.agent(&agent).unwrap();
    assert_eq!(inventory::count(&a.inventory, "PLANK"), 7);
    assert_eq!(inventory::count(&a.inventory, "COAL"), 7);
    assert_eq!(a.hp, 20);
    assert_eq!(a.hunger, 10);
    assert_eq!(a.stamina_milli, 1000);
    assert_ne!(a.pos, death_pos);

    let ids = w.items_at.get(&death_pos).expect("drops at death pos");
    assert_eq!(ids.len(), 2);
    let mut counts: Vec<i64> = ids
        .iter()
        .filter_map(|id| w.items.get(id))
        .map(|e| e.count)
        .collect();
    counts.sort();
    assert_eq!(counts, vec![3, 3]);

    let respawn = find_event(&w, &agent, "RESPAWN").expect("respawn event");
    assert_eq!(
        respawn.get("drop_pos").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(3)
    );
}

#[test]
fn law_lifecycle_market_tax() {
    let mut w = test_world("t");
    let leader = join(&mut w, "leader");
    let land_id = make_claim(&mut w, &leader, Vec3i::new(0, 1, 0), 8);

    let mut params = serde_json::Map::new();
    params.insert("market_tax".to_string(), serde_json::json!(0.10));
    let propose = InstantReq {
        id: "i1".to_string(),
        req_type: "PROPOSE_LAW".to_string(),
        land_id: land_id.clone(),
        template_id: "MARKET_TAX".to_string(),
        params: Some(params),
        ..Default::default()
    };
    w.apply_instant(&leader, &propose, 0);
    let law_id = last_event(&w, &leader)
        .get("law_id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .expect("law id");

    w.tick_laws(2999);
    assert_eq!(w.laws.get(&law_id).unwrap().status, LawStatus::Notice);

    w.tick_laws(3000);
    assert_eq!(w.laws.get(&law_id).unwrap().status, LawStatus::Voting);

    let vote = InstantReq {
        id: "i2".to_string(),
        req_type: "VOTE".to_string(),
        law_id: law_id.clone(),
        choice: "YES".to_string(),
        ..Default::default()
    };
    w.apply_instant(&leader, &vote, 3001);

    w.tick_laws(5999);
    assert_eq!(w.laws.get(&law_id).unwrap().status, LawStatus::Voting);

    w.tick_laws(6000);
    assert_eq!(w.laws.get(&law_id).unwrap().status, LawStatus::Active);
    assert!((w.claims.get(&land_id).unwrap().market_tax - 0.10).abs() < 1e-9);
}

#[test]
fn law_repeal_reverses_static_effects() {
    let mut w = test_world("t");
    let leader = join(&mut w, "leader");
    let land_id = make_claim(&mut w, &leader, Vec3i::new(0, 1, 0), 8);

    let mut params = serde_json::Map::new();
    params.insert("market_tax".to_string(), serde_json::json!(0.20));
    let propose = InstantReq {
        id: "i1".to_string(),
        req_type: "PROPOSE_LAW".to_string(),
        land_id: land_id.clone(),
        template_id: "MARKET_TAX".to_string(),
        params: Some(params),
        ..Default::default()
    };
    w.apply_instant(&leader, &propose, 0);
    let law_id = last_event(&w, &leader)
        .get("law_id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap();
    w.tick_laws(3000);
    let vote = InstantReq {
        id: "i2".to_string(),
        req_type: "VOTE".to_string(),
        law_id: law_id.clone(),
        choice: "YES".to_string(),
        ..Default::default()
    };
    w.apply_instant(&leader, &vote, 3001);
    w.tick_laws(6000);
    assert!(w.claims.get(&land_id).unwrap().market_tax > 0.0);

    let repeal = InstantReq {
        id: "i3".to_string(),
        req_type: "REPEAL_LAW".to_string(),
        law_id: law_id.clone(),
        ..Default::default()
    };
    w.apply_instant(&leader, &repeal, 6001);
    assert_eq!(w.laws.get(&law_id).unwrap().status, LawStatus::Repealed);
    assert_eq!(w.claims.get(&land_id).unwrap().market_tax, 0.0);
}

#[test]
fn snapshot_round_trip_preserves_rate_limits() {
    let mut w = test_world("t");
    let talker = join(&mut w, "talker");
    w.tick = 100;

    for i in 0..5 {
        let say = InstantReq {
            id: format!("s{i}"),
            req_type: "SAY".to_string(),
            text: "hello".to_string(),
            ..Default::default()
        };
        w.apply_instant(&talker, &say, 100);
        let ev = last_event(&w, &talker);
        assert_eq!(ev.get("ok").and_then(|v| v.as_bool()), Some(true), "say {i}");
    }

    let snap = w.export_snapshot(100);
    let mut w2 = test_world("t");
    w2.import_snapshot(snap).unwrap();

    let say = InstantReq {
        id: "s6".to_string(),
        req_type: "SAY".to_string(),
        text: "one too many".to_string(),
        ..Default::default()
    };
    w2.apply_instant(&talker, &say, 100);
    let ev = last_event(&w2, &talker);
    assert_eq!(ev.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(ev.get("code").and_then(|v| v.as_str()), Some("E_RATE_LIMIT"));
    let cooldown = ev
        .get("cooldown_ticks")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    assert!(cooldown > 0);
}

#[test]
fn snapshot_round_trip_is_identity() {
    let mut w = test_world("t");
    let a = join(&mut w, "one");
    let _b = join(&mut w, "two");
    make_claim(&mut w, &a, Vec3i::new(10, 1, 10), 16);
    w.spawn_item_entity(0, &a, Vec3i::new(3, 1, 3), "COAL", 5, "TEST");
    for _ in 0..5 {
        w.step_once(Vec::new(), Vec::new(), Vec::new());
    }

    let tick = w.tick();
    let digest = w.state_digest(tick);
    let snap = w.export_snapshot(tick);

    let mut w2 = test_world("t");
    w2.import_snapshot(snap).unwrap();
    assert_eq!(w2.state_digest(tick), digest);
}

#[test]
fn item_entities_merge_and_expire_deterministically() {
    let mut w = test_world("t");
    let a = join(&mut w, "dropper");
    let pos = Vec3i::new(7, 1, 7);

    let id1 = w.spawn_item_entity(0, &a, pos, "COAL", 2, "TEST");
    let id2 = w.spawn_item_entity(0, &a, pos, "COAL", 3, "TEST");
    assert_eq!(id1, id2, "same item at same pos merges");
    assert_eq!(w.items.get(&id1).unwrap().count, 5);

    let id3 = w.spawn_item_entity(0, &a, pos, "PLANK", 1, "TEST");
    assert_ne!(id1, id3);
    assert_eq!(w.items_at.get(&pos).unwrap().len(), 2);

    // Both expire on the same tick; removal is id-ascending and total.
    w.cleanup_expired_item_entities(ITEM_ENTITY_TTL_TICKS);
    assert!(w.items.is_empty());
    assert!(w.items_at.is_empty());
}

#[test]
fn gather_requires_standing_on_entity() {
    let mut w = test_world("t");
    let a = join(&mut w, "picker");
    let pos = w.agent(&a).unwrap().pos;
    let away = Vec3i::new(pos.x + 4, pos.y, pos.z);
    let id = w.spawn_item_entity(0, &a, away, "COAL", 2, "TEST");

    let act = |target: &str| ActMsg {
        msg_type: "ACT".to_string(),
        tick: 0,
        agent_id: a.clone(),
        tasks: vec![TaskReq {
            id: "g1".to_string(),
            req_type: "GATHER".to_string(),
            target_id: target.to_string(),
            ..Default::default()
        }],
        ..Default::default()
    };

    w.step_once(
        Vec::new(),
        Vec::new(),
        vec![ActionEnvelope {
            agent_id: a.clone(),
            act: act(&id),
        }],
    );
    let fail = find_event(&w, &a, "TASK_FAIL").expect("not standing on item");
    assert_eq!(
        fail.get("code").and_then(|v| v.as_str()),
        Some("E_OUT_OF_RANGE")
    );

    // Standing on it succeeds and transfers the stack.
    w.agent_mut(&a).unwrap().events.clear();
    w.agent_mut(&a).unwrap().pos = away;
    let act2 = ActMsg {
        tick: w.tick(),
        ..act(&id)
    };
    w.step_once(
        Vec::new(),
        Vec::new(),
        vec![ActionEnvelope {
            agent_id: a.clone(),
            act: act2,
        }],
    );
    assert!(w.items.get(&id).is_none());
    assert_eq!(inventory::count(&w.agent(&a).unwrap().inventory, "COAL"), 2);
}

#[test]
fn mine_denied_inside_claim_pays_fine() {
    let mut w = test_world("t");
    let intruder = join(&mut w, "intruder");
    let owner = join(&mut w, "owner");
    let anchor = Vec3i::new(40, 1, 40);
    let land_id = make_claim(&mut w, &owner, anchor, 8);
    {
        let land = w.claims.get_mut(&land_id).unwrap();
        land.fine_break_enabled = true;
        land.fine_break_item = "COAL".to_string();
        land.fine_break_per_block = 2;
    }

    // A solid block just inside the claim.
    let stone = w.catalogs().block_id("STONE").unwrap();
    let target = Vec3i::new(40, 1, 41);
    w.chunks.set_block(target, stone);

    {
        let a = w.agent_mut(&intruder).unwrap();
        a.pos = Vec3i::new(40, 1, 42);
        a.inventory = Inventory::from([("COAL".to_string(), 5)]);
    }

    let act = ActMsg {
        msg_type: "ACT".to_string(),
        tick: 0,
        agent_id: intruder.clone(),
        tasks: vec![TaskReq {
            id: "m1".to_string(),
            req_type: "MINE".to_string(),
            target: target.to_array(),
            ..Default::default()
        }],
        ..Default::default()
    };
    w.step_once(
        Vec::new(),
        Vec::new(),
        vec![ActionEnvelope {
            agent_id: intruder.clone(),
            act,
        }],
    );

    // Fine of 2 COAL paid to the owner; the block still stands.
    assert_eq!(
        inventory::count(&w.agent(&intruder).unwrap().inventory, "COAL"),
        3
    );
    assert_eq!(inventory::count(&w.agent(&owner).unwrap().inventory, "COAL"), 2);
    assert_eq!(w.chunks.get_block(target), stone);
    let fail = find_event(&w, &intruder, "TASK_FAIL").unwrap();
    assert_eq!(
        fail.get("code").and_then(|v| v.as_str()),
        Some("E_NO_PERMISSION")
    );
    assert!(find_event(&w, &intruder, "FINE").is_some());
}

#[test]
fn task_overwrite_cancels_previous() {
    let mut w = test_world("t");
    let a = join(&mut w, "walker");
    let first = TaskReq {
        id: "t1".to_string(),
        req_type: "MOVE_TO".to_string(),
        target: [50, 0, 50],
        ..Default::default()
    };
    let second = TaskReq {
        id: "t2".to_string(),
        req_type: "MOVE_TO".to_string(),
        target: [-50, 0, -50],
        ..Default::default()
    };
    w.apply_task_req(&a, &first, 0);
    let first_task_id = w.agent(&a).unwrap().move_task.as_ref().unwrap().task_id.clone();
    w.apply_task_req(&a, &second, 0);

    let cancelled = find_event(&w, &a, "TASK_CANCELLED").expect("cancel event");
    assert_eq!(
        cancelled.get("task_id").and_then(|v| v.as_str()),
        Some(first_task_id.as_str())
    );
    let mt = w.agent(&a).unwrap().move_task.as_ref().unwrap().clone();
    assert_eq!(mt.target, Vec3i::new(-50, 0, -50));
    assert_ne!(mt.task_id, first_task_id);
}

#[test]
fn chat_rate_limit_and_channels() {
    let mut w = test_world("t");
    let a = join(&mut w, "chatty");
    let b = join(&mut w, "nearby");
    w.agent_mut(&b).unwrap().pos = w.agent(&a).unwrap().pos;

    let say = |i: usize| InstantReq {
        id: format!("s{i}"),
        req_type: "SAY".to_string(),
        text: "hi".to_string(),
        ..Default::default()
    };
    for i in 0..5 {
        w.apply_instant(&a, &say(i), 10);
    }
    assert!(find_event(&w, &b, "CHAT").is_some());

    w.apply_instant(&a, &say(6), 10);
    let ev = last_event(&w, &a);
    assert_eq!(ev.get("code").and_then(|v| v.as_str()), Some("E_RATE_LIMIT"));

    // ORG channel requires membership.
    let org_say = InstantReq {
        id: "o1".to_string(),
        req_type: "SAY".to_string(),
        channel: "ORG".to_string(),
        text: "hi".to_string(),
        ..Default::default()
    };
    w.apply_instant(&a, &org_say, 11);
    let ev = last_event(&w, &a);
    assert_eq!(
        ev.get("code").and_then(|v| v.as_str()),
        Some("E_NO_PERMISSION")
    );
}

#[test]
fn org_lifecycle_and_treasury() {
    let mut w = test_world("t");
    let founder = join(&mut w, "founder");
    let joiner = join(&mut w, "joiner");

    let create = InstantReq {
        id: "c1".to_string(),
        req_type: "CREATE_ORG".to_string(),
        org_kind: "GUILD".to_string(),
        org_name: "miners".to_string(),
        ..Default::default()
    };
    w.apply_instant(&founder, &create, 0);
    let org_id = last_event(&w, &founder)
        .get("org_id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .expect("org id");

    let join_req = InstantReq {
        id: "j1".to_string(),
        req_type: "JOIN_ORG".to_string(),
        org_id: org_id.clone(),
        ..Default::default()
    };
    w.apply_instant(&joiner, &join_req, 1);
    assert!(w.org(&org_id).unwrap().is_member(&joiner));

    // Deposit by member, withdraw gated to admins.
    w.agent_mut(&joiner).unwrap().inventory = Inventory::from([("COAL".to_string(), 4)]);
    let deposit = InstantReq {
        id: "d1".to_string(),
        req_type: "ORG_DEPOSIT".to_string(),
        org_id: org_id.clone(),
        item_id: "COAL".to_string(),
        count: 4,
        ..Default::default()
    };
    w.apply_instant(&joiner, &deposit, 2);
    assert_eq!(inventory::count(&w.org(&org_id).unwrap().treasury, "COAL"), 4);

    let withdraw = InstantReq {
        id: "w1".to_string(),
        req_type: "ORG_WITHDRAW".to_string(),
        org_id: org_id.clone(),
        item_id: "COAL".to_string(),
        count: 2,
        ..Default::default()
    };
    w.apply_instant(&joiner, &withdraw, 3);
    assert_eq!(
        last_event(&w, &joiner).get("code").and_then(|v| v.as_str()),
        Some("E_NO_PERMISSION")
    );
    w.apply_instant(&founder, &withdraw, 4);
    assert_eq!(
        inventory::count(&w.agent(&founder).unwrap().inventory, "COAL"),
        2
    );

    // Founder leaves: leadership passes; last leaver dissolves the org.
    let leave = InstantReq {
        id: "l1".to_string(),
        req_type: "LEAVE_ORG".to_string(),
        ..Default::default()
    };
    w.apply_instant(&founder, &leave, 5);
    assert!(w.org(&org_id).unwrap().is_admin(&joiner));
    w.apply_instant(&joiner, &leave, 6);
    assert!(w.org(&org_id).is_none());
}

#[test]
fn transfer_out_round_trips_into_other_world() {
    let mut w1 = test_world("alpha");
    let mut w2 = test_world("beta");
    let a = join(&mut w1, "migrant");
    let peer = join(&mut w1, "peer");

    // The migrant leads an org and has an open trade; both must not leak.
    let create = InstantReq {
        id: "c1".to_string(),
        req_type: "CREATE_ORG".to_string(),
        org_kind: "GUILD".to_string(),
        org_name: "wanderers".to_string(),
        ..Default::default()
    };
    w1.apply_instant(&a, &create, 0);
    w1.agent_mut(&a).unwrap().inventory = Inventory::from([("PLANK".to_string(), 3)]);
    let offer = InstantReq {
        id: "t1".to_string(),
        req_type: "OFFER_TRADE".to_string(),
        to: peer.clone(),
        offer: vec![ItemStack {
            item: "PLANK".to_string(),
            count: 1,
        }],
        request: vec![ItemStack {
            item: "COAL".to_string(),
            count: 1,
        }],
        ..Default::default()
    };
    w1.apply_instant(&a, &offer, 0);
    assert_eq!(w1.trades.len(), 1);

    let (tx, rx) = std::sync::mpsc::channel();
    w1.handle_transfer_out(TransferOutRequest {
        agent_id: a.clone(),
        resp: Some(tx),
    });
    let out = rx.recv().unwrap();
    assert!(out.err.is_empty());
    let transfer = out.transfer.unwrap();
    assert_eq!(transfer.from_world_id, "alpha");
    assert!(transfer.org.is_some());
    assert!(w1.agent(&a).is_none());
    assert!(w1.trades.is_empty());

    let (tx, rx) = std::sync::mpsc::channel();
    w2.handle_transfer_in(TransferInRequest {
        transfer,
        out: None,
        delta_voxels: false,
        resp: Some(tx),
    });
    assert!(rx.recv().unwrap().err.is_empty());

    let moved = w2.agent(&a).expect("agent installed");
    assert_eq!(moved.current_world_id, "beta");
    assert_eq!(inventory::count(&moved.inventory, "PLANK"), 3);
    let org_id = moved.org_id.clone();
    assert!(w2.org(&org_id).is_some(), "org snapshot reconciled");
    assert!(w2.org(&org_id).unwrap().is_member(&a));
}

#[test]
fn join_emits_seven_ordered_catalogs() {
    let mut w = test_world("t");
    let resp = w.join_agent("newcomer", false, None);
    let names: Vec<&str> = resp.catalogs.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "block_palette",
            "item_palette",
            "tuning",
            "recipes",
            "blueprints",
            "law_templates",
            "events"
        ]
    );
    for c in &resp.catalogs {
        assert!(!c.digest.is_empty(), "{} digest", c.name);
        assert_eq!((c.part, c.total_parts), (1, 1));
    }
    assert!(!resp.welcome.resume_token.is_empty());
    assert_eq!(resp.welcome.current_world_id, "t");
}

#[test]
fn attach_rotates_resume_token() {
    let mut w = test_world("t");
    let resp = w.join_agent("roamer", false, None);
    let agent_id = resp.welcome.agent_id.clone();
    let token = resp.welcome.resume_token.clone();

    let (out_tx, _out_rx) = std::sync::mpsc::sync_channel(4);
    let (tx, rx) = std::sync::mpsc::channel();
    w.handle_attach(AttachRequest {
        resume_token: token.clone(),
        delta_voxels: false,
        out: Some(out_tx),
        resp: Some(tx),
    });
    let resp2 = rx.recv().unwrap();
    assert_eq!(resp2.welcome.agent_id, agent_id);
    assert!(!resp2.welcome.resume_token.is_empty());
    assert_ne!(resp2.welcome.resume_token, token);

    // The old token no longer resolves.
    let (tx, rx) = std::sync::mpsc::channel();
    let (out_tx, _out_rx) = std::sync::mpsc::sync_channel(4);
    w.handle_attach(AttachRequest {
        resume_token: token,
        delta_voxels: false,
        out: Some(out_tx),
        resp: Some(tx),
    });
    assert!(rx.recv().unwrap().welcome.agent_id.is_empty());
}

#[test]
fn maintenance_failure_degrades_claim_to_wild() {
    let mut w = test_world("t");
    let owner = join(&mut w, "landlord");
    let visitor = join(&mut w, "visitor");
    let land_id = make_claim(&mut w, &owner, Vec3i::new(30, 1, 30), 8);
    w.claims.get_mut(&land_id).unwrap().maintenance_due_tick = 1;

    let inside = Vec3i::new(30, 1, 31);
    assert!(!w.can_build_at(&visitor, inside, 0));

    // Two missed payments: stage 1 then stage 2 (unprotected).
    w.tick = 1;
    w.step_once(Vec::new(), Vec::new(), Vec::new());
    assert_eq!(w.claims.get(&land_id).unwrap().maintenance_stage, 1);

    w.claims.get_mut(&land_id).unwrap().maintenance_due_tick = w.tick;
    w.step_once(Vec::new(), Vec::new(), Vec::new());
    assert_eq!(w.claims.get(&land_id).unwrap().maintenance_stage, 2);
    assert!(w.can_build_at(&visitor, inside, w.tick()));
}

#[test]
fn access_pass_charges_on_core_entry() {
    let mut w = test_world("t");
    let owner = join(&mut w, "owner");
    let walker = join(&mut w, "walker");
    let anchor = Vec3i::new(60, 1, 60);
    let land_id = make_claim(&mut w, &owner, anchor, 40);
    {
        let land = w.claims.get_mut(&land_id).unwrap();
        land.access_pass_enabled = true;
        land.access_ticket_item = "ACCESS_TICKET".to_string();
        land.access_ticket_cost = 1;
    }

    // Just outside the core (radius 16), moving inward.
    {
        let a = w.agent_mut(&walker).unwrap();
        a.pos = Vec3i::new(60, 1, 77);
        a.inventory = Inventory::from([("ACCESS_TICKET".to_string(), 2)]);
    }
    let act = ActMsg {
        msg_type: "ACT".to_string(),
        tick: 0,
        agent_id: walker.clone(),
        tasks: vec![TaskReq {
            id: "mv".to_string(),
            req_type: "MOVE_TO".to_string(),
            target: [60, 0, 60],
            ..Default::default()
        }],
        ..Default::default()
    };
    w.step_once(
        Vec::new(),
        Vec::new(),
        vec![ActionEnvelope {
            agent_id: walker.clone(),
            act,
        }],
    );

    assert_eq!(
        inventory::count(&w.agent(&walker).unwrap().inventory, "ACCESS_TICKET"),
        1
    );
    assert_eq!(
        inventory::count(&w.agent(&owner).unwrap().inventory, "ACCESS_TICKET"),
        1
    );
    assert!(find_event(&w, &walker, "ACCESS_PASS").is_some());

    // Without a ticket the move fails and the agent stays put.
    let broke = join(&mut w, "broke");
    w.agent_mut(&broke).unwrap().pos = Vec3i::new(60, 1, 77);
    let pos_before = w.agent(&broke).unwrap().pos;
    let act = ActMsg {
        msg_type: "ACT".to_string(),
        tick: w.tick(),
        agent_id: broke.clone(),
        tasks: vec![TaskReq {
            id: "mv2".to_string(),
            req_type: "MOVE_TO".to_string(),
            target: [60, 0, 60],
            ..Default::default()
        }],
        ..Default::default()
    };
    w.step_once(
        Vec::new(),
        Vec::new(),
        vec![ActionEnvelope {
            agent_id: broke.clone(),
            act,
        }],
    );
    let fail = find_event(&w, &broke, "TASK_FAIL").expect("ticketless entry fails");
    assert_eq!(
        fail.get("code").and_then(|v| v.as_str()),
        Some("E_NO_RESOURCE")
    );
    assert_eq!(w.agent(&broke).unwrap().pos, pos_before);
    assert!(w.agent(&broke).unwrap().move_task.is_none());
}

#[test]
fn craft_consumes_inputs_after_time_ticks() {
    let mut w = test_world("t");
    let a = join(&mut w, "crafter");
    w.agent_mut(&a).unwrap().inventory = Inventory::from([("LOG".to_string(), 1)]);

    let act = ActMsg {
        msg_type: "ACT".to_string(),
        tick: 0,
        agent_id: a.clone(),
        tasks: vec![TaskReq {
            id: "c1".to_string(),
            req_type: "CRAFT".to_string(),
            recipe_id: "plank_from_log".to_string(),
            count: 1,
            ..Default::default()
        }],
        ..Default::default()
    };
    w.step_once(
        Vec::new(),
        Vec::new(),
        vec![ActionEnvelope {
            agent_id: a.clone(),
            act,
        }],
    );
    // 5 work ticks; 4 more steps to finish.
    for _ in 0..3 {
        w.step_once(Vec::new(), Vec::new(), Vec::new());
        assert!(w.agent(&a).unwrap().work_task.is_some());
    }
    w.step_once(Vec::new(), Vec::new(), Vec::new());
    let inv = &w.agent(&a).unwrap().inventory;
    assert_eq!(inventory::count(inv, "LOG"), 0);
    assert_eq!(inventory::count(inv, "PLANK"), 4);
    assert!(w.agent(&a).unwrap().work_task.is_none());
}

#[test]
fn claim_land_places_totem_and_registers_claim() {
    let mut w = test_world("t");
    let a = join(&mut w, "settler");
    let pos = w.agent(&a).unwrap().pos;
    w.agent_mut(&a).unwrap().inventory =
        Inventory::from([("BATTERY".to_string(), 1), ("CRYSTAL_SHARD".to_string(), 1)]);

    let anchor = Vec3i::new(pos.x, 3, pos.z);
    let req = TaskReq {
        id: "cl".to_string(),
        req_type: "CLAIM_LAND".to_string(),
        target: anchor.to_array(),
        radius: 16,
        ..Default::default()
    };
    w.apply_task_req(&a, &req, 0);

    let ev = last_event(&w, &a);
    assert_eq!(ev.get("ok").and_then(|v| v.as_bool()), Some(true));
    let land_id = ev.get("land_id").and_then(|v| v.as_str()).unwrap().to_string();
    let claim = w.claim(&land_id).unwrap();
    assert_eq!(claim.owner, a);
    assert_eq!(claim.radius, 16);
    let totem = w.catalogs().block_id("CLAIM_TOTEM").unwrap();
    assert_eq!(w.chunks.get_block(anchor), totem);
    assert!(w.agent(&a).unwrap().inventory.is_empty());

    // Overlapping claims are rejected.
    let b = join(&mut w, "rival");
    w.agent_mut(&b).unwrap().inventory =
        Inventory::from([("BATTERY".to_string(), 1), ("CRYSTAL_SHARD".to_string(), 1)]);
    // Outside the first claim, but the radii would still overlap.
    let req2 = TaskReq {
        id: "cl2".to_string(),
        req_type: "CLAIM_LAND".to_string(),
        target: [anchor.x + 20, 3, anchor.z],
        radius: 16,
        ..Default::default()
    };
    w.apply_task_req(&b, &req2, 0);
    assert_eq!(
        last_event(&w, &b).get("code").and_then(|v| v.as_str()),
        Some("E_CONFLICT")
    );
}
