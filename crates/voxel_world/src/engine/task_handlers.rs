//! Task request handlers: validate and install movement/work tasks.
//!
//! A new task replaces any prior task on the same track; the replaced task
//! emits TASK_CANCELLED before the new one is installed.

use serde_json::json;

use voxel_world_proto::{
    TaskReq, E_BAD_REQUEST, E_CONFLICT, E_INVALID_TARGET, E_NO_PERMISSION, E_NO_RESOURCE,
};

use crate::engine::claims::{ClaimFlags, LandClaim};
use crate::engine::events::{action_result, task_cancelled};
use crate::engine::inventory;
use crate::engine::tasks::{MoveKind, MoveTask, WorkKind, WorkTask};
use crate::engine::world::World;
use crate::geometry::{manhattan_xz, Vec3i};

const FOLLOW_DISTANCE_MIN: f64 = 1.0;
const FOLLOW_DISTANCE_MAX: f64 = 16.0;

impl World {
    pub(crate) fn apply_task_req(&mut self, agent_id: &str, tr: &TaskReq, now_tick: u64) {
        match tr.req_type.as_str() {
            "STOP" => self.task_stop(agent_id, tr, now_tick),
            "MOVE_TO" => self.task_move_to(agent_id, tr, now_tick),
            "FOLLOW" => self.task_follow(agent_id, tr, now_tick),
            "GATHER" => self.task_gather(agent_id, tr, now_tick),
            "MINE" => self.task_mine(agent_id, tr, now_tick),
            "PLACE" => self.task_place(agent_id, tr, now_tick),
            "CRAFT" => self.task_craft(agent_id, tr, now_tick),
            "OPEN" => self.task_open(agent_id, tr, now_tick),
            "BUILD_BLUEPRINT" => self.task_build_blueprint(agent_id, tr, now_tick),
            "CLAIM_LAND" => self.task_claim_land(agent_id, tr, now_tick),
            _ => self.push_action_result(
                agent_id,
                now_tick,
                &tr.id,
                false,
                E_BAD_REQUEST,
                "unknown task type",
            ),
        }
    }

    fn set_move_task(&mut self, agent_id: &str, task: MoveTask, now_tick: u64) {
        if let Some(a) = self.agents.get_mut(agent_id) {
            if let Some(prev) = a.move_task.take() {
                a.add_event(task_cancelled(now_tick, &prev.task_id, prev.kind.as_str()));
            }
            a.move_task = Some(task);
        }
    }

    fn set_work_task(&mut self, agent_id: &str, task: WorkTask, now_tick: u64) {
        if let Some(a) = self.agents.get_mut(agent_id) {
            if let Some(prev) = a.work_task.take() {
                a.add_event(task_cancelled(now_tick, &prev.task_id, prev.kind.as_str()));
            }
            a.work_task = Some(task);
        }
    }

    fn ack_task(&mut self, agent_id: &str, now_tick: u64, ref_id: &str, task_id: &str) {
        let mut ev = action_result(now_tick, ref_id, true, "", "");
        if let Some(obj) = ev.as_object_mut() {
            obj.insert("task_id".to_string(), json!(task_id));
        }
        self.push_event(agent_id, ev);
    }

    fn task_stop(&mut self, agent_id: &str, tr: &TaskReq, now_tick: u64) {
        if let Some(a) = self.agents.get_mut(agent_id) {
            a.move_task = None;
        }
        self.push_action_result(agent_id, now_tick, &tr.id, true, "", "stopped");
    }

    fn task_move_to(&mut self, agent_id: &str, tr: &TaskReq, now_tick: u64) {
        let target = Vec3i::new(tr.target[0], 1, tr.target[2]);
        if !self.chunks.in_bounds(target) {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_INVALID_TARGET, "out of bounds",
            );
            return;
        }
        let start_pos = match self.agents.get(agent_id) {
            Some(a) => a.pos,
            None => return,
        };
        let task_id = self.next_task_id();
        self.set_move_task(
            agent_id,
            MoveTask {
                task_id: task_id.clone(),
                kind: MoveKind::MoveTo,
                target: Vec3i::from_array(tr.target),
                tolerance: tr.tolerance,
                target_id: String::new(),
                distance: 0.0,
                start_pos,
                started_tick: now_tick,
            },
            now_tick,
        );
        self.ack_task(agent_id, now_tick, &tr.id, &task_id);
    }

    fn task_follow(&mut self, agent_id: &str, tr: &TaskReq, now_tick: u64) {
        if tr.target_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_BAD_REQUEST, "missing target_id",
            );
            return;
        }
        let Some(target) = self.follow_target_pos(&tr.target_id) else {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_INVALID_TARGET, "target not found",
            );
            return;
        };
        let start_pos = match self.agents.get(agent_id) {
            Some(a) => a.pos,
            None => return,
        };
        let task_id = self.next_task_id();
        self.set_move_task(
            agent_id,
            MoveTask {
                task_id: task_id.clone(),
                kind: MoveKind::Follow,
                target,
                tolerance: 0.0,
                target_id: tr.target_id.clone(),
                distance: tr.distance.clamp(FOLLOW_DISTANCE_MIN, FOLLOW_DISTANCE_MAX),
                start_pos,
                started_tick: now_tick,
            },
            now_tick,
        );
        self.ack_task(agent_id, now_tick, &tr.id, &task_id);
    }

    fn task_gather(&mut self, agent_id: &str, tr: &TaskReq, now_tick: u64) {
        if tr.target_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_BAD_REQUEST, "missing target_id",
            );
            return;
        }
        let task_id = self.next_task_id();
        self.set_work_task(
            agent_id,
            WorkTask {
                task_id: task_id.clone(),
                kind: WorkKind::Gather,
                block_pos: Vec3i::default(),
                recipe_id: String::new(),
                item_id: String::new(),
                count: 0,
                blueprint_id: String::new(),
                anchor: Vec3i::default(),
                rotation: 0,
                build_index: 0,
                target_id: tr.target_id.clone(),
                started_tick: now_tick,
                work_ticks: 0,
            },
            now_tick,
        );
        self.ack_task(agent_id, now_tick, &tr.id, &task_id);
    }

    fn task_mine(&mut self, agent_id: &str, tr: &TaskReq, now_tick: u64) {
        let pos = Vec3i::from_array(tr.target);
        if !self.chunks.in_bounds(pos) {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_INVALID_TARGET, "out of bounds",
            );
            return;
        }
        let task_id = self.next_task_id();
        self.set_work_task(
            agent_id,
            WorkTask {
                task_id: task_id.clone(),
                kind: WorkKind::Mine,
                block_pos: pos,
                recipe_id: String::new(),
                item_id: String::new(),
                count: 0,
                blueprint_id: String::new(),
                anchor: Vec3i::default(),
                rotation: 0,
                build_index: 0,
                target_id: String::new(),
                started_tick: now_tick,
                work_ticks: 0,
            },
            now_tick,
        );
        self.ack_task(agent_id, now_tick, &tr.id, &task_id);
    }

    fn task_place(&mut self, agent_id: &str, tr: &TaskReq, now_tick: u64) {
        if tr.item_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_BAD_REQUEST, "missing item_id",
            );
            return;
        }
        let pos = Vec3i::from_array(tr.target);
        if !self.chunks.in_bounds(pos) {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_INVALID_TARGET, "out of bounds",
            );
            return;
        }
        let task_id = self.next_task_id();
        self.set_work_task(
            agent_id,
            WorkTask {
                task_id: task_id.clone(),
                kind: WorkKind::Place,
                block_pos: pos,
                recipe_id: String::new(),
                item_id: tr.item_id.clone(),
                count: 0,
                blueprint_id: String::new(),
                anchor: Vec3i::default(),
                rotation: 0,
                build_index: 0,
                target_id: String::new(),
                started_tick: now_tick,
                work_ticks: 0,
            },
            now_tick,
        );
        self.ack_task(agent_id, now_tick, &tr.id, &task_id);
    }

    fn task_craft(&mut self, agent_id: &str, tr: &TaskReq, now_tick: u64) {
        if tr.recipe_id.is_empty() || !self.catalogs.recipes.by_id.contains_key(&tr.recipe_id) {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_INVALID_TARGET, "unknown recipe",
            );
            return;
        }
        let task_id = self.next_task_id();
        self.set_work_task(
            agent_id,
            WorkTask {
                task_id: task_id.clone(),
                kind: WorkKind::Craft,
                block_pos: Vec3i::default(),
                recipe_id: tr.recipe_id.clone(),
                item_id: String::new(),
                count: tr.count.max(1),
                blueprint_id: String::new(),
                anchor: Vec3i::default(),
                rotation: 0,
                build_index: 0,
                target_id: String::new(),
                started_tick: now_tick,
                work_ticks: 0,
            },
            now_tick,
        );
        self.ack_task(agent_id, now_tick, &tr.id, &task_id);
    }

    fn task_open(&mut self, agent_id: &str, tr: &TaskReq, now_tick: u64) {
        if tr.target_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_BAD_REQUEST, "missing target_id",
            );
            return;
        }
        let task_id = self.next_task_id();
        self.set_work_task(
            agent_id,
            WorkTask {
                task_id: task_id.clone(),
                kind: WorkKind::Open,
                block_pos: Vec3i::default(),
                recipe_id: String::new(),
                item_id: String::new(),
                count: 0,
                blueprint_id: String::new(),
                anchor: Vec3i::default(),
                rotation: 0,
                build_index: 0,
                target_id: tr.target_id.clone(),
                started_tick: now_tick,
                work_ticks: 0,
            },
            now_tick,
        );
        self.ack_task(agent_id, now_tick, &tr.id, &task_id);
    }

    fn task_build_blueprint(&mut self, agent_id: &str, tr: &TaskReq, now_tick: u64) {
        if tr.blueprint_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_BAD_REQUEST, "missing blueprint_id",
            );
            return;
        }
        if !self.catalogs.blueprints.by_id.contains_key(&tr.blueprint_id) {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_INVALID_TARGET, "unknown blueprint",
            );
            return;
        }
        let anchor = Vec3i::from_array(tr.anchor);
        if !self.chunks.in_bounds(anchor) {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_INVALID_TARGET, "out of bounds",
            );
            return;
        }
        let task_id = self.next_task_id();
        self.set_work_task(
            agent_id,
            WorkTask {
                task_id: task_id.clone(),
                kind: WorkKind::BuildBlueprint,
                block_pos: Vec3i::default(),
                recipe_id: String::new(),
                item_id: String::new(),
                count: 0,
                blueprint_id: tr.blueprint_id.clone(),
                anchor,
                rotation: tr.rotation.rem_euclid(4),
                build_index: 0,
                target_id: String::new(),
                started_tick: now_tick,
                work_ticks: 0,
            },
            now_tick,
        );
        self.ack_task(agent_id, now_tick, &tr.id, &task_id);
    }

    /// Creating a claim resolves within the submission tick: consumes the
    /// totem materials, places the totem block and registers the claim.
    fn task_claim_land(&mut self, agent_id: &str, tr: &TaskReq, now_tick: u64) {
        let radius = if tr.radius <= 0 { 32 } else { tr.radius.min(128) };
        let anchor = Vec3i::from_array(tr.target);
        if !self.chunks.in_bounds(anchor) {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_INVALID_TARGET, "out of bounds",
            );
            return;
        }
        if !self.can_build_at(agent_id, anchor, now_tick) {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_NO_PERMISSION, "cannot claim here",
            );
            return;
        }
        let has_materials = self.agents.get(agent_id).is_some_and(|a| {
            inventory::count(&a.inventory, "BATTERY") >= 1
                && inventory::count(&a.inventory, "CRYSTAL_SHARD") >= 1
        });
        if !has_materials {
            self.push_action_result(
                agent_id,
                now_tick,
                &tr.id,
                false,
                E_NO_RESOURCE,
                "need BATTERY + CRYSTAL_SHARD",
            );
            return;
        }
        let overlaps = self.claims.values().any(|c| {
            manhattan_xz(anchor, c.anchor) <= radius + c.radius
        });
        if overlaps {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_CONFLICT, "claim overlaps existing land",
            );
            return;
        }
        let air = self.chunks.gen.air;
        if self.chunks.get_block(anchor) != air {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_CONFLICT, "anchor occupied",
            );
            return;
        }
        let Some(totem) = self.catalogs.block_id("CLAIM_TOTEM") else {
            self.push_action_result(
                agent_id, now_tick, &tr.id, false, E_INVALID_TARGET, "no claim totem block",
            );
            return;
        };

        if let Some(a) = self.agents.get_mut(agent_id) {
            inventory::take(&mut a.inventory, "BATTERY", 1);
            inventory::take(&mut a.inventory, "CRYSTAL_SHARD", 1);
        }
        self.chunks.set_block(anchor, totem);
        self.audit_set_block(now_tick, agent_id, anchor, air, totem, "CLAIM_LAND");

        let land_id = self.next_land_id(agent_id);
        let due = now_tick + self.cfg.day_ticks;
        self.claims.insert(
            land_id.clone(),
            LandClaim {
                land_id: land_id.clone(),
                owner: agent_id.to_string(),
                anchor,
                radius,
                flags: ClaimFlags {
                    allow_build: false,
                    allow_break: false,
                    allow_damage: false,
                    allow_trade: true,
                },
                members: Default::default(),
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
                maintenance_due_tick: due,
            },
        );
        let mut ev = action_result(now_tick, &tr.id, true, "", "");
        if let Some(obj) = ev.as_object_mut() {
            obj.insert("land_id".to_string(), json!(land_id));
        }
        self.push_event(agent_id, ev);
    }

    /// Removes the claim anchored at `anchor` (smallest land id on ties)
    /// along with its laws. Triggered by mining the totem.
    pub(crate) fn remove_claim_by_anchor(
        &mut self,
        now_tick: u64,
        actor: &str,
        anchor: Vec3i,
        reason: &str,
    ) {
        let Some(land_id) = self
            .claims
            .values()
            .filter(|c| c.anchor == anchor)
            .map(|c| c.land_id.clone())
            .next()
        else {
            return;
        };
        self.claims.remove(&land_id);
        let bound_laws: Vec<String> = self
            .laws
            .values()
            .filter(|l| l.land_id == land_id)
            .map(|l| l.law_id.clone())
            .collect();
        for id in bound_laws {
            self.laws.remove(&id);
        }
        self.audit_event(
            now_tick,
            actor,
            "CLAIM_REMOVE",
            anchor,
            reason,
            json!({"land_id": land_id}),
        );
    }
}
