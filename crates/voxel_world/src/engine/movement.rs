//! Movement system: one step per tick toward the task target.

use serde_json::json;

use voxel_world_proto::{E_CONFLICT, E_INVALID_TARGET, E_NO_PERMISSION, E_NO_RESOURCE};

use crate::engine::events::{task_done, task_fail};
use crate::engine::inventory;
use crate::engine::tasks::{MoveKind, MoveTask};
use crate::engine::world::World;
use crate::geometry::{manhattan_xz, Vec3i};

const MOVE_STAMINA_COST: i64 = 8;
/// Agents can step up or down at most this many blocks per move.
const MAX_STEP_HEIGHT: i32 = 1;

impl World {
    pub(crate) fn system_movement(&mut self, now_tick: u64) {
        for id in self.sorted_agent_ids() {
            let Some(mut task) = self.agents.get_mut(&id).and_then(|a| a.move_task.take()) else {
                continue;
            };
            if self.tick_move(&id, &mut task, now_tick) {
                if let Some(a) = self.agents.get_mut(&id) {
                    // A handler may have installed a replacement meanwhile.
                    if a.move_task.is_none() {
                        a.move_task = Some(task);
                    }
                }
            }
        }
    }

    /// Advances one movement task a single step. Returns whether the task
    /// stays installed.
    fn tick_move(&mut self, agent_id: &str, mt: &mut MoveTask, now_tick: u64) -> bool {
        let pos = match self.agents.get(agent_id) {
            Some(a) => a.pos,
            None => return false,
        };

        let target = match mt.kind {
            MoveKind::MoveTo => {
                let want = (mt.tolerance.ceil() as i32).max(1);
                if manhattan_xz(pos, mt.target) <= want {
                    self.fun_on_biome(agent_id, pos, now_tick);
                    self.push_event(agent_id, task_done(now_tick, &mt.task_id, mt.kind.as_str()));
                    return false;
                }
                mt.target
            }
            MoveKind::Follow => {
                let Some(t) = self.follow_target_pos(&mt.target_id) else {
                    self.push_event(
                        agent_id,
                        task_fail(now_tick, &mt.task_id, E_INVALID_TARGET, "follow target not found"),
                    );
                    return false;
                };
                mt.target = t;
                let want = (mt.distance.ceil() as i32).max(1);
                if manhattan_xz(pos, t) <= want {
                    // Holding distance; the task stays active until canceled.
                    return true;
                }
                t
            }
        };

        // Storms slow travel without deadlocking tasks.
        if self.weather == "STORM" && now_tick % 2 == 1 {
            return true;
        }

        // Too tired: wait and recover.
        let can_move = self
            .agents
            .get(agent_id)
            .is_some_and(|a| a.stamina_milli >= MOVE_STAMINA_COST);
        if !can_move {
            return true;
        }

        // Steer along the axis with the greatest remaining delta, X before Z
        // on ties; the Y coordinate re-snaps to the terrain surface.
        let dx = target.x - pos.x;
        let dz = target.z - pos.z;
        let primary_x = dx.abs() >= dz.abs();
        let step = |along_x: bool| -> Option<Vec3i> {
            let mut next = pos;
            if along_x {
                next.x += dx.signum();
            } else {
                next.z += dz.signum();
            }
            if next.x == pos.x && next.z == pos.z {
                return None;
            }
            Some(next)
        };

        let mut next = None;
        for along_x in [primary_x, !primary_x] {
            if let Some(mut cand) = step(along_x) {
                if !self.chunks.in_bounds(Vec3i::new(cand.x, 1, cand.z)) {
                    continue;
                }
                cand.y = self.chunks.surface_y(cand.x, cand.z);
                if (cand.y - pos.y).abs() <= MAX_STEP_HEIGHT {
                    next = Some(cand);
                    break;
                }
            }
        }
        let Some(next) = next else {
            self.push_event(agent_id, task_fail(now_tick, &mt.task_id, E_CONFLICT, "blocked"));
            return false;
        };

        // Core access pass: entering a guarded core costs a ticket.
        if !self.charge_access_pass(agent_id, pos, next, &mt.task_id, now_tick) {
            return false;
        }

        if let Some(a) = self.agents.get_mut(agent_id) {
            a.stamina_milli -= MOVE_STAMINA_COST;
            a.pos = next;
        }
        self.fun_on_biome(agent_id, next, now_tick);
        true
    }

    /// Applies the ACCESS_PASS_CORE law when a step crosses into a claim
    /// core. Returns false when the move is denied (task already failed).
    fn charge_access_pass(
        &mut self,
        agent_id: &str,
        from: Vec3i,
        to: Vec3i,
        task_id: &str,
        now_tick: u64,
    ) -> bool {
        let Some(to_land) = self.land_at(to) else {
            return true;
        };
        if !to_land.access_pass_enabled
            || !self.land_core_contains(to_land, to)
            || self.is_land_member(agent_id, to_land)
        {
            return true;
        }
        let was_inside = self
            .land_at(from)
            .is_some_and(|l| l.land_id == to_land.land_id && self.land_core_contains(to_land, from));
        if was_inside {
            return true;
        }

        let land_id = to_land.land_id.clone();
        let owner = to_land.owner.clone();
        let item = to_land.access_ticket_item.trim().to_string();
        let cost = to_land.access_ticket_cost;
        if item.is_empty() || cost <= 0 {
            // Misconfigured law: treat the core as closed.
            self.push_event(
                agent_id,
                task_fail(now_tick, task_id, E_NO_PERMISSION, "access pass required"),
            );
            return false;
        }
        let affordable = self
            .agents
            .get(agent_id)
            .is_some_and(|a| inventory::count(&a.inventory, &item) >= cost);
        if !affordable {
            self.push_event(
                agent_id,
                task_fail(now_tick, task_id, E_NO_RESOURCE, "need access ticket"),
            );
            return false;
        }
        if let Some(a) = self.agents.get_mut(agent_id) {
            inventory::take(&mut a.inventory, &item, cost);
        }
        if !owner.is_empty() {
            let paid = crate::engine::inventory::Inventory::from([(item.clone(), cost)]);
            self.credit_owner(&owner, &paid);
        }
        let ev = json!({
            "t": now_tick,
            "type": "ACCESS_PASS",
            "land_id": land_id,
            "item": item,
            "count": cost,
        });
        self.push_event(agent_id, ev);
        true
    }
}
