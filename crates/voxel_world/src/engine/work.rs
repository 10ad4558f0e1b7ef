//! Work system: MINE, GATHER, PLACE, CRAFT, OPEN and BUILD_BLUEPRINT ticks.

use serde_json::json;

use voxel_world_proto::{
    E_CONFLICT, E_INVALID_TARGET, E_NO_PERMISSION, E_NO_RESOURCE, E_OUT_OF_RANGE,
};

use crate::engine::container::Container;
use crate::engine::events::{task_done, task_fail};
use crate::engine::inventory;
use crate::engine::tasks::{WorkKind, WorkTask};
use crate::engine::world::World;
use crate::geometry::{manhattan, Vec3i};

/// Mining effort and stamina drain by best matching tool tier.
fn mine_params_for_tier(tier: i32) -> (u64, i64) {
    match tier {
        0 => (3, 12),
        1 => (2, 10),
        _ => (1, 8),
    }
}

fn best_pickaxe_tier(inv: &crate::engine::inventory::Inventory) -> i32 {
    if inventory::count(inv, "IRON_PICKAXE") > 0 {
        2
    } else if inventory::count(inv, "STONE_PICKAXE") > 0 {
        1
    } else if inventory::count(inv, "WOOD_PICKAXE") > 0 {
        1
    } else {
        0
    }
}

impl World {
    pub(crate) fn system_work(&mut self, now_tick: u64) {
        for id in self.sorted_agent_ids() {
            let Some(mut task) = self.agents.get_mut(&id).and_then(|a| a.work_task.take()) else {
                continue;
            };
            let keep = match task.kind {
                WorkKind::Mine => self.tick_mine(&id, &mut task, now_tick),
                WorkKind::Gather => self.tick_gather(&id, &mut task, now_tick),
                WorkKind::Place => self.tick_place(&id, &mut task, now_tick),
                WorkKind::Craft => self.tick_craft(&id, &mut task, now_tick),
                WorkKind::Open => self.tick_open(&id, &mut task, now_tick),
                WorkKind::BuildBlueprint => self.tick_build_blueprint(&id, &mut task, now_tick),
            };
            if keep {
                if let Some(a) = self.agents.get_mut(&id) {
                    if a.work_task.is_none() {
                        a.work_task = Some(task);
                    }
                }
            }
        }
    }

    fn tick_mine(&mut self, agent_id: &str, wt: &mut WorkTask, now_tick: u64) -> bool {
        let pos = wt.block_pos;
        let agent_pos = match self.agents.get(agent_id) {
            Some(a) => a.pos,
            None => return false,
        };
        if manhattan(agent_pos, pos) > 2 {
            self.push_event(agent_id, task_fail(now_tick, &wt.task_id, E_OUT_OF_RANGE, "too far"));
            return false;
        }
        if !self.can_break_at(agent_id, pos, now_tick) {
            self.apply_break_fine(agent_id, pos, now_tick);
            self.push_event(
                agent_id,
                task_fail(now_tick, &wt.task_id, E_NO_PERMISSION, "break denied"),
            );
            return false;
        }
        let block = self.chunks.get_block(pos);
        let air = self.chunks.gen.air;
        if block == air {
            self.push_event(
                agent_id,
                task_fail(now_tick, &wt.task_id, E_INVALID_TARGET, "no block"),
            );
            return false;
        }
        let block_name = self.catalogs.block_name(block).to_string();

        let (work_needed, stamina_cost) = {
            let tier = self
                .agents
                .get(agent_id)
                .map(|a| best_pickaxe_tier(&a.inventory))
                .unwrap_or(0);
            mine_params_for_tier(tier)
        };
        {
            let Some(a) = self.agents.get_mut(agent_id) else {
                return false;
            };
            if a.stamina_milli < stamina_cost {
                return true; // wait and recover
            }
            a.stamina_milli -= stamina_cost;
        }
        wt.work_ticks += 1;
        if wt.work_ticks < work_needed {
            return true;
        }

        // Blocks with attached state clean up their runtime metadata.
        match block_name.as_str() {
            "CHEST" | "FURNACE" => {
                if let Some(c) = self.containers.remove(&pos) {
                    if let Some(a) = self.agents.get_mut(agent_id) {
                        for (item, n) in c.inventory {
                            inventory::add(&mut a.inventory, &item, n);
                        }
                    }
                }
            }
            "SIGN" => {
                if self.signs.remove(&pos).is_some() {
                    self.audit_event(
                        now_tick,
                        agent_id,
                        "SIGN_REMOVE",
                        pos,
                        "MINE",
                        json!({}),
                    );
                }
            }
            "BULLETIN_BOARD" => {
                self.boards.remove(&pos);
            }
            "CLAIM_TOTEM" => {
                self.remove_claim_by_anchor(now_tick, agent_id, pos, "MINE");
            }
            _ => {}
        }

        self.chunks.set_block(pos, air);
        self.audit_set_block(now_tick, agent_id, pos, block, air, "MINE");

        let drop = self.catalogs.block_drop(block).to_string();
        if !drop.is_empty() {
            self.spawn_item_entity(now_tick, agent_id, pos, &drop, 1, "MINE_DROP");
        }
        self.push_event(agent_id, task_done(now_tick, &wt.task_id, wt.kind.as_str()));
        false
    }

    /// Fine for denied break attempts under FINE_BREAK_PER_BLOCK. Permission
    /// denials only; curfew misses do not fine. Insufficient funds pay what
    /// is there.
    fn apply_break_fine(&mut self, agent_id: &str, pos: Vec3i, now_tick: u64) {
        let Some(land) = self.land_at(pos) else {
            return;
        };
        if self.is_land_member(agent_id, land)
            || !land.fine_break_enabled
            || land.fine_break_per_block <= 0
            || land.fine_break_item.trim().is_empty()
        {
            return;
        }
        // Only permission denials are finable.
        let (_, perms) = self.permissions_for(agent_id, pos);
        if perms.can_break {
            return;
        }
        let land_id = land.land_id.clone();
        let owner = land.owner.clone();
        let item = land.fine_break_item.trim().to_string();
        let fine = land.fine_break_per_block;

        let paid = match self.agents.get_mut(agent_id) {
            Some(a) => inventory::take(&mut a.inventory, &item, fine),
            None => 0,
        };
        if paid <= 0 {
            return;
        }
        if !owner.is_empty() {
            let amount = crate::engine::inventory::Inventory::from([(item.clone(), paid)]);
            self.credit_owner(&owner, &amount);
        }
        let ev = json!({
            "t": now_tick,
            "type": "FINE",
            "land_id": land_id,
            "item": item,
            "count": paid,
            "reason": "BREAK_DENIED",
        });
        self.push_event(agent_id, ev);
    }

    fn tick_gather(&mut self, agent_id: &str, wt: &mut WorkTask, now_tick: u64) -> bool {
        let Some(entity) = self.items.get(&wt.target_id).cloned() else {
            self.push_event(
                agent_id,
                task_fail(now_tick, &wt.task_id, E_INVALID_TARGET, "item entity not found"),
            );
            return false;
        };
        let agent_pos = match self.agents.get(agent_id) {
            Some(a) => a.pos,
            None => return false,
        };
        // Pickup requires standing on the stack.
        if agent_pos != entity.pos {
            self.push_event(
                agent_id,
                task_fail(now_tick, &wt.task_id, E_OUT_OF_RANGE, "not on item"),
            );
            return false;
        }
        if !self.can_pickup_item_entity(agent_id, entity.pos) {
            self.push_event(
                agent_id,
                task_fail(now_tick, &wt.task_id, E_NO_PERMISSION, "pickup denied"),
            );
            return false;
        }
        if let Some(a) = self.agents.get_mut(agent_id) {
            inventory::add(&mut a.inventory, &entity.item, entity.count);
        }
        self.remove_item_entity(now_tick, agent_id, &wt.target_id, "GATHER");
        self.push_event(agent_id, task_done(now_tick, &wt.task_id, wt.kind.as_str()));
        false
    }

    fn tick_place(&mut self, agent_id: &str, wt: &mut WorkTask, now_tick: u64) -> bool {
        let pos = wt.block_pos;
        if !self.chunks.in_bounds(pos) {
            self.push_event(
                agent_id,
                task_fail(now_tick, &wt.task_id, E_INVALID_TARGET, "out of bounds"),
            );
            return false;
        }
        if !self.can_build_at(agent_id, pos, now_tick) {
            self.push_event(
                agent_id,
                task_fail(now_tick, &wt.task_id, E_NO_PERMISSION, "build denied"),
            );
            return false;
        }
        let air = self.chunks.gen.air;
        if self.chunks.get_block(pos) != air {
            self.push_event(
                agent_id,
                task_fail(now_tick, &wt.task_id, E_CONFLICT, "space occupied"),
            );
            return false;
        }
        let has_item = self
            .agents
            .get(agent_id)
            .is_some_and(|a| inventory::count(&a.inventory, &wt.item_id) >= 1);
        if wt.item_id.is_empty() || !has_item {
            self.push_event(
                agent_id,
                task_fail(now_tick, &wt.task_id, E_NO_RESOURCE, "missing item"),
            );
            return false;
        }

        let block_name = match self.catalogs.items.defs.get(&wt.item_id) {
            Some(def) if !def.place_as.is_empty() => def.place_as.clone(),
            _ => wt.item_id.clone(),
        };
        let Some(block_id) = self.catalogs.block_id(&block_name) else {
            self.push_event(
                agent_id,
                task_fail(now_tick, &wt.task_id, E_INVALID_TARGET, "item not placeable"),
            );
            return false;
        };

        if let Some(a) = self.agents.get_mut(agent_id) {
            inventory::take(&mut a.inventory, &wt.item_id, 1);
        }
        self.chunks.set_block(pos, block_id);
        self.audit_set_block(now_tick, agent_id, pos, air, block_id, "PLACE");
        self.ensure_container_for_placed_block(pos, &block_name);

        self.push_event(agent_id, task_done(now_tick, &wt.task_id, wt.kind.as_str()));
        false
    }

    pub(crate) fn ensure_container_for_placed_block(&mut self, pos: Vec3i, block_name: &str) {
        match block_name {
            "CHEST" | "FURNACE" => {
                self.containers.entry(pos).or_insert_with(|| Container {
                    kind: block_name.to_string(),
                    pos,
                    inventory: Default::default(),
                });
            }
            "BULLETIN_BOARD" => {
                self.boards.entry(pos).or_default();
            }
            "SIGN" => {
                self.signs.entry(pos).or_default();
            }
            _ => {}
        }
    }

    fn tick_craft(&mut self, agent_id: &str, wt: &mut WorkTask, now_tick: u64) -> bool {
        let Some(recipe) = self.catalogs.recipes.by_id.get(&wt.recipe_id).cloned() else {
            self.push_event(
                agent_id,
                task_fail(now_tick, &wt.task_id, E_INVALID_TARGET, "unknown recipe"),
            );
            return false;
        };
        let agent_pos = match self.agents.get(agent_id) {
            Some(a) => a.pos,
            None => return false,
        };
        match recipe.station.as_str() {
            "HAND" => {}
            "CRAFTING_BENCH" => {
                if !self.near_block(agent_pos, "CRAFTING_BENCH", 2) {
                    self.push_event(
                        agent_id,
                        task_fail(now_tick, &wt.task_id, E_CONFLICT, "need crafting bench nearby"),
                    );
                    return false;
                }
            }
            _ => {
                self.push_event(
                    agent_id,
                    task_fail(now_tick, &wt.task_id, E_INVALID_TARGET, "unsupported station"),
                );
                return false;
            }
        }

        wt.work_ticks += 1;
        if wt.work_ticks < recipe.time_ticks {
            return true;
        }
        wt.work_ticks = 0;

        let consumed = match self.agents.get_mut(agent_id) {
            Some(a) => {
                let can = recipe
                    .inputs
                    .iter()
                    .all(|ic| inventory::count(&a.inventory, &ic.item) >= ic.count);
                if can {
                    for ic in &recipe.inputs {
                        inventory::take(&mut a.inventory, &ic.item, ic.count);
                    }
                    for oc in &recipe.outputs {
                        inventory::add(&mut a.inventory, &oc.item, oc.count);
                    }
                }
                can
            }
            None => return false,
        };
        if !consumed {
            self.push_event(
                agent_id,
                task_fail(now_tick, &wt.task_id, E_NO_RESOURCE, "missing inputs"),
            );
            return false;
        }
        self.fun_on_recipe(agent_id, &wt.recipe_id, now_tick);

        wt.count -= 1;
        if wt.count <= 0 {
            self.push_event(agent_id, task_done(now_tick, &wt.task_id, wt.kind.as_str()));
            return false;
        }
        true
    }

    fn tick_open(&mut self, agent_id: &str, wt: &mut WorkTask, now_tick: u64) -> bool {
        let target_id = wt.target_id.clone();
        match self.open_target(agent_id, &target_id, now_tick) {
            Ok(()) => {
                self.push_event(agent_id, task_done(now_tick, &wt.task_id, wt.kind.as_str()));
            }
            Err((code, msg)) => {
                self.push_event(agent_id, task_fail(now_tick, &wt.task_id, code, msg));
            }
        }
        false
    }
}
