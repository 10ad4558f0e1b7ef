//! Blueprint building: rotation, storage auto-pull and the per-tick placer.

use voxel_world_proto::{E_CONFLICT, E_INVALID_TARGET, E_NO_PERMISSION, E_NO_RESOURCE};

use crate::catalogs::BlueprintDef;
use crate::engine::events::{task_done, task_fail};
use crate::engine::inventory::{self, Inventory};
use crate::engine::tasks::WorkTask;
use crate::engine::world::World;
use crate::geometry::{manhattan, Vec3i};

/// Rotates a blueprint offset by `rotation` quarter turns around Y.
pub fn rotate_offset(offset: [i32; 3], rotation: i32) -> [i32; 3] {
    let [x, y, z] = offset;
    match rotation.rem_euclid(4) {
        1 => [-z, y, x],
        2 => [-x, y, -z],
        3 => [z, y, -x],
        _ => [x, y, z],
    }
}

struct StorageCandidate {
    pos: Vec3i,
    dist: i32,
}

impl World {
    /// Containers eligible for blueprint auto-pull: within range of the
    /// anchor, on the anchor's claim (or in the wild when the anchor is),
    /// and withdrawable by the agent. Sorted by distance, then position.
    fn blueprint_storage_candidates(&self, agent_id: &str, anchor: Vec3i) -> Vec<StorageCandidate> {
        let anchor_land = self.land_id_at(anchor);
        let range = self.cfg.blueprint_auto_pull_range;

        let mut cands: Vec<StorageCandidate> = self
            .containers
            .values()
            .filter(|c| c.kind == "CHEST")
            .filter_map(|c| {
                let dist = manhattan(c.pos, anchor);
                if dist > range {
                    return None;
                }
                let land = self.land_id_at(c.pos);
                if land != anchor_land {
                    return None;
                }
                if !self.can_withdraw_from_container(agent_id, c.pos) {
                    return None;
                }
                Some(StorageCandidate { pos: c.pos, dist })
            })
            .collect();
        cands.sort_by_key(|c| (c.dist, c.pos));
        cands
    }

    /// Ensures the agent holds every item in `cost`, pulling deficits from
    /// eligible storage. Fails without mutating anything when the pooled
    /// stock cannot cover a deficit.
    fn blueprint_ensure_materials(
        &mut self,
        agent_id: &str,
        anchor: Vec3i,
        cost: &Inventory,
    ) -> Result<(), String> {
        if cost.is_empty() {
            return Ok(());
        }
        let cands = self.blueprint_storage_candidates(agent_id, anchor);

        // Preflight the whole bill before touching any inventory.
        for (item, &required) in cost {
            let have = self
                .agents
                .get(agent_id)
                .map(|a| inventory::count(&a.inventory, item))
                .unwrap_or(0);
            if have >= required {
                continue;
            }
            let deficit = required - have;
            let avail: i64 = cands
                .iter()
                .filter_map(|c| self.containers.get(&c.pos))
                .map(|c| inventory::count(&c.inventory, item))
                .sum();
            if avail < deficit {
                return Err(format!("missing {} x{}", item, deficit - avail));
            }
        }

        for (item, &required) in cost {
            loop {
                let have = self
                    .agents
                    .get(agent_id)
                    .map(|a| inventory::count(&a.inventory, item))
                    .unwrap_or(0);
                if have >= required {
                    break;
                }
                let mut deficit = required - have;
                let mut pulled = 0;
                for cand in &cands {
                    if deficit <= 0 {
                        break;
                    }
                    let taken = match self.containers.get_mut(&cand.pos) {
                        Some(c) => inventory::take(&mut c.inventory, item, deficit),
                        None => 0,
                    };
                    if taken > 0 {
                        pulled += taken;
                        deficit -= taken;
                    }
                }
                if pulled == 0 {
                    // Unreachable given the preflight; treated as missing.
                    return Err("missing materials".to_string());
                }
                if let Some(a) = self.agents.get_mut(agent_id) {
                    inventory::add(&mut a.inventory, item, pulled);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn tick_build_blueprint(
        &mut self,
        agent_id: &str,
        wt: &mut WorkTask,
        now_tick: u64,
    ) -> bool {
        let Some(bp) = self.catalogs.blueprints.by_id.get(&wt.blueprint_id).cloned() else {
            self.push_event(
                agent_id,
                task_fail(now_tick, &wt.task_id, E_INVALID_TARGET, "unknown blueprint"),
            );
            return false;
        };
        let anchor = wt.anchor;
        let rotation = wt.rotation;

        // First tick: preflight the whole footprint and secure materials.
        if wt.build_index == 0 && wt.work_ticks == 0 {
            wt.work_ticks = 1;
            let mut already_correct: Inventory = Inventory::new();
            let mut correct = 0usize;
            for b in &bp.blocks {
                let off = rotate_offset(b.pos, rotation);
                let pos = Vec3i::new(anchor.x + off[0], anchor.y + off[1], anchor.z + off[2]);
                if !self.chunks.in_bounds(pos) {
                    self.push_event(
                        agent_id,
                        task_fail(now_tick, &wt.task_id, E_INVALID_TARGET, "out of bounds"),
                    );
                    return false;
                }
                let Some(block_id) = self.catalogs.block_id(&b.block) else {
                    self.push_event(
                        agent_id,
                        task_fail(now_tick, &wt.task_id, E_INVALID_TARGET, "unknown block in blueprint"),
                    );
                    return false;
                };
                if !self.can_build_at(agent_id, pos, now_tick) {
                    self.push_event(
                        agent_id,
                        task_fail(now_tick, &wt.task_id, E_NO_PERMISSION, "build denied"),
                    );
                    return false;
                }
                let cur = self.chunks.get_block(pos);
                if cur != self.chunks.gen.air {
                    if cur == block_id {
                        // Resuming over partially-built work is fine.
                        inventory::add(&mut already_correct, &b.block, 1);
                        correct += 1;
                        continue;
                    }
                    self.push_event(
                        agent_id,
                        task_fail(now_tick, &wt.task_id, E_CONFLICT, "space occupied"),
                    );
                    return false;
                }
            }

            // Fully present already: nothing to charge, nothing to place.
            if correct == bp.blocks.len() {
                self.push_event(agent_id, task_done(now_tick, &wt.task_id, wt.kind.as_str()));
                return false;
            }

            // Charge only the remaining share of the bill.
            let mut need = Inventory::new();
            for ic in &bp.cost {
                if ic.item.is_empty() || ic.count <= 0 {
                    continue;
                }
                let credit = inventory::count(&already_correct, &ic.item);
                let rest = ic.count - credit;
                if rest > 0 {
                    inventory::add(&mut need, &ic.item, rest);
                }
            }
            if let Err(msg) = self.blueprint_ensure_materials(agent_id, anchor, &need) {
                self.push_event(
                    agent_id,
                    task_fail(now_tick, &wt.task_id, E_NO_RESOURCE, &msg),
                );
                return false;
            }
            if let Some(a) = self.agents.get_mut(agent_id) {
                for (item, &n) in &need {
                    inventory::take(&mut a.inventory, item, n);
                }
            }
        }

        // Place up to the configured number of blocks.
        let mut placed = 0usize;
        let limit = self.cfg.blueprint_blocks_per_tick.max(1);
        while placed < limit && wt.build_index < bp.blocks.len() {
            let b = &bp.blocks[wt.build_index];
            let off = rotate_offset(b.pos, rotation);
            let pos = Vec3i::new(anchor.x + off[0], anchor.y + off[1], anchor.z + off[2]);
            let Some(block_id) = self.catalogs.block_id(&b.block) else {
                self.push_event(
                    agent_id,
                    task_fail(now_tick, &wt.task_id, E_INVALID_TARGET, "unknown block in blueprint"),
                );
                return false;
            };
            if !self.can_build_at(agent_id, pos, now_tick) {
                self.push_event(
                    agent_id,
                    task_fail(now_tick, &wt.task_id, E_NO_PERMISSION, "build denied"),
                );
                return false;
            }
            let cur = self.chunks.get_block(pos);
            if cur != self.chunks.gen.air {
                if cur == block_id {
                    wt.build_index += 1;
                    continue;
                }
                self.push_event(
                    agent_id,
                    task_fail(now_tick, &wt.task_id, E_CONFLICT, "space occupied"),
                );
                return false;
            }
            let air = self.chunks.gen.air;
            self.chunks.set_block(pos, block_id);
            self.audit_set_block(now_tick, agent_id, pos, air, block_id, "BUILD_BLUEPRINT");
            self.ensure_container_for_placed_block(pos, &b.block);
            wt.build_index += 1;
            placed += 1;
        }

        if wt.build_index >= bp.blocks.len() {
            self.register_structure(now_tick, agent_id, &wt.blueprint_id, anchor, rotation);
            self.fun_on_blueprint_complete(agent_id, now_tick);
            self.push_event(agent_id, task_done(now_tick, &wt.task_id, wt.kind.as_str()));
            return false;
        }
        true
    }

    /// True when every block of the blueprint is present at the anchor.
    pub(crate) fn blueprint_placed(
        &mut self,
        bp: &BlueprintDef,
        anchor: Vec3i,
        rotation: i32,
    ) -> bool {
        bp.blocks.iter().all(|b| {
            let off = rotate_offset(b.pos, rotation);
            let pos = Vec3i::new(anchor.x + off[0], anchor.y + off[1], anchor.z + off[2]);
            self.catalogs
                .block_id(&b.block)
                .is_some_and(|id| self.chunks.get_block(pos) == id)
        })
    }
}
