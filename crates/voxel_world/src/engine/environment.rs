//! Environment and survival: day cycle, hunger, stamina, starvation,
//! respawn and claim maintenance.

use serde_json::json;

use crate::engine::inventory::{self, Inventory};
use crate::engine::world::World;
use crate::geometry::Vec3i;

/// Hunger ticks down (and starvation bites) on this cadence.
const SURVIVAL_CADENCE_TICKS: u64 = 200;
const COLD_CADENCE_TICKS: u64 = 50;
/// Share of each stack dropped on death, rounded down.
const RESPAWN_DROP_NUMERATOR: i64 = 3;
const RESPAWN_DROP_DENOMINATOR: i64 = 10;

fn is_night(time_of_day: f64) -> bool {
    !(0.25..0.75).contains(&time_of_day)
}

impl World {
    pub(crate) fn system_environment(&mut self, now_tick: u64) {
        self.tick_claims_maintenance(now_tick);

        let agent_ids = self.sorted_agent_ids();

        // Hunger decay and starvation pressure.
        if now_tick % SURVIVAL_CADENCE_TICKS == 0 && now_tick != 0 {
            for id in &agent_ids {
                let damaged = match self.agents.get_mut(id) {
                    Some(a) => {
                        if a.hunger > 0 {
                            a.hunger -= 1;
                            None
                        } else if a.hp > 0 {
                            a.hp -= 1;
                            Some(a.hp)
                        } else {
                            None
                        }
                    }
                    None => None,
                };
                if let Some(hp) = damaged {
                    let ev = json!({"t": now_tick, "type": "DAMAGE", "kind": "STARVATION", "hp": hp});
                    self.push_event(id, ev);
                }
            }
        }

        // Cold snaps hurt at night unless the agent keeps a torch nearby.
        if self.weather == "COLD" && now_tick % COLD_CADENCE_TICKS == 0 {
            if is_night(self.time_of_day(now_tick)) {
                for id in &agent_ids {
                    let pos = match self.agents.get(id) {
                        Some(a) if a.hp > 0 => a.pos,
                        _ => continue,
                    };
                    if self.near_block(pos, "TORCH", 3) {
                        continue;
                    }
                    let hp = match self.agents.get_mut(id) {
                        Some(a) => {
                            a.hp -= 1;
                            a.hp
                        }
                        None => continue,
                    };
                    let ev = json!({"t": now_tick, "type": "DAMAGE", "kind": "COLD", "hp": hp});
                    self.push_event(id, ev);
                }
            }
        }

        // Stamina recovery; hungry agents recover slowly.
        for id in &agent_ids {
            if let Some(a) = self.agents.get_mut(id) {
                if a.stamina_milli < 1000 {
                    let rec = if a.hunger >= 3 { 4 } else { 1 };
                    a.stamina_milli = (a.stamina_milli + rec).min(1000);
                }
            }
        }

        // Downed agents respawn.
        for id in &agent_ids {
            let downed = self.agents.get(id).is_some_and(|a| a.hp <= 0);
            if downed {
                self.respawn_agent(now_tick, id, "DOWNED");
            }
        }
    }

    /// Death drops 30% of each stack (floor) at the downed position, then
    /// restores vitals and teleports to the agent's spawn point.
    pub(crate) fn respawn_agent(&mut self, now_tick: u64, agent_id: &str, reason: &str) {
        let (drop_pos, lost) = {
            let Some(a) = self.agents.get_mut(agent_id) else {
                return;
            };
            a.move_task = None;
            a.work_task = None;

            let mut lost = Inventory::new();
            for (item, &n) in a.inventory.iter() {
                let drop = n * RESPAWN_DROP_NUMERATOR / RESPAWN_DROP_DENOMINATOR;
                if drop > 0 {
                    lost.insert(item.clone(), drop);
                }
            }
            for (item, &n) in &lost {
                inventory::take(&mut a.inventory, item, n);
            }
            (a.pos, lost)
        };

        for (item, &n) in &lost {
            self.spawn_item_entity(now_tick, agent_id, drop_pos, item, n, "RESPAWN_DROP");
        }

        // Spawn point is a pure function of the agent index and the seed.
        let idx = crate::engine::transfer::parse_uint_after_prefix("A", agent_id).unwrap_or(0);
        let base = (idx as i32) * 2;
        let (x, z) = self.chunks.find_spawn(base, -base, 8);
        let y = self.chunks.surface_y(x, z);

        let Some(a) = self.agents.get_mut(agent_id) else {
            return;
        };
        a.pos = Vec3i::new(x, y, z);
        a.yaw = 0;
        a.hp = 20;
        a.hunger = 10;
        a.stamina_milli = 1000;

        let mut ev = json!({
            "t": now_tick,
            "type": "RESPAWN",
            "reason": reason,
            "pos": [x, y, z],
            "drop_pos": drop_pos.to_array(),
        });
        if !lost.is_empty() {
            if let Some(obj) = ev.as_object_mut() {
                obj.insert("lost".to_string(), inventory::stacks_json(&lost));
            }
        }
        self.push_event(agent_id, ev);
    }

    /// Daily upkeep per claim: paid from the owner (agent inventory or org
    /// treasury). Failure advances the maintenance stage toward unprotected.
    fn tick_claims_maintenance(&mut self, now_tick: u64) {
        if self.claims.is_empty() {
            return;
        }
        let day = self.cfg.day_ticks.max(1);
        let land_ids: Vec<String> = self.claims.keys().cloned().collect();

        for land_id in land_ids {
            let (due, owner) = match self.claims.get(&land_id) {
                Some(c) => (c.maintenance_due_tick, c.owner.clone()),
                None => continue,
            };
            if due == 0 {
                if let Some(c) = self.claims.get_mut(&land_id) {
                    c.maintenance_due_tick = now_tick + day;
                }
                continue;
            }
            if now_tick < due {
                continue;
            }

            let paid = self.pay_maintenance(&owner);
            let (stage, next_due) = match self.claims.get_mut(&land_id) {
                Some(c) => {
                    if paid {
                        c.maintenance_stage = 0;
                    } else if c.maintenance_stage < 2 {
                        c.maintenance_stage += 1;
                    }
                    c.maintenance_due_tick = due + day;
                    (c.maintenance_stage, c.maintenance_due_tick)
                }
                None => continue,
            };

            if self.agents.contains_key(&owner) {
                let ev = json!({
                    "t": now_tick,
                    "type": "MAINTENANCE",
                    "land_id": land_id,
                    "status": if paid { "PAID" } else { "LATE" },
                    "stage": stage,
                    "next_due_tick": next_due,
                });
                self.push_event(&owner, ev);
            }
        }
    }

    fn pay_maintenance(&mut self, owner: &str) -> bool {
        let owner = owner.trim();
        if owner.is_empty() {
            return false;
        }
        let cost = self.cfg.maintenance_cost.clone();

        if let Some(org) = self.orgs.get_mut(owner) {
            if !inventory::has_all(&org.treasury, &cost) {
                return false;
            }
            for (item, &n) in &cost {
                inventory::take(&mut org.treasury, item, n);
            }
            return true;
        }
        if let Some(a) = self.agents.get_mut(owner) {
            if !inventory::has_all(&a.inventory, &cost) {
                return false;
            }
            for (item, &n) in &cost {
                inventory::take(&mut a.inventory, item, n);
            }
            return true;
        }
        false
    }
}
