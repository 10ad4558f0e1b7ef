//! Per-agent observation building and non-blocking dispatch.

use voxel_world_proto::{
    EntityObs, LocalRulesObs, ObsMsg, SelfObs, TaskObs, VoxelDeltaOp, VoxelsObs, WorldObs,
    PROTOCOL_VERSION, TYPE_OBS,
};

use crate::engine::claims::curfew_blocks;
use crate::engine::container::container_id;
use crate::engine::inventory;
use crate::engine::tasks::WorkKind;
use crate::engine::world::World;
use crate::geometry::{manhattan, manhattan_xz, Vec3i};

impl World {
    /// Builds and sends OBS frames to every bound client. Sends never block:
    /// a slow client loses this tick's frame, not the engine's time.
    pub(crate) fn dispatch_observations(&mut self, now_tick: u64) {
        let ids: Vec<String> = self.clients.keys().cloned().collect();
        for id in ids {
            if !self.agents.contains_key(&id) {
                continue;
            }
            let obs = self.build_obs(&id, now_tick);
            let Ok(bytes) = serde_json::to_vec(&obs) else {
                continue;
            };
            if let Some(cl) = self.clients.get(&id) {
                let _ = cl.out.try_send(bytes);
            }
        }
    }

    pub(crate) fn build_obs(&mut self, agent_id: &str, now_tick: u64) -> ObsMsg {
        let (pos, yaw, hp, hunger, stamina_milli) = match self.agents.get(agent_id) {
            Some(a) => (a.pos, a.yaw, a.hp, a.hunger, a.stamina_milli),
            None => Default::default(),
        };

        let voxels = self.build_obs_voxels(agent_id, pos);
        let entities = self.build_obs_entities(agent_id, pos);
        let tasks = self.build_obs_tasks(agent_id);
        let local_rules = self.build_obs_local_rules(agent_id, pos, now_tick);

        let inventory_list = self
            .agents
            .get(agent_id)
            .map(|a| inventory::sorted_stacks(&a.inventory))
            .unwrap_or_default();
        let events = self
            .agents
            .get_mut(agent_id)
            .map(|a| a.take_events())
            .unwrap_or_default();

        ObsMsg {
            msg_type: TYPE_OBS.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            tick: now_tick,
            agent_id: agent_id.to_string(),
            world_id: self.cfg.id.clone(),
            world: WorldObs {
                time_of_day: self.time_of_day(now_tick),
                weather: self.weather.clone(),
                season_day: self.season_day(now_tick),
                biome: self.biome_at_pos(pos).to_string(),
                active_event: self.active_event_id.clone(),
                active_event_ends_tick: self.active_event_ends,
            },
            self_obs: SelfObs {
                pos: pos.to_array(),
                yaw,
                hp,
                hunger,
                stamina: stamina_milli as f64 / 1000.0,
            },
            inventory: inventory_list,
            local_rules,
            voxels,
            entities,
            events,
            tasks,
        }
    }

    fn build_obs_local_rules(&self, agent_id: &str, pos: Vec3i, now_tick: u64) -> LocalRulesObs {
        let (land, mut perms) = self.permissions_for(agent_id, pos);
        let mut out = LocalRulesObs::default();
        match land {
            None => {
                out.role = "WILD".to_string();
                out.market_tax = 0.0;
            }
            Some(land) => {
                if !self.is_land_member(agent_id, land)
                    && curfew_blocks(land, self.time_of_day(now_tick))
                {
                    perms.can_build = false;
                    perms.can_break = false;
                }
                out.land_id = land.land_id.clone();
                out.owner = land.owner.clone();
                out.role = if land.owner == agent_id {
                    "OWNER".to_string()
                } else if self.is_land_member(agent_id, land) {
                    "MEMBER".to_string()
                } else {
                    "VISITOR".to_string()
                };
                out.market_tax = land.market_tax;
                out.maintenance_stage = land.maintenance_stage as i64;
            }
        }
        out.permissions = perms.to_map();
        out
    }

    /// The voxel window around the agent: a cube of side `2r+1`, x fastest,
    /// then z, then y. Delta clients receive only the ops against their
    /// previous window.
    fn build_obs_voxels(&mut self, agent_id: &str, center: Vec3i) -> VoxelsObs {
        let r = self.cfg.obs_radius;
        let dim = (2 * r + 1) as usize;
        let mut current = vec![0u16; dim * dim * dim];
        let mut i = 0;
        for dy in -r..=r {
            for dz in -r..=r {
                for dx in -r..=r {
                    current[i] = self.chunks.get_block(Vec3i::new(
                        center.x + dx,
                        center.y + dy,
                        center.z + dz,
                    ));
                    i += 1;
                }
            }
        }

        let delta_mode = self
            .clients
            .get(agent_id)
            .map(|c| c.delta_voxels)
            .unwrap_or(false);
        let mut out = VoxelsObs {
            center: center.to_array(),
            radius: r,
            encoding: "FULL".to_string(),
            blocks: Vec::new(),
            ops: Vec::new(),
        };

        if delta_mode {
            let prev = self
                .clients
                .get(agent_id)
                .map(|c| c.last_voxels.clone())
                .unwrap_or_default();
            if prev.len() == current.len() {
                out.encoding = "DELTA".to_string();
                let mut i = 0;
                for dy in -r..=r {
                    for dz in -r..=r {
                        for dx in -r..=r {
                            if prev[i] != current[i] {
                                out.ops.push(VoxelDeltaOp {
                                    d: [dx, dy, dz],
                                    b: current[i],
                                });
                            }
                            i += 1;
                        }
                    }
                }
            } else {
                out.blocks = current.clone();
            }
        } else {
            out.blocks = current.clone();
        }

        if let Some(cl) = self.clients.get_mut(agent_id) {
            cl.last_voxels = current;
        }
        out
    }

    fn build_obs_entities(&self, agent_id: &str, pos: Vec3i) -> Vec<EntityObs> {
        let range = self.cfg.obs_radius.max(1) * 2;
        let mut ents = Vec::with_capacity(16);

        for (other_id, other) in &self.agents {
            if other_id == agent_id || manhattan(other.pos, pos) > range {
                continue;
            }
            let mut tags = Vec::new();
            if !other.org_id.is_empty() {
                tags.push(format!("org:{}", other.org_id));
            }
            ents.push(EntityObs {
                id: other_id.clone(),
                entity_type: "AGENT".to_string(),
                pos: other.pos.to_array(),
                tags,
                item: String::new(),
                count: 0,
            });
        }

        for e in self.items.values() {
            if e.count <= 0 || manhattan(e.pos, pos) > range {
                continue;
            }
            ents.push(EntityObs {
                id: e.entity_id.clone(),
                entity_type: "ITEM".to_string(),
                pos: e.pos.to_array(),
                tags: Vec::new(),
                item: e.item.clone(),
                count: e.count,
            });
        }

        for c in self.containers.values() {
            if manhattan(c.pos, pos) > range {
                continue;
            }
            ents.push(EntityObs {
                id: c.id(),
                entity_type: c.kind.clone(),
                pos: c.pos.to_array(),
                tags: Vec::new(),
                item: String::new(),
                count: 0,
            });
        }

        for (sign_pos, sign) in &self.signs {
            if manhattan(*sign_pos, pos) > range {
                continue;
            }
            let mut tags = Vec::new();
            if !sign.text.is_empty() {
                tags.push("has_text".to_string());
            }
            ents.push(EntityObs {
                id: container_id("SIGN", *sign_pos),
                entity_type: "SIGN".to_string(),
                pos: sign_pos.to_array(),
                tags,
                item: String::new(),
                count: 0,
            });
        }

        for board_pos in self.boards.keys() {
            if manhattan(*board_pos, pos) > range {
                continue;
            }
            ents.push(EntityObs {
                id: container_id("BULLETIN_BOARD", *board_pos),
                entity_type: "BULLETIN_BOARD".to_string(),
                pos: board_pos.to_array(),
                tags: Vec::new(),
                item: String::new(),
                count: 0,
            });
        }

        ents
    }

    fn build_obs_tasks(&self, agent_id: &str) -> Vec<TaskObs> {
        let Some(a) = self.agents.get(agent_id) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(2);

        if let Some(mt) = &a.move_task {
            let total = manhattan_xz(mt.start_pos, mt.target).max(1);
            let remaining = manhattan_xz(a.pos, mt.target);
            let progress =
                ((total - remaining) as f64 / total as f64).clamp(0.0, 1.0);
            out.push(TaskObs {
                task_id: mt.task_id.clone(),
                kind: mt.kind.as_str().to_string(),
                progress,
                target: Some(mt.target.to_array()),
                eta_ticks: remaining as i64,
            });
        }
        if let Some(wt) = &a.work_task {
            let (progress, eta) = match wt.kind {
                WorkKind::Craft => {
                    let time = self
                        .catalogs
                        .recipes
                        .by_id
                        .get(&wt.recipe_id)
                        .map(|r| r.time_ticks)
                        .unwrap_or(1)
                        .max(1);
                    (
                        (wt.work_ticks as f64 / time as f64).clamp(0.0, 1.0),
                        time.saturating_sub(wt.work_ticks) as i64,
                    )
                }
                WorkKind::BuildBlueprint => {
                    let total = self
                        .catalogs
                        .blueprints
                        .by_id
                        .get(&wt.blueprint_id)
                        .map(|b| b.blocks.len())
                        .unwrap_or(1)
                        .max(1);
                    let per_tick = self.cfg.blueprint_blocks_per_tick.max(1);
                    (
                        (wt.build_index as f64 / total as f64).clamp(0.0, 1.0),
                        (total.saturating_sub(wt.build_index) / per_tick) as i64,
                    )
                }
                _ => (0.0, 0),
            };
            out.push(TaskObs {
                task_id: wt.task_id.clone(),
                kind: wt.kind.as_str().to_string(),
                progress,
                target: None,
                eta_ticks: eta,
            });
        }
        out
    }
}
