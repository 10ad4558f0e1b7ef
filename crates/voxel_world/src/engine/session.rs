//! Session lifecycle: join, attach by resume token, welcome + catalogs.

use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use voxel_world_proto::{
    CatalogDigests, CatalogMsg, DigestRef, WelcomeMsg, WorldParams, PROTOCOL_VERSION, TYPE_CATALOG,
    TYPE_WELCOME,
};

use crate::engine::agent::Agent;
use crate::engine::config::WorldConfig;
use crate::engine::inventory;
use crate::engine::requests::{AttachRequest, JoinResponse, OutboundChannel};
use crate::engine::world::{ClientState, World};
use crate::geometry::Vec3i;

/// The operational parameters included in the tuning catalog. The digest and
/// the catalog payload are computed from the same value.
fn tuning_value(cfg: &WorldConfig) -> serde_json::Value {
    json!({
        "snapshot_every_ticks": cfg.snapshot_every_ticks,
        "director_every_ticks": cfg.director_every_ticks,
        "season_length_ticks": cfg.season_length_ticks,
        "law_notice_ticks": cfg.law_notice_ticks,
        "law_vote_ticks": cfg.law_vote_ticks,
        "blueprint_auto_pull_range": cfg.blueprint_auto_pull_range,
        "blueprint_blocks_per_tick": cfg.blueprint_blocks_per_tick,
        "access_pass_core_radius": cfg.access_pass_core_radius,
        "maintenance_cost": cfg.maintenance_cost,
        "fun_decay_window_ticks": cfg.fun_decay_window_ticks,
        "fun_decay_base": cfg.fun_decay_base,
        "structure_survival_ticks": cfg.structure_survival_ticks,
        "rate_limits": {
            "say": {"window": cfg.rate_limits.say_window_ticks, "max": cfg.rate_limits.say_max},
            "market_say": {"window": cfg.rate_limits.market_say_window_ticks, "max": cfg.rate_limits.market_say_max},
            "whisper": {"window": cfg.rate_limits.whisper_window_ticks, "max": cfg.rate_limits.whisper_max},
            "offer_trade": {"window": cfg.rate_limits.offer_trade_window_ticks, "max": cfg.rate_limits.offer_trade_max},
            "post_board": {"window": cfg.rate_limits.post_board_window_ticks, "max": cfg.rate_limits.post_board_max},
        },
    })
}

pub(crate) fn tuning_digest(cfg: &WorldConfig) -> String {
    let bytes = serde_json::to_vec(&tuning_value(cfg)).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

fn normalize_agent_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return "agent".to_string();
    }
    trimmed.chars().take(24).collect()
}

fn new_resume_token(world_id: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("resume_{world_id}_{nanos}")
}

impl World {
    fn build_welcome(&self, agent_id: &str, resume_token: &str) -> WelcomeMsg {
        WelcomeMsg {
            msg_type: TYPE_WELCOME.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            agent_id: agent_id.to_string(),
            resume_token: resume_token.to_string(),
            world_params: WorldParams {
                tick_rate_hz: self.cfg.tick_rate_hz,
                obs_radius: self.cfg.obs_radius,
                day_ticks: self.cfg.day_ticks as i64,
                height: self.cfg.height,
                seed: self.cfg.seed,
            },
            catalogs: CatalogDigests {
                block_palette: DigestRef {
                    digest: self.catalogs.blocks.palette_digest.clone(),
                    count: self.catalogs.blocks.palette.len(),
                },
                item_palette: DigestRef {
                    digest: self.catalogs.items.palette_digest.clone(),
                    count: self.catalogs.items.palette.len(),
                },
                tuning_digest: self.tuning_digest.clone(),
                recipes_digest: self.catalogs.recipes.digest.clone(),
                blueprints_digest: self.catalogs.blueprints.digest.clone(),
                law_templates_digest: self.catalogs.laws.digest.clone(),
                events_digest: self.catalogs.events.digest.clone(),
            },
            current_world_id: self.cfg.id.clone(),
        }
    }

    /// The catalog handshake: exactly seven single-part messages, in a fixed
    /// order, each with a stable digest.
    pub(crate) fn build_catalog_msgs(&self) -> Vec<CatalogMsg> {
        let one = |name: &str, digest: &str, data: serde_json::Value| CatalogMsg {
            msg_type: TYPE_CATALOG.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            name: name.to_string(),
            digest: digest.to_string(),
            part: 1,
            total_parts: 1,
            data,
        };

        let recipes: Vec<_> = self.catalogs.recipes.by_id.values().collect();
        let blueprints: Vec<_> = self.catalogs.blueprints.by_id.values().collect();
        let law_templates: Vec<_> = self.catalogs.laws.by_id.values().collect();
        let events: Vec<_> = self.catalogs.events.by_id.values().collect();

        vec![
            one(
                "block_palette",
                &self.catalogs.blocks.palette_digest,
                json!(self.catalogs.blocks.palette),
            ),
            one(
                "item_palette",
                &self.catalogs.items.palette_digest,
                json!(self.catalogs.items.palette),
            ),
            one("tuning", &self.tuning_digest, tuning_value(&self.cfg)),
            one("recipes", &self.catalogs.recipes.digest, json!(recipes)),
            one(
                "blueprints",
                &self.catalogs.blueprints.digest,
                json!(blueprints),
            ),
            one(
                "law_templates",
                &self.catalogs.laws.digest,
                json!({"templates": law_templates}),
            ),
            one("events", &self.catalogs.events.digest, json!(events)),
        ]
    }

    pub(crate) fn join_agent(
        &mut self,
        name: &str,
        delta_voxels: bool,
        out: Option<OutboundChannel>,
    ) -> JoinResponse {
        let name = normalize_agent_name(name);
        let now_tick = self.tick;

        let agent_id = self.next_agent_id();
        let id_num = self.counters.agent;

        // Deterministic spawn from the agent index, nudged to an air column.
        let spawn_xz = (id_num as i32) * 2;
        let (x, z) = self.chunks.find_spawn(spawn_xz, -spawn_xz, 8);
        let y = self.chunks.surface_y(x, z);

        let mut agent = Agent::new(agent_id.clone(), name, self.cfg.id.clone());
        agent.pos = Vec3i::new(x, y, z);

        // Starter items, iterated in sorted key order for determinism.
        for (item, &n) in &self.cfg.starter_items {
            inventory::add(&mut agent.inventory, item, n);
        }

        let token = new_resume_token(&self.cfg.id);
        agent.resume_token = token.clone();

        let spawn_pos = agent.pos;
        self.agents.insert(agent_id.clone(), agent);
        self.fun_on_biome(&agent_id, spawn_pos, now_tick);
        self.enqueue_active_event_for_agent(now_tick, &agent_id);

        if let Some(out) = out {
            self.clients.insert(
                agent_id.clone(),
                ClientState {
                    out,
                    delta_voxels,
                    last_voxels: Vec::new(),
                },
            );
        }

        JoinResponse {
            welcome: self.build_welcome(&agent_id, &token),
            catalogs: self.build_catalog_msgs(),
        }
    }

    /// Re-binds a disconnected agent by resume token, rotating the token.
    /// Unknown tokens get an empty response.
    pub(crate) fn handle_attach(&mut self, req: AttachRequest) {
        let token = req.resume_token.trim().to_string();
        let resp = if token.is_empty() || req.out.is_none() {
            JoinResponse::default()
        } else {
            let found = self
                .agents
                .values()
                .find(|a| a.resume_token == token)
                .map(|a| a.id.clone());
            match found {
                None => JoinResponse::default(),
                Some(agent_id) => {
                    let new_token = new_resume_token(&self.cfg.id);
                    if let Some(a) = self.agents.get_mut(&agent_id) {
                        a.resume_token = new_token.clone();
                        a.current_world_id = self.cfg.id.clone();
                    }
                    if let Some(out) = req.out {
                        self.clients.insert(
                            agent_id.clone(),
                            ClientState {
                                out,
                                delta_voxels: req.delta_voxels,
                                last_voxels: Vec::new(),
                            },
                        );
                    }
                    let now_tick = self.tick;
                    self.enqueue_active_event_for_agent(now_tick, &agent_id);
                    JoinResponse {
                        welcome: self.build_welcome(&agent_id, &new_token),
                        catalogs: self.build_catalog_msgs(),
                    }
                }
            }
        };
        if let Some(reply) = req.resp {
            let _ = reply.send(resp);
        }
    }

    pub(crate) fn enqueue_active_event_for_agent(&mut self, now_tick: u64, agent_id: &str) {
        if self.active_event_id.is_empty() || now_tick >= self.active_event_ends {
            return;
        }
        let ev = json!({
            "t": now_tick,
            "type": "WORLD_EVENT",
            "event_id": self.active_event_id,
            "ends_tick": self.active_event_ends,
            "center": self.active_event_center.to_array(),
            "radius": self.active_event_radius,
        });
        self.push_event(agent_id, ev);
    }
}
