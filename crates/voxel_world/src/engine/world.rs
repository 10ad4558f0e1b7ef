//! The authoritative world state and the per-tick step.
//!
//! All state is owned by one `World` value and mutated only by the tick loop
//! thread (or directly by tests via `step_once`). Every collection is a
//! sorted map, so iteration order is deterministic without explicit sorting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::mpsc::SyncSender;
use std::sync::Arc;

use voxel_world_proto::Event;

use crate::catalogs::Catalogs;
use crate::engine::agent::Agent;
use crate::engine::audit::{AuditEntry, AuditSink};
use crate::engine::chunkstore::{biome_at, ChunkStore, WorldGen};
use crate::engine::claims::{curfew_blocks, resolve_permissions, LandClaim, Permissions};
use crate::engine::config::WorldConfig;
use crate::engine::container::Container;
use crate::engine::events::action_result;
use crate::engine::fun::Structure;
use crate::engine::items::ItemEntity;
use crate::engine::laws::Law;
use crate::engine::orgs::Organization;
use crate::engine::requests::{
    ActionEnvelope, JoinRequest, OutboundChannel, TransferInRequest, TransferOutRequest,
};
use crate::engine::signs::{Board, Sign};
use crate::engine::snapshot::SnapshotV1;
use crate::engine::trades::Trade;
use crate::geometry::{manhattan, Vec3i};

pub struct ClientState {
    pub out: OutboundChannel,
    pub delta_voxels: bool,
    pub last_voxels: Vec<u16>,
}

/// Monotonic id counters, snapshot together with the entities they number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Counters {
    pub agent: u64,
    pub task: u64,
    pub land: u64,
    pub trade: u64,
    pub post: u64,
    pub law: u64,
    pub org: u64,
    pub item: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    BadConfig(String),
    BadCatalogs(String),
}

impl std::fmt::Display for WorldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorldError::BadConfig(msg) => write!(f, "bad config: {msg}"),
            WorldError::BadCatalogs(msg) => write!(f, "bad catalogs: {msg}"),
        }
    }
}

impl std::error::Error for WorldError {}

/// Single-owner authoritative simulation. All access happens on the loop
/// thread; the request channels are the only way in.
pub struct World {
    pub(crate) cfg: WorldConfig,
    pub(crate) catalogs: Arc<Catalogs>,
    pub(crate) tick: u64,

    pub(crate) chunks: ChunkStore,

    pub(crate) agents: BTreeMap<String, Agent>,
    pub(crate) clients: BTreeMap<String, ClientState>,

    pub(crate) claims: BTreeMap<String, LandClaim>,
    pub(crate) containers: BTreeMap<Vec3i, Container>,
    pub(crate) items: BTreeMap<String, ItemEntity>,
    /// pos -> entity ids at that position, in insertion order.
    pub(crate) items_at: BTreeMap<Vec3i, Vec<String>>,
    pub(crate) trades: BTreeMap<String, Trade>,
    pub(crate) boards: BTreeMap<Vec3i, Board>,
    pub(crate) signs: BTreeMap<Vec3i, Sign>,
    pub(crate) laws: BTreeMap<String, Law>,
    pub(crate) orgs: BTreeMap<String, Organization>,
    pub(crate) structures: BTreeMap<String, Structure>,

    // Director state.
    pub(crate) weather: String,
    pub(crate) weather_until_tick: u64,
    pub(crate) active_event_id: String,
    pub(crate) active_event_start: u64,
    pub(crate) active_event_ends: u64,
    pub(crate) active_event_center: Vec3i,
    pub(crate) active_event_radius: i32,

    pub(crate) counters: Counters,
    pub(crate) tuning_digest: String,

    pub(crate) audit: Option<Box<dyn AuditSink + Send>>,
    /// Off-thread snapshot sink; a full sink drops the snapshot.
    pub(crate) snapshot_sink: Option<SyncSender<SnapshotV1>>,
}

impl World {
    pub fn new(
        cfg: WorldConfig,
        catalogs: Arc<Catalogs>,
        audit: Option<Box<dyn AuditSink + Send>>,
    ) -> Result<Self, WorldError> {
        let cfg = cfg.sanitized();
        if cfg.id.is_empty() {
            return Err(WorldError::BadConfig("missing world id".to_string()));
        }
        match catalogs.block_id("AIR") {
            Some(0) => {}
            _ => {
                return Err(WorldError::BadCatalogs(
                    "block palette must start with AIR".to_string(),
                ))
            }
        }

        let gen = WorldGen::from_catalogs(cfg.seed, cfg.boundary_r, cfg.height, &catalogs);
        let tuning_digest = crate::engine::session::tuning_digest(&cfg);

        Ok(Self {
            cfg,
            catalogs,
            tick: 0,
            chunks: ChunkStore::new(gen),
            agents: BTreeMap::new(),
            clients: BTreeMap::new(),
            claims: BTreeMap::new(),
            containers: BTreeMap::new(),
            items: BTreeMap::new(),
            items_at: BTreeMap::new(),
            trades: BTreeMap::new(),
            boards: BTreeMap::new(),
            signs: BTreeMap::new(),
            laws: BTreeMap::new(),
            orgs: BTreeMap::new(),
            structures: BTreeMap::new(),
            weather: "CLEAR".to_string(),
            weather_until_tick: 0,
            active_event_id: String::new(),
            active_event_start: 0,
            active_event_ends: 0,
            active_event_center: Vec3i::default(),
            active_event_radius: 0,
            counters: Counters::default(),
            tuning_digest,
            audit,
            snapshot_sink: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.cfg.id
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &WorldConfig {
        &self.cfg
    }

    pub fn catalogs(&self) -> &Catalogs {
        &self.catalogs
    }

    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn agent_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    pub fn claim(&self, land_id: &str) -> Option<&LandClaim> {
        self.claims.get(land_id)
    }

    pub fn org(&self, org_id: &str) -> Option<&Organization> {
        self.orgs.get(org_id)
    }

    pub fn set_snapshot_sink(&mut self, sink: SyncSender<SnapshotV1>) {
        self.snapshot_sink = Some(sink);
    }

    // ------------------------------------------------------------------
    // Identity counters
    // ------------------------------------------------------------------

    pub(crate) fn next_agent_id(&mut self) -> String {
        self.counters.agent += 1;
        format!("A{:04}", self.counters.agent)
    }

    pub(crate) fn next_task_id(&mut self) -> String {
        self.counters.task += 1;
        format!("T{:06}", self.counters.task)
    }

    pub(crate) fn next_land_id(&mut self, owner: &str) -> String {
        self.counters.land += 1;
        format!("LAND_{}_{:03}", owner, self.counters.land)
    }

    pub(crate) fn next_trade_id(&mut self) -> String {
        self.counters.trade += 1;
        format!("TR{:06}", self.counters.trade)
    }

    pub(crate) fn next_post_id(&mut self) -> String {
        self.counters.post += 1;
        format!("P{:06}", self.counters.post)
    }

    pub(crate) fn next_law_id(&mut self) -> String {
        self.counters.law += 1;
        format!("LAW{:06}", self.counters.law)
    }

    pub(crate) fn next_org_id(&mut self) -> String {
        self.counters.org += 1;
        format!("O{:04}", self.counters.org)
    }

    pub(crate) fn next_item_entity_id(&mut self) -> String {
        self.counters.item += 1;
        format!("IT{:06}", self.counters.item)
    }

    // ------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------

    /// Fraction of the in-game day in [0, 1).
    pub fn time_of_day(&self, now_tick: u64) -> f64 {
        let day = self.cfg.day_ticks.max(1);
        (now_tick % day) as f64 / day as f64
    }

    pub(crate) fn season_day(&self, now_tick: u64) -> i64 {
        let day = self.cfg.day_ticks.max(1);
        let season_days = (self.cfg.season_length_ticks / day).max(1);
        ((now_tick / day) % season_days) as i64
    }

    // ------------------------------------------------------------------
    // Claims and permissions
    // ------------------------------------------------------------------

    /// The claim containing `pos`; with overlap, the lowest land id wins.
    pub fn land_at(&self, pos: Vec3i) -> Option<&LandClaim> {
        self.claims.values().find(|c| c.contains(pos))
    }

    pub(crate) fn land_id_at(&self, pos: Vec3i) -> Option<String> {
        self.land_at(pos).map(|c| c.land_id.clone())
    }

    pub(crate) fn is_org_member(&self, agent_id: &str, org_id: &str) -> bool {
        self.orgs
            .get(org_id)
            .is_some_and(|o| o.is_member(agent_id))
    }

    pub(crate) fn is_org_admin(&self, agent_id: &str, org_id: &str) -> bool {
        self.orgs.get(org_id).is_some_and(|o| o.is_admin(agent_id))
    }

    /// Owner, explicit member, or member of an owning org.
    pub(crate) fn is_land_member(&self, agent_id: &str, land: &LandClaim) -> bool {
        if land.owner == agent_id {
            return true;
        }
        if land.members.get(agent_id).copied().unwrap_or(false) {
            return true;
        }
        self.is_org_member(agent_id, &land.owner)
    }

    /// Owner, or admin of an owning org.
    pub(crate) fn is_land_admin(&self, agent_id: &str, land: &LandClaim) -> bool {
        land.owner == agent_id || self.is_org_admin(agent_id, &land.owner)
    }

    pub fn permissions_for(&self, agent_id: &str, pos: Vec3i) -> (Option<&LandClaim>, Permissions) {
        let land = self.land_at(pos);
        let perms = resolve_permissions(land, |c| self.is_land_member(agent_id, c));
        (land, perms)
    }

    pub fn can_build_at(&self, agent_id: &str, pos: Vec3i, now_tick: u64) -> bool {
        let (land, perms) = self.permissions_for(agent_id, pos);
        if !perms.can_build {
            return false;
        }
        match land {
            Some(land) if !self.is_land_member(agent_id, land) => {
                !curfew_blocks(land, self.time_of_day(now_tick))
            }
            _ => true,
        }
    }

    pub fn can_break_at(&self, agent_id: &str, pos: Vec3i, now_tick: u64) -> bool {
        let (land, perms) = self.permissions_for(agent_id, pos);
        if !perms.can_break {
            return false;
        }
        match land {
            Some(land) if !self.is_land_member(agent_id, land) => {
                !curfew_blocks(land, self.time_of_day(now_tick))
            }
            _ => true,
        }
    }

    /// Withdrawals are open in the wild; inside a claim they require
    /// membership unless the claim has degraded to unprotected.
    pub fn can_withdraw_from_container(&self, agent_id: &str, pos: Vec3i) -> bool {
        match self.land_at(pos) {
            None => true,
            Some(land) => land.maintenance_stage >= 2 || self.is_land_member(agent_id, land),
        }
    }

    pub(crate) fn can_pickup_item_entity(&self, agent_id: &str, pos: Vec3i) -> bool {
        self.can_withdraw_from_container(agent_id, pos)
    }

    /// Core disc of a claim, capped by the claim radius.
    pub(crate) fn land_core_radius(&self, land: &LandClaim) -> i32 {
        self.cfg.access_pass_core_radius.min(land.radius).max(0)
    }

    pub(crate) fn land_core_contains(&self, land: &LandClaim, pos: Vec3i) -> bool {
        let r = self.land_core_radius(land);
        r > 0 && crate::geometry::manhattan_xz(pos, land.anchor) <= r
    }

    // ------------------------------------------------------------------
    // Events, audit, chat
    // ------------------------------------------------------------------

    pub(crate) fn push_event(&mut self, agent_id: &str, ev: Event) {
        if let Some(a) = self.agents.get_mut(agent_id) {
            a.add_event(ev);
        }
    }

    pub(crate) fn push_action_result(
        &mut self,
        agent_id: &str,
        now_tick: u64,
        ref_id: &str,
        ok: bool,
        code: &str,
        message: &str,
    ) {
        self.push_event(agent_id, action_result(now_tick, ref_id, ok, code, message));
    }

    pub(crate) fn audit_event(
        &mut self,
        now_tick: u64,
        actor: &str,
        action: &str,
        pos: Vec3i,
        reason: &str,
        details: serde_json::Value,
    ) {
        if let Some(sink) = self.audit.as_mut() {
            sink.write_audit(AuditEntry::new(now_tick, actor, action, pos, reason, details));
        }
    }

    pub(crate) fn audit_set_block(
        &mut self,
        now_tick: u64,
        actor: &str,
        pos: Vec3i,
        from: u16,
        to: u16,
        reason: &str,
    ) {
        let from_name = self.catalogs.block_name(from).to_string();
        let to_name = self.catalogs.block_name(to).to_string();
        self.audit_event(
            now_tick,
            actor,
            "SET_BLOCK",
            pos,
            reason,
            serde_json::json!({"from": from_name, "to": to_name}),
        );
    }

    /// Chat fan-out. LOCAL uses an ear radius; CITY/ORG route by org
    /// membership; MARKET and WHISPER are filtered by the caller.
    pub(crate) fn broadcast_chat(
        &mut self,
        now_tick: u64,
        from_id: &str,
        channel: &str,
        text: &str,
    ) {
        let Some(from) = self.agents.get(from_id) else {
            return;
        };
        let from_pos = from.pos;
        let from_org = from.org_id.clone();
        let ev = serde_json::json!({
            "t": now_tick,
            "type": "CHAT",
            "from": from_id,
            "channel": channel,
            "text": text,
        });

        let recipients: Vec<String> = self
            .agents
            .values()
            .filter(|a| match channel {
                "LOCAL" => manhattan(a.pos, from_pos) <= 32,
                "CITY" => {
                    !from_org.is_empty()
                        && self
                            .orgs
                            .get(&from_org)
                            .is_some_and(|o| {
                                o.kind == crate::engine::orgs::OrgKind::City && o.is_member(&a.id)
                            })
                }
                "ORG" => !from_org.is_empty() && self.is_org_member(&a.id, &from_org),
                _ => true,
            })
            .map(|a| a.id.clone())
            .collect();
        for id in recipients {
            self.push_event(&id, ev.clone());
        }
    }

    /// True when a block named `name` lies within Manhattan `dist` of `pos`
    /// (searched in a small vertical band around the position).
    pub(crate) fn near_block(&mut self, pos: Vec3i, name: &str, dist: i32) -> bool {
        let Some(want) = self.catalogs.block_id(name) else {
            return false;
        };
        for dy in -1..=1 {
            for dz in -dist..=dist {
                for dx in -dist..=dist {
                    if dx.abs() + dz.abs() > dist {
                        continue;
                    }
                    let p = Vec3i::new(pos.x + dx, pos.y + dy, pos.z + dz);
                    if self.chunks.get_block(p) == want {
                        return true;
                    }
                }
            }
        }
        false
    }

    pub(crate) fn biome_at_pos(&self, pos: Vec3i) -> &'static str {
        biome_at(self.cfg.seed, pos.x, pos.z, self.chunks.gen.biome_region_size)
    }

    pub(crate) fn sorted_agent_ids(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub(crate) fn follow_target_pos(&self, target_id: &str) -> Option<Vec3i> {
        self.agents.get(target_id).map(|a| a.pos)
    }

    // ------------------------------------------------------------------
    // Step
    // ------------------------------------------------------------------

    /// Advances the world by a single tick with the same ordering semantics
    /// as the runtime loop. Returns the tick that was processed and the
    /// state digest after it. Intended for tests and deterministic replays.
    pub fn step_once(
        &mut self,
        joins: Vec<JoinRequest>,
        leaves: Vec<String>,
        actions: Vec<ActionEnvelope>,
    ) -> (u64, String) {
        let tick = self.tick;
        self.step_internal(Vec::new(), Vec::new(), joins, leaves, actions);
        (tick, self.state_digest(tick))
    }

    pub(crate) fn step_internal(
        &mut self,
        transfer_outs: Vec<TransferOutRequest>,
        transfer_ins: Vec<TransferInRequest>,
        joins: Vec<JoinRequest>,
        leaves: Vec<String>,
        actions: Vec<ActionEnvelope>,
    ) {
        let now_tick = self.tick;

        // Boundary requests, in fixed priority order.
        for req in transfer_outs {
            self.handle_transfer_out(req);
        }
        for req in transfer_ins {
            self.handle_transfer_in(req);
        }
        for id in leaves {
            self.clients.remove(&id);
        }
        for req in joins {
            let resp = self.join_agent(&req.name, req.delta_voxels, req.out);
            if let Some(reply) = req.resp {
                let _ = reply.send(resp);
            }
        }

        // Systems observe the state left by earlier ones; the order is fixed.
        self.system_environment(now_tick);
        self.apply_actions(now_tick, actions);
        self.system_movement(now_tick);
        self.system_work(now_tick);
        self.tick_laws(now_tick);
        self.expire_trades(now_tick);
        self.cleanup_expired_item_entities(now_tick);
        self.system_fun(now_tick);
        self.system_director(now_tick);

        self.dispatch_observations(now_tick);
        self.maybe_snapshot(now_tick);

        self.tick += 1;
    }

    fn apply_actions(&mut self, now_tick: u64, actions: Vec<ActionEnvelope>) {
        // Group envelopes by agent id; application order is agent-id
        // ascending, envelopes for one agent in arrival order.
        let mut grouped: BTreeMap<String, Vec<ActionEnvelope>> = BTreeMap::new();
        for env in actions {
            if !self.agents.contains_key(&env.agent_id) {
                continue;
            }
            grouped.entry(env.agent_id.clone()).or_default().push(env);
        }
        for (agent_id, envs) in grouped {
            for mut env in envs {
                env.act.agent_id = agent_id.clone(); // trust session identity
                self.apply_act(&agent_id, env.act, now_tick);
            }
        }
    }

    fn apply_act(&mut self, agent_id: &str, act: voxel_world_proto::ActMsg, now_tick: u64) {
        // Staleness: accept only [now-2, now].
        if act.tick + 2 < now_tick || act.tick > now_tick {
            self.push_action_result(
                agent_id,
                now_tick,
                "ACT",
                false,
                voxel_world_proto::E_BAD_REQUEST,
                "act tick out of range",
            );
            return;
        }

        for cancel_id in &act.cancel {
            self.cancel_task(agent_id, cancel_id, now_tick);
        }
        for inst in &act.instants {
            self.apply_instant(agent_id, inst, now_tick);
        }
        for tr in &act.tasks {
            self.apply_task_req(agent_id, tr, now_tick);
        }
    }

    fn cancel_task(&mut self, agent_id: &str, task_id: &str, now_tick: u64) {
        let Some(a) = self.agents.get_mut(agent_id) else {
            return;
        };
        if a.move_task.as_ref().is_some_and(|t| t.task_id == task_id) {
            a.move_task = None;
            self.push_action_result(agent_id, now_tick, task_id, true, "", "canceled");
            return;
        }
        if a.work_task.as_ref().is_some_and(|t| t.task_id == task_id) {
            a.work_task = None;
            self.push_action_result(agent_id, now_tick, task_id, true, "", "canceled");
            return;
        }
        self.push_action_result(
            agent_id,
            now_tick,
            task_id,
            false,
            voxel_world_proto::E_INVALID_TARGET,
            "task not found",
        );
    }

    /// Removes trades whose parties are no longer present.
    fn expire_trades(&mut self, _now_tick: u64) {
        let stale: Vec<String> = self
            .trades
            .values()
            .filter(|t| !self.agents.contains_key(&t.from) || !self.agents.contains_key(&t.to))
            .map(|t| t.trade_id.clone())
            .collect();
        for id in stale {
            self.trades.remove(&id);
        }
    }

    fn maybe_snapshot(&mut self, now_tick: u64) {
        let every = self.cfg.snapshot_every_ticks;
        if now_tick == 0 || every == 0 || now_tick % every != 0 {
            return;
        }
        if self.snapshot_sink.is_some() {
            let snap = self.export_snapshot(now_tick);
            if let Some(sink) = self.snapshot_sink.as_ref() {
                let _ = sink.try_send(snap);
            }
        }
    }
}
