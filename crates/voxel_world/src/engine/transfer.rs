//! Cross-world agent transfer: uproot on the source, install on the
//! destination, org snapshot reconciliation in between.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use crate::engine::agent::Agent;
use crate::engine::fun::FunScore;
use crate::engine::inventory::Inventory;
use crate::engine::orgs::{OrgKind, OrgRole, Organization};
use crate::engine::requests::{
    TransferInRequest, TransferInResponse, TransferOutRequest, TransferOutResponse,
};
use crate::engine::world::{ClientState, World};
use crate::geometry::Vec3i;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTransfer {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub org_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<OrgTransfer>,

    pub from_world_id: String,

    pub pos: Vec3i,
    pub yaw: i32,
    pub hp: i64,
    pub hunger: i64,
    pub stamina_milli: i64,
    #[serde(default)]
    pub fun: FunScore,
    pub inventory: Inventory,
}

/// Snapshot of the agent's org at transfer time, reconciled on arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgTransfer {
    pub org_id: String,
    pub kind: OrgKind,
    pub name: String,
    pub created_tick: u64,
    pub members: BTreeMap<String, OrgRole>,
}

pub(crate) fn parse_uint_after_prefix(prefix: &str, id: &str) -> Option<u64> {
    id.strip_prefix(prefix)?.parse().ok()
}

impl World {
    pub(crate) fn handle_transfer_out(&mut self, req: TransferOutRequest) {
        let mut resp = TransferOutResponse::default();

        match self.agents.get_mut(&req.agent_id) {
            None => resp.err = "agent not found".to_string(),
            Some(a) => {
                // Tasks do not survive a world switch.
                a.move_task = None;
                a.work_task = None;

                let mut inv = Inventory::new();
                for (item, &n) in &a.inventory {
                    if !item.is_empty() && n > 0 {
                        inv.insert(item.clone(), n);
                    }
                }
                resp.transfer = Some(AgentTransfer {
                    id: a.id.clone(),
                    name: a.name.clone(),
                    org_id: a.org_id.clone(),
                    org: None,
                    from_world_id: self.cfg.id.clone(),
                    pos: a.pos,
                    yaw: a.yaw,
                    hp: a.hp,
                    hunger: a.hunger,
                    stamina_milli: a.stamina_milli,
                    fun: a.fun,
                    inventory: inv,
                });
            }
        }

        if let Some(transfer) = resp.transfer.as_mut() {
            if !transfer.org_id.is_empty() {
                if let Some(org) = self.orgs.get(&transfer.org_id) {
                    transfer.org = Some(OrgTransfer {
                        org_id: org.org_id.clone(),
                        kind: org.kind,
                        name: org.name.clone(),
                        created_tick: org.created_tick,
                        members: org.members.clone(),
                    });
                }
            }

            let agent_id = transfer.id.clone();
            self.clients.remove(&agent_id);
            self.agents.remove(&agent_id);

            // Open trades referencing the leaving agent are void.
            let stale: Vec<String> = self
                .trades
                .values()
                .filter(|t| t.from == agent_id || t.to == agent_id)
                .map(|t| t.trade_id.clone())
                .collect();
            for id in stale {
                self.trades.remove(&id);
            }
        }

        if let Some(reply) = req.resp {
            let _ = reply.send(resp);
        }
    }

    pub(crate) fn handle_transfer_in(&mut self, req: TransferInRequest) {
        let mut resp = TransferInResponse::default();
        let t = req.transfer;

        if t.id.is_empty() {
            resp.err = "missing agent id".to_string();
        } else if self.agents.contains_key(&t.id) {
            resp.err = "agent already present".to_string();
        } else {
            let mut a = Agent::new(t.id.clone(), t.name.clone(), self.cfg.id.clone());
            a.org_id = t.org_id.clone();
            a.pos = t.pos;
            a.yaw = t.yaw;
            a.hp = t.hp.clamp(0, 20);
            a.hunger = t.hunger.clamp(0, 10);
            a.stamina_milli = t.stamina_milli.clamp(0, 1000);
            a.fun = t.fun;
            for (item, &n) in &t.inventory {
                if !item.is_empty() && n > 0 {
                    a.inventory.insert(item.clone(), n);
                }
            }
            if a.org_id.is_empty() {
                if let Some(org) = &t.org {
                    a.org_id = org.org_id.clone();
                }
            }
            if !self.chunks.in_bounds(a.pos) {
                let (x, z) = self.chunks.find_spawn(0, 0, 8);
                a.pos = Vec3i::new(x, self.chunks.surface_y(x, z), z);
            }

            let agent_id = a.id.clone();
            let org_id = a.org_id.clone();
            self.agents.insert(agent_id.clone(), a);

            // Keep the agent counter ahead of imported ids.
            if let Some(n) = parse_uint_after_prefix("A", &agent_id) {
                if n > self.counters.agent {
                    self.counters.agent = n;
                }
            }

            if !org_id.is_empty() {
                self.reconcile_transfer_org(&agent_id, &org_id, t.org.as_ref());
            }

            if !t.from_world_id.is_empty() {
                let now_tick = self.tick;
                let ev = json!({
                    "t": now_tick,
                    "type": "WORLD_SWITCH",
                    "from": t.from_world_id,
                    "to": self.cfg.id,
                    "agent_id": agent_id,
                    "world_id": self.cfg.id,
                });
                self.push_event(&agent_id, ev);
            }

            if let Some(out) = req.out {
                self.clients.insert(
                    agent_id,
                    ClientState {
                        out,
                        delta_voxels: req.delta_voxels,
                        last_voxels: Vec::new(),
                    },
                );
            }
        }

        if let Some(reply) = req.resp {
            let _ = reply.send(resp);
        }
    }

    /// Installs or merges the carried org snapshot: same org id is preserved
    /// when absent here; an existing org merges membership instead.
    fn reconcile_transfer_org(
        &mut self,
        agent_id: &str,
        org_id: &str,
        snapshot: Option<&OrgTransfer>,
    ) {
        if !self.orgs.contains_key(org_id) {
            let org = match snapshot {
                Some(s) => Organization {
                    org_id: s.org_id.clone(),
                    kind: s.kind,
                    name: s.name.clone(),
                    created_tick: s.created_tick,
                    members: s
                        .members
                        .iter()
                        .filter(|(id, _)| !id.is_empty())
                        .map(|(id, role)| (id.clone(), *role))
                        .collect(),
                    treasury: Inventory::new(),
                },
                None => Organization {
                    org_id: org_id.to_string(),
                    kind: OrgKind::Guild,
                    name: org_id.to_string(),
                    created_tick: self.tick,
                    members: BTreeMap::new(),
                    treasury: Inventory::new(),
                },
            };
            self.orgs.insert(org_id.to_string(), org);
            // Keep the counter ahead of imported ids.
            if let Some(n) = parse_uint_after_prefix("O", org_id) {
                if n > self.counters.org {
                    self.counters.org = n;
                }
            }
        } else if let (Some(s), Some(org)) = (snapshot, self.orgs.get_mut(org_id)) {
            for (id, role) in &s.members {
                if !id.is_empty() {
                    org.members.entry(id.clone()).or_insert(*role);
                }
            }
        }
        if let Some(org) = self.orgs.get_mut(org_id) {
            org.members
                .entry(agent_id.to_string())
                .or_insert(OrgRole::Member);
        }
    }
}
