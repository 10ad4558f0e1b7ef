//! Governance instants: organizations, claim administration, law proposals
//! and votes.

use serde_json::json;
use std::collections::BTreeMap;

use voxel_world_proto::{
    InstantReq, E_BAD_REQUEST, E_CONFLICT, E_INVALID_TARGET, E_NO_PERMISSION, E_NO_RESOURCE,
};

use crate::engine::events::action_result;
use crate::engine::inventory::{self, Inventory};
use crate::engine::laws::{normalize_vote_choice, Law, LawStatus};
use crate::engine::orgs::{OrgKind, OrgRole, Organization};
use crate::engine::world::World;

impl World {
    // ------------------------------------------------------------------
    // Organizations
    // ------------------------------------------------------------------

    pub(crate) fn instant_create_org(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        let Some(kind) = OrgKind::parse(&inst.org_kind) else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "bad org_kind",
            );
            return;
        };
        let name = inst.org_name.trim().to_string();
        if name.is_empty() || name.len() > 40 {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "bad org_name",
            );
            return;
        }
        let (pos, in_org) = match self.agents.get(agent_id) {
            Some(a) => (a.pos, !a.org_id.is_empty()),
            None => return,
        };
        if in_org {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_CONFLICT, "already in org",
            );
            return;
        }
        let org_id = self.next_org_id();
        self.orgs.insert(
            org_id.clone(),
            Organization {
                org_id: org_id.clone(),
                kind,
                name: name.clone(),
                created_tick: now_tick,
                members: BTreeMap::from([(agent_id.to_string(), OrgRole::Leader)]),
                treasury: Inventory::new(),
            },
        );
        if let Some(a) = self.agents.get_mut(agent_id) {
            a.org_id = org_id.clone();
        }
        self.audit_event(
            now_tick,
            agent_id,
            "ORG_CREATE",
            pos,
            "CREATE_ORG",
            json!({"org_id": org_id, "org_kind": kind.as_str(), "org_name": name, "leader": agent_id}),
        );
        let mut ev = action_result(now_tick, &inst.id, true, "", "");
        if let Some(obj) = ev.as_object_mut() {
            obj.insert("org_id".to_string(), json!(org_id));
        }
        self.push_event(agent_id, ev);
    }

    pub(crate) fn instant_join_org(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        if inst.org_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing org_id",
            );
            return;
        }
        if !self.orgs.contains_key(&inst.org_id) {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "org not found",
            );
            return;
        }
        let (pos, in_org) = match self.agents.get(agent_id) {
            Some(a) => (a.pos, !a.org_id.is_empty()),
            None => return,
        };
        if in_org {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_CONFLICT, "already in org",
            );
            return;
        }
        let kind = match self.orgs.get_mut(&inst.org_id) {
            Some(org) => {
                org.members.insert(agent_id.to_string(), OrgRole::Member);
                org.kind
            }
            None => return,
        };
        if let Some(a) = self.agents.get_mut(agent_id) {
            a.org_id = inst.org_id.clone();
        }
        self.audit_event(
            now_tick,
            agent_id,
            "ORG_JOIN",
            pos,
            "JOIN_ORG",
            json!({"org_id": inst.org_id, "member": agent_id, "org_kind": kind.as_str()}),
        );
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok");
    }

    pub(crate) fn instant_leave_org(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        let org_id = match self.agents.get(agent_id) {
            Some(a) => a.org_id.clone(),
            None => return,
        };
        if org_id.is_empty() {
            self.push_action_result(agent_id, now_tick, &inst.id, false, E_CONFLICT, "not in org");
            return;
        }
        if let Some(a) = self.agents.get_mut(agent_id) {
            a.org_id = String::new();
        }
        let now_empty = match self.orgs.get_mut(&org_id) {
            Some(org) => org.remove_member(agent_id),
            None => false,
        };
        if now_empty {
            // Orgs are destroyed when the last member leaves. Claims they
            // owned keep the org id and degrade through maintenance.
            self.orgs.remove(&org_id);
        }
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok");
    }

    pub(crate) fn instant_org_deposit(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        if inst.org_id.is_empty() || inst.item_id.is_empty() || inst.count <= 0 {
            self.push_action_result(
                agent_id,
                now_tick,
                &inst.id,
                false,
                E_BAD_REQUEST,
                "missing org_id/item_id/count",
            );
            return;
        }
        if !self.orgs.contains_key(&inst.org_id) {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "org not found",
            );
            return;
        }
        if !self.is_org_member(agent_id, &inst.org_id) {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_NO_PERMISSION, "not org member",
            );
            return;
        }
        let pos = {
            let Some(a) = self.agents.get_mut(agent_id) else {
                return;
            };
            if inventory::count(&a.inventory, &inst.item_id) < inst.count {
                self.push_action_result(
                    agent_id, now_tick, &inst.id, false, E_NO_RESOURCE, "missing items",
                );
                return;
            }
            inventory::take(&mut a.inventory, &inst.item_id, inst.count);
            a.pos
        };
        if let Some(org) = self.orgs.get_mut(&inst.org_id) {
            inventory::add(&mut org.treasury, &inst.item_id, inst.count);
        }
        self.audit_event(
            now_tick,
            agent_id,
            "ORG_DEPOSIT",
            pos,
            "ORG_DEPOSIT",
            json!({"org_id": inst.org_id, "item": inst.item_id, "count": inst.count}),
        );
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok");
    }

    pub(crate) fn instant_org_withdraw(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        if inst.org_id.is_empty() || inst.item_id.is_empty() || inst.count <= 0 {
            self.push_action_result(
                agent_id,
                now_tick,
                &inst.id,
                false,
                E_BAD_REQUEST,
                "missing org_id/item_id/count",
            );
            return;
        }
        if !self.orgs.contains_key(&inst.org_id) {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "org not found",
            );
            return;
        }
        if !self.is_org_admin(agent_id, &inst.org_id) {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_NO_PERMISSION, "not org admin",
            );
            return;
        }
        let withdrawn = match self.orgs.get_mut(&inst.org_id) {
            Some(org) => {
                if inventory::count(&org.treasury, &inst.item_id) < inst.count {
                    self.push_action_result(
                        agent_id, now_tick, &inst.id, false, E_NO_RESOURCE, "treasury lacks items",
                    );
                    return;
                }
                inventory::take(&mut org.treasury, &inst.item_id, inst.count)
            }
            None => return,
        };
        let pos = match self.agents.get_mut(agent_id) {
            Some(a) => {
                inventory::add(&mut a.inventory, &inst.item_id, withdrawn);
                a.pos
            }
            None => return,
        };
        self.audit_event(
            now_tick,
            agent_id,
            "ORG_WITHDRAW",
            pos,
            "ORG_WITHDRAW",
            json!({"org_id": inst.org_id, "item": inst.item_id, "count": inst.count}),
        );
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok");
    }

    // ------------------------------------------------------------------
    // Claim administration
    // ------------------------------------------------------------------

    fn land_admin_gate(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) -> bool {
        let Some(land) = self.claims.get(&inst.land_id) else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "land not found",
            );
            return false;
        };
        if !self.is_land_admin(agent_id, land) {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_NO_PERMISSION, "not land admin",
            );
            return false;
        }
        true
    }

    pub(crate) fn instant_set_permissions(
        &mut self,
        agent_id: &str,
        inst: &InstantReq,
        now_tick: u64,
    ) {
        let Some(policy) = inst.policy.as_ref() else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing land_id/policy",
            );
            return;
        };
        if inst.land_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing land_id/policy",
            );
            return;
        }
        if !self.land_admin_gate(agent_id, inst, now_tick) {
            return;
        }
        let policy = policy.clone();
        if let Some(land) = self.claims.get_mut(&inst.land_id) {
            if let Some(&v) = policy.get("allow_build") {
                land.flags.allow_build = v;
            }
            if let Some(&v) = policy.get("allow_break") {
                land.flags.allow_break = v;
            }
            if let Some(&v) = policy.get("allow_damage") {
                land.flags.allow_damage = v;
            }
            if let Some(&v) = policy.get("allow_trade") {
                land.flags.allow_trade = v;
            }
        }
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok");
    }

    pub(crate) fn instant_add_member(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        if inst.land_id.is_empty() || inst.member_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing land_id/member_id",
            );
            return;
        }
        if !self.land_admin_gate(agent_id, inst, now_tick) {
            return;
        }
        if let Some(land) = self.claims.get_mut(&inst.land_id) {
            // The owner is never duplicated into the member set.
            if land.owner != inst.member_id {
                land.members.insert(inst.member_id.clone(), true);
            }
        }
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok");
    }

    pub(crate) fn instant_remove_member(
        &mut self,
        agent_id: &str,
        inst: &InstantReq,
        now_tick: u64,
    ) {
        if inst.land_id.is_empty() || inst.member_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing land_id/member_id",
            );
            return;
        }
        if !self.land_admin_gate(agent_id, inst, now_tick) {
            return;
        }
        if let Some(land) = self.claims.get_mut(&inst.land_id) {
            land.members.remove(&inst.member_id);
        }
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok");
    }

    pub(crate) fn instant_deed_land(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        if inst.land_id.is_empty() || inst.new_owner.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing land_id/new_owner",
            );
            return;
        }
        if !self.land_admin_gate(agent_id, inst, now_tick) {
            return;
        }
        let new_owner = inst.new_owner.trim().to_string();
        if !self.agents.contains_key(&new_owner) && !self.orgs.contains_key(&new_owner) {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "new owner not found",
            );
            return;
        }
        let anchor = match self.claims.get_mut(&inst.land_id) {
            Some(land) => {
                land.owner = new_owner.clone();
                land.members.remove(&new_owner);
                land.anchor
            }
            None => return,
        };
        self.audit_event(
            now_tick,
            agent_id,
            "CLAIM_DEED",
            anchor,
            "DEED_LAND",
            json!({"land_id": inst.land_id, "new_owner": new_owner}),
        );
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok");
    }

    // ------------------------------------------------------------------
    // Laws
    // ------------------------------------------------------------------

    pub(crate) fn instant_propose_law(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        if inst.land_id.is_empty() || inst.template_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing land_id/template_id",
            );
            return;
        }
        let Some(land) = self.claims.get(&inst.land_id) else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "land not found",
            );
            return;
        };
        if !self.is_land_member(agent_id, land) {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_NO_PERMISSION, "not eligible",
            );
            return;
        }
        let land_id = land.land_id.clone();
        let anchor = land.anchor;
        let Some(template) = self.catalogs.laws.by_id.get(&inst.template_id).cloned() else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "unknown law template",
            );
            return;
        };

        let params = match normalize_law_params(&inst.template_id, inst.params.as_ref(), |item| {
            self.catalogs.items.defs.contains_key(item)
        }) {
            Ok(p) => p,
            Err(msg) => {
                self.push_action_result(agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, msg);
                return;
            }
        };

        let title = if inst.title.trim().is_empty() {
            template.title.clone()
        } else {
            inst.title.trim().to_string()
        };
        let law_id = self.next_law_id();
        let law = Law {
            law_id: law_id.clone(),
            land_id: land_id.clone(),
            template_id: inst.template_id.clone(),
            title: title.clone(),
            params: params.clone(),
            proposed_by: agent_id.to_string(),
            proposed_tick: now_tick,
            notice_ends_tick: now_tick + self.cfg.law_notice_ticks,
            vote_ends_tick: now_tick + self.cfg.law_vote_ticks,
            status: LawStatus::Notice,
            votes: BTreeMap::new(),
        };
        let notice_ends = law.notice_ends_tick;
        let vote_ends = law.vote_ends_tick;
        self.laws.insert(law_id.clone(), law);
        self.broadcast_law_event(now_tick, "PROPOSED", &law_id, "");
        self.audit_event(
            now_tick,
            agent_id,
            "LAW_PROPOSE",
            anchor,
            "PROPOSE_LAW",
            json!({
                "law_id": law_id,
                "land_id": land_id,
                "template_id": inst.template_id,
                "title": title,
                "notice_ends": notice_ends,
                "vote_ends": vote_ends,
                "params": params,
                "proposed_by": agent_id,
            }),
        );
        let mut ev = action_result(now_tick, &inst.id, true, "", "");
        if let Some(obj) = ev.as_object_mut() {
            obj.insert("law_id".to_string(), json!(law_id));
        }
        self.push_event(agent_id, ev);
    }

    pub(crate) fn instant_vote(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        if inst.law_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing law_id",
            );
            return;
        }
        let Some(law) = self.laws.get(&inst.law_id) else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "law not found",
            );
            return;
        };
        if law.status != LawStatus::Voting {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_CONFLICT, "law not in voting",
            );
            return;
        }
        let land_id = law.land_id.clone();
        let Some(land) = self.claims.get(&land_id) else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "land not found",
            );
            return;
        };
        if !self.is_land_member(agent_id, land) {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_NO_PERMISSION, "not eligible to vote",
            );
            return;
        }
        let anchor = land.anchor;
        let Some(choice) = normalize_vote_choice(&inst.choice) else {
            self.push_action_result(agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "bad choice");
            return;
        };
        let law_id = inst.law_id.clone();
        if let Some(law) = self.laws.get_mut(&law_id) {
            law.votes.insert(agent_id.to_string(), choice.to_string());
        }
        self.fun_on_vote(agent_id, now_tick);
        self.audit_event(
            now_tick,
            agent_id,
            "LAW_VOTE",
            anchor,
            "VOTE",
            json!({"law_id": law_id, "land_id": land_id, "choice": choice, "voter_id": agent_id}),
        );
        self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok");
    }

    pub(crate) fn instant_repeal_law(&mut self, agent_id: &str, inst: &InstantReq, now_tick: u64) {
        if inst.law_id.is_empty() {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_BAD_REQUEST, "missing law_id",
            );
            return;
        }
        let Some(law) = self.laws.get(&inst.law_id) else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "law not found",
            );
            return;
        };
        let land_id = law.land_id.clone();
        let Some(land) = self.claims.get(&land_id) else {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_INVALID_TARGET, "land not found",
            );
            return;
        };
        if !self.is_land_admin(agent_id, land) {
            self.push_action_result(
                agent_id, now_tick, &inst.id, false, E_NO_PERMISSION, "not land admin",
            );
            return;
        }
        match self.repeal_law(now_tick, &inst.law_id) {
            Ok(()) => self.push_action_result(agent_id, now_tick, &inst.id, true, "", "ok"),
            Err(msg) => {
                self.push_action_result(agent_id, now_tick, &inst.id, false, E_CONFLICT, &msg)
            }
        }
    }
}

/// Validates and canonicalizes law parameters into the stable string form
/// stored on the law record.
fn normalize_law_params(
    template_id: &str,
    params: Option<&serde_json::Map<String, serde_json::Value>>,
    item_exists: impl Fn(&str) -> bool,
) -> Result<BTreeMap<String, String>, &'static str> {
    let get_num = |key: &str| -> Result<f64, &'static str> {
        params
            .and_then(|p| p.get(key))
            .and_then(|v| v.as_f64())
            .ok_or("missing numeric param")
    };
    let get_item = |key: &str| -> Result<String, &'static str> {
        let item = params
            .and_then(|p| p.get(key))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or("missing item param")?;
        if item.is_empty() || !item_exists(&item) {
            return Err("unknown item param");
        }
        Ok(item)
    };

    let mut out = BTreeMap::new();
    match template_id {
        "MARKET_TAX" => {
            let v = get_num("market_tax")?;
            if !(0.0..=1.0).contains(&v) {
                return Err("market_tax out of range");
            }
            out.insert("market_tax".to_string(), canon_float(v));
        }
        "CURFEW_NO_BUILD" => {
            let s = get_num("start_time")?;
            let e = get_num("end_time")?;
            if !(0.0..=1.0).contains(&s) || !(0.0..=1.0).contains(&e) {
                return Err("curfew time out of range");
            }
            out.insert("start_time".to_string(), canon_float(s));
            out.insert("end_time".to_string(), canon_float(e));
        }
        "FINE_BREAK_PER_BLOCK" => {
            let item = get_item("fine_item")?;
            let n = get_num("fine_per_block")?;
            if n < 0.0 {
                return Err("fine_per_block out of range");
            }
            out.insert("fine_item".to_string(), item);
            out.insert("fine_per_block".to_string(), format!("{}", n as i64));
        }
        "ACCESS_PASS_CORE" => {
            let item = get_item("ticket_item")?;
            let n = get_num("ticket_cost")?;
            if n < 0.0 {
                return Err("ticket_cost out of range");
            }
            out.insert("ticket_item".to_string(), item);
            out.insert("ticket_cost".to_string(), format!("{}", n as i64));
        }
        _ => return Err("unsupported template"),
    }
    Ok(out)
}

/// Stable float rendering suitable for hashing and digests.
fn canon_float(f: f64) -> String {
    let mut s = format!("{f}");
    if !s.contains('.') && !s.contains('e') {
        s.push_str(".0");
    }
    s
}
