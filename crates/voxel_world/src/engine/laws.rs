//! Law lifecycle: propose -> NOTICE -> VOTING -> ACTIVE | REJECTED, with
//! repeal reversing static effects.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use crate::engine::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LawStatus {
    #[serde(rename = "NOTICE")]
    Notice,
    #[serde(rename = "VOTING")]
    Voting,
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "REJECTED")]
    Rejected,
    #[serde(rename = "REPEALED")]
    Repealed,
}

impl LawStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LawStatus::Notice => "NOTICE",
            LawStatus::Voting => "VOTING",
            LawStatus::Active => "ACTIVE",
            LawStatus::Rejected => "REJECTED",
            LawStatus::Repealed => "REPEALED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Law {
    pub law_id: String,
    pub land_id: String,
    pub template_id: String,
    pub title: String,

    /// Canonical string form of every parameter, stable for digests.
    pub params: BTreeMap<String, String>,

    pub proposed_by: String,
    pub proposed_tick: u64,
    pub notice_ends_tick: u64,
    pub vote_ends_tick: u64,

    pub status: LawStatus,
    /// agent id -> "YES" | "NO".
    pub votes: BTreeMap<String, String>,
}

pub fn count_votes(votes: &BTreeMap<String, String>) -> (usize, usize) {
    let mut yes = 0;
    let mut no = 0;
    for v in votes.values() {
        match v.trim().to_ascii_uppercase().as_str() {
            "YES" | "Y" | "1" | "TRUE" => yes += 1,
            "NO" | "N" | "0" | "FALSE" => no += 1,
            _ => {}
        }
    }
    (yes, no)
}

pub fn normalize_vote_choice(choice: &str) -> Option<&'static str> {
    match choice.trim().to_ascii_uppercase().as_str() {
        "YES" | "Y" | "1" | "TRUE" => Some("YES"),
        "NO" | "N" | "0" | "FALSE" => Some("NO"),
        _ => None,
    }
}

impl World {
    pub(crate) fn tick_laws(&mut self, now_tick: u64) {
        if self.laws.is_empty() {
            return;
        }
        let ids: Vec<String> = self.laws.keys().cloned().collect();
        for id in ids {
            let Some(law) = self.laws.get(&id) else {
                continue;
            };
            match law.status {
                LawStatus::Notice => {
                    if now_tick >= law.notice_ends_tick {
                        if let Some(law) = self.laws.get_mut(&id) {
                            law.status = LawStatus::Voting;
                        }
                        self.broadcast_law_event(now_tick, "VOTING", &id, "");
                    }
                }
                LawStatus::Voting => {
                    if now_tick >= law.vote_ends_tick {
                        self.tally_law(now_tick, &id);
                    }
                }
                _ => {}
            }
        }
    }

    fn tally_law(&mut self, now_tick: u64, law_id: &str) {
        let Some(law) = self.laws.get(law_id) else {
            return;
        };
        let (yes, no) = count_votes(&law.votes);
        let land_id = law.land_id.clone();
        let anchor = self.claims.get(&land_id).map(|c| c.anchor);

        if yes > no {
            match self.apply_law_effects(law_id) {
                Ok(()) => {
                    let proposed_by = match self.laws.get_mut(law_id) {
                        Some(law) => {
                            law.status = LawStatus::Active;
                            law.proposed_by.clone()
                        }
                        None => String::new(),
                    };
                    self.fun_on_law_active(&proposed_by, now_tick);
                    if let Some(anchor) = anchor {
                        let details = self.law_audit_details(law_id, yes, no);
                        self.audit_event(
                            now_tick,
                            "WORLD",
                            "LAW_ACTIVE",
                            anchor,
                            "VOTE_PASSED",
                            details,
                        );
                    }
                    self.broadcast_law_event(now_tick, "ACTIVE", law_id, "");
                }
                Err(msg) => {
                    if let Some(law) = self.laws.get_mut(law_id) {
                        law.status = LawStatus::Rejected;
                    }
                    if let Some(anchor) = anchor {
                        let details = self.law_audit_details(law_id, yes, no);
                        self.audit_event(
                            now_tick,
                            "WORLD",
                            "LAW_REJECTED",
                            anchor,
                            "ACTIVATE_FAILED",
                            details,
                        );
                    }
                    self.broadcast_law_event(now_tick, "REJECTED", law_id, &msg);
                }
            }
        } else {
            if let Some(law) = self.laws.get_mut(law_id) {
                law.status = LawStatus::Rejected;
            }
            if let Some(anchor) = anchor {
                let details = self.law_audit_details(law_id, yes, no);
                self.audit_event(
                    now_tick,
                    "WORLD",
                    "LAW_REJECTED",
                    anchor,
                    "VOTE_FAILED",
                    details,
                );
            }
            self.broadcast_law_event(now_tick, "REJECTED", law_id, "vote failed");
        }
    }

    /// Writes a law's effects onto its claim. Exposed for tests and admin
    /// tooling; the voting path goes through the same function.
    pub fn apply_law_effects(&mut self, law_id: &str) -> Result<(), String> {
        let Some(law) = self.laws.get(law_id) else {
            return Err("law not found".to_string());
        };
        let template_id = law.template_id.clone();
        let params = law.params.clone();
        let land_id = law.land_id.clone();
        let Some(land) = self.claims.get_mut(&land_id) else {
            return Err("land not found".to_string());
        };

        match template_id.as_str() {
            "MARKET_TAX" => {
                let raw = params.get("market_tax").cloned().unwrap_or_default();
                let f: f64 = raw.parse().map_err(|_| "bad market_tax".to_string())?;
                land.market_tax = f.clamp(0.0, 0.25);
                Ok(())
            }
            "CURFEW_NO_BUILD" => {
                let s: f64 = params
                    .get("start_time")
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| "bad start_time".to_string())?;
                let e: f64 = params
                    .get("end_time")
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| "bad end_time".to_string())?;
                let s = s.clamp(0.0, 1.0);
                let e = e.clamp(0.0, 1.0);
                if s == e {
                    land.curfew_enabled = false;
                    land.curfew_start = 0.0;
                    land.curfew_end = 0.0;
                } else {
                    land.curfew_enabled = true;
                    land.curfew_start = s;
                    land.curfew_end = e;
                }
                Ok(())
            }
            "FINE_BREAK_PER_BLOCK" => {
                let item = params
                    .get("fine_item")
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default();
                let n: i64 = params
                    .get("fine_per_block")
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| "bad fine_per_block".to_string())?;
                let n = n.clamp(0, 100);
                if item.is_empty() {
                    return Err("missing fine_item".to_string());
                }
                if n == 0 {
                    land.fine_break_enabled = false;
                    land.fine_break_item = String::new();
                    land.fine_break_per_block = 0;
                } else {
                    land.fine_break_enabled = true;
                    land.fine_break_item = item;
                    land.fine_break_per_block = n;
                }
                Ok(())
            }
            "ACCESS_PASS_CORE" => {
                let item = params
                    .get("ticket_item")
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default();
                let n: i64 = params
                    .get("ticket_cost")
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| "bad ticket_cost".to_string())?;
                let n = n.clamp(0, 64);
                if item.is_empty() {
                    return Err("missing ticket_item".to_string());
                }
                if n == 0 {
                    land.access_pass_enabled = false;
                    land.access_ticket_item = String::new();
                    land.access_ticket_cost = 0;
                } else {
                    land.access_pass_enabled = true;
                    land.access_ticket_item = item;
                    land.access_ticket_cost = n;
                }
                Ok(())
            }
            _ => Err("unsupported template".to_string()),
        }
    }

    /// Reverses a law's static effects and marks it REPEALED.
    pub(crate) fn repeal_law(&mut self, now_tick: u64, law_id: &str) -> Result<(), String> {
        let Some(law) = self.laws.get(law_id) else {
            return Err("law not found".to_string());
        };
        if law.status != LawStatus::Active {
            return Err("law not active".to_string());
        }
        let template_id = law.template_id.clone();
        let land_id = law.land_id.clone();
        let Some(land) = self.claims.get_mut(&land_id) else {
            return Err("land not found".to_string());
        };
        match template_id.as_str() {
            "MARKET_TAX" => land.market_tax = 0.0,
            "CURFEW_NO_BUILD" => {
                land.curfew_enabled = false;
                land.curfew_start = 0.0;
                land.curfew_end = 0.0;
            }
            "FINE_BREAK_PER_BLOCK" => {
                land.fine_break_enabled = false;
                land.fine_break_item = String::new();
                land.fine_break_per_block = 0;
            }
            "ACCESS_PASS_CORE" => {
                land.access_pass_enabled = false;
                land.access_ticket_item = String::new();
                land.access_ticket_cost = 0;
            }
            _ => {}
        }
        let anchor = land.anchor;
        if let Some(law) = self.laws.get_mut(law_id) {
            law.status = LawStatus::Repealed;
        }
        let details = self.law_audit_details(law_id, 0, 0);
        self.audit_event(now_tick, "WORLD", "LAW_REPEALED", anchor, "REPEAL", details);
        self.broadcast_law_event(now_tick, "REPEALED", law_id, "");
        Ok(())
    }

    fn law_audit_details(&self, law_id: &str, yes: usize, no: usize) -> serde_json::Value {
        match self.laws.get(law_id) {
            Some(law) => json!({
                "law_id": law.law_id,
                "land_id": law.land_id,
                "template_id": law.template_id,
                "title": law.title,
                "yes": yes,
                "no": no,
                "params": law.params,
            }),
            None => json!({"law_id": law_id}),
        }
    }

    pub(crate) fn broadcast_law_event(
        &mut self,
        now_tick: u64,
        kind: &str,
        law_id: &str,
        message: &str,
    ) {
        let Some(law) = self.laws.get(law_id) else {
            return;
        };
        let mut base = json!({
            "t": now_tick,
            "type": "LAW",
            "kind": kind,
            "law_id": law.law_id,
            "land_id": law.land_id,
            "template_id": law.template_id,
            "title": law.title,
            "status": law.status.as_str(),
        });
        if let Some(obj) = base.as_object_mut() {
            if !message.is_empty() {
                obj.insert("message".to_string(), json!(message));
            }
            if kind == "PROPOSED" {
                obj.insert("notice_ends_tick".to_string(), json!(law.notice_ends_tick));
                obj.insert("vote_ends_tick".to_string(), json!(law.vote_ends_tick));
            }
        }
        for agent in self.agents.values_mut() {
            agent.add_event(base.clone());
        }
    }
}
