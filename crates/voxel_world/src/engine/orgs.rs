//! Organizations: guilds and cities with role membership and a treasury.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::engine::inventory::Inventory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrgKind {
    #[serde(rename = "GUILD")]
    Guild,
    #[serde(rename = "CITY")]
    City,
}

impl OrgKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GUILD" => Some(OrgKind::Guild),
            "CITY" => Some(OrgKind::City),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrgKind::Guild => "GUILD",
            OrgKind::City => "CITY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OrgRole {
    #[serde(rename = "LEADER")]
    Leader,
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "MEMBER")]
    Member,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub org_id: String,
    pub kind: OrgKind,
    pub name: String,
    pub created_tick: u64,
    /// agent id -> role.
    pub members: BTreeMap<String, OrgRole>,
    pub treasury: Inventory,
}

impl Organization {
    pub fn is_member(&self, agent_id: &str) -> bool {
        self.members.contains_key(agent_id)
    }

    pub fn is_admin(&self, agent_id: &str) -> bool {
        matches!(
            self.members.get(agent_id),
            Some(OrgRole::Leader) | Some(OrgRole::Admin)
        )
    }

    /// Removes a member; if the leader left, the lowest remaining agent id is
    /// promoted. Returns true when the org is now empty and must be deleted.
    pub fn remove_member(&mut self, agent_id: &str) -> bool {
        let was_leader = matches!(self.members.get(agent_id), Some(OrgRole::Leader));
        self.members.remove(agent_id);
        if self.members.is_empty() {
            return true;
        }
        if was_leader && !self.members.values().any(|r| *r == OrgRole::Leader) {
            if let Some(id) = self.members.keys().next().cloned() {
                self.members.insert(id, OrgRole::Leader);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leader_succession_on_leave() {
        let mut org = Organization {
            org_id: "O0001".to_string(),
            kind: OrgKind::Guild,
            name: "miners".to_string(),
            created_tick: 0,
            members: BTreeMap::from([
                ("A3".to_string(), OrgRole::Leader),
                ("A5".to_string(), OrgRole::Member),
                ("A9".to_string(), OrgRole::Member),
            ]),
            treasury: Inventory::new(),
        };
        assert!(!org.remove_member("A3"));
        assert_eq!(org.members.get("A5"), Some(&OrgRole::Leader));

        assert!(!org.remove_member("A5"));
        assert!(org.remove_member("A9"));
    }
}
