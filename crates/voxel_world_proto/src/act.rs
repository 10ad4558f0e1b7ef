//! ACT frames: per-tick action bundles submitted by one agent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActMsg {
    #[serde(rename = "type", default)]
    pub msg_type: String,
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub tick: u64,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instants: Vec<InstantReq>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskReq>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cancel: Vec<String>,
}

/// An action resolved entirely within the tick it is applied.
///
/// The field set is the union over all instant types; unused fields stay at
/// their defaults and are omitted on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InstantReq {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub req_type: String,

    // Chat.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,

    // Trades.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub offer: Vec<ItemStack>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request: Vec<ItemStack>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trade_id: String,

    // Signs, boards, container reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<[i32; 3]>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_id: String,

    // Claims.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub land_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<std::collections::BTreeMap<String, bool>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub member_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub new_owner: String,

    // Orgs.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub org_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub org_kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub org_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub item_id: String,
    #[serde(default)]
    pub count: i64,

    // Laws.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub law_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub choice: String,
}

/// A multi-tick action tracked on the agent as a movement or work task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaskReq {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub req_type: String,

    #[serde(default)]
    pub target: [i32; 3],
    #[serde(default)]
    pub tolerance: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_id: String,
    #[serde(default)]
    pub distance: f64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub item_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub recipe_id: String,
    #[serde(default)]
    pub count: i64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub blueprint_id: String,
    #[serde(default)]
    pub anchor: [i32; 3],
    #[serde(default)]
    pub rotation: i32,

    #[serde(default)]
    pub radius: i32,
}
