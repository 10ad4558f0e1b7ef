//! OBS frames: the per-agent view of the world, built once per tick.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::act::ItemStack;
use crate::event::Event;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObsMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub protocol_version: String,
    pub tick: u64,
    pub agent_id: String,
    pub world_id: String,

    pub world: WorldObs,
    #[serde(rename = "self")]
    pub self_obs: SelfObs,
    pub inventory: Vec<ItemStack>,
    pub local_rules: LocalRulesObs,

    pub voxels: VoxelsObs,
    pub entities: Vec<EntityObs>,
    pub events: Vec<Event>,
    pub tasks: Vec<TaskObs>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldObs {
    /// 0..1 fraction of the current in-game day.
    pub time_of_day: f64,
    pub weather: String,
    pub season_day: i64,
    pub biome: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub active_event: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub active_event_ends_tick: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SelfObs {
    pub pos: [i32; 3],
    pub yaw: i32,
    pub hp: i64,
    pub hunger: i64,
    /// 0..1 (stamina millis / 1000).
    pub stamina: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LocalRulesObs {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub land_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    /// "WILD", "OWNER", "MEMBER" or "VISITOR".
    pub role: String,
    pub permissions: BTreeMap<String, bool>,
    pub market_tax: f64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub maintenance_stage: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VoxelsObs {
    pub center: [i32; 3],
    pub radius: i32,
    /// "FULL" carries the whole window in `blocks`; "DELTA" only `ops`.
    pub encoding: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ops: Vec<VoxelDeltaOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelDeltaOp {
    /// Offset from the window center.
    pub d: [i32; 3],
    /// Block palette id.
    pub b: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityObs {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub pos: [i32; 3],
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub item: String,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskObs {
    pub task_id: String,
    pub kind: String,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<[i32; 3]>,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub eta_ticks: i64,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}
