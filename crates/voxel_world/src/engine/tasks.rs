//! Task records carried on agents.
//!
//! An agent holds at most one movement task and one work task; both advance
//! one step per tick and survive snapshots.

use serde::{Deserialize, Serialize};

use crate::geometry::Vec3i;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveKind {
    #[serde(rename = "MOVE_TO")]
    MoveTo,
    #[serde(rename = "FOLLOW")]
    Follow,
}

impl MoveKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MoveKind::MoveTo => "MOVE_TO",
            MoveKind::Follow => "FOLLOW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkKind {
    #[serde(rename = "GATHER")]
    Gather,
    #[serde(rename = "MINE")]
    Mine,
    #[serde(rename = "PLACE")]
    Place,
    #[serde(rename = "CRAFT")]
    Craft,
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "BUILD_BLUEPRINT")]
    BuildBlueprint,
}

impl WorkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkKind::Gather => "GATHER",
            WorkKind::Mine => "MINE",
            WorkKind::Place => "PLACE",
            WorkKind::Craft => "CRAFT",
            WorkKind::Open => "OPEN",
            WorkKind::BuildBlueprint => "BUILD_BLUEPRINT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveTask {
    pub task_id: String,
    pub kind: MoveKind,
    pub target: Vec3i,
    #[serde(default)]
    pub tolerance: f64,
    /// FOLLOW re-resolves the target from this agent every tick.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_id: String,
    #[serde(default)]
    pub distance: f64,
    pub start_pos: Vec3i,
    pub started_tick: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkTask {
    pub task_id: String,
    pub kind: WorkKind,
    #[serde(default)]
    pub block_pos: Vec3i,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub recipe_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub item_id: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub blueprint_id: String,
    #[serde(default)]
    pub anchor: Vec3i,
    #[serde(default)]
    pub rotation: i32,
    #[serde(default)]
    pub build_index: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_id: String,
    pub started_tick: u64,
    #[serde(default)]
    pub work_ticks: u64,
}
