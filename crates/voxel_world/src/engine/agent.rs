//! Agent record, event queue and rate-limit windows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use voxel_world_proto::Event;

use crate::engine::fun::{FunDecayWindow, FunScore};
use crate::engine::inventory::Inventory;
use crate::engine::tasks::{MoveTask, WorkTask};
use crate::geometry::Vec3i;

/// One fixed-window rate limiter bucket. The window length and cap come from
/// config at check time; only the live window state is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RateWindow {
    pub start_tick: u64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub org_id: String,
    pub current_world_id: String,

    // Transport-level token for reconnects. Deliberately excluded from
    // snapshots and digests.
    #[serde(skip)]
    pub resume_token: String,

    pub pos: Vec3i,
    pub yaw: i32,

    pub hp: i64,
    pub hunger: i64,
    pub stamina_milli: i64,

    #[serde(default)]
    pub fun: FunScore,
    #[serde(default)]
    pub fun_decay: BTreeMap<String, FunDecayWindow>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub seen_biomes: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub seen_recipes: BTreeMap<String, bool>,

    pub inventory: Inventory,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_task: Option<MoveTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_task: Option<WorkTask>,

    // Drained into the OBS batch each tick; not part of snapshots.
    #[serde(skip)]
    pub events: Vec<Event>,

    /// Per-key rate limit windows (SAY, SAY_MARKET, WHISPER, OFFER_TRADE,
    /// POST_BOARD).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rate_windows: BTreeMap<String, RateWindow>,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>, world_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            org_id: String::new(),
            current_world_id: world_id.into(),
            resume_token: String::new(),
            pos: Vec3i::default(),
            yaw: 0,
            hp: 20,
            hunger: 10,
            stamina_milli: 1000,
            fun: FunScore::default(),
            fun_decay: BTreeMap::new(),
            seen_biomes: BTreeMap::new(),
            seen_recipes: BTreeMap::new(),
            inventory: Inventory::new(),
            move_task: None,
            work_task: None,
            events: Vec::new(),
            rate_windows: BTreeMap::new(),
        }
    }

    pub fn add_event(&mut self, ev: Event) {
        self.events.push(ev);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Fixed-window limiter: counts the call and reports whether it fits.
    /// On violation, returns the remaining cooldown in ticks.
    pub fn rate_limit_allow(
        &mut self,
        kind: &str,
        now_tick: u64,
        window: u64,
        max: i64,
    ) -> (bool, u64) {
        if window == 0 || max <= 0 {
            return (true, 0);
        }
        let w = self
            .rate_windows
            .entry(kind.to_string())
            .or_insert(RateWindow {
                start_tick: now_tick,
                count: 0,
            });
        if now_tick.saturating_sub(w.start_tick) >= window {
            w.start_tick = now_tick;
            w.count = 0;
        }
        w.count += 1;
        if w.count <= max {
            (true, 0)
        } else {
            (false, (w.start_tick + window).saturating_sub(now_tick))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_window_resets_after_window() {
        let mut a = Agent::new("A1", "tester", "w");
        for _ in 0..5 {
            let (ok, cd) = a.rate_limit_allow("SAY", 100, 50, 5);
            assert!(ok);
            assert_eq!(cd, 0);
        }
        let (ok, cd) = a.rate_limit_allow("SAY", 100, 50, 5);
        assert!(!ok);
        assert_eq!(cd, 50);

        let (ok, _) = a.rate_limit_allow("SAY", 150, 50, 5);
        assert!(ok);
    }

    #[test]
    fn independent_buckets_per_kind() {
        let mut a = Agent::new("A1", "tester", "w");
        for _ in 0..5 {
            assert!(a.rate_limit_allow("SAY", 10, 50, 5).0);
        }
        assert!(!a.rate_limit_allow("SAY", 10, 50, 5).0);
        assert!(a.rate_limit_allow("WHISPER", 10, 50, 5).0);
    }
}
