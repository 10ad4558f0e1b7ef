//! World configuration with defaulting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldConfig {
    pub id: String,
    #[serde(default)]
    pub world_type: String,
    #[serde(default)]
    pub tick_rate_hz: i32,
    #[serde(default)]
    pub day_ticks: u64,
    #[serde(default)]
    pub season_length_ticks: u64,
    #[serde(default)]
    pub obs_radius: i32,
    #[serde(default)]
    pub height: i32,
    #[serde(default)]
    pub seed: i64,
    #[serde(default)]
    pub boundary_r: i32,

    // Operational parameters, included in snapshots for deterministic resume.
    #[serde(default)]
    pub snapshot_every_ticks: u64,
    #[serde(default)]
    pub director_every_ticks: u64,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    // Governance.
    #[serde(default)]
    pub law_notice_ticks: u64,
    #[serde(default)]
    pub law_vote_ticks: u64,

    // Blueprints.
    #[serde(default)]
    pub blueprint_auto_pull_range: i32,
    #[serde(default)]
    pub blueprint_blocks_per_tick: usize,

    // Claims and laws.
    #[serde(default)]
    pub access_pass_core_radius: i32,
    #[serde(default)]
    pub maintenance_cost: BTreeMap<String, i64>,

    // Fun scoring.
    #[serde(default)]
    pub fun_decay_window_ticks: u64,
    #[serde(default)]
    pub fun_decay_base: f64,
    #[serde(default)]
    pub structure_survival_ticks: u64,

    #[serde(default)]
    pub starter_items: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub say_window_ticks: u64,
    #[serde(default)]
    pub say_max: i64,
    #[serde(default)]
    pub market_say_window_ticks: u64,
    #[serde(default)]
    pub market_say_max: i64,
    #[serde(default)]
    pub whisper_window_ticks: u64,
    #[serde(default)]
    pub whisper_max: i64,
    #[serde(default)]
    pub offer_trade_window_ticks: u64,
    #[serde(default)]
    pub offer_trade_max: i64,
    #[serde(default)]
    pub post_board_window_ticks: u64,
    #[serde(default)]
    pub post_board_max: i64,
}

impl WorldConfig {
    /// Returns the config with every unset knob replaced by its default.
    pub fn sanitized(mut self) -> Self {
        if self.tick_rate_hz <= 0 {
            self.tick_rate_hz = 5;
        }
        if self.day_ticks == 0 {
            self.day_ticks = 6000;
        }
        if self.season_length_ticks == 0 {
            self.season_length_ticks = self.day_ticks * 7;
        }
        if self.obs_radius <= 0 {
            self.obs_radius = 7;
        }
        if self.height <= 0 {
            self.height = 64;
        }
        if self.boundary_r <= 0 {
            self.boundary_r = 4000;
        }
        if self.snapshot_every_ticks == 0 {
            self.snapshot_every_ticks = 3000;
        }
        if self.director_every_ticks == 0 {
            self.director_every_ticks = 3000;
        }
        if self.law_notice_ticks == 0 {
            self.law_notice_ticks = 3000;
        }
        if self.law_vote_ticks == 0 {
            self.law_vote_ticks = 6000;
        }
        if self.blueprint_auto_pull_range <= 0 {
            self.blueprint_auto_pull_range = 32;
        }
        if self.blueprint_blocks_per_tick == 0 {
            self.blueprint_blocks_per_tick = 2;
        }
        if self.access_pass_core_radius <= 0 {
            self.access_pass_core_radius = 16;
        }
        if self.maintenance_cost.is_empty() {
            self.maintenance_cost.insert("IRON_INGOT".to_string(), 1);
            self.maintenance_cost.insert("COAL".to_string(), 1);
        }
        if self.fun_decay_window_ticks == 0 {
            self.fun_decay_window_ticks = 3000;
        }
        if !(self.fun_decay_base > 0.0 && self.fun_decay_base <= 1.0) {
            self.fun_decay_base = 0.70;
        }
        if self.structure_survival_ticks == 0 {
            self.structure_survival_ticks = 3000;
        }
        self.rate_limits = self.rate_limits.sanitized();
        self
    }
}

impl RateLimitConfig {
    pub fn sanitized(mut self) -> Self {
        if self.say_window_ticks == 0 {
            self.say_window_ticks = 50;
        }
        if self.say_max <= 0 {
            self.say_max = 5;
        }
        if self.market_say_window_ticks == 0 {
            self.market_say_window_ticks = 50;
        }
        if self.market_say_max <= 0 {
            self.market_say_max = 2;
        }
        if self.whisper_window_ticks == 0 {
            self.whisper_window_ticks = 50;
        }
        if self.whisper_max <= 0 {
            self.whisper_max = 5;
        }
        if self.offer_trade_window_ticks == 0 {
            self.offer_trade_window_ticks = 50;
        }
        if self.offer_trade_max <= 0 {
            self.offer_trade_max = 3;
        }
        if self.post_board_window_ticks == 0 {
            self.post_board_window_ticks = 600;
        }
        if self.post_board_max <= 0 {
            self.post_board_max = 1;
        }
        self
    }
}
