//! Fun scoring: novelty/creation/social/influence/narrative buckets with
//! per-key diminishing returns so repeated actions stop farming points.

use serde::{Deserialize, Serialize};

use crate::engine::world::World;
use crate::geometry::Vec3i;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FunScore {
    pub novelty: i64,
    pub creation: i64,
    pub social: i64,
    pub influence: i64,
    pub narrative: i64,
}

impl FunScore {
    pub fn bucket_mut(&mut self, bucket: &str) -> Option<&mut i64> {
        match bucket {
            "NOVELTY" => Some(&mut self.novelty),
            "CREATION" => Some(&mut self.creation),
            "SOCIAL" => Some(&mut self.social),
            "INFLUENCE" => Some(&mut self.influence),
            "NARRATIVE" => Some(&mut self.narrative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FunDecayWindow {
    pub start_tick: u64,
    pub count: i64,
}

/// Diminishing-return award: the n-th award of `base` points for the same key
/// within the window yields `round(base * decay_base^n)` points.
pub fn decayed_points(
    window: &mut FunDecayWindow,
    base: i64,
    now_tick: u64,
    window_ticks: u64,
    decay_base: f64,
) -> i64 {
    if base <= 0 {
        return 0;
    }
    if window_ticks > 0 && now_tick.saturating_sub(window.start_tick) >= window_ticks {
        window.start_tick = now_tick;
        window.count = 0;
    }
    let factor = decay_base.clamp(0.0, 1.0).powi(window.count as i32);
    window.count += 1;
    ((base as f64) * factor).round() as i64
}

/// A completed blueprint tracked for delayed creation awards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub structure_id: String,
    pub blueprint_id: String,
    pub builder_id: String,
    pub anchor: Vec3i,
    pub rotation: i32,
    pub completed_tick: u64,
    pub award_due_tick: u64,
    pub awarded: bool,
}

impl World {
    /// Awards `base` points into `bucket`, decayed per `decay_key`.
    pub(crate) fn add_fun(
        &mut self,
        agent_id: &str,
        bucket: &str,
        decay_key: &str,
        base: i64,
        now_tick: u64,
    ) {
        let window_ticks = self.cfg.fun_decay_window_ticks;
        let decay_base = self.cfg.fun_decay_base;
        let Some(a) = self.agents.get_mut(agent_id) else {
            return;
        };
        let window = a.fun_decay.entry(decay_key.to_string()).or_default();
        let pts = decayed_points(window, base, now_tick, window_ticks, decay_base);
        if pts <= 0 {
            return;
        }
        if let Some(slot) = a.fun.bucket_mut(bucket) {
            *slot += pts;
        }
    }

    /// First arrival in a biome scores novelty.
    pub(crate) fn fun_on_biome(&mut self, agent_id: &str, pos: Vec3i, now_tick: u64) {
        let biome = self.biome_at_pos(pos).to_string();
        let first = match self.agents.get_mut(agent_id) {
            Some(a) => a.seen_biomes.insert(biome.clone(), true).is_none(),
            None => return,
        };
        if first {
            self.add_fun(agent_id, "NOVELTY", "novelty:biome", 10, now_tick);
        }
    }

    /// First craft of a recipe scores creation.
    pub(crate) fn fun_on_recipe(&mut self, agent_id: &str, recipe_id: &str, now_tick: u64) {
        let first = match self.agents.get_mut(agent_id) {
            Some(a) => a.seen_recipes.insert(recipe_id.to_string(), true).is_none(),
            None => return,
        };
        let base = if first { 8 } else { 2 };
        self.add_fun(
            agent_id,
            "CREATION",
            &format!("creation:recipe:{recipe_id}"),
            base,
            now_tick,
        );
    }

    pub(crate) fn fun_on_trade(&mut self, agent_id: &str, now_tick: u64) {
        self.add_fun(agent_id, "SOCIAL", "social:trade", 4, now_tick);
    }

    pub(crate) fn fun_on_vote(&mut self, agent_id: &str, now_tick: u64) {
        self.add_fun(agent_id, "INFLUENCE", "influence:vote", 3, now_tick);
    }

    pub(crate) fn fun_on_law_active(&mut self, agent_id: &str, now_tick: u64) {
        if agent_id.is_empty() {
            return;
        }
        self.add_fun(agent_id, "NARRATIVE", "narrative:law_active", 12, now_tick);
    }

    pub(crate) fn fun_on_blueprint_complete(&mut self, agent_id: &str, now_tick: u64) {
        self.add_fun(agent_id, "CREATION", "creation:blueprint", 6, now_tick);
    }

    pub(crate) fn register_structure(
        &mut self,
        now_tick: u64,
        builder_id: &str,
        blueprint_id: &str,
        anchor: Vec3i,
        rotation: i32,
    ) {
        if !self.catalogs.blueprints.by_id.contains_key(blueprint_id) {
            return;
        }
        let structure_id = format!(
            "ST_{}_{}_{}_{}_{}",
            builder_id, blueprint_id, anchor.x, anchor.z, now_tick
        );
        self.structures.insert(
            structure_id.clone(),
            Structure {
                structure_id,
                blueprint_id: blueprint_id.to_string(),
                builder_id: builder_id.to_string(),
                anchor,
                rotation,
                completed_tick: now_tick,
                award_due_tick: now_tick + self.cfg.structure_survival_ticks,
                awarded: false,
            },
        );
    }

    /// Delayed creation awards: a structure still standing after the
    /// survival window scores once for its builder.
    pub(crate) fn system_fun(&mut self, now_tick: u64) {
        if self.structures.is_empty() {
            return;
        }
        let ids: Vec<String> = self.structures.keys().cloned().collect();
        for id in ids {
            let Some(s) = self.structures.get(&id).cloned() else {
                continue;
            };
            if s.awarded || now_tick < s.award_due_tick {
                continue;
            }
            let Some(bp) = self.catalogs.blueprints.by_id.get(&s.blueprint_id).cloned() else {
                self.structures.remove(&id);
                continue;
            };
            if !self.blueprint_placed(&bp, s.anchor, s.rotation) {
                self.structures.remove(&id);
                continue;
            }
            if !self.agents.contains_key(&s.builder_id) {
                self.structures.remove(&id);
                continue;
            }
            self.add_fun(
                &s.builder_id,
                "CREATION",
                "creation:structure",
                10,
                now_tick,
            );
            if let Some(s) = self.structures.get_mut(&id) {
                s.awarded = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_awards_decay_within_window() {
        let mut w = FunDecayWindow::default();
        let a = decayed_points(&mut w, 10, 0, 3000, 0.5);
        let b = decayed_points(&mut w, 10, 10, 3000, 0.5);
        let c = decayed_points(&mut w, 10, 20, 3000, 0.5);
        assert_eq!((a, b, c), (10, 5, 3));

        // Window reset restores the full award.
        let d = decayed_points(&mut w, 10, 3000, 3000, 0.5);
        assert_eq!(d, 10);
    }
}
