//! World director: schedules weather and world events deterministically
//! from the seed and the tick, weighted by the event catalog.

use serde_json::json;

use crate::engine::chunkstore::hash2;
use crate::engine::world::World;
use crate::geometry::Vec3i;

const WEATHER_KINDS: [&str; 3] = ["CLEAR", "STORM", "COLD"];
const WEATHER_DURATION_TICKS: u64 = 1500;

impl World {
    pub(crate) fn system_director(&mut self, now_tick: u64) {
        // Expiry first, so a new pick can land on the same tick.
        if self.active_event_ends != 0 && now_tick >= self.active_event_ends {
            self.active_event_id = String::new();
            self.active_event_start = 0;
            self.active_event_ends = 0;
            self.active_event_radius = 0;
        }
        if self.weather_until_tick != 0 && now_tick >= self.weather_until_tick {
            self.weather = "CLEAR".to_string();
            self.weather_until_tick = 0;
        }

        let every = self.cfg.director_every_ticks;
        if every == 0 || now_tick == 0 || now_tick % every != 0 {
            return;
        }

        // Weather override for the next window.
        let roll = hash2(self.cfg.seed, now_tick as i32, 7);
        let pick = WEATHER_KINDS[(roll % WEATHER_KINDS.len() as u64) as usize];
        if pick != "CLEAR" {
            self.weather = pick.to_string();
            self.weather_until_tick = now_tick + WEATHER_DURATION_TICKS;
        }

        if !self.active_event_id.is_empty() {
            return;
        }
        let Some(event_id) = self.sample_event(now_tick) else {
            return;
        };
        self.start_event(now_tick, &event_id);
    }

    /// Weighted sample over the event catalog, deterministic in seed + tick.
    fn sample_event(&self, now_tick: u64) -> Option<String> {
        let mut total = 0.0;
        let mut entries: Vec<(&String, f64)> = Vec::new();
        for (id, t) in &self.catalogs.events.by_id {
            if t.base_weight <= 0.0 {
                continue;
            }
            total += t.base_weight;
            entries.push((id, t.base_weight));
        }
        if entries.is_empty() || total <= 0.0 {
            return None;
        }
        let roll = hash2(self.cfg.seed, now_tick as i32, 1337);
        let target = (roll % 1_000_000_000) as f64 / 1_000_000_000.0 * total;
        let mut acc = 0.0;
        for (id, w) in &entries {
            acc += w;
            if target <= acc {
                return Some((*id).clone());
            }
        }
        entries.last().map(|(id, _)| (*id).clone())
    }

    fn start_event(&mut self, now_tick: u64, event_id: &str) {
        let Some(template) = self.catalogs.events.by_id.get(event_id).cloned() else {
            return;
        };
        // Event center lands deterministically inside the boundary.
        let r = self.cfg.boundary_r.max(1) as u64;
        let hx = hash2(self.cfg.seed, now_tick as i32, 11);
        let hz = hash2(self.cfg.seed, now_tick as i32, 13);
        let cx = (hx % (2 * r)) as i32 - r as i32;
        let cz = (hz % (2 * r)) as i32 - r as i32;

        self.active_event_id = template.id.clone();
        self.active_event_start = now_tick;
        self.active_event_ends = now_tick + template.duration_ticks.max(1);
        self.active_event_center = Vec3i::new(cx, 1, cz);
        self.active_event_radius = template.radius;

        let ev = json!({
            "t": now_tick,
            "type": "WORLD_EVENT",
            "event_id": template.id,
            "title": template.title,
            "ends_tick": self.active_event_ends,
            "center": self.active_event_center.to_array(),
            "radius": self.active_event_radius,
        });
        let ids = self.sorted_agent_ids();
        for id in ids {
            self.push_event(&id, ev.clone());
        }
        self.audit_event(
            now_tick,
            "WORLD",
            "EVENT_START",
            self.active_event_center,
            "DIRECTOR",
            json!({"event_id": template.id, "ends_tick": self.active_event_ends}),
        );
    }
}
