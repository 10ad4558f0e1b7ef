//! Dropped item stacks with TTL and a position index.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::engine::world::World;
use crate::geometry::Vec3i;

/// One in-game day at the default tick rate.
pub const ITEM_ENTITY_TTL_TICKS: u64 = 6000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEntity {
    pub entity_id: String,
    pub pos: Vec3i,
    pub item: String,
    pub count: i64,
    pub created_tick: u64,
    pub expires_tick: u64,
}

impl World {
    /// Spawns a dropped stack, merging into an existing entity holding the
    /// same item at the same position (TTL extends to the later expiry).
    pub fn spawn_item_entity(
        &mut self,
        now_tick: u64,
        actor: &str,
        pos: Vec3i,
        item: &str,
        count: i64,
        reason: &str,
    ) -> String {
        if item.is_empty() || count <= 0 {
            return String::new();
        }

        if let Some(ids) = self.items_at.get(&pos) {
            let merge_id = ids
                .iter()
                .find(|id| {
                    self.items
                        .get(*id)
                        .is_some_and(|e| e.item == item && e.count > 0)
                })
                .cloned();
            if let Some(id) = merge_id {
                if let Some(e) = self.items.get_mut(&id) {
                    e.count += count;
                    e.expires_tick = e.expires_tick.max(now_tick + ITEM_ENTITY_TTL_TICKS);
                }
                self.audit_event(
                    now_tick,
                    actor,
                    "ITEM_SPAWN",
                    pos,
                    reason,
                    json!({"entity_id": id, "item": item, "count": count, "merged": true}),
                );
                return id;
            }
        }

        let id = self.next_item_entity_id();
        self.items.insert(
            id.clone(),
            ItemEntity {
                entity_id: id.clone(),
                pos,
                item: item.to_string(),
                count,
                created_tick: now_tick,
                expires_tick: now_tick + ITEM_ENTITY_TTL_TICKS,
            },
        );
        self.items_at.entry(pos).or_default().push(id.clone());
        self.audit_event(
            now_tick,
            actor,
            "ITEM_SPAWN",
            pos,
            reason,
            json!({"entity_id": id, "item": item, "count": count, "merged": false}),
        );
        id
    }

    pub fn remove_item_entity(&mut self, now_tick: u64, actor: &str, id: &str, reason: &str) {
        let Some(e) = self.items.remove(id) else {
            return;
        };
        if let Some(ids) = self.items_at.get_mut(&e.pos) {
            ids.retain(|x| x != id);
            if ids.is_empty() {
                self.items_at.remove(&e.pos);
            }
        }
        self.audit_event(
            now_tick,
            actor,
            "ITEM_DESPAWN",
            e.pos,
            reason,
            json!({"entity_id": id, "item": e.item, "count": e.count}),
        );
    }

    /// Atomically re-indexes an entity to a new position.
    pub fn move_item_entity(
        &mut self,
        now_tick: u64,
        actor: &str,
        id: &str,
        to: Vec3i,
        reason: &str,
    ) {
        let Some((from, item, count)) = self.items.get_mut(id).map(|e| {
            let from = e.pos;
            e.pos = to;
            (from, e.item.clone(), e.count)
        }) else {
            return;
        };
        if from == to {
            return;
        }
        if let Some(ids) = self.items_at.get_mut(&from) {
            ids.retain(|x| x != id);
            if ids.is_empty() {
                self.items_at.remove(&from);
            }
        }
        self.items_at.entry(to).or_default().push(id.to_string());
        self.audit_event(
            now_tick,
            actor,
            "ITEM_MOVE",
            from,
            reason,
            json!({"entity_id": id, "to": to.to_array(), "item": item, "count": count}),
        );
    }

    /// Despawns every expired entity, in ascending (expires_tick, id) order.
    pub(crate) fn cleanup_expired_item_entities(&mut self, now_tick: u64) {
        if self.items.is_empty() {
            return;
        }
        let mut expired: Vec<(u64, String)> = self
            .items
            .values()
            .filter(|e| e.expires_tick != 0 && now_tick >= e.expires_tick)
            .map(|e| (e.expires_tick, e.entity_id.clone()))
            .collect();
        expired.sort();
        for (_, id) in expired {
            self.remove_item_entity(now_tick, "WORLD", &id, "EXPIRE");
        }
    }
}
