//! Chest-like containers keyed by position.

use serde::{Deserialize, Serialize};

use crate::engine::inventory::Inventory;
use crate::geometry::Vec3i;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// Block kind, e.g. "CHEST" or "FURNACE".
    pub kind: String,
    pub pos: Vec3i,
    pub inventory: Inventory,
}

impl Container {
    pub fn id(&self) -> String {
        container_id(&self.kind, self.pos)
    }
}

pub fn container_id(kind: &str, pos: Vec3i) -> String {
    format!("{}@{},{},{}", kind, pos.x, pos.y, pos.z)
}

/// Parses "KIND@x,y,z" ids, the shared id syntax for containers, signs and
/// boards.
pub fn parse_container_id(id: &str) -> Option<(String, Vec3i)> {
    let (kind, coords) = id.split_once('@')?;
    let mut it = coords.split(',');
    let x = it.next()?.parse::<i32>().ok()?;
    let y = it.next()?.parse::<i32>().ok()?;
    let z = it.next()?.parse::<i32>().ok()?;
    if it.next().is_some() || kind.is_empty() {
        return None;
    }
    Some((kind.to_string(), Vec3i::new(x, y, z)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trip() {
        let pos = Vec3i::new(-3, 1, 17);
        let id = container_id("CHEST", pos);
        assert_eq!(id, "CHEST@-3,1,17");
        assert_eq!(parse_container_id(&id), Some(("CHEST".to_string(), pos)));
        assert_eq!(parse_container_id("CHEST@1,2"), None);
        assert_eq!(parse_container_id("nope"), None);
    }
}
