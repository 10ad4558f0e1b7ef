//! Read-only catalog projections.
//!
//! Catalogs enter the engine as loaded, immutable structures; the engine only
//! projects them (lookups, palette ids, digests). Digests are SHA-256 of the
//! canonical JSON form of each catalog, stable across runs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDef {
    pub id: String,
    pub solid: bool,
    pub breakable: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub drops_item: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDef {
    pub id: String,
    /// "BLOCK", "TOOL", "MATERIAL" or "FOOD".
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub place_as: String,
    #[serde(default)]
    pub edible_hp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCount {
    pub item: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDef {
    pub recipe_id: String,
    /// "HAND" or "CRAFTING_BENCH".
    pub station: String,
    pub inputs: Vec<ItemCount>,
    pub outputs: Vec<ItemCount>,
    pub tier: i32,
    pub time_ticks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintBlock {
    pub pos: [i32; 3],
    pub block: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintDef {
    pub id: String,
    pub blocks: Vec<BlueprintBlock>,
    pub cost: Vec<ItemCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LawTemplate {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Parameter name -> type hint ("number", "item", ...).
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub id: String,
    pub title: String,
    pub base_weight: f64,
    pub duration_ticks: u64,
    pub radius: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockCatalog {
    pub palette: Vec<String>,
    pub index: BTreeMap<String, u16>,
    pub defs: BTreeMap<String, BlockDef>,
    pub palette_digest: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemCatalog {
    pub palette: Vec<String>,
    pub defs: BTreeMap<String, ItemDef>,
    pub palette_digest: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeCatalog {
    pub by_id: BTreeMap<String, RecipeDef>,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlueprintCatalog {
    pub by_id: BTreeMap<String, BlueprintDef>,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LawTemplateCatalog {
    pub by_id: BTreeMap<String, LawTemplate>,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventCatalog {
    pub by_id: BTreeMap<String, EventTemplate>,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catalogs {
    pub blocks: BlockCatalog,
    pub items: ItemCatalog,
    pub recipes: RecipeCatalog,
    pub blueprints: BlueprintCatalog,
    pub laws: LawTemplateCatalog,
    pub events: EventCatalog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    EmptyPalette { kind: String },
    DuplicateId { kind: String, id: String },
    MissingBlock { id: String },
    Serde(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::EmptyPalette { kind } => write!(f, "empty {kind} palette"),
            CatalogError::DuplicateId { kind, id } => write!(f, "duplicate {kind} id {id}"),
            CatalogError::MissingBlock { id } => write!(f, "unknown block {id}"),
            CatalogError::Serde(msg) => write!(f, "catalog serde: {msg}"),
        }
    }
}

impl std::error::Error for CatalogError {}

fn sha256_json<T: Serialize>(value: &T) -> Result<String, CatalogError> {
    let bytes = serde_json::to_vec(value).map_err(|e| CatalogError::Serde(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

impl Catalogs {
    /// Assembles catalog projections from loaded definitions. Palette ids are
    /// assigned in the given block order, so the caller controls the id of
    /// AIR (conventionally first).
    pub fn new(
        blocks: Vec<BlockDef>,
        items: Vec<ItemDef>,
        recipes: Vec<RecipeDef>,
        blueprints: Vec<BlueprintDef>,
        law_templates: Vec<LawTemplate>,
        event_templates: Vec<EventTemplate>,
    ) -> Result<Self, CatalogError> {
        if blocks.is_empty() {
            return Err(CatalogError::EmptyPalette {
                kind: "block".to_string(),
            });
        }
        if items.is_empty() {
            return Err(CatalogError::EmptyPalette {
                kind: "item".to_string(),
            });
        }

        let mut palette = Vec::with_capacity(blocks.len());
        let mut index = BTreeMap::new();
        let mut block_defs = BTreeMap::new();
        for (i, def) in blocks.into_iter().enumerate() {
            if index.contains_key(&def.id) {
                return Err(CatalogError::DuplicateId {
                    kind: "block".to_string(),
                    id: def.id,
                });
            }
            palette.push(def.id.clone());
            index.insert(def.id.clone(), i as u16);
            block_defs.insert(def.id.clone(), def);
        }

        let mut item_palette = Vec::with_capacity(items.len());
        let mut item_defs = BTreeMap::new();
        for def in items {
            if item_defs.contains_key(&def.id) {
                return Err(CatalogError::DuplicateId {
                    kind: "item".to_string(),
                    id: def.id,
                });
            }
            item_palette.push(def.id.clone());
            item_defs.insert(def.id.clone(), def);
        }

        let mut recipe_map = BTreeMap::new();
        for r in recipes {
            let id = r.recipe_id.clone();
            if recipe_map.insert(id.clone(), r).is_some() {
                return Err(CatalogError::DuplicateId {
                    kind: "recipe".to_string(),
                    id,
                });
            }
        }
        let mut bp_map = BTreeMap::new();
        for bp in blueprints {
            for b in &bp.blocks {
                if !index.contains_key(&b.block) {
                    return Err(CatalogError::MissingBlock {
                        id: b.block.clone(),
                    });
                }
            }
            bp_map.insert(bp.id.clone(), bp);
        }
        let mut law_map = BTreeMap::new();
        for t in law_templates {
            law_map.insert(t.id.clone(), t);
        }
        let mut ev_map = BTreeMap::new();
        for t in event_templates {
            ev_map.insert(t.id.clone(), t);
        }

        let palette_digest = sha256_json(&palette)?;
        let item_palette_digest = sha256_json(&item_palette)?;
        let recipes_digest = sha256_json(&recipe_map)?;
        let blueprints_digest = sha256_json(&bp_map)?;
        let laws_digest = sha256_json(&law_map)?;
        let events_digest = sha256_json(&ev_map)?;

        Ok(Self {
            blocks: BlockCatalog {
                palette,
                index,
                defs: block_defs,
                palette_digest,
            },
            items: ItemCatalog {
                palette: item_palette,
                defs: item_defs,
                palette_digest: item_palette_digest,
            },
            recipes: RecipeCatalog {
                by_id: recipe_map,
                digest: recipes_digest,
            },
            blueprints: BlueprintCatalog {
                by_id: bp_map,
                digest: blueprints_digest,
            },
            laws: LawTemplateCatalog {
                by_id: law_map,
                digest: laws_digest,
            },
            events: EventCatalog {
                by_id: ev_map,
                digest: events_digest,
            },
        })
    }

    /// The default content set shipped with the engine, used by demos and
    /// tests. Real deployments load catalogs externally and pass them in.
    pub fn builtin() -> Self {
        let blocks = vec![
            block("AIR", false, false, ""),
            block("DIRT", true, true, "DIRT"),
            block("GRASS", true, true, "DIRT"),
            block("SAND", true, true, "SAND"),
            block("STONE", true, true, "STONE"),
            block("GRAVEL", true, true, "GRAVEL"),
            block("LOG", true, true, "LOG"),
            block("COAL_ORE", true, true, "COAL"),
            block("IRON_ORE", true, true, "IRON_ORE"),
            block("COPPER_ORE", true, true, "COPPER_ORE"),
            block("CRYSTAL_ORE", true, true, "CRYSTAL_SHARD"),
            block("PLANK", true, true, "PLANK"),
            block("ROAD", true, true, "PLANK"),
            block("CHEST", true, true, "CHEST"),
            block("FURNACE", true, true, "FURNACE"),
            block("CRAFTING_BENCH", true, true, "CRAFTING_BENCH"),
            block("TORCH", false, true, "TORCH"),
            block("SIGN", false, true, "SIGN"),
            block("BULLETIN_BOARD", true, true, "BULLETIN_BOARD"),
            block("CLAIM_TOTEM", true, true, "CLAIM_TOTEM"),
        ];
        let items = vec![
            item_block("PLANK"),
            item_block("LOG"),
            item_block("STONE"),
            item_block("DIRT"),
            item_block("SAND"),
            item_block("GRAVEL"),
            item_block("CHEST"),
            item_block("FURNACE"),
            item_block("CRAFTING_BENCH"),
            item_block("TORCH"),
            item_block("SIGN"),
            item_block("BULLETIN_BOARD"),
            item_block("CLAIM_TOTEM"),
            item_material("COAL"),
            item_material("IRON_ORE"),
            item_material("COPPER_ORE"),
            item_material("IRON_INGOT"),
            item_material("COPPER_INGOT"),
            item_material("CRYSTAL_SHARD"),
            item_material("STICK"),
            item_material("BATTERY"),
            item_material("ACCESS_TICKET"),
            item_tool("WOOD_PICKAXE"),
            item_tool("STONE_PICKAXE"),
            item_tool("IRON_PICKAXE"),
            item_food("BERRIES", 1),
            item_food("BREAD", 3),
        ];
        let recipes = vec![
            RecipeDef {
                recipe_id: "plank_from_log".to_string(),
                station: "HAND".to_string(),
                inputs: vec![ic("LOG", 1)],
                outputs: vec![ic("PLANK", 4)],
                tier: 0,
                time_ticks: 5,
            },
            RecipeDef {
                recipe_id: "stick".to_string(),
                station: "HAND".to_string(),
                inputs: vec![ic("PLANK", 2)],
                outputs: vec![ic("STICK", 4)],
                tier: 0,
                time_ticks: 3,
            },
            RecipeDef {
                recipe_id: "wood_pickaxe".to_string(),
                station: "CRAFTING_BENCH".to_string(),
                inputs: vec![ic("PLANK", 3), ic("STICK", 2)],
                outputs: vec![ic("WOOD_PICKAXE", 1)],
                tier: 1,
                time_ticks: 10,
            },
            RecipeDef {
                recipe_id: "bread".to_string(),
                station: "CRAFTING_BENCH".to_string(),
                inputs: vec![ic("BERRIES", 3)],
                outputs: vec![ic("BREAD", 1)],
                tier: 0,
                time_ticks: 8,
            },
        ];
        let blueprints = vec![
            BlueprintDef {
                id: "road_segment".to_string(),
                blocks: (0..5)
                    .map(|i| BlueprintBlock {
                        pos: [i, 0, 0],
                        block: "ROAD".to_string(),
                    })
                    .collect(),
                cost: vec![ic("PLANK", 5)],
            },
            BlueprintDef {
                id: "small_hut".to_string(),
                blocks: vec![
                    BlueprintBlock {
                        pos: [0, 0, 0],
                        block: "PLANK".to_string(),
                    },
                    BlueprintBlock {
                        pos: [1, 0, 0],
                        block: "PLANK".to_string(),
                    },
                    BlueprintBlock {
                        pos: [0, 0, 1],
                        block: "PLANK".to_string(),
                    },
                    BlueprintBlock {
                        pos: [1, 0, 1],
                        block: "PLANK".to_string(),
                    },
                    BlueprintBlock {
                        pos: [0, 1, 0],
                        block: "TORCH".to_string(),
                    },
                ],
                cost: vec![ic("PLANK", 4), ic("TORCH", 1)],
            },
        ];
        let law_templates = vec![
            law(
                "MARKET_TAX",
                "Market tax",
                "Taxes trades completed inside the claim.",
                &[("market_tax", "number")],
            ),
            law(
                "CURFEW_NO_BUILD",
                "Build curfew",
                "Forbids visitors from building or breaking during a daily window.",
                &[("start_time", "number"), ("end_time", "number")],
            ),
            law(
                "FINE_BREAK_PER_BLOCK",
                "Break fine",
                "Fines visitors attempting to break blocks without permission.",
                &[("fine_item", "item"), ("fine_per_block", "number")],
            ),
            law(
                "ACCESS_PASS_CORE",
                "Core access pass",
                "Charges a ticket to enter the claim core.",
                &[("ticket_item", "item"), ("ticket_cost", "number")],
            ),
        ];
        let event_templates = vec![
            event("MARKET_WEEK", "Market week", 1.0, 3000, 0),
            event("CRYSTAL_RIFT", "Crystal rift", 0.8, 3000, 48),
            event("BUILDER_EXPO", "Builder expo", 0.8, 3000, 0),
            event("FLOOD_WARNING", "Flood warning", 0.6, 1500, 64),
            event("BANDIT_CAMP", "Bandit camp", 0.5, 3000, 32),
            event("CIVIC_VOTE", "Civic vote", 0.7, 3000, 0),
        ];

        match Self::new(
            blocks,
            items,
            recipes,
            blueprints,
            law_templates,
            event_templates,
        ) {
            Ok(c) => c,
            // The builtin set is validated by tests; a failure here is a bug
            // in the table above, not a runtime condition.
            Err(err) => unreachable!("builtin catalogs invalid: {err}"),
        }
    }

    pub fn block_id(&self, name: &str) -> Option<u16> {
        self.blocks.index.get(name).copied()
    }

    pub fn block_name(&self, id: u16) -> &str {
        self.blocks
            .palette
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn block_solid(&self, id: u16) -> bool {
        self.blocks
            .defs
            .get(self.block_name(id))
            .map(|d| d.solid)
            .unwrap_or(false)
    }

    /// Item dropped when a block is mined; empty when it drops nothing.
    pub fn block_drop(&self, id: u16) -> &str {
        self.blocks
            .defs
            .get(self.block_name(id))
            .map(|d| d.drops_item.as_str())
            .unwrap_or("")
    }
}

fn block(id: &str, solid: bool, breakable: bool, drops: &str) -> BlockDef {
    BlockDef {
        id: id.to_string(),
        solid,
        breakable,
        drops_item: drops.to_string(),
    }
}

fn item_block(id: &str) -> ItemDef {
    ItemDef {
        id: id.to_string(),
        kind: "BLOCK".to_string(),
        place_as: id.to_string(),
        edible_hp: 0,
    }
}

fn item_material(id: &str) -> ItemDef {
    ItemDef {
        id: id.to_string(),
        kind: "MATERIAL".to_string(),
        place_as: String::new(),
        edible_hp: 0,
    }
}

fn item_tool(id: &str) -> ItemDef {
    ItemDef {
        id: id.to_string(),
        kind: "TOOL".to_string(),
        place_as: String::new(),
        edible_hp: 0,
    }
}

fn item_food(id: &str, hp: i64) -> ItemDef {
    ItemDef {
        id: id.to_string(),
        kind: "FOOD".to_string(),
        place_as: String::new(),
        edible_hp: hp,
    }
}

fn ic(item: &str, count: i64) -> ItemCount {
    ItemCount {
        item: item.to_string(),
        count,
    }
}

fn law(id: &str, title: &str, desc: &str, params: &[(&str, &str)]) -> LawTemplate {
    LawTemplate {
        id: id.to_string(),
        title: title.to_string(),
        description: desc.to_string(),
        params: params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

fn event(id: &str, title: &str, weight: f64, duration: u64, radius: i32) -> EventTemplate {
    EventTemplate {
        id: id.to_string(),
        title: title.to_string(),
        base_weight: weight,
        duration_ticks: duration,
        radius,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalogs_are_consistent() {
        let c = Catalogs::builtin();
        assert_eq!(c.block_id("AIR"), Some(0));
        assert!(c.block_id("CLAIM_TOTEM").is_some());
        assert!(!c.blocks.palette_digest.is_empty());
        assert!(!c.items.palette_digest.is_empty());
        assert!(c.recipes.by_id.contains_key("plank_from_log"));
        assert!(c.blueprints.by_id.contains_key("road_segment"));
        assert_eq!(c.laws.by_id.len(), 4);
        assert!(!c.block_solid(c.block_id("AIR").unwrap()));
        assert!(c.block_solid(c.block_id("STONE").unwrap()));
    }

    #[test]
    fn digests_are_stable_across_construction() {
        let a = Catalogs::builtin();
        let b = Catalogs::builtin();
        assert_eq!(a.blocks.palette_digest, b.blocks.palette_digest);
        assert_eq!(a.recipes.digest, b.recipes.digest);
        assert_eq!(a.events.digest, b.events.digest);
    }
}
