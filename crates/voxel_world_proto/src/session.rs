//! Session handshake frames: WELCOME plus the ordered catalog set.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WelcomeMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub protocol_version: String,
    pub agent_id: String,
    pub resume_token: String,
    pub world_params: WorldParams,
    pub catalogs: CatalogDigests,
    pub current_world_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldParams {
    pub tick_rate_hz: i32,
    pub obs_radius: i32,
    pub day_ticks: i64,
    pub height: i32,
    pub seed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CatalogDigests {
    pub block_palette: DigestRef,
    pub item_palette: DigestRef,
    pub tuning_digest: String,
    pub recipes_digest: String,
    pub blueprints_digest: String,
    pub law_templates_digest: String,
    pub events_digest: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DigestRef {
    pub digest: String,
    pub count: usize,
}

/// One catalog payload. Each catalog ships as a single part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub protocol_version: String,
    pub name: String,
    pub digest: String,
    pub part: u32,
    pub total_parts: u32,
    pub data: serde_json::Value,
}
