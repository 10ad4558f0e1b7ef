//! Trade records. Handlers live with the other instants.

use serde::{Deserialize, Serialize};

use crate::engine::inventory::Inventory;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub from: String,
    pub to: String,
    pub offer: Inventory,
    pub request: Inventory,
    pub created_tick: u64,
}
