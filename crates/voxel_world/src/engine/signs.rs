//! Signs and bulletin boards riding on placed blocks.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Sign {
    pub text: String,
    pub updated_by: String,
    pub updated_tick: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Board {
    pub posts: Vec<BoardPost>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardPost {
    pub post_id: String,
    pub author: String,
    pub title: String,
    pub body: String,
    pub tick: u64,
}

/// Boards keep only the newest posts; older ones fall off.
pub const BOARD_MAX_POSTS: usize = 20;
