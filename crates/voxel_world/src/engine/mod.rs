//! The world engine: a single-owner, tick-driven state machine.
//!
//! Submodules by concern:
//! - `config`: world configuration and defaults
//! - `world`: the `World` aggregate and the per-tick step
//! - `agent`, `tasks`: agent records and task state machines
//! - `chunkstore`: chunked voxel storage with seeded generation
//! - `claims`, `orgs`, `laws`: land, organizations, governance
//! - `items`, `container`, `trades`, `signs`: world entities
//! - `instants`, `governance`, `task_handlers`: action handlers
//! - `movement`, `work`, `blueprint`, `environment`, `director`, `fun`:
//!   per-tick systems
//! - `session`, `transfer`: agent lifecycle in and out of the world
//! - `obs`, `snapshot`, `audit`: outputs
//! - `runtime`: the loop thread and request channels

mod agent;
mod audit;
mod blueprint;
mod chunkstore;
mod claims;
mod config;
mod container;
mod director;
mod environment;
mod events;
mod fun;
mod governance;
mod instants;
mod inventory;
mod items;
mod laws;
mod movement;
mod obs;
mod orgs;
mod requests;
mod runtime;
mod session;
mod signs;
mod snapshot;
mod task_handlers;
mod tasks;
mod trades;
mod transfer;
mod work;
mod world;

#[cfg(test)]
mod tests;

pub use agent::{Agent, RateWindow};
pub use audit::{AuditEntry, AuditSink, MemoryAuditSink};
pub use blueprint::rotate_offset;
pub use chunkstore::{biome_at, Chunk, ChunkKey, ChunkStore, WorldGen, CHUNK_SIZE};
pub use claims::{ClaimFlags, LandClaim, Permissions};
pub use config::{RateLimitConfig, WorldConfig};
pub use container::{container_id, parse_container_id, Container};
pub use fun::{FunDecayWindow, FunScore, Structure};
pub use inventory::Inventory;
pub use items::{ItemEntity, ITEM_ENTITY_TTL_TICKS};
pub use laws::{Law, LawStatus};
pub use orgs::{OrgKind, OrgRole, Organization};
pub use requests::{
    ActionEnvelope, AttachRequest, JoinRequest, JoinResponse, OutboundChannel, TransferInRequest,
    TransferInResponse, TransferOutRequest, TransferOutResponse,
};
pub use runtime::{RequestError, WorldHandle, WorldRunner};
pub use signs::{Board, BoardPost, Sign};
pub use snapshot::{ChunkV1, DirectorV1, SnapshotV1, SNAPSHOT_VERSION};
pub use tasks::{MoveKind, MoveTask, WorkKind, WorkTask};
pub use trades::Trade;
pub use transfer::{AgentTransfer, OrgTransfer};
pub use world::{Counters, World, WorldError};
