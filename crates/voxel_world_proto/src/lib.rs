//! Wire protocol for the voxel world engine.
//!
//! Every frame exchanged with a client is one of these serde types encoded as
//! a JSON object. The engine owns serialization; transports only move bytes.

mod act;
mod codes;
mod event;
mod obs;
mod session;

pub use act::{ActMsg, InstantReq, ItemStack, TaskReq};
pub use codes::{
    E_BAD_REQUEST, E_CONFLICT, E_INVALID_TARGET, E_NOT_FOUND, E_NO_PERMISSION, E_NO_RESOURCE,
    E_OUT_OF_RANGE, E_RATE_LIMIT,
};
pub use event::Event;
pub use obs::{
    EntityObs, LocalRulesObs, ObsMsg, SelfObs, TaskObs, VoxelDeltaOp, VoxelsObs, WorldObs,
};
pub use session::{CatalogDigests, CatalogMsg, DigestRef, WelcomeMsg, WorldParams};

/// Protocol version string, constant per build.
pub const PROTOCOL_VERSION: &str = "vw1";

pub const TYPE_WELCOME: &str = "WELCOME";
pub const TYPE_CATALOG: &str = "CATALOG";
pub const TYPE_OBS: &str = "OBS";
pub const TYPE_ACT: &str = "ACT";
