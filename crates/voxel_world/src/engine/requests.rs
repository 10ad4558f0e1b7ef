//! Typed requests entering the engine, each carrying its reply channel.

use std::sync::mpsc::{Sender, SyncSender};

use voxel_world_proto::{ActMsg, CatalogMsg, WelcomeMsg};

use crate::engine::transfer::AgentTransfer;

/// Outbound byte channel bound to one client. The engine writes serialized
/// JSON frames with a non-blocking send; a full channel drops the frame.
pub type OutboundChannel = SyncSender<Vec<u8>>;

pub struct JoinRequest {
    pub name: String,
    pub delta_voxels: bool,
    pub out: Option<OutboundChannel>,
    pub resp: Option<Sender<JoinResponse>>,
}

pub struct AttachRequest {
    pub resume_token: String,
    pub delta_voxels: bool,
    pub out: Option<OutboundChannel>,
    pub resp: Option<Sender<JoinResponse>>,
}

/// Reply to join/attach. An unknown resume token yields the default value.
#[derive(Debug, Clone, Default)]
pub struct JoinResponse {
    pub welcome: WelcomeMsg,
    pub catalogs: Vec<CatalogMsg>,
}

pub struct ActionEnvelope {
    pub agent_id: String,
    pub act: ActMsg,
}

pub struct TransferOutRequest {
    pub agent_id: String,
    pub resp: Option<Sender<TransferOutResponse>>,
}

#[derive(Debug, Clone, Default)]
pub struct TransferOutResponse {
    pub transfer: Option<AgentTransfer>,
    pub err: String,
}

pub struct TransferInRequest {
    pub transfer: AgentTransfer,
    pub out: Option<OutboundChannel>,
    pub delta_voxels: bool,
    pub resp: Option<Sender<TransferInResponse>>,
}

#[derive(Debug, Clone, Default)]
pub struct TransferInResponse {
    pub err: String,
}
