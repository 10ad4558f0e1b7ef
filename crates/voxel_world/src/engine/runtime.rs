//! The tick loop thread and the request-channel handle.
//!
//! The runner owns the `World`; the handle owns the sending half of every
//! request channel. Requests are drained once per tick in a fixed priority
//! order (transfer, attach, join, action), which makes request application
//! deterministic given the same arrival stream.

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use voxel_world_proto::ActMsg;

use crate::engine::requests::{
    ActionEnvelope, AttachRequest, JoinRequest, JoinResponse, OutboundChannel, TransferInRequest,
    TransferInResponse, TransferOutRequest, TransferOutResponse,
};
use crate::engine::transfer::AgentTransfer;
use crate::engine::world::World;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The engine stopped or the channel closed.
    Closed,
    Timeout,
    /// The engine replied with an error.
    Engine(String),
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::Closed => write!(f, "engine closed"),
            RequestError::Timeout => write!(f, "request timed out"),
            RequestError::Engine(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RequestError {}

/// Cloneable request-side of a running world.
#[derive(Clone)]
pub struct WorldHandle {
    join_tx: Sender<JoinRequest>,
    attach_tx: Sender<AttachRequest>,
    action_tx: Sender<ActionEnvelope>,
    leave_tx: Sender<String>,
    transfer_out_tx: Sender<TransferOutRequest>,
    transfer_in_tx: Sender<TransferInRequest>,
    stop_tx: Sender<()>,
}

impl WorldHandle {
    pub fn join(
        &self,
        name: &str,
        delta_voxels: bool,
        out: Option<OutboundChannel>,
        timeout: Duration,
    ) -> Result<JoinResponse, RequestError> {
        let (resp_tx, resp_rx) = channel();
        self.join_tx
            .send(JoinRequest {
                name: name.to_string(),
                delta_voxels,
                out,
                resp: Some(resp_tx),
            })
            .map_err(|_| RequestError::Closed)?;
        recv_reply(&resp_rx, timeout)
    }

    pub fn attach(
        &self,
        resume_token: &str,
        delta_voxels: bool,
        out: Option<OutboundChannel>,
        timeout: Duration,
    ) -> Result<JoinResponse, RequestError> {
        let (resp_tx, resp_rx) = channel();
        self.attach_tx
            .send(AttachRequest {
                resume_token: resume_token.to_string(),
                delta_voxels,
                out,
                resp: Some(resp_tx),
            })
            .map_err(|_| RequestError::Closed)?;
        recv_reply(&resp_rx, timeout)
    }

    /// Enqueues one per-tick action bundle; applied at the next boundary.
    pub fn submit_act(&self, agent_id: &str, act: ActMsg) -> Result<(), RequestError> {
        self.action_tx
            .send(ActionEnvelope {
                agent_id: agent_id.to_string(),
                act,
            })
            .map_err(|_| RequestError::Closed)
    }

    /// Unbinds the client channel; the agent stays in the world.
    pub fn leave(&self, agent_id: &str) -> Result<(), RequestError> {
        self.leave_tx
            .send(agent_id.to_string())
            .map_err(|_| RequestError::Closed)
    }

    pub fn transfer_out(
        &self,
        agent_id: &str,
        timeout: Duration,
    ) -> Result<AgentTransfer, RequestError> {
        let (resp_tx, resp_rx) = channel();
        self.transfer_out_tx
            .send(TransferOutRequest {
                agent_id: agent_id.to_string(),
                resp: Some(resp_tx),
            })
            .map_err(|_| RequestError::Closed)?;
        let resp: TransferOutResponse = recv_reply(&resp_rx, timeout)?;
        if !resp.err.is_empty() {
            return Err(RequestError::Engine(resp.err));
        }
        resp.transfer.ok_or(RequestError::Closed)
    }

    pub fn transfer_in(
        &self,
        transfer: AgentTransfer,
        out: Option<OutboundChannel>,
        delta_voxels: bool,
        timeout: Duration,
    ) -> Result<(), RequestError> {
        let (resp_tx, resp_rx) = channel();
        self.transfer_in_tx
            .send(TransferInRequest {
                transfer,
                out,
                delta_voxels,
                resp: Some(resp_tx),
            })
            .map_err(|_| RequestError::Closed)?;
        let resp: TransferInResponse = recv_reply(&resp_rx, timeout)?;
        if !resp.err.is_empty() {
            return Err(RequestError::Engine(resp.err));
        }
        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

fn recv_reply<T>(rx: &Receiver<T>, timeout: Duration) -> Result<T, RequestError> {
    match rx.recv_timeout(timeout) {
        Ok(v) => Ok(v),
        Err(RecvTimeoutError::Timeout) => Err(RequestError::Timeout),
        Err(RecvTimeoutError::Disconnected) => Err(RequestError::Closed),
    }
}

/// Owns the world and drives it at the configured tick rate until stopped.
pub struct WorldRunner {
    world: World,
    join_rx: Receiver<JoinRequest>,
    attach_rx: Receiver<AttachRequest>,
    action_rx: Receiver<ActionEnvelope>,
    leave_rx: Receiver<String>,
    transfer_out_rx: Receiver<TransferOutRequest>,
    transfer_in_rx: Receiver<TransferInRequest>,
    stop_rx: Receiver<()>,
}

impl WorldRunner {
    pub fn new(world: World) -> (Self, WorldHandle) {
        let (join_tx, join_rx) = channel();
        let (attach_tx, attach_rx) = channel();
        let (action_tx, action_rx) = channel();
        let (leave_tx, leave_rx) = channel();
        let (transfer_out_tx, transfer_out_rx) = channel();
        let (transfer_in_tx, transfer_in_rx) = channel();
        let (stop_tx, stop_rx) = channel();
        (
            Self {
                world,
                join_rx,
                attach_rx,
                action_rx,
                leave_rx,
                transfer_out_rx,
                transfer_in_rx,
                stop_rx,
            },
            WorldHandle {
                join_tx,
                attach_tx,
                action_tx,
                leave_tx,
                transfer_out_tx,
                transfer_in_tx,
                stop_tx,
            },
        )
    }

    /// Spawns the loop on its own thread.
    pub fn spawn(world: World) -> (WorldHandle, thread::JoinHandle<()>) {
        let (runner, handle) = Self::new(world);
        let join = thread::spawn(move || runner.run());
        (handle, join)
    }

    pub fn run(mut self) {
        let hz = self.world.config().tick_rate_hz.max(1) as f64;
        let interval = Duration::from_secs_f64(1.0 / hz);
        let mut next_tick = Instant::now() + interval;

        loop {
            if self.stop_rx.try_recv().is_ok() {
                return;
            }
            let now = Instant::now();
            if now < next_tick {
                thread::sleep(next_tick - now);
            }
            next_tick += interval;

            self.tick_once();
        }
    }

    /// Drains every request channel in priority order and steps the world.
    fn tick_once(&mut self) {
        let transfer_outs: Vec<_> = self.transfer_out_rx.try_iter().collect();
        let transfer_ins: Vec<_> = self.transfer_in_rx.try_iter().collect();
        for req in self.attach_rx.try_iter() {
            self.world.handle_attach(req);
        }
        let joins: Vec<_> = self.join_rx.try_iter().collect();
        let leaves: Vec<_> = self.leave_rx.try_iter().collect();
        let actions: Vec<_> = self.action_rx.try_iter().collect();

        self.world
            .step_internal(transfer_outs, transfer_ins, joins, leaves, actions);
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}
