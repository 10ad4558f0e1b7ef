//! Deterministic snapshot export/import and the replay digest.
//!
//! The snapshot is the canonical serialization of everything the simulation
//! depends on: sorted entity lists, chunk data, counters, director state and
//! per-agent rate-limit windows. Client bindings and resume tokens stay out.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::engine::agent::Agent;
use crate::engine::claims::LandClaim;
use crate::engine::config::WorldConfig;
use crate::engine::container::Container;
use crate::engine::fun::Structure;
use crate::engine::items::ItemEntity;
use crate::engine::laws::Law;
use crate::engine::orgs::Organization;
use crate::engine::signs::{Board, Sign};
use crate::engine::trades::Trade;
use crate::engine::world::{Counters, World, WorldError};
use crate::geometry::Vec3i;

pub const SNAPSHOT_VERSION: u32 = 1;

fn default_snapshot_version() -> u32 {
    SNAPSHOT_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkV1 {
    pub cx: i32,
    pub cz: i32,
    pub blocks: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DirectorV1 {
    pub weather: String,
    pub weather_until_tick: u64,
    pub active_event_id: String,
    pub active_event_start: u64,
    pub active_event_ends: u64,
    pub active_event_center: [i32; 3],
    pub active_event_radius: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotV1 {
    #[serde(default = "default_snapshot_version")]
    pub version: u32,
    pub world_id: String,
    pub tick: u64,
    pub config: WorldConfig,

    pub agents: Vec<Agent>,
    pub orgs: Vec<Organization>,
    pub claims: Vec<LandClaim>,
    pub laws: Vec<Law>,
    pub containers: Vec<Container>,
    pub items: Vec<ItemEntity>,
    pub trades: Vec<Trade>,
    pub boards: Vec<(Vec3i, Board)>,
    pub signs: Vec<(Vec3i, Sign)>,
    pub structures: Vec<Structure>,
    pub chunks: Vec<ChunkV1>,

    pub director: DirectorV1,
    pub counters: Counters,
}

impl SnapshotV1 {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(input: &str) -> Result<Self, WorldError> {
        let snap: Self =
            serde_json::from_str(input).map_err(|e| WorldError::BadConfig(e.to_string()))?;
        snap.validate_version()?;
        Ok(snap)
    }

    pub fn validate_version(&self) -> Result<(), WorldError> {
        if self.version == SNAPSHOT_VERSION {
            Ok(())
        } else {
            Err(WorldError::BadConfig(format!(
                "unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            )))
        }
    }
}

impl World {
    /// Exports the deterministic world state at `tick`. Every list is sorted
    /// by its identity; map-backed state is already ordered.
    pub fn export_snapshot(&self, tick: u64) -> SnapshotV1 {
        let chunks: Vec<ChunkV1> = self
            .chunks
            .loaded_chunks()
            .map(|(_, ch)| ChunkV1 {
                cx: ch.cx,
                cz: ch.cz,
                blocks: ch.blocks.clone(),
            })
            .collect();

        SnapshotV1 {
            version: SNAPSHOT_VERSION,
            world_id: self.cfg.id.clone(),
            tick,
            config: self.cfg.clone(),
            agents: self.agents.values().cloned().collect(),
            orgs: self.orgs.values().cloned().collect(),
            claims: self.claims.values().cloned().collect(),
            laws: self.laws.values().cloned().collect(),
            containers: self.containers.values().cloned().collect(),
            items: self.items.values().cloned().collect(),
            trades: self.trades.values().cloned().collect(),
            boards: self.boards.iter().map(|(p, b)| (*p, b.clone())).collect(),
            signs: self.signs.iter().map(|(p, s)| (*p, s.clone())).collect(),
            structures: self.structures.values().cloned().collect(),
            chunks,
            director: DirectorV1 {
                weather: self.weather.clone(),
                weather_until_tick: self.weather_until_tick,
                active_event_id: self.active_event_id.clone(),
                active_event_start: self.active_event_start,
                active_event_ends: self.active_event_ends,
                active_event_center: self.active_event_center.to_array(),
                active_event_radius: self.active_event_radius,
            },
            counters: self.counters,
        }
    }

    /// Restores a snapshot into this world. Clients are not restored; they
    /// re-attach with resume tokens issued after import.
    pub fn import_snapshot(&mut self, snap: SnapshotV1) -> Result<(), WorldError> {
        snap.validate_version()?;
        self.cfg = snap.config.sanitized();
        self.tick = snap.tick;
        self.counters = snap.counters;

        self.agents.clear();
        self.clients.clear();
        for mut a in snap.agents {
            a.events.clear();
            a.resume_token = String::new();
            self.agents.insert(a.id.clone(), a);
        }
        self.orgs = snap.orgs.into_iter().map(|o| (o.org_id.clone(), o)).collect();
        self.claims = snap
            .claims
            .into_iter()
            .map(|c| (c.land_id.clone(), c))
            .collect();
        self.laws = snap.laws.into_iter().map(|l| (l.law_id.clone(), l)).collect();
        self.containers = snap.containers.into_iter().map(|c| (c.pos, c)).collect();

        self.items.clear();
        self.items_at.clear();
        for e in snap.items {
            self.items_at
                .entry(e.pos)
                .or_default()
                .push(e.entity_id.clone());
            self.items.insert(e.entity_id.clone(), e);
        }

        self.trades = snap
            .trades
            .into_iter()
            .map(|t| (t.trade_id.clone(), t))
            .collect();
        self.boards = snap.boards.into_iter().collect();
        self.signs = snap.signs.into_iter().collect();
        self.structures = snap
            .structures
            .into_iter()
            .map(|s| (s.structure_id.clone(), s))
            .collect();

        for ch in snap.chunks {
            self.chunks.import_chunk(ch.cx, ch.cz, ch.blocks);
        }

        self.weather = snap.director.weather;
        self.weather_until_tick = snap.director.weather_until_tick;
        self.active_event_id = snap.director.active_event_id;
        self.active_event_start = snap.director.active_event_start;
        self.active_event_ends = snap.director.active_event_ends;
        self.active_event_center = Vec3i::from_array(snap.director.active_event_center);
        self.active_event_radius = snap.director.active_event_radius;

        Ok(())
    }

    /// SHA-256 over the tick and the canonical snapshot serialization. Two
    /// engines fed the same seed and ordered action stream produce equal
    /// digests at every tick.
    pub fn state_digest(&self, tick: u64) -> String {
        let snap = self.export_snapshot(tick);
        let bytes = serde_json::to_vec(&snap).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(tick.to_le_bytes());
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }
}
