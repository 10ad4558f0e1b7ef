//! Chunked voxel store with lazy, seed-pure generation.
//!
//! Chunks are 16x16 columns of `height` blocks. Terrain is a function of
//! (seed, x, z) only: a stone floor at y=0 and a rolled surface cell at y=1,
//! leaving air above. Blocks placed later can stack to any height inside the
//! configured ceiling.

use serde::{Deserialize, Serialize};

use crate::catalogs::Catalogs;
use crate::geometry::Vec3i;

pub const CHUNK_SIZE: i32 = 16;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ChunkKey {
    pub cx: i32,
    pub cz: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub cx: i32,
    pub cz: i32,
    pub height: i32,
    /// x fastest, then z, then y.
    pub blocks: Vec<u16>,

    dirty: bool,
    hash: [u8; 32],
}

impl Chunk {
    fn index(&self, x: i32, y: i32, z: i32) -> usize {
        (x + z * CHUNK_SIZE + y * CHUNK_SIZE * CHUNK_SIZE) as usize
    }

    pub fn get(&self, x: i32, y: i32, z: i32) -> u16 {
        self.blocks[self.index(x, y, z)]
    }

    pub fn set(&mut self, x: i32, y: i32, z: i32, b: u16) {
        let i = self.index(x, y, z);
        if self.blocks[i] == b {
            return;
        }
        self.blocks[i] = b;
        self.dirty = true;
    }

    /// Content digest of the raw block data, cached until the chunk changes.
    pub fn digest(&mut self) -> [u8; 32] {
        if self.dirty || self.hash == [0u8; 32] {
            let mut hasher = blake3::Hasher::new();
            for v in &self.blocks {
                hasher.update(&v.to_le_bytes());
            }
            self.hash = *hasher.finalize().as_bytes();
            self.dirty = false;
        }
        self.hash
    }
}

/// Terrain parameters, all derived from catalogs + config at startup.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldGen {
    pub seed: i64,
    pub boundary_r: i32,
    pub height: i32,
    pub biome_region_size: i32,

    pub air: u16,
    pub dirt: u16,
    pub sand: u16,
    pub stone: u16,
    pub gravel: u16,
    pub log: u16,
    pub coal_ore: u16,
    pub iron_ore: u16,
    pub copper_ore: u16,
    pub crystal_ore: u16,
}

impl WorldGen {
    pub fn from_catalogs(seed: i64, boundary_r: i32, height: i32, catalogs: &Catalogs) -> Self {
        let id = |name: &str| catalogs.block_id(name).unwrap_or(0);
        Self {
            seed,
            boundary_r,
            height: height.max(2),
            biome_region_size: 64,
            air: id("AIR"),
            dirt: id("DIRT"),
            sand: id("SAND"),
            stone: id("STONE"),
            gravel: id("GRAVEL"),
            log: id("LOG"),
            coal_ore: id("COAL_ORE"),
            iron_ore: id("IRON_ORE"),
            copper_ore: id("COPPER_ORE"),
            crystal_ore: id("CRYSTAL_ORE"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ChunkStore {
    pub gen: WorldGen,
    chunks: std::collections::BTreeMap<ChunkKey, Chunk>,
}

impl ChunkStore {
    pub fn new(gen: WorldGen) -> Self {
        Self {
            gen,
            chunks: std::collections::BTreeMap::new(),
        }
    }

    pub fn in_bounds(&self, pos: Vec3i) -> bool {
        if pos.y < 0 || pos.y >= self.gen.height {
            return false;
        }
        let r = self.gen.boundary_r;
        r <= 0 || (pos.x >= -r && pos.x <= r && pos.z >= -r && pos.z <= r)
    }

    pub fn loaded_chunk_keys(&self) -> Vec<ChunkKey> {
        self.chunks.keys().copied().collect()
    }

    pub fn loaded_chunks(&self) -> impl Iterator<Item = (&ChunkKey, &Chunk)> {
        self.chunks.iter()
    }

    pub fn get_block(&mut self, pos: Vec3i) -> u16 {
        if !self.in_bounds(pos) {
            return self.gen.air;
        }
        let cx = floor_div(pos.x, CHUNK_SIZE);
        let cz = floor_div(pos.z, CHUNK_SIZE);
        let lx = modulo(pos.x, CHUNK_SIZE);
        let lz = modulo(pos.z, CHUNK_SIZE);
        self.get_or_gen_chunk(cx, cz).get(lx, pos.y, lz)
    }

    pub fn set_block(&mut self, pos: Vec3i, b: u16) {
        if !self.in_bounds(pos) {
            return;
        }
        let cx = floor_div(pos.x, CHUNK_SIZE);
        let cz = floor_div(pos.z, CHUNK_SIZE);
        let lx = modulo(pos.x, CHUNK_SIZE);
        let lz = modulo(pos.z, CHUNK_SIZE);
        self.get_or_gen_chunk(cx, cz).set(lx, pos.y, lz, b);
    }

    /// Lowest y at which the column is air, i.e. where an agent stands.
    pub fn surface_y(&mut self, x: i32, z: i32) -> i32 {
        let air = self.gen.air;
        for y in 1..self.gen.height {
            if self.get_block(Vec3i::new(x, y, z)) == air {
                return y;
            }
        }
        self.gen.height - 1
    }

    /// Spiral scan for the nearest column whose standing cell carries no
    /// obstacle block, used for deterministic spawn placement.
    pub fn find_spawn(&mut self, x: i32, z: i32, max_r: i32) -> (i32, i32) {
        let air = self.gen.air;
        for r in 0..=max_r.max(0) {
            for dz in -r..=r {
                for dx in -r..=r {
                    if dx.abs() != r && dz.abs() != r {
                        continue;
                    }
                    let px = x + dx;
                    let pz = z + dz;
                    if !self.in_bounds(Vec3i::new(px, 1, pz)) {
                        continue;
                    }
                    if self.get_block(Vec3i::new(px, 1, pz)) == air {
                        return (px, pz);
                    }
                }
            }
        }
        (x, z)
    }

    pub fn import_chunk(&mut self, cx: i32, cz: i32, blocks: Vec<u16>) {
        let expected = (CHUNK_SIZE * CHUNK_SIZE * self.gen.height) as usize;
        if blocks.len() != expected {
            return;
        }
        let mut ch = Chunk {
            cx,
            cz,
            height: self.gen.height,
            blocks,
            dirty: true,
            hash: [0u8; 32],
        };
        let _ = ch.digest();
        self.chunks.insert(ChunkKey { cx, cz }, ch);
    }

    fn get_or_gen_chunk(&mut self, cx: i32, cz: i32) -> &mut Chunk {
        let key = ChunkKey { cx, cz };
        if !self.chunks.contains_key(&key) {
            let mut ch = Chunk {
                cx,
                cz,
                height: self.gen.height,
                blocks: vec![
                    self.gen.air;
                    (CHUNK_SIZE * CHUNK_SIZE * self.gen.height) as usize
                ],
                dirty: true,
                hash: [0u8; 32],
            };
            self.generate_chunk(&mut ch);
            let _ = ch.digest();
            self.chunks.insert(key, ch);
        }
        self.chunks.get_mut(&key).expect("chunk just inserted")
    }

    fn generate_chunk(&self, ch: &mut Chunk) {
        let g = &self.gen;
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let wx = ch.cx * CHUNK_SIZE + x;
                let wz = ch.cz * CHUNK_SIZE + z;

                ch.set(x, 0, z, g.stone);

                // One rolled surface cell per column; most stay air.
                let roll = hash2(g.seed, wx, wz) % 1000;
                let b = match roll {
                    0..=9 => g.crystal_ore,
                    10..=29 => g.iron_ore,
                    30..=59 => g.copper_ore,
                    60..=99 => g.coal_ore,
                    100..=179 => g.stone,
                    180..=239 => g.log,
                    240..=299 => {
                        if biome_at(g.seed, wx, wz, g.biome_region_size) == "DESERT" {
                            g.sand
                        } else {
                            g.dirt
                        }
                    }
                    300..=329 => g.sand,
                    330..=349 => g.gravel,
                    _ => g.air,
                };
                ch.set(x, 1, z, b);
            }
        }
    }
}

pub fn floor_div(a: i32, b: i32) -> i32 {
    let q = a / b;
    let r = a % b;
    if r < 0 {
        q - 1
    } else {
        q
    }
}

pub fn modulo(a: i32, b: i32) -> i32 {
    let m = a % b;
    if m < 0 {
        m + b
    } else {
        m
    }
}

fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

pub fn hash2(seed: i64, x: i32, z: i32) -> u64 {
    let ux = (x as u32) as u64;
    let uz = (z as u32) as u64;
    mix64(
        (seed as u64)
            ^ ux.wrapping_mul(0x9e37_79b9_7f4a_7c15)
            ^ uz.wrapping_mul(0xbf58_476d_1ce4_e5b9),
    )
}

pub fn biome_at(seed: i64, x: i32, z: i32, region_size: i32) -> &'static str {
    let rs = region_size.max(1);
    let rx = floor_div(x, rs);
    let rz = floor_div(z, rs);
    match hash2(seed, rx, rz) % 3 {
        0 => "PLAINS",
        1 => "FOREST",
        _ => "DESERT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ChunkStore {
        let cats = Catalogs::builtin();
        ChunkStore::new(WorldGen::from_catalogs(42, 4000, 64, &cats))
    }

    #[test]
    fn generation_is_seed_pure() {
        let mut a = store();
        let mut b = store();
        for x in -20..20 {
            for z in -20..20 {
                let p = Vec3i::new(x, 1, z);
                assert_eq!(a.get_block(p), b.get_block(p));
            }
        }
    }

    #[test]
    fn set_block_changes_digest() {
        let mut s = store();
        let p = Vec3i::new(3, 1, 3);
        let before = s.get_or_gen_chunk(0, 0).digest();
        let stone = s.gen.stone;
        let air = s.gen.air;
        let cur = s.get_block(p);
        s.set_block(p, if cur == stone { air } else { stone });
        let after = s.get_or_gen_chunk(0, 0).digest();
        assert_ne!(before, after);
    }

    #[test]
    fn out_of_bounds_reads_air() {
        let mut s = store();
        assert_eq!(s.get_block(Vec3i::new(5000, 1, 0)), s.gen.air);
        assert_eq!(s.get_block(Vec3i::new(0, -1, 0)), s.gen.air);
        assert_eq!(s.get_block(Vec3i::new(0, 64, 0)), s.gen.air);
    }

    #[test]
    fn surface_tracks_placed_blocks() {
        let mut s = store();
        let (x, z) = s.find_spawn(0, 0, 8);
        assert_eq!(s.surface_y(x, z), 1);
        let stone = s.gen.stone;
        s.set_block(Vec3i::new(x, 1, z), stone);
        assert_eq!(s.surface_y(x, z), 2);
    }
}
