//! Authoritative simulation core of a multi-agent voxel world.
//!
//! The engine is a single-owner state machine advanced one tick at a time.
//! External callers talk to it only through typed request channels; every
//! side effect on world state happens on the tick loop.

pub mod catalogs;
pub mod engine;
pub mod geometry;
