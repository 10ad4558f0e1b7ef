//! Per-agent event payloads.
//!
//! Events are open JSON objects so new event kinds never require a protocol
//! bump. `serde_json::Value` objects are backed by a sorted map, which keeps
//! their serialization deterministic.

/// One event queued for an agent, delivered in its next OBS batch.
pub type Event = serde_json::Value;
