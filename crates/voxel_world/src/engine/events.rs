//! Builders for the per-agent event payloads.

use serde_json::json;
use voxel_world_proto::Event;

pub fn action_result(tick: u64, ref_id: &str, ok: bool, code: &str, message: &str) -> Event {
    let mut ev = json!({
        "t": tick,
        "type": "ACTION_RESULT",
        "ref": ref_id,
        "ok": ok,
    });
    if let Some(obj) = ev.as_object_mut() {
        if !code.is_empty() {
            obj.insert("code".to_string(), json!(code));
        }
        if !message.is_empty() {
            obj.insert("message".to_string(), json!(message));
        }
    }
    ev
}

pub fn task_fail(tick: u64, task_id: &str, code: &str, message: &str) -> Event {
    json!({
        "t": tick,
        "type": "TASK_FAIL",
        "task_id": task_id,
        "code": code,
        "message": message,
    })
}

pub fn task_done(tick: u64, task_id: &str, kind: &str) -> Event {
    json!({
        "t": tick,
        "type": "TASK_DONE",
        "task_id": task_id,
        "kind": kind,
    })
}

pub fn task_cancelled(tick: u64, task_id: &str, kind: &str) -> Event {
    json!({
        "t": tick,
        "type": "TASK_CANCELLED",
        "task_id": task_id,
        "kind": kind,
    })
}
