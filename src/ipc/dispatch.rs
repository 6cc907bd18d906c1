use log::{error, info};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};

use super::pipeline::PipelineHandle;
use super::runtime::{frames_socket_path, socket_path};
use crate::config::DaemonConfigState;

fn ok(data: Value) -> Value {
    json!({"ok": true, "data": data})
}

fn fail(msg: impl ToString) -> Value {
    json!({"ok": false, "error": msg.to_string()})
}

/// Answer one control request. Runs on the daemon's main loop, which owns
/// the config state.
pub fn dispatch_request(
    req: &Value,
    cfg: &mut DaemonConfigState,
    pipeline: &PipelineHandle,
    stop: &AtomicBool,
) -> Value {
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    match op {
        "status" => ok(json!({
            "enabled": pipeline.is_enabled(),
            "active_profile": cfg.active_name,
            "pointer_mode": cfg.profile.pointer.mode,
            "frames_seen": pipeline.frames_seen(),
            "socket": socket_path().ok(),
            "frames_socket": frames_socket_path().ok(),
        })),
        "reload" => match cfg.reload() {
            Ok(()) => {
                pipeline.update_profile(cfg.profile.clone());
                info!("profile '{}' reloaded", cfg.active_name);
                ok(json!({"active_profile": cfg.active_name}))
            }
            Err(e) => {
                error!("reload failed: {e}");
                fail(e)
            }
        },
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            if name.is_empty() {
                return fail("missing profile name");
            }
            match cfg.set_active(name) {
                Ok(()) => {
                    pipeline.update_profile(cfg.profile.clone());
                    info!("switched active profile to {}", cfg.active_name);
                    ok(json!({"active_profile": cfg.active_name}))
                }
                Err(e) => {
                    error!("use profile failed: {e}");
                    fail(e)
                }
            }
        }
        "list" => ok(json!({"profiles": cfg.list_profiles(), "active": cfg.active_name})),
        "doctor" => ok(cfg.doctor_report()),
        "enable" | "disable" | "toggle" => {
            let enabled = match op {
                "enable" => true,
                "disable" => false,
                _ => !pipeline.is_enabled(),
            };
            pipeline.set_enabled(enabled);
            ok(json!({"enabled": enabled}))
        }
        "get" => match req.get("key").and_then(|v| v.as_str()) {
            Some(key) => match cfg.profile.get_knob(key) {
                Ok(v) => ok(json!({"key": key, "value": v})),
                Err(e) => fail(e),
            },
            None => match cfg.profile.knobs() {
                Ok(v) => ok(v),
                Err(e) => fail(e),
            },
        },
        "set" => {
            let Some(key) = req.get("key").and_then(|v| v.as_str()) else {
                return fail("missing key");
            };
            let raw = match req.get("value") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => return fail("missing value"),
            };
            // in-memory only; a reload goes back to the file
            if let Err(e) = cfg.profile.set_knob(key, &raw) {
                return fail(e);
            }
            pipeline.update_profile(cfg.profile.clone());
            match cfg.profile.get_knob(key) {
                Ok(v) => {
                    info!("set {key} = {v}");
                    ok(json!({"key": key, "value": v}))
                }
                Err(e) => fail(e),
            }
        }
        "shutdown" => {
            stop.store(true, Ordering::Relaxed);
            ok(json!("shutting down"))
        }
        _ => fail(format!("unknown op: {op}")),
    }
}
