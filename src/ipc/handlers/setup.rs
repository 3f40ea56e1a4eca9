use crate::config::{self, SetupSection, SECTIONS};
use crate::ipc::helpers::{require_db, required_str, respond, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

fn handle_setup_get(state: &mut AppState, _req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let mut out = Map::new();
    for section in SECTIONS {
        out.insert(
            section.name().to_string(),
            config::load_section(conn, section)?,
        );
    }
    Ok(Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let section_raw = required_str(&req.params, "section")?;
    let section = SetupSection::parse(section_raw)
        .ok_or_else(|| HandlerErr::bad_params("unknown section"))?;
    let patch = req
        .params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

    let saved = config::update_section(conn, section, patch)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?
        .map_err(HandlerErr::bad_params)?;
    Ok(json!({ "ok": true, "section": section.name(), "values": saved }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "setup.get" => handle_setup_get(state, req),
        "setup.update" => handle_setup_update(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
