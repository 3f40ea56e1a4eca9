use crate::db;
use crate::ipc::helpers::{require_db, required_str, respond, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, _req: &Request) -> HandlerResult {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "dbFile": db::DB_FILE_NAME
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> HandlerResult {
    let path = PathBuf::from(required_str(&req.params, "path")?);
    state
        .open_workspace(&path)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

fn handle_owners_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let name = required_str(&req.params, "name")?;
    let owner_id = SqliteStore::new(conn).create_owner(name)?;
    Ok(json!({ "ownerId": owner_id, "name": name }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        "owners.create" => handle_owners_create(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
