use crate::backup;
use crate::db;
use crate::ipc::helpers::{required_str, respond, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn workspace_path(state: &AppState) -> Result<PathBuf, HandlerErr> {
    state
        .workspace
        .clone()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn handle_export_bundle(state: &mut AppState, req: &Request) -> HandlerResult {
    let workspace = workspace_path(state)?;
    let out_path = PathBuf::from(required_str(&req.params, "outPath")?);
    let summary = backup::export_workspace_bundle(&workspace.join(db::DB_FILE_NAME), &out_path)
        .map_err(|e| HandlerErr::new("io_failed", format!("{e:#}")))?;
    tracing::info!(path = %out_path.display(), bytes = summary.db_bytes, "workspace exported");
    Ok(json!({
        "ok": true,
        "path": out_path.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "dbSha256": summary.db_sha256
    }))
}

/// Swaps the workspace database for the bundle's copy, then reopens it.
fn handle_import_bundle(state: &mut AppState, req: &Request) -> HandlerResult {
    let workspace = workspace_path(state)?;
    let in_path = PathBuf::from(required_str(&req.params, "inPath")?);

    state.close_workspace();
    let imported = backup::import_workspace_bundle(&in_path, &workspace.join(db::DB_FILE_NAME));
    // Reopen whichever database is now on disk, even if the import failed.
    state
        .open_workspace(&workspace)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;
    let summary = imported.map_err(|e| HandlerErr::new("import_failed", format!("{e:#}")))?;

    tracing::info!(path = %in_path.display(), bytes = summary.db_bytes, "workspace imported");
    Ok(json!({
        "ok": true,
        "bundleFormat": summary.bundle_format,
        "exportedAt": summary.exported_at,
        "workspacePath": workspace.to_string_lossy()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => handle_export_bundle(state, req),
        "backup.importWorkspaceBundle" => handle_import_bundle(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
