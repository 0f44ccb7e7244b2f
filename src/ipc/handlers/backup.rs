use crate::backup;
use crate::ipc::helpers::{get_required_str, require_admin, require_store, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn backup_export(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_admin(state)?;
    let store = require_store(state)?;
    let out_path = get_required_str(params, "outPath")?.trim().to_string();
    if out_path.is_empty() {
        return Err(HandlerErr::new("bad_params", "missing outPath"));
    }

    let export = backup::export_workspace_bundle(
        store.workspace(),
        &store.config().store_files(),
        &PathBuf::from(&out_path),
    )
    .map_err(|e| {
        HandlerErr::new("backup_failed", format!("{e:#}")).with_details(json!({ "path": out_path }))
    })?;
    tracing::info!(path = %out_path, entries = export.entry_count, "workspace exported");

    Ok(json!({
        "ok": true,
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count
    }))
}

fn backup_import(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_admin(state)?;
    let store = require_store(state)?;
    let in_path = get_required_str(params, "inPath")?.trim().to_string();
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    let import =
        backup::import_workspace_bundle(&src, store.workspace(), &store.config().store_files())
            .map_err(|e| {
                HandlerErr::new("backup_failed", format!("{e:#}"))
                    .with_details(json!({ "path": in_path }))
            })?;
    tracing::info!(path = %in_path, files = ?import.restored_files, "workspace restored");

    Ok(json!({
        "ok": true,
        "bundleFormatDetected": import.bundle_format_detected,
        "restoredFiles": import.restored_files,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => backup_export(state, &req.params),
        "backup.importWorkspaceBundle" => backup_import(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
