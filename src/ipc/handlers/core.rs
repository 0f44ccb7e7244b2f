use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::RecordStore;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "loggedIn": state.session.as_ref().map(|s| s.username.clone()),
        }),
    )
}

/// Opens (and seeds, on first use) the store in `path`. Any previous
/// session is dropped.
pub fn open_workspace(
    state: &mut AppState,
    path: PathBuf,
) -> Result<serde_json::Value, HandlerErr> {
    let store = RecordStore::open(&path).map_err(|e| {
        HandlerErr::new("store_open_failed", format!("{e:#}"))
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;
    let subjects = store.config().subjects.clone();
    tracing::info!(workspace = %path.display(), "workspace selected");
    state.workspace = Some(path.clone());
    state.store = Some(store);
    state.session = None;
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "subjects": subjects,
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = get_required_str(&req.params, "path")
        .and_then(|p| open_workspace(state, PathBuf::from(p)));
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
