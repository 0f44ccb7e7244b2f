use crate::ipc::helpers::{require_session, require_store, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn grades_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state)?;
    let store = require_store(state)?;
    let grades = store.grades_for(&session.username, session.is_admin)?;
    Ok(json!({ "grades": grades }))
}

fn activities_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state)?;
    let store = require_store(state)?;
    let activities = store.activities_for(&session.username, session.is_admin)?;
    Ok(json!({ "activities": activities }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.list" => grades_list(state),
        "activities.list" => activities_list(state),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
