use crate::ipc::helpers::{get_required_str, require_store, respond, HandlerErr};
use crate::ipc::types::{AppState, Request, Session};
use serde_json::json;

fn auth_login(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let username = get_required_str(params, "username")?;
    let password = get_required_str(params, "password")?;
    let store = require_store(state)?;

    if !store.authenticate(&username, &password) {
        tracing::info!(username = %username, "login rejected");
        state.session = None;
        return Ok(json!({ "authenticated": false }));
    }

    let is_admin = store.is_admin(&username);
    // A credential without an account line still logs in; it just has no profile.
    let account = store.account(&username).ok();
    tracing::info!(username = %username, is_admin, "login accepted");
    state.session = Some(Session {
        username: username.clone(),
        is_admin,
    });
    Ok(json!({
        "authenticated": true,
        "username": username,
        "isAdmin": is_admin,
        "account": account,
    }))
}

fn handle_auth_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(&req.id, auth_login(state, &req.params))
}

fn handle_auth_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session = None;
    respond(&req.id, Ok(json!({ "ok": true })))
}

fn handle_auth_is_admin(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = get_required_str(&req.params, "username").and_then(|username| {
        let store = require_store(state)?;
        Ok(json!({ "isAdmin": store.is_admin(&username) }))
    });
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_auth_login(state, req)),
        "auth.logout" => Some(handle_auth_logout(state, req)),
        "auth.isAdmin" => Some(handle_auth_is_admin(state, req)),
        _ => None,
    }
}
