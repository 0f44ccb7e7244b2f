use crate::ipc::helpers::{
    get_optional_str, get_required_str, require_admin, require_session, require_store, respond,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::records::Role;
use crate::store::NewAccount;
use serde_json::json;

fn parse_role(raw: Option<String>) -> Result<Option<Role>, HandlerErr> {
    match raw {
        None => Ok(None),
        Some(r) => Role::parse(&r)
            .map(Some)
            .ok_or_else(|| HandlerErr::new("bad_params", format!("unknown role: {}", r))),
    }
}

/// Free-form text field; absent or null reads as empty so validation can
/// report the missing field by name.
fn text_param(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(String::new()),
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(HandlerErr::new(
            "bad_params",
            format!("{} must be a string", key),
        )),
    }
}

fn mark_text(v: &serde_json::Value) -> Result<String, HandlerErr> {
    match v {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        _ => Err(HandlerErr::new("bad_params", "mark must be a string or number")),
    }
}

/// Accepts `[{"subject": .., "mark": ..}]` or `{"Subject": mark}`.
fn parse_marks(v: Option<&serde_json::Value>) -> Result<Vec<(String, String)>, HandlerErr> {
    let Some(v) = v else {
        return Ok(Vec::new());
    };
    match v {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| -> Result<(String, String), HandlerErr> {
                let subject = get_required_str(item, "subject")?;
                let mark = mark_text(item.get("mark").unwrap_or(&serde_json::Value::Null))?;
                Ok((subject, mark))
            })
            .collect(),
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(subject, mark)| -> Result<(String, String), HandlerErr> {
                Ok((subject.clone(), mark_text(mark)?))
            })
            .collect(),
        _ => Err(HandlerErr::new("bad_params", "marks must be an array or object")),
    }
}

fn parse_activities(v: Option<&serde_json::Value>) -> Result<String, HandlerErr> {
    match v {
        None | Some(serde_json::Value::Null) => Ok(String::new()),
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Array(items)) => {
            let names: Option<Vec<&str>> = items.iter().map(|x| x.as_str()).collect();
            names
                .map(|n| n.join(","))
                .ok_or_else(|| HandlerErr::new("bad_params", "activities must be strings"))
        }
        Some(_) => Err(HandlerErr::new(
            "bad_params",
            "activities must be a string or array",
        )),
    }
}

fn accounts_list(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_admin(state)?;
    let store = require_store(state)?;
    let role = parse_role(get_optional_str(params, "role"))?;
    let loaded = store.list_accounts(role)?;
    Ok(json!({
        "accounts": loaded.records,
        "skippedLines": loaded.skipped.len(),
    }))
}

fn accounts_get(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state)?;
    let store = require_store(state)?;
    let username = get_optional_str(params, "username").unwrap_or_else(|| session.username.clone());
    if username != session.username && !session.is_admin {
        return Err(HandlerErr::new("forbidden", "cannot view another account"));
    }
    let account = store.account(&username)?;
    Ok(json!({ "account": account }))
}

fn accounts_create(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_admin(state)?;
    let store = require_store(state)?;

    let full_name = match params.get("fullName") {
        Some(_) => text_param(params, "fullName")?,
        None => text_param(params, "name")?,
    };
    let input = NewAccount {
        username: text_param(params, "username")?,
        password: text_param(params, "password")?,
        full_name,
        email: text_param(params, "email")?,
        phone: text_param(params, "phone")?,
        role: parse_role(get_optional_str(params, "role"))?.unwrap_or(Role::Student),
        marks: parse_marks(params.get("marks"))?,
        activities: parse_activities(params.get("activities"))?,
    };

    let outcome = store.add_account(&input)?;
    Ok(json!({
        "account": outcome.account,
        "warnings": outcome.warnings,
    }))
}

fn accounts_delete(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_admin(state)?;
    let store = require_store(state)?;
    let username = get_required_str(params, "username")?;
    let summary = store.delete_account(username.trim())?;
    Ok(json!({
        "deleted": summary.deleted(),
        "removed": {
            "accounts": summary.accounts,
            "credentials": summary.credentials,
            "grades": summary.grades,
            "activities": summary.activities,
        }
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "accounts.list" => accounts_list(state, &req.params),
        "accounts.get" => accounts_get(state, &req.params),
        "accounts.create" => accounts_create(state, &req.params),
        "accounts.delete" => accounts_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
