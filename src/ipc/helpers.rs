use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Session};
use crate::store::{RecordStore, StoreError, ValidationError};
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        let details = match &e {
            StoreError::Validation(ValidationError::MissingField { field })
            | StoreError::Validation(ValidationError::EmbeddedDelimiter { field }) => {
                Some(json!({ "field": field }))
            }
            StoreError::Validation(ValidationError::InvalidMark { subject, value }) => {
                Some(json!({ "subject": subject, "value": value }))
            }
            StoreError::Validation(ValidationError::UnknownSubject { subject }) => {
                Some(json!({ "subject": subject }))
            }
            StoreError::Validation(ValidationError::DuplicateUsername { username })
            | StoreError::NotFound { username } => Some(json!({ "username": username })),
            StoreError::IdExhausted { prefix, max } => {
                Some(json!({ "prefix": prefix, "max": max }))
            }
            StoreError::Io { path, .. } => Some(json!({ "path": path.to_string_lossy() })),
            StoreError::Validation(_) => None,
        };
        Self {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn require_store(state: &AppState) -> Result<&RecordStore, HandlerErr> {
    state
        .store
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn require_session(state: &AppState) -> Result<&Session, HandlerErr> {
    state
        .session
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_session", "log in first"))
}

pub fn require_admin(state: &AppState) -> Result<&Session, HandlerErr> {
    let session = require_session(state)?;
    if !session.is_admin {
        return Err(HandlerErr::new("forbidden", "admin access required"));
    }
    Ok(session)
}
