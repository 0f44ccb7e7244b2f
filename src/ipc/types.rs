use std::path::PathBuf;

use serde::Deserialize;

use crate::store::RecordStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The signed-in user. Cleared on logout and whenever the workspace changes.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub is_admin: bool,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: Option<RecordStore>,
    pub session: Option<Session>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            store: None,
            session: None,
        }
    }
}
