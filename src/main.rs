mod backup;
mod calc;
mod config;
mod ipc;
mod records;
mod store;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

/// Logs go to stderr; stdout carries the response stream.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("RECORDBOOKD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let mut state = ipc::AppState::new();

    if let Ok(path) = std::env::var("RECORDBOOKD_WORKSPACE") {
        if !path.trim().is_empty() {
            if let Err(e) = ipc::open_workspace(&mut state, PathBuf::from(path.trim())) {
                tracing::warn!(code = e.code, error = %e.message, "startup workspace not opened");
            }
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No request id to echo back.
                let resp = ipc::err("", "bad_json", e.to_string(), None);
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        tracing::debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
