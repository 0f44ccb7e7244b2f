use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_recordbookd");
    let mut child = Command::new(exe)
        .env_remove("RECORDBOOKD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn recordbookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn send(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

/// Like `send`, but a known method must never come back as `not_implemented`.
fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = send(stdin, reader, id, method, params);
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("recordbook-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let calls: Vec<(&str, serde_json::Value)> = vec![
        ("health", json!({})),
        (
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        ),
        (
            "auth.login",
            json!({ "username": "admin", "password": "admin123" }),
        ),
        ("auth.isAdmin", json!({ "username": "admin" })),
        (
            "accounts.create",
            json!({
                "username": "smoke",
                "password": "pw",
                "fullName": "Smoke Test",
                "email": "smoke@example.com",
                "phone": "123",
                "marks": [{ "subject": "Science", "mark": 77 }],
                "activities": "Chess"
            }),
        ),
        ("accounts.list", json!({})),
        ("accounts.get", json!({ "username": "smoke" })),
        ("grades.list", json!({})),
        ("activities.list", json!({})),
        ("stats.studentAverages", json!({})),
        ("stats.subjectAverages", json!({})),
        ("stats.gradeDistribution", json!({})),
        ("stats.activityCounts", json!({})),
        ("stats.subjectSummary", json!({})),
        ("stats.activitiesByStudent", json!({})),
        ("stats.activityCategories", json!({})),
        (
            "backup.exportWorkspaceBundle",
            json!({ "outPath": bundle_out.to_string_lossy() }),
        ),
        (
            "backup.importWorkspaceBundle",
            json!({ "inPath": bundle_out.to_string_lossy() }),
        ),
        ("accounts.delete", json!({ "username": "smoke" })),
        ("auth.logout", json!({})),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &(i + 1).to_string(), method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            resp
        );
    }

    let unknown = send(&mut stdin, &mut reader, "x", "students.teleport", json!({}));
    assert_eq!(
        unknown
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn bad_json_line_gets_error_and_loop_continues() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read error line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse error json");
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_json")
    );

    let health = request(&mut stdin, &mut reader, "after", "health", json!({}));
    assert_eq!(health.get("ok").and_then(|v| v.as_bool()), Some(true));

    drop(stdin);
    let _ = child.wait();
}
