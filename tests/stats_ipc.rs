use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
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

fn request_ok(
    stdin: &mut std::process::ChildStdin,
    reader: &mut BufReader<std::process::ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let req = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", req).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn band_counts(result: &serde_json::Value) -> Vec<(String, u64)> {
    result
        .get("bands")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|b| {
            (
                b.get("band").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                b.get("count").and_then(|v| v.as_u64()).unwrap_or(0),
            )
        })
        .collect()
}

#[test]
fn stats_over_preloaded_store_files() {
    let workspace = temp_dir("recordbook-stats");
    std::fs::write(
        workspace.join("users.txt"),
        "admin,password,admin,ADM001,Admin User,admin@example.com,1234567890\n\
         u1,password,student,STU001,Una One,u1@school.test,5550001\n\
         u2,password,student,STU002,Dos Two,u2@school.test,5550002\n",
    )
    .expect("write users");
    std::fs::write(
        workspace.join("passwords.txt"),
        "admin,admin123\nu1,one\nu2,two\n",
    )
    .expect("write passwords");
    std::fs::write(
        workspace.join("grades.txt"),
        "u1,Mathematics,80\nu1,Science,90\nu1,English,100\n\
         u2,Mathematics,85\nu2,Science,72\nu2,History,61\nu2,English,40\n\
         u2,Science,not-a-number\n",
    )
    .expect("write grades");
    std::fs::write(
        workspace.join("eca.txt"),
        "u1,Chess\nu1,Football\nu2,Chess\nu2,Drama\n",
    )
    .expect("write eca");

    let exe = env!("CARGO_BIN_EXE_recordbookd");
    let mut child = Command::new(exe)
        .env("RECORDBOOKD_WORKSPACE", workspace.to_string_lossy().to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn recordbookd");
    let mut stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    let mut reader = BufReader::new(stdout);

    let health = request_ok(&mut stdin, &mut reader, "h", "health", json!({}));
    assert!(health
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .is_some());

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "auth.login",
        json!({ "username": "admin", "password": "admin123" }),
    );

    let students = request_ok(&mut stdin, &mut reader, "2", "stats.studentAverages", json!({}));
    let averages = students.get("averages").expect("averages");
    assert_eq!(averages.get("u1").and_then(|v| v.as_f64()), Some(90.0));
    assert_eq!(averages.get("u2").and_then(|v| v.as_f64()), Some(64.5));
    assert!(averages.get("admin").is_none());

    let subjects = request_ok(&mut stdin, &mut reader, "3", "stats.subjectAverages", json!({}));
    let averages = subjects.get("averages").expect("averages");
    assert_eq!(averages.get("Mathematics").and_then(|v| v.as_f64()), Some(82.5));
    assert_eq!(averages.get("Science").and_then(|v| v.as_f64()), Some(81.0));
    assert_eq!(averages.get("History").and_then(|v| v.as_f64()), Some(61.0));

    let dist = request_ok(&mut stdin, &mut reader, "4", "stats.gradeDistribution", json!({}));
    assert_eq!(
        band_counts(&dist),
        vec![
            ("A".to_string(), 2),
            ("B".to_string(), 2),
            ("C".to_string(), 1),
            ("D".to_string(), 1),
            ("F".to_string(), 1),
        ]
    );
    assert_eq!(
        dist.get("bands")
            .and_then(|b| b.get(0))
            .and_then(|b| b.get("label"))
            .and_then(|v| v.as_str()),
        Some("A (90-100)")
    );

    let counts = request_ok(&mut stdin, &mut reader, "5", "stats.activityCounts", json!({}));
    let counts = counts.get("counts").expect("counts");
    assert_eq!(counts.get("Chess").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(counts.get("Drama").and_then(|v| v.as_u64()), Some(1));

    let summary = request_ok(&mut stdin, &mut reader, "6", "stats.subjectSummary", json!({}));
    let science = summary
        .get("subjects")
        .and_then(|s| s.get("Science"))
        .expect("science summary");
    assert_eq!(science.get("count").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(science.get("min").and_then(|v| v.as_f64()), Some(72.0));
    assert_eq!(science.get("max").and_then(|v| v.as_f64()), Some(90.0));

    let by_student = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "stats.activitiesByStudent",
        json!({}),
    );
    assert_eq!(
        by_student.get("students").and_then(|s| s.get("u2")),
        Some(&json!(["Chess", "Drama"]))
    );

    let categories = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "stats.activityCategories",
        json!({}),
    );
    let categories = categories.get("categories").expect("categories");
    assert_eq!(categories.get("Sports").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(categories.get("Arts").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(categories.get("Other").and_then(|v| v.as_u64()), Some(2));

    // A student's charts only cover their own records.
    request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "auth.login",
        json!({ "username": "u2", "password": "two" }),
    );
    let mine = request_ok(&mut stdin, &mut reader, "10", "stats.gradeDistribution", json!({}));
    assert_eq!(
        band_counts(&mine),
        vec![
            ("A".to_string(), 0),
            ("B".to_string(), 1),
            ("C".to_string(), 1),
            ("D".to_string(), 1),
            ("F".to_string(), 1),
        ]
    );
    let mine = request_ok(&mut stdin, &mut reader, "11", "stats.studentAverages", json!({}));
    assert_eq!(
        mine.get("averages"),
        Some(&json!({ "u2": 64.5 }))
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
