use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
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
    let exe = env!("CARGO_BIN_EXE_rollcalld");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rollcalld");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
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

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn elevate_to_hod(workspace: &Path, email: &str) {
    let conn =
        rusqlite::Connection::open(workspace.join("rollcall.sqlite3")).expect("open workspace db");
    let changed = conn
        .execute("UPDATE users SET role = 'hod' WHERE email = ?", [email])
        .expect("elevate user role");
    assert_eq!(changed, 1, "expected exactly one user to elevate");
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("rollcall-router-smoke");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.register",
        json!({ "email": "head@school.example", "password": "classro0m" }),
    );
    elevate_to_hod(&workspace, "head@school.example");
    let login = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "auth.login",
        json!({ "email": "head@school.example", "password": "classro0m" }),
    );
    let token = login
        .get("token")
        .and_then(|v| v.as_str())
        .expect("token")
        .to_string();

    let me = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "auth.me",
        json!({ "token": token }),
    );
    assert_eq!(me.get("role").and_then(|v| v.as_str()), Some("hod"));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "auth.reverify",
        json!({ "token": token, "password": "classro0m" }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({
            "token": token,
            "roll": "1",
            "name": "Asha Rao",
            "class": "10",
            "section": "A"
        }),
    );
    let student_id = created
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.list",
        json!({ "token": token }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.mark",
        json!({
            "token": token,
            "studentId": student_id,
            "date": "2024-03-05",
            "present": true
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.list",
        json!({ "token": token, "month": 3, "year": 2024 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.summary",
        json!({ "token": token, "month": 3, "year": 2024 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "attendance.dailySeries",
        json!({ "token": token, "month": 3, "year": 2024, "windowDays": 31 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "attendance.statusTotals",
        json!({ "token": token, "month": 3, "year": 2024 }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "students.delete",
        json!({ "token": token, "studentId": student_id }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_lines_get_a_bad_json_envelope() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    // The second line is valid JSON but not a request, so the parse error
    // itself contains double quotes.
    for garbage in ["this is not json", "\"hello\""] {
        writeln!(stdin, "{}", garbage).expect("write raw line");
        stdin.flush().expect("flush raw line");

        let mut line = String::new();
        reader.read_line(&mut line).expect("read response line");
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("reply must still be one valid json line");
        assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
        assert_eq!(
            value
                .get("error")
                .and_then(|e| e.get("code"))
                .and_then(|v| v.as_str()),
            Some("bad_json")
        );
    }

    // The loop keeps serving after bad lines.
    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health.get("ok").and_then(|v| v.as_bool()), Some(true));

    drop(stdin);
    let _ = child.wait();
}
