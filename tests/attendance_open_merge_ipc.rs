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
    let exe = env!("CARGO_BIN_EXE_absensid");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn absensid");
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
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
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

fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    nama: &str,
    kelas: &str,
) -> String {
    let result = request_ok(
        stdin,
        reader,
        id,
        "students.create",
        json!({ "nama": nama, "nis": "0000", "kelas": kelas }),
    );
    result
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string()
}

fn statuses_of(result: &serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    result
        .get("statuses")
        .and_then(|v| v.as_object())
        .expect("statuses object")
        .clone()
}

#[test]
fn open_merges_saved_statuses_with_the_current_roster() {
    let workspace = temp_dir("absensid-open-merge");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let andi = create_student(&mut stdin, &mut reader, "2", "Andi", "3");
    let budi = create_student(&mut stdin, &mut reader, "3", "Budi", "3");

    // First open of the day: everyone defaults to H.
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.open",
        json!({ "kelas": "3", "date": "2025-01-10" }),
    );
    let statuses = statuses_of(&opened);
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses.get(&andi), Some(&json!("H")));
    assert_eq!(statuses.get(&budi), Some(&json!("H")));

    // Mark Andi sick and save.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.setStatus",
        json!({
            "statuses": serde_json::Value::Object(statuses),
            "studentId": andi,
            "status": "S"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.commit",
        json!({
            "kelas": "3",
            "date": "2025-01-10",
            "statuses": updated.get("statuses").cloned().expect("statuses")
        }),
    );

    // Re-opening the same day restores the saved statuses.
    let reopened = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.open",
        json!({ "kelas": "3", "date": "2025-01-10" }),
    );
    let statuses = statuses_of(&reopened);
    assert_eq!(statuses.get(&andi), Some(&json!("S")));
    assert_eq!(statuses.get(&budi), Some(&json!("H")));

    // A student enrolled after the save shows up defaulted to H.
    let citra = create_student(&mut stdin, &mut reader, "8", "Citra", "3");
    let merged = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.open",
        json!({ "kelas": "3", "date": "2025-01-10" }),
    );
    let statuses = statuses_of(&merged);
    assert_eq!(statuses.len(), 3);
    assert_eq!(statuses.get(&andi), Some(&json!("S")));
    assert_eq!(statuses.get(&citra), Some(&json!("H")));

    // A student removed from the roster drops out of the working set.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.delete",
        json!({ "studentId": budi.clone() }),
    );
    let after_delete = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.open",
        json!({ "kelas": "3", "date": "2025-01-10" }),
    );
    let statuses = statuses_of(&after_delete);
    assert_eq!(statuses.len(), 2);
    assert!(!statuses.contains_key(&budi));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn open_with_empty_roster_is_legal_and_empty() {
    let workspace = temp_dir("absensid-open-empty");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.open",
        json!({ "kelas": "9Z", "date": "2025-01-10" }),
    );
    assert_eq!(statuses_of(&opened).len(), 0);
    assert_eq!(
        opened.get("students").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn set_status_rejects_student_outside_working_mapping() {
    let workspace = temp_dir("absensid-set-status-reject");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let value = request(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.setStatus",
        json!({ "statuses": { "known": "H" }, "studentId": "ghost", "status": "A" }),
    );
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let _ = std::fs::remove_dir_all(workspace);
}
