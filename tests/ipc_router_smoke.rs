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

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("absensid-router-smoke");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "users.upsert",
        json!({ "email": "guru3@sekolah.id", "role": "guru", "kelas": "3" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "4",
        "users.resolve",
        json!({ "email": "guru3@sekolah.id" }),
    );
    let created = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({ "nama": "Smoke Siswa", "nis": "1001", "kelas": "3" }),
    );
    let student_id = created
        .get("result")
        .and_then(|v| v.get("studentId"))
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "students.list",
        json!({ "kelas": "3" }),
    );
    let _ = request(&mut stdin, &mut reader, "7", "students.classes", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "students.update",
        json!({ "studentId": student_id, "patch": { "nama": "Smoke Diperbarui" } }),
    );
    let opened = request(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.open",
        json!({ "kelas": "3", "date": "2025-01-10" }),
    );
    let statuses = opened
        .get("result")
        .and_then(|v| v.get("statuses"))
        .cloned()
        .expect("statuses");
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.setStatus",
        json!({ "statuses": statuses, "studentId": student_id, "status": "S" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.commit",
        json!({ "kelas": "3", "date": "2025-01-10", "statuses": statuses }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "recap.daily",
        json!({ "date": "2025-01-10", "kelas": "3" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "recap.reportModel",
        json!({ "date": "2025-01-10", "kelas": "3" }),
    );
    let sub = request(
        &mut stdin,
        &mut reader,
        "14",
        "subscribe.students",
        json!({ "kelas": "3" }),
    );
    let sub_id = sub
        .get("result")
        .and_then(|v| v.get("subscriptionId"))
        .and_then(|v| v.as_str())
        .expect("subscriptionId")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "subscribe.cancel",
        json!({ "subscriptionId": sub_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "students.delete",
        json!({ "studentId": student_id }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
