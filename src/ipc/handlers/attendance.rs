use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::recap::{self, AttendanceStatus, Details};
use crate::store::{self, SqliteStore};
use chrono::Local;
use rusqlite::Connection;
use serde_json::json;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn bad_params(message: impl Into<String>) -> HandlerErr {
    HandlerErr {
        code: "bad_params",
        message: message.into(),
        details: None,
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_params(format!("missing {}", key)))
}

/// Recap dates are the local calendar date at report time; an explicit
/// `date` param overrides it. The param is normalized, not echoed back, so
/// "2025-1-5" lands under the same key as "2025-01-05".
fn effective_date(params: &serde_json::Value) -> Result<String, HandlerErr> {
    match params.get("date").and_then(|v| v.as_str()) {
        Some(raw) => {
            recap::canonical_date(raw).ok_or_else(|| bad_params("date must be YYYY-MM-DD"))
        }
        None => Ok(Local::now().format("%Y-%m-%d").to_string()),
    }
}

/// Strict parse of a caller-supplied working mapping. Unlike codes read
/// back from storage, an unknown code here is a client bug.
fn parse_details(params: &serde_json::Value, key: &str) -> Result<Details, HandlerErr> {
    let Some(map) = params.get(key).and_then(|v| v.as_object()) else {
        return Err(bad_params(format!("missing {}", key)));
    };
    let mut details = Details::new();
    for (student_id, value) in map {
        let Some(code) = value.as_str() else {
            return Err(bad_params(format!("{}.{} must be a string", key, student_id)));
        };
        let status = AttendanceStatus::from_code(code).ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("unknown status code {}", code),
            details: Some(json!({ "studentId": student_id })),
        })?;
        details.insert(student_id.clone(), status);
    }
    Ok(details)
}

fn details_json(details: &Details) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = details
        .iter()
        .map(|(id, status)| (id.clone(), json!(status.code())))
        .collect();
    serde_json::Value::Object(map)
}

fn attendance_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let kelas = get_required_str(params, "kelas")?;
    let date = effective_date(params)?;

    // Empty roster is legal: the screen shows an empty list.
    let roster = store::list_students(conn, Some(&kelas)).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })?;
    let roster_ids: Vec<String> = roster.iter().map(|s| s.id.clone()).collect();

    // open_day is fail-open on the historical read, so this cannot fail.
    let statuses = recap::open_day(&SqliteStore::new(conn), &kelas, &date, &roster_ids);

    let students_json = serde_json::to_value(&roster).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })?;
    Ok(json!({
        "date": date,
        "kelas": kelas,
        "students": students_json,
        "statuses": details_json(&statuses)
    }))
}

fn attendance_set_status(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let details = parse_details(params, "statuses")?;
    let student_id = get_required_str(params, "studentId")?;
    let code = get_required_str(params, "status")?;
    let status = AttendanceStatus::from_code(&code)
        .ok_or_else(|| bad_params(format!("unknown status code {}", code)))?;

    let next = recap::set_status(&details, &student_id, status).map_err(|e| HandlerErr {
        code: "bad_params",
        message: e.to_string(),
        details: Some(json!({ "studentId": student_id })),
    })?;
    Ok(json!({ "statuses": details_json(&next) }))
}

fn attendance_commit(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let kelas = get_required_str(params, "kelas")?;
    let date = effective_date(params)?;
    let details = parse_details(params, "statuses")?;

    let doc =
        recap::commit(&SqliteStore::new(conn), &kelas, &date, &details).map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "attendance_recap" })),
        })?;

    let mut result = serde_json::to_value(&doc).map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: None,
    })?;
    result["id"] = json!(doc.doc_id());
    Ok(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.open" | "attendance.commit" => {
            let Some(conn) = state.db.as_ref() else {
                return Some(err(&req.id, "no_workspace", "select a workspace first", None));
            };
            let result = match req.method.as_str() {
                "attendance.open" => attendance_open(conn, &req.params),
                _ => attendance_commit(conn, &req.params),
            };
            Some(match result {
                Ok(v) => ok(&req.id, v),
                Err(e) => e.response(&req.id),
            })
        }
        // Pure update over the caller's working mapping; no db involved.
        "attendance.setStatus" => Some(match attendance_set_status(&req.params) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}
