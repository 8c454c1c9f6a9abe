use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

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

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
}

fn student_exists(conn: &Connection, student_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })
}

fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let kelas = get_optional_str(params, "kelas").filter(|s| !s.is_empty());
    let students = store::list_students(conn, kelas.as_deref()).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })?;
    let students_json = serde_json::to_value(&students).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })?;
    Ok(json!({ "students": students_json }))
}

fn students_classes(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let labels = store::class_labels(conn).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })?;
    Ok(json!({ "classes": labels }))
}

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let nama = get_required_str(params, "nama")?;
    let nis = get_required_str(params, "nis")?;
    let kelas = get_required_str(params, "kelas")?;
    let nama_ortu = get_optional_str(params, "nama_ortu").unwrap_or_default();
    let no_hp_ortu = get_optional_str(params, "no_hp_ortu").unwrap_or_default();

    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, nama, nis, kelas, nama_ortu, no_hp_ortu, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &nama,
            &nis,
            &kelas,
            &nama_ortu,
            &no_hp_ortu,
            Utc::now().to_rfc3339(),
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;

    Ok(json!({
        "studentId": student_id,
        "nama": nama,
        "nis": nis,
        "kelas": kelas
    }))
}

fn students_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
            details: None,
        });
    }
    let patch = params.get("patch").cloned().unwrap_or_else(|| json!({}));

    let current = conn
        .query_row(
            "SELECT nama, nis, kelas, nama_ortu, no_hp_ortu FROM students WHERE id = ?",
            [&student_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                ))
            },
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;

    let pick = |key: &str, fallback: String| -> Result<String, HandlerErr> {
        match get_optional_str(&patch, key) {
            Some(v) if !v.is_empty() => Ok(v),
            Some(_) => Err(HandlerErr {
                code: "bad_params",
                message: format!("{} must not be empty", key),
                details: None,
            }),
            None => Ok(fallback),
        }
    };
    let nama = pick("nama", current.0)?;
    let nis = pick("nis", current.1)?;
    let kelas = pick("kelas", current.2)?;
    // Guardian fields may legitimately be cleared.
    let nama_ortu = get_optional_str(&patch, "nama_ortu").unwrap_or(current.3);
    let no_hp_ortu = get_optional_str(&patch, "no_hp_ortu").unwrap_or(current.4);

    conn.execute(
        "UPDATE students
         SET nama = ?, nis = ?, kelas = ?, nama_ortu = ?, no_hp_ortu = ?, updated_at = ?
         WHERE id = ?",
        (
            &nama,
            &nis,
            &kelas,
            &nama_ortu,
            &no_hp_ortu,
            Utc::now().to_rfc3339(),
            &student_id,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;

    Ok(json!({
        "studentId": student_id,
        "nama": nama,
        "nis": nis,
        "kelas": kelas
    }))
}

fn students_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
            details: None,
        });
    }
    // Historical recap details keep their entry for this id on purpose:
    // recaps are snapshots, and the next open/commit drops it from the
    // working set anyway.
    conn.execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(|e| HandlerErr {
            code: "db_delete_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "students" })),
        })?;
    Ok(json!({ "ok": true }))
}

fn with_conn(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_conn(state, req, students_list)),
        "students.classes" => Some(with_conn(state, req, |c, _| students_classes(c))),
        "students.create" => Some(with_conn(state, req, students_create)),
        "students.update" => Some(with_conn(state, req, students_update)),
        "students.delete" => Some(with_conn(state, req, students_delete)),
        _ => None,
    }
}
