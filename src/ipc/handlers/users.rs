use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

// Role gate only. The daemon never stores or compares credentials; the host
// app authenticates against its identity provider and then asks us which
// screen the account belongs to.

const ROLES: [&str; 3] = ["admin", "guru", "kepsek"];

fn handle_users_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let email = match req.params.get("email").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_lowercase(),
        _ => return err(&req.id, "bad_params", "missing email", None),
    };
    let role = match req.params.get("role").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing role", None),
    };
    if !ROLES.contains(&role.as_str()) {
        return err(
            &req.id,
            "bad_params",
            "role must be admin, guru or kepsek",
            Some(json!({ "role": role })),
        );
    }
    let kelas = req
        .params
        .get("kelas")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if role == "guru" && kelas.is_none() {
        return err(&req.id, "bad_params", "guru accounts need a kelas", None);
    }

    let user_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO users(id, email, role, kelas)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(email) DO UPDATE SET
           role = excluded.role,
           kelas = excluded.kelas",
        (&user_id, &email, &role, &kelas),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }

    // On conflict the existing id is kept, so read it back.
    let stored_id: Result<String, _> =
        conn.query_row("SELECT id FROM users WHERE email = ?", [&email], |r| {
            r.get(0)
        });
    match stored_id {
        Ok(id) => ok(
            &req.id,
            json!({ "userId": id, "email": email, "role": role, "kelas": kelas }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_users_resolve(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let email = match req.params.get("email").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_lowercase(),
        _ => return err(&req.id, "bad_params", "missing email", None),
    };

    let row = conn
        .query_row(
            "SELECT role, kelas FROM users WHERE email = ?",
            [&email],
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?)),
        )
        .optional();

    match row {
        Ok(Some((role, kelas))) => ok(
            &req.id,
            json!({ "email": email, "role": role, "kelas": kelas }),
        ),
        Ok(None) => err(&req.id, "not_found", "no account for that email", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.upsert" => Some(handle_users_upsert(state, req)),
        "users.resolve" => Some(handle_users_resolve(state, req)),
        _ => None,
    }
}
