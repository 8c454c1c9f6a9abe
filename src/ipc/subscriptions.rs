use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::recap::{self, RecapStore};
use crate::store::{self, SqliteStore};
use chrono::Local;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

/// One live query owned by a client screen. The client holds the id as its
/// cancel handle and must cancel it exactly once on teardown.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub query: SubQuery,
}

#[derive(Debug, Clone)]
pub enum SubQuery {
    Students { kelas: Option<String> },
    RecapsByDate { date: String },
}

impl SubQuery {
    fn fires_on(&self, req: &Request) -> bool {
        match self {
            SubQuery::Students { .. } => matches!(
                req.method.as_str(),
                "students.create" | "students.update" | "students.delete"
            ),
            // Only the committed date's subscribers get a fresh snapshot.
            SubQuery::RecapsByDate { date } => {
                req.method == "attendance.commit"
                    && committed_date(&req.params).as_deref() == Some(date.as_str())
            }
        }
    }
}

// Mirrors the commit handler's date resolution: explicit param normalized,
// otherwise the local calendar date.
fn committed_date(params: &serde_json::Value) -> Option<String> {
    match params.get("date").and_then(|v| v.as_str()) {
        Some(raw) => recap::canonical_date(raw),
        None => Some(Local::now().format("%Y-%m-%d").to_string()),
    }
}

fn snapshot(conn: &Connection, query: &SubQuery) -> anyhow::Result<serde_json::Value> {
    match query {
        SubQuery::Students { kelas } => {
            let students = store::list_students(conn, kelas.as_deref())?;
            Ok(json!({ "students": serde_json::to_value(&students)? }))
        }
        SubQuery::RecapsByDate { date } => {
            let recaps = SqliteStore::new(conn).recaps_for_date(date)?;
            let docs: Vec<serde_json::Value> = recaps
                .iter()
                .map(|doc| {
                    let mut v = serde_json::to_value(doc).unwrap_or_else(|_| json!({}));
                    v["id"] = json!(doc.doc_id());
                    v
                })
                .collect();
            Ok(json!({ "date": date, "recaps": docs }))
        }
    }
}

/// Re-run every subscription affected by a successful mutating request and
/// produce one snapshot event per subscription. Cancelled subscriptions are
/// gone from the registry, so they can never emit again.
pub fn after_method(state: &AppState, req: &Request) -> Vec<serde_json::Value> {
    let Some(conn) = state.db.as_ref() else {
        return Vec::new();
    };
    let mut events = Vec::new();
    for sub in state.subs.iter().filter(|s| s.query.fires_on(req)) {
        match snapshot(conn, &sub.query) {
            Ok(result) => events.push(json!({
                "event": "snapshot",
                "subscriptionId": sub.id,
                "result": result
            })),
            Err(e) => {
                tracing::warn!(subscription = %sub.id, error = %e, "subscription re-run failed");
            }
        }
    }
    events
}

fn handle_subscribe(state: &mut AppState, req: &Request, query: SubQuery) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let initial = match snapshot(conn, &query) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let id = Uuid::new_v4().to_string();
    state.subs.push(Subscription {
        id: id.clone(),
        query,
    });
    ok(&req.id, json!({ "subscriptionId": id, "snapshot": initial }))
}

fn handle_subscribe_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let kelas = req
        .params
        .get("kelas")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    handle_subscribe(state, req, SubQuery::Students { kelas })
}

fn handle_subscribe_recaps(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("date").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing date", None);
    };
    let Some(date) = recap::canonical_date(raw) else {
        return err(&req.id, "bad_params", "date must be YYYY-MM-DD", None);
    };
    handle_subscribe(state, req, SubQuery::RecapsByDate { date })
}

fn handle_cancel(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(sub_id) = req.params.get("subscriptionId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing subscriptionId", None);
    };
    let before = state.subs.len();
    state.subs.retain(|s| s.id != sub_id);
    if state.subs.len() == before {
        // Cancelling twice is a caller bug worth surfacing.
        return err(&req.id, "not_found", "subscription not found", None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subscribe.students" => Some(handle_subscribe_students(state, req)),
        "subscribe.recaps" => Some(handle_subscribe_recaps(state, req)),
        "subscribe.cancel" => Some(handle_cancel(state, req)),
        _ => None,
    }
}
