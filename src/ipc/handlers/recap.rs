use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::recap::{self, RecapStore};
use crate::store::SqliteStore;
use rusqlite::Connection;
use serde_json::json;

struct HandlerErr {
    code: &'static str,
    message: String,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, None)
    }
}

fn required_date(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let Some(raw) = params.get("date").and_then(|v| v.as_str()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing date".to_string(),
        });
    };
    // Normalized so lookups hit the same key the commit wrote.
    recap::canonical_date(raw).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "date must be YYYY-MM-DD".to_string(),
    })
}

fn required_kelas(params: &serde_json::Value) -> Result<String, HandlerErr> {
    params
        .get("kelas")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "missing kelas".to_string(),
        })
}

fn class_day_totals(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<(String, String, recap::RollUp, bool), HandlerErr> {
    let date = required_date(params)?;
    let kelas = required_kelas(params)?;
    let recaps = SqliteStore::new(conn)
        .recaps_for_date(&date)
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
        })?;
    let has_data = recaps.iter().any(|d| d.kelas == kelas);
    let totals = recap::aggregate_for_class(&recaps, &kelas);
    Ok((date, kelas, totals, has_data))
}

fn recap_daily(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (date, kelas, totals, has_data) = class_day_totals(conn, params)?;
    // Zero matches is "no data", not an error.
    let mut result = json!({
        "date": date,
        "kelas": kelas,
        "totalStudents": totals.total(),
        "hasData": has_data
    });
    let totals_json = serde_json::to_value(totals).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
    })?;
    if let (Some(obj), Some(t)) = (result.as_object_mut(), totals_json.as_object()) {
        for (k, v) in t {
            obj.insert(k.clone(), v.clone());
        }
    }
    Ok(result)
}

/// Row model for the external PDF renderer: one row per status category
/// plus the grand total. The renderer owns layout and styling.
fn recap_report_model(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (date, kelas, totals, has_data) = class_day_totals(conn, params)?;
    Ok(json!({
        "title": "Laporan Absensi Harian",
        "date": date,
        "kelas": kelas,
        "rows": [
            { "label": "Hadir", "count": totals.hadir },
            { "label": "Sakit", "count": totals.sakit },
            { "label": "Izin", "count": totals.izin },
            { "label": "Alpha", "count": totals.alpha }
        ],
        "totalStudents": totals.total(),
        "hasData": has_data
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler = match req.method.as_str() {
        "recap.daily" => recap_daily,
        "recap.reportModel" => recap_report_model,
        _ => return None,
    };
    let Some(conn) = state.db.as_ref() else {
        return Some(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    Some(match handler(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
