use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One attendance mark per student per day. Wire codes follow the
/// persisted document shape: H (hadir), S (sakit), I (izin), A (alpha).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Sick,
    Excused,
    Absent,
}

impl AttendanceStatus {
    pub fn code(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "H",
            AttendanceStatus::Sick => "S",
            AttendanceStatus::Excused => "I",
            AttendanceStatus::Absent => "A",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "H" => Some(AttendanceStatus::Present),
            "S" => Some(AttendanceStatus::Sick),
            "I" => Some(AttendanceStatus::Excused),
            "A" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }

    /// Boundary coercion for codes read back from storage. An unknown code
    /// is a data-integrity problem, not a reason to block attendance entry:
    /// log it and fall back to Present so the roll-up invariant still holds.
    pub fn from_code_lossy(code: &str) -> Self {
        Self::from_code(code).unwrap_or_else(|| {
            tracing::warn!(code, "unknown attendance status code, treating as H");
            AttendanceStatus::Present
        })
    }
}

/// Working mapping for one (date, class): student id -> status.
pub type Details = BTreeMap<String, AttendanceStatus>;

/// The four derived per-status totals cached alongside the details mapping.
/// These are a cache of the mapping, never an independent source of truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RollUp {
    #[serde(rename = "total_hadir")]
    pub hadir: i64,
    #[serde(rename = "total_sakit")]
    pub sakit: i64,
    #[serde(rename = "total_izin")]
    pub izin: i64,
    #[serde(rename = "total_alpha")]
    pub alpha: i64,
}

impl RollUp {
    pub fn total(&self) -> i64 {
        self.hadir + self.sakit + self.izin + self.alpha
    }
}

/// Persisted daily aggregate for one (date, class) pair, in the exact shape
/// clients read from the `attendance_recap` collection. `details` holds raw
/// wire codes; use [`RecapDoc::typed_details`] before doing logic on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecapDoc {
    pub date: String,
    pub timestamp: String,
    pub kelas: String,
    pub total_hadir: i64,
    pub total_sakit: i64,
    pub total_izin: i64,
    pub total_alpha: i64,
    pub details: BTreeMap<String, String>,
}

impl RecapDoc {
    pub fn doc_id(&self) -> String {
        recap_doc_id(&self.date, &self.kelas)
    }

    pub fn typed_details(&self) -> Details {
        self.details
            .iter()
            .map(|(id, code)| (id.clone(), AttendanceStatus::from_code_lossy(code)))
            .collect()
    }
}

/// Persistence contract the reconciler depends on. The daemon backs it with
/// SQLite; tests back it with in-memory fakes.
pub trait RecapStore {
    fn load_recap(&self, doc_id: &str) -> anyhow::Result<Option<RecapDoc>>;
    fn upsert_recap(&self, doc_id: &str, doc: &RecapDoc) -> anyhow::Result<()>;
    fn recaps_for_date(&self, date: &str) -> anyhow::Result<Vec<RecapDoc>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecapError {
    UnknownStudent(String),
}

impl std::fmt::Display for RecapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecapError::UnknownStudent(id) => {
                write!(f, "student {} is not in the working mapping", id)
            }
        }
    }
}

impl std::error::Error for RecapError {}

/// Deterministic document id for one (date, class) pair. Doubles as the
/// lookup key and the persistence identity, so a given day+class can never
/// produce more than one record.
pub fn recap_doc_id(date: &str, kelas: &str) -> String {
    format!("{}_Kelas{}", date, kelas)
}

/// Normalize a caller-supplied ISO date to zero-padded YYYY-MM-DD. chrono
/// accepts unpadded fields ("2025-1-5"), and storing the raw text would mint
/// a second key for the same calendar day, so every date that feeds a recap
/// key goes through here first.
pub fn canonical_date(raw: &str) -> Option<String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Merge a previously saved details mapping with the current roster.
///
/// Every roster student gets a status: the saved one if present, else
/// Present. Saved entries for students no longer on the roster are dropped
/// from the working set (their historical record stays on disk until the
/// next commit overwrites it). The result's key set is exactly the roster's
/// id set.
pub fn merge_with_saved(roster_ids: &[String], saved: Option<&Details>) -> Details {
    roster_ids
        .iter()
        .map(|id| {
            let status = saved
                .and_then(|s| s.get(id).copied())
                .unwrap_or(AttendanceStatus::Present);
            (id.clone(), status)
        })
        .collect()
}

/// Produce the working mapping a teacher sees when opening the attendance
/// screen for `kelas` on `date`. A failed read of the prior recap is logged
/// and treated as "no prior recap" so attendance entry is never blocked on
/// optional historical data.
pub fn open_day(
    store: &dyn RecapStore,
    kelas: &str,
    date: &str,
    roster_ids: &[String],
) -> Details {
    let saved = match store.load_recap(&recap_doc_id(date, kelas)) {
        Ok(doc) => doc.map(|d| d.typed_details()),
        Err(e) => {
            tracing::warn!(date, kelas, error = %e, "recap read failed, defaulting all to H");
            None
        }
    };
    merge_with_saved(roster_ids, saved.as_ref())
}

/// Pure status update. The student must already be in the working mapping;
/// anything else is a caller bug and is rejected rather than inserted.
pub fn set_status(
    details: &Details,
    student_id: &str,
    status: AttendanceStatus,
) -> Result<Details, RecapError> {
    if !details.contains_key(student_id) {
        return Err(RecapError::UnknownStudent(student_id.to_string()));
    }
    let mut next = details.clone();
    next.insert(student_id.to_string(), status);
    Ok(next)
}

pub fn tally(details: &Details) -> RollUp {
    let mut totals = RollUp::default();
    for status in details.values() {
        match status {
            AttendanceStatus::Present => totals.hadir += 1,
            AttendanceStatus::Sick => totals.sakit += 1,
            AttendanceStatus::Excused => totals.izin += 1,
            AttendanceStatus::Absent => totals.alpha += 1,
        }
    }
    totals
}

/// Tally the working mapping and upsert the full record under its
/// deterministic key. The write is a single whole-record upsert: repeated
/// commits of the same mapping land on the same row with the same content.
pub fn commit(
    store: &dyn RecapStore,
    kelas: &str,
    date: &str,
    details: &Details,
) -> anyhow::Result<RecapDoc> {
    let totals = tally(details);
    let doc = RecapDoc {
        date: date.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        kelas: kelas.to_string(),
        total_hadir: totals.hadir,
        total_sakit: totals.sakit,
        total_izin: totals.izin,
        total_alpha: totals.alpha,
        details: details
            .iter()
            .map(|(id, status)| (id.clone(), status.code().to_string()))
            .collect(),
    };
    store.upsert_recap(&doc.doc_id(), &doc)?;
    Ok(doc)
}

/// Principal-facing roll-up for one class on one date: filter the day's
/// recaps in memory and sum counters across however many match. Zero matches
/// sums to all zeros; the caller renders that as "no data", not an error.
pub fn aggregate_for_class(recaps: &[RecapDoc], kelas: &str) -> RollUp {
    let mut totals = RollUp::default();
    for doc in recaps.iter().filter(|d| d.kelas == kelas) {
        totals.hadir += doc.total_hadir;
        totals.sakit += doc.total_sakit;
        totals.izin += doc.total_izin;
        totals.alpha += doc.total_alpha;
    }
    totals
}
