use crate::recap::{RecapDoc, RecapStore};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// SQLite-backed implementation of the recap store contract.
pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn recap_from_row(row: &Row) -> rusqlite::Result<(RecapDoc, String)> {
    let details_json: String = row.get(7)?;
    let doc = RecapDoc {
        date: row.get(0)?,
        timestamp: row.get(1)?,
        kelas: row.get(2)?,
        total_hadir: row.get(3)?,
        total_sakit: row.get(4)?,
        total_izin: row.get(5)?,
        total_alpha: row.get(6)?,
        details: BTreeMap::new(),
    };
    Ok((doc, details_json))
}

fn attach_details(doc: RecapDoc, details_json: &str) -> anyhow::Result<RecapDoc> {
    let details: BTreeMap<String, String> =
        serde_json::from_str(details_json).context("recap details column is not a JSON map")?;
    Ok(RecapDoc { details, ..doc })
}

impl RecapStore for SqliteStore<'_> {
    fn load_recap(&self, doc_id: &str) -> anyhow::Result<Option<RecapDoc>> {
        let found = self
            .conn
            .query_row(
                "SELECT date, timestamp, kelas, total_hadir, total_sakit, total_izin,
                        total_alpha, details
                 FROM attendance_recap
                 WHERE id = ?",
                [doc_id],
                recap_from_row,
            )
            .optional()?;
        match found {
            Some((doc, details_json)) => Ok(Some(attach_details(doc, &details_json)?)),
            None => Ok(None),
        }
    }

    fn upsert_recap(&self, doc_id: &str, doc: &RecapDoc) -> anyhow::Result<()> {
        let details_json = serde_json::to_string(&doc.details)?;
        // The whole record goes in one statement so counters and details
        // can never land separately.
        self.conn.execute(
            "INSERT INTO attendance_recap(
                id, date, timestamp, kelas,
                total_hadir, total_sakit, total_izin, total_alpha, details)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               date = excluded.date,
               timestamp = excluded.timestamp,
               kelas = excluded.kelas,
               total_hadir = excluded.total_hadir,
               total_sakit = excluded.total_sakit,
               total_izin = excluded.total_izin,
               total_alpha = excluded.total_alpha,
               details = excluded.details",
            (
                doc_id,
                &doc.date,
                &doc.timestamp,
                &doc.kelas,
                doc.total_hadir,
                doc.total_sakit,
                doc.total_izin,
                doc.total_alpha,
                &details_json,
            ),
        )?;
        Ok(())
    }

    fn recaps_for_date(&self, date: &str) -> anyhow::Result<Vec<RecapDoc>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, timestamp, kelas, total_hadir, total_sakit, total_izin,
                    total_alpha, details
             FROM attendance_recap
             WHERE date = ?
             ORDER BY kelas",
        )?;
        let rows = stmt
            .query_map([date], recap_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(doc, details_json)| attach_details(doc, &details_json))
            .collect()
    }
}

/// Roster document as stored in the `students` collection.
#[derive(Debug, Clone, Serialize)]
pub struct Student {
    pub id: String,
    pub nama: String,
    pub nis: String,
    pub kelas: String,
    pub nama_ortu: String,
    pub no_hp_ortu: String,
}

fn student_from_row(row: &Row) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        nama: row.get(1)?,
        nis: row.get(2)?,
        kelas: row.get(3)?,
        nama_ortu: row.get(4)?,
        no_hp_ortu: row.get(5)?,
    })
}

/// List roster students, optionally restricted to one class. Results are
/// ordered by name within a class; the full listing is grouped by class in
/// numeric-aware label order.
pub fn list_students(conn: &Connection, kelas: Option<&str>) -> rusqlite::Result<Vec<Student>> {
    let mut students = match kelas {
        Some(kelas) => {
            let mut stmt = conn.prepare(
                "SELECT id, nama, nis, kelas, nama_ortu, no_hp_ortu
                 FROM students
                 WHERE kelas = ?
                 ORDER BY nama",
            )?;
            let rows = stmt
                .query_map([kelas], student_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, nama, nis, kelas, nama_ortu, no_hp_ortu
                 FROM students
                 ORDER BY nama",
            )?;
            let rows = stmt
                .query_map([], student_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    students.sort_by(|a, b| class_label_cmp(&a.kelas, &b.kelas));
    Ok(students)
}

/// Distinct class labels present on the roster, in display order.
pub fn class_labels(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT kelas FROM students")?;
    let mut labels = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    labels.sort_by(|a, b| class_label_cmp(a, b));
    Ok(labels)
}

/// Numeric-aware comparison for free-form class labels, so "2" sorts before
/// "10" and "6" before "6A". Display ordering only; labels stay free-form.
pub fn class_label_cmp(a: &str, b: &str) -> Ordering {
    let mut ra = runs(a).into_iter();
    let mut rb = runs(b).into_iter();
    loop {
        match (ra.next(), rb.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    _ => x.cmp(&y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

// Split into maximal runs of digits / non-digits.
fn runs(s: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for c in s.chars() {
        match out.last_mut() {
            Some(last)
                if last.chars().next().map(|p| p.is_ascii_digit())
                    == Some(c.is_ascii_digit()) =>
            {
                last.push(c);
            }
            _ => out.push(c.to_string()),
        }
    }
    out
}
