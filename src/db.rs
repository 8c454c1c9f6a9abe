use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("absensi.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Role gate for the login screen. Credential verification lives with
    // the identity provider on the client side; this table only maps an
    // authenticated email to a role (and a home class for teachers).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL,
            kelas TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            nama TEXT NOT NULL,
            nis TEXT NOT NULL,
            kelas TEXT NOT NULL,
            nama_ortu TEXT NOT NULL DEFAULT '',
            no_hp_ortu TEXT NOT NULL DEFAULT '',
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_kelas ON students(kelas)",
        [],
    )?;

    // One row per (date, class); the id is the deterministic recap key.
    // details holds the per-student status map as JSON and is written
    // together with the counters in a single upsert.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_recap(
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            kelas TEXT NOT NULL,
            total_hadir INTEGER NOT NULL,
            total_sakit INTEGER NOT NULL,
            total_izin INTEGER NOT NULL,
            total_alpha INTEGER NOT NULL,
            details TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_recap_date ON attendance_recap(date)",
        [],
    )?;

    Ok(())
}
