use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("aula.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            subject TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            ci TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS periods(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            number INTEGER NOT NULL,
            year INTEGER NOT NULL,
            period_type TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(class_id, period_type, number, year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_periods_class ON periods(class_id)",
        [],
    )?;

    // Daily records store the registry vocabulary ('presente'/'falta'/...);
    // the wire layer speaks English tokens. One row per student per day.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            class_id TEXT NOT NULL,
            period_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            PRIMARY KEY(class_id, period_id, student_id, date),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(period_id) REFERENCES periods(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_scope
         ON attendance_records(class_id, period_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student
         ON attendance_records(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS participation_records(
            class_id TEXT NOT NULL,
            period_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            level TEXT NOT NULL,
            PRIMARY KEY(class_id, period_id, student_id, date),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(period_id) REFERENCES periods(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_participation_scope
         ON participation_records(class_id, period_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_participation_student
         ON participation_records(student_id)",
        [],
    )?;

    // Component scores only; total and approved/failed status are derived
    // everywhere they are needed, so the sum invariant cannot drift.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS period_grades(
            class_id TEXT NOT NULL,
            period_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            ser REAL NOT NULL,
            saber REAL NOT NULL,
            hacer REAL NOT NULL,
            decidir REAL NOT NULL,
            autoevaluacion REAL NOT NULL,
            PRIMARY KEY(class_id, period_id, student_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(period_id) REFERENCES periods(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_period_grades_scope
         ON period_grades(class_id, period_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_period_grades_student
         ON period_grades(student_id)",
        [],
    )?;

    Ok(conn)
}
