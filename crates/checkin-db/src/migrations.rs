use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, sessions, records)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                role        TEXT NOT NULL CHECK (role IN ('admin', 'student')),
                name        TEXT NOT NULL,
                student_id  TEXT UNIQUE,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                title         TEXT NOT NULL,
                checkin_code  TEXT NOT NULL UNIQUE,
                start_time    TEXT NOT NULL,
                end_time      TEXT NOT NULL,
                created_by    INTEGER NOT NULL REFERENCES users(id),
                created_at    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS records (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id    INTEGER NOT NULL REFERENCES sessions(id),
                user_id       INTEGER NOT NULL REFERENCES users(id),
                checkin_time  TEXT NOT NULL,
                UNIQUE(session_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_records_user
                ON records(user_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        // Seats carry no uniqueness constraint: two students may claim the same seat.
        info!("Running migration v2 (check-in location and seat)");
        conn.execute_batch(
            "
            ALTER TABLE records ADD COLUMN latitude REAL;
            ALTER TABLE records ADD COLUMN longitude REAL;
            ALTER TABLE records ADD COLUMN location_accuracy REAL;
            ALTER TABLE records ADD COLUMN location_time TEXT;
            ALTER TABLE records ADD COLUMN seat_row TEXT;
            ALTER TABLE records ADD COLUMN seat_col INTEGER;

            CREATE INDEX IF NOT EXISTS idx_records_seat
                ON records(session_id, seat_row, seat_col);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
