use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, Row, params};
use tracing::warn;

use checkin_types::models::{Role, Seat, WindowState};

use crate::Database;
use crate::models::{
    AttendeeRow, CheckinOutcome, HistoryRow, Inserted, NewRecord, NewUser, RecordRow,
    SeatRow, SessionCountRow, SessionRow, StudentCountRow, UserRow,
};

/// Bound parameters per `IN (...)` lookup.
const USERNAME_BATCH: usize = 500;

const USER_COLUMNS: &str = "u.id, u.username, u.password, u.role, u.name, u.student_id, u.created_at";

const SESSION_COLUMNS: &str =
    "s.id, s.title, s.checkin_code, s.start_time, s.end_time, s.created_by, s.created_at";

const RECORD_COLUMNS: &str = "r.id, r.session_id, r.user_id, r.checkin_time, r.latitude, r.longitude, \
     r.location_accuracy, r.location_time, r.seat_row, r.seat_col";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>, created_at: DateTime<Utc>) -> Result<Inserted> {
        self.with_conn(|conn| insert_user(conn, user, created_at))
    }

    /// Inserts the account unless the username is already taken.
    /// Returns true when a new row was written.
    pub fn ensure_user(&self, user: &NewUser<'_>, created_at: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO users (username, password, role, name, student_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.username,
                    user.password_hash,
                    user.role.as_str(),
                    user.name,
                    user.student_id,
                    created_at
                ],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1");
            conn.query_row(&sql, [id], user_from_row).optional()
        })
    }

    pub fn list_students(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u WHERE u.role = 'student' ORDER BY u.username"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Inserts each user on one connection. Every insert commits on its own;
    /// a UNIQUE conflict on one row does not affect the others.
    pub fn create_users(
        &self,
        users: &[NewUser<'_>],
        created_at: DateTime<Utc>,
    ) -> Result<Vec<Inserted>> {
        self.with_conn(|conn| {
            users
                .iter()
                .map(|user| insert_user(conn, user, created_at))
                .collect()
        })
    }

    /// Which of `usernames` are already taken.
    pub fn existing_usernames(&self, usernames: &[String]) -> Result<HashSet<String>> {
        if usernames.is_empty() {
            return Ok(HashSet::new());
        }

        self.with_conn(|conn| {
            let mut found = HashSet::new();
            for chunk in usernames.chunks(USERNAME_BATCH) {
                let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "SELECT username FROM users WHERE username IN ({})",
                    placeholders.join(", ")
                );

                let mut stmt = conn.prepare(&sql)?;
                let params: Vec<&dyn rusqlite::types::ToSql> = chunk
                    .iter()
                    .map(|name| name as &dyn rusqlite::types::ToSql)
                    .collect();

                let rows = stmt.query_map(params.as_slice(), |row| row.get::<_, String>(0))?;
                for row in rows {
                    found.insert(row?);
                }
            }
            Ok(found)
        })
    }

    // -- Sessions --

    pub fn create_session(
        &self,
        title: &str,
        checkin_code: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        created_by: i64,
        created_at: DateTime<Utc>,
    ) -> Result<Inserted> {
        self.with_conn(|conn| {
            let res = conn.execute(
                "INSERT INTO sessions (title, checkin_code, start_time, end_time, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![title, checkin_code, start_time, end_time, created_by, created_at],
            );
            unique_outcome(conn, res)
        })
    }

    /// All sessions, newest first, each with its number of check-ins.
    pub fn list_sessions(&self) -> Result<Vec<(SessionRow, u64)>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SESSION_COLUMNS},
                        (SELECT COUNT(*) FROM records r WHERE r.session_id = s.id)
                 FROM sessions s
                 ORDER BY s.created_at DESC, s.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| {
                    let session = session_from_row(row)?;
                    let count: i64 = row.get(7)?;
                    Ok((session, count as u64))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_session(&self, id: i64) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| query_session_by_id(conn, id))
    }

    pub fn get_session_by_code(&self, checkin_code: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions s WHERE s.checkin_code = ?1");
            conn.query_row(&sql, [checkin_code], session_from_row).optional()
        })
    }

    // -- Records --

    /// Records a check-in if the student has none for this session and `now`
    /// (the record's `checkin_time`) is inside the window.
    ///
    /// An existing record wins over the window check. A concurrent insert that
    /// loses the race on UNIQUE(session_id, user_id) is reported the same way.
    pub fn check_in(&self, record: &NewRecord) -> Result<CheckinOutcome> {
        self.with_tx(|conn| {
            let Some(session) = query_session_by_id(conn, record.session_id)? else {
                anyhow::bail!("session {} does not exist", record.session_id);
            };

            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM records WHERE session_id = ?1 AND user_id = ?2",
                    params![record.session_id, record.user_id],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Ok(CheckinOutcome::AlreadyCheckedIn);
            }

            match WindowState::at(session.start_time, session.end_time, record.checkin_time) {
                WindowState::NotStarted => return Ok(CheckinOutcome::NotStarted),
                WindowState::Expired => return Ok(CheckinOutcome::Expired),
                WindowState::Active => {}
            }

            if let Some(seat) = record.seat {
                let taken: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM records WHERE session_id = ?1 AND seat_row = ?2 AND seat_col = ?3",
                    params![record.session_id, seat.row.to_string(), seat.col],
                    |row| row.get(0),
                )?;
                if taken > 0 {
                    warn!(
                        session_id = record.session_id,
                        user_id = record.user_id,
                        %seat,
                        "Seat already claimed by another check-in"
                    );
                }
            }

            let location = record.location;
            let res = conn.execute(
                "INSERT INTO records (session_id, user_id, checkin_time, latitude, longitude,
                                      location_accuracy, location_time, seat_row, seat_col)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.session_id,
                    record.user_id,
                    record.checkin_time,
                    location.map(|l| l.latitude),
                    location.map(|l| l.longitude),
                    location.and_then(|l| l.accuracy),
                    location.and_then(|l| l.timestamp),
                    record.seat.map(|s| s.row.to_string()),
                    record.seat.map(|s| s.col),
                ],
            );

            match unique_outcome(conn, res)? {
                Inserted::Duplicate => Ok(CheckinOutcome::AlreadyCheckedIn),
                Inserted::Created(id) => {
                    let sql = format!("SELECT {RECORD_COLUMNS} FROM records r WHERE r.id = ?1");
                    let row = conn.query_row(&sql, [id], |row| record_from_row(row, 0))?;
                    Ok(CheckinOutcome::Recorded(row))
                }
            }
        })
    }

    /// Records for a session joined with their students, in check-in order.
    pub fn session_attendees(&self, session_id: i64) -> Result<Vec<AttendeeRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {RECORD_COLUMNS}, u.username, u.name, u.student_id
                 FROM records r
                 JOIN users u ON r.user_id = u.id
                 WHERE r.session_id = ?1
                 ORDER BY r.checkin_time, r.id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([session_id], |row| {
                    Ok(AttendeeRow {
                        record: record_from_row(row, 0)?,
                        username: row.get(10)?,
                        name: row.get(11)?,
                        student_id: row.get(12)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Students with no record for the session.
    pub fn missed_students(&self, session_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u
                 WHERE u.role = 'student'
                   AND NOT EXISTS (
                       SELECT 1 FROM records r WHERE r.session_id = ?1 AND r.user_id = u.id
                   )
                 ORDER BY u.username"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([session_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn student_history(&self, user_id: i64) -> Result<Vec<HistoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {RECORD_COLUMNS}, s.title, s.start_time, s.end_time
                 FROM records r
                 JOIN sessions s ON r.session_id = s.id
                 WHERE r.user_id = ?1
                 ORDER BY r.checkin_time DESC, r.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| {
                    let record = record_from_row(row, 0)?;
                    Ok(HistoryRow {
                        session_id: record.session_id,
                        title: row.get(10)?,
                        start_time: row.get(11)?,
                        end_time: row.get(12)?,
                        record,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn occupied_seats(&self, session_id: i64) -> Result<Vec<SeatRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.seat_row, r.seat_col, r.user_id, u.name
                 FROM records r
                 JOIN users u ON r.user_id = u.id
                 WHERE r.session_id = ?1 AND r.seat_row IS NOT NULL AND r.seat_col IS NOT NULL
                 ORDER BY r.seat_row, r.seat_col, r.checkin_time",
            )?;
            let rows = stmt
                .query_map([session_id], |row| {
                    let seat_row: String = row.get(0)?;
                    let seat_col: i64 = row.get(1)?;
                    Ok((seat_row, seat_col, row.get::<_, i64>(2)?, row.get::<_, String>(3)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            // Rows written outside this service might not parse; drop them.
            Ok(rows
                .into_iter()
                .filter_map(|(seat_row, seat_col, user_id, name)| {
                    let row = seat_row.chars().next()?;
                    let col = u32::try_from(seat_col).ok()?;
                    Some(SeatRow {
                        seat: Seat { row, col },
                        user_id,
                        name,
                    })
                })
                .collect())
        })
    }

    // -- Statistics --

    pub fn student_checkin_counts(&self) -> Result<Vec<StudentCountRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.name, COUNT(r.id)
                 FROM users u
                 LEFT JOIN records r ON r.user_id = u.id
                 WHERE u.role = 'student'
                 GROUP BY u.id
                 ORDER BY u.username",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(StudentCountRow {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        name: row.get(2)?,
                        checkins: row.get::<_, i64>(3)? as u64,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Per-session counts of student check-ins, newest session first.
    pub fn session_checkin_counts(&self) -> Result<Vec<SessionCountRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.title, COUNT(u.id)
                 FROM sessions s
                 LEFT JOIN records r ON r.session_id = s.id
                 LEFT JOIN users u ON u.id = r.user_id AND u.role = 'student'
                 GROUP BY s.id
                 ORDER BY s.start_time DESC, s.id DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(SessionCountRow {
                        session_id: row.get(0)?,
                        title: row.get(1)?,
                        checkins: row.get::<_, i64>(2)? as u64,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn insert_user(conn: &Connection, user: &NewUser<'_>, created_at: DateTime<Utc>) -> Result<Inserted> {
    let res = conn.execute(
        "INSERT INTO users (username, password, role, name, student_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.username,
            user.password_hash,
            user.role.as_str(),
            user.name,
            user.student_id,
            created_at
        ],
    );
    unique_outcome(conn, res)
}

/// Maps a UNIQUE violation to `Inserted::Duplicate`; any other failure is an error.
fn unique_outcome(conn: &Connection, res: rusqlite::Result<usize>) -> Result<Inserted> {
    match res {
        Ok(_) => Ok(Inserted::Created(conn.last_insert_rowid())),
        Err(e) if is_unique_violation(&e) => Ok(Inserted::Duplicate),
        Err(e) => Err(e.into()),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && matches!(
                    e.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1");
    conn.query_row(&sql, [username], user_from_row).optional()
}

fn query_session_by_id(conn: &Connection, id: i64) -> Result<Option<SessionRow>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions s WHERE s.id = ?1");
    conn.query_row(&sql, [id], session_from_row).optional()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    let raw_role: String = row.get(3)?;
    let role: Role = raw_role
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        role,
        name: row.get(4)?,
        student_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        title: row.get(1)?,
        checkin_code: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        created_by: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Reads the ten `RECORD_COLUMNS` starting at `offset`.
fn record_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<RecordRow> {
    let seat_col: Option<i64> = row.get(offset + 9)?;
    Ok(RecordRow {
        id: row.get(offset)?,
        session_id: row.get(offset + 1)?,
        user_id: row.get(offset + 2)?,
        checkin_time: row.get(offset + 3)?,
        latitude: row.get(offset + 4)?,
        longitude: row.get(offset + 5)?,
        location_accuracy: row.get(offset + 6)?,
        location_time: row.get(offset + 7)?,
        seat_row: row.get(offset + 8)?,
        seat_col: seat_col.and_then(|c| u32::try_from(c).ok()),
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
