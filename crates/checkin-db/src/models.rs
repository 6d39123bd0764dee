//! Database row types — these map directly to SQLite rows.
//! Distinct from checkin-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};

use checkin_types::models::{Location, Record, Role, Seat, Session, User};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub role: Role,
    pub name: String,
    pub student_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            name: row.name,
            role: row.role,
            student_id: row.student_id,
            created_at: row.created_at,
        }
    }
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub name: &'a str,
    pub student_id: Option<&'a str>,
}

pub struct SessionRow {
    pub id: i64,
    pub title: String,
    pub checkin_code: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            checkin_code: row.checkin_code,
            start_time: row.start_time,
            end_time: row.end_time,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

pub struct RecordRow {
    pub id: i64,
    pub session_id: i64,
    pub user_id: i64,
    pub checkin_time: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_accuracy: Option<f64>,
    pub location_time: Option<DateTime<Utc>>,
    pub seat_row: Option<String>,
    pub seat_col: Option<u32>,
}

impl RecordRow {
    pub fn seat(&self) -> Option<Seat> {
        let row = self.seat_row.as_deref()?.chars().next()?;
        Some(Seat {
            row,
            col: self.seat_col?,
        })
    }

    pub fn location(&self) -> Option<Location> {
        Some(Location {
            latitude: self.latitude?,
            longitude: self.longitude?,
            accuracy: self.location_accuracy,
            timestamp: self.location_time,
        })
    }
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        Self {
            seat: row.seat(),
            location: row.location(),
            id: row.id,
            session_id: row.session_id,
            user_id: row.user_id,
            checkin_time: row.checkin_time,
        }
    }
}

pub struct NewRecord {
    pub session_id: i64,
    pub user_id: i64,
    pub checkin_time: DateTime<Utc>,
    pub location: Option<Location>,
    pub seat: Option<Seat>,
}

/// A record joined with the student who made it.
pub struct AttendeeRow {
    pub record: RecordRow,
    pub username: String,
    pub name: String,
    pub student_id: Option<String>,
}

pub struct HistoryRow {
    pub session_id: i64,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub record: RecordRow,
}

pub struct SeatRow {
    pub seat: Seat,
    pub user_id: i64,
    pub name: String,
}

pub struct StudentCountRow {
    pub user_id: i64,
    pub username: String,
    pub name: String,
    pub checkins: u64,
}

pub struct SessionCountRow {
    pub session_id: i64,
    pub title: String,
    pub checkins: u64,
}

/// Outcome of an insert guarded by a UNIQUE constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    Created(i64),
    Duplicate,
}

pub enum CheckinOutcome {
    Recorded(RecordRow),
    AlreadyCheckedIn,
    NotStarted,
    Expired,
}
