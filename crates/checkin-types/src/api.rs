use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Location, Record, Role, Seat, Session};

// -- Token claims --

/// Signed identity carried in the session cookie (or a bearer header).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub student_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
    pub name: String,
    pub role: Role,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub name: String,
    pub role: Role,
}

// -- Sessions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSessionRequest {
    pub title: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: i64,
    pub checkin_code: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub session: Session,
    pub checkin_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttendeeEntry {
    #[serde(flatten)]
    pub record: Record,
    pub username: String,
    pub name: String,
    pub student_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StudentEntry {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub student_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionRecordsResponse {
    pub session: Session,
    pub checked_in: Vec<AttendeeEntry>,
    pub missed: Vec<StudentEntry>,
}

// -- Check-in --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckinRequest {
    pub checkin_code: String,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub seat: Option<Seat>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckinResponse {
    pub record_id: i64,
    pub session_title: String,
    pub checkin_time: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub session_id: i64,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub checkin_time: DateTime<Utc>,
    pub seat: Option<Seat>,
}

#[derive(Debug, Deserialize)]
pub struct SeatQuery {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OccupiedSeat {
    #[serde(flatten)]
    pub seat: Seat,
    pub user_id: i64,
    pub name: String,
}

// -- Reporting --

#[derive(Debug, Serialize, Deserialize)]
pub struct StudentStats {
    pub user_id: i64,
    pub username: String,
    pub name: String,
    pub checkins: u64,
    pub rate: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: i64,
    pub title: String,
    pub checkins: u64,
    pub rate: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatisticsResponse {
    pub total_students: u64,
    pub total_sessions: u64,
    pub total_checkins: u64,
    pub overall_rate: f64,
    pub students: Vec<StudentStats>,
    pub sessions: Vec<SessionStats>,
}

// -- Bulk import --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub success_count: u64,
    pub skip_count: u64,
    pub errors: Vec<ImportRowError>,
}
