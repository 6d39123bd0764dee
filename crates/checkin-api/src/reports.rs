use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, header},
    response::IntoResponse,
};
use chrono::SecondsFormat;

use checkin_db::models::{AttendeeRow, UserRow};
use checkin_types::api::{SessionStats, StatisticsResponse, StudentStats};
use checkin_types::models::attendance_rate;

use crate::auth::AppState;
use crate::csv;
use crate::error::ApiError;
use crate::run_blocking;
use crate::sessions::load_session;

pub const EXPORT_HEADER: [&str; 8] = [
    "username",
    "name",
    "student_id",
    "status",
    "checkin_time",
    "seat",
    "latitude",
    "longitude",
];

/// GET /api/admin/statistics
pub async fn statistics(
    State(state): State<AppState>,
) -> Result<Json<StatisticsResponse>, ApiError> {
    let (students, sessions) = run_blocking(&state, |state| {
        Ok((
            state.db.student_checkin_counts()?,
            state.db.session_checkin_counts()?,
        ))
    })
    .await?;

    let total_students = students.len() as u64;
    let total_sessions = sessions.len() as u64;
    let total_checkins: u64 = students.iter().map(|s| s.checkins).sum();

    Ok(Json(StatisticsResponse {
        total_students,
        total_sessions,
        total_checkins,
        overall_rate: attendance_rate(total_checkins, total_students * total_sessions),
        students: students
            .into_iter()
            .map(|s| StudentStats {
                rate: attendance_rate(s.checkins, total_sessions),
                user_id: s.user_id,
                username: s.username,
                name: s.name,
                checkins: s.checkins,
            })
            .collect(),
        sessions: sessions
            .into_iter()
            .map(|s| SessionStats {
                rate: attendance_rate(s.checkins, total_students),
                session_id: s.session_id,
                title: s.title,
                checkins: s.checkins,
            })
            .collect(),
    }))
}

/// GET /api/admin/sessions/{id}/export
///
/// `text/csv` attachment: present students in check-in order, then absent
/// students by username.
pub async fn export_session_csv(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let (attendees, missed) = run_blocking(&state, move |state| {
        load_session(state, session_id)?;
        Ok((
            state.db.session_attendees(session_id)?,
            state.db.missed_students(session_id)?,
        ))
    })
    .await?;

    let body = render_attendance_csv(&attendees, &missed);
    let filename = format!("attendance_session_{}.csv", session_id);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
            .unwrap_or(HeaderValue::from_static("attachment")),
    );

    Ok((headers, body))
}

pub fn render_attendance_csv(attendees: &[AttendeeRow], missed: &[UserRow]) -> String {
    let mut out = String::new();
    out.push(csv::UTF8_BOM);
    csv::write_row(&mut out, &EXPORT_HEADER);

    for a in attendees {
        let r = &a.record;
        csv::write_row(
            &mut out,
            &[
                a.username.clone(),
                a.name.clone(),
                a.student_id.clone().unwrap_or_default(),
                "present".to_string(),
                r.checkin_time.to_rfc3339_opts(SecondsFormat::Secs, true),
                r.seat().map(|s| s.to_string()).unwrap_or_default(),
                r.latitude.map(|v| v.to_string()).unwrap_or_default(),
                r.longitude.map(|v| v.to_string()).unwrap_or_default(),
            ],
        );
    }

    for u in missed {
        csv::write_row(
            &mut out,
            &[
                u.username.clone(),
                u.name.clone(),
                u.student_id.clone().unwrap_or_default(),
                "absent".to_string(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
            ],
        );
    }

    out
}
