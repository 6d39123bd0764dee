use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use rand::Rng;
use tracing::{info, warn};

use checkin_db::models::Inserted;
use checkin_types::api::{
    AttendeeEntry, Claims, CreateSessionRequest, CreateSessionResponse, OccupiedSeat,
    SessionRecordsResponse, SessionSummary, StudentEntry,
};
use checkin_types::models::{Record, Session};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::run_blocking;

pub const CODE_LENGTH: usize = 6;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Fresh codes tried before giving up on a UNIQUE collision.
const CODE_ATTEMPTS: usize = 5;

const DEFAULT_DURATION_MINUTES: i64 = 60;
const MAX_DURATION_MINUTES: i64 = 24 * 60;
const MAX_TITLE_LENGTH: usize = 200;

/// Random check-in code from the thread-local CSPRNG.
pub fn generate_checkin_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively and without surrounding whitespace.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// POST /api/admin/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LENGTH
        )));
    }

    let now = Utc::now();
    let start_time = req.start_time.unwrap_or(now);
    let end_time = match (req.end_time, req.duration_minutes) {
        (Some(_), Some(_)) => {
            return Err(ApiError::bad_request(
                "Provide either end_time or duration_minutes, not both",
            ));
        }
        (Some(end), None) => end,
        (None, minutes) => {
            let minutes = minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
            if !(1..=MAX_DURATION_MINUTES).contains(&minutes) {
                return Err(ApiError::bad_request(format!(
                    "Duration must be between 1 and {} minutes",
                    MAX_DURATION_MINUTES
                )));
            }
            start_time + Duration::minutes(minutes)
        }
    };
    if start_time >= end_time {
        return Err(ApiError::bad_request("End time must be after start time"));
    }

    let admin_id = claims.sub;
    let log_title = title.clone();
    let (session_id, checkin_code) = run_blocking(&state, move |state| {
        for _ in 0..CODE_ATTEMPTS {
            let code = generate_checkin_code();
            match state
                .db
                .create_session(&title, &code, start_time, end_time, admin_id, now)?
            {
                Inserted::Created(id) => return Ok((id, code)),
                Inserted::Duplicate => warn!("Check-in code collision, retrying"),
            }
        }
        Err(anyhow::anyhow!("no unique check-in code after {} attempts", CODE_ATTEMPTS).into())
    })
    .await?;

    info!(session_id, admin_id, title = %log_title, "Check-in session created");

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id,
            checkin_code,
            start_time,
            end_time,
        }),
    ))
}

/// GET /api/admin/sessions — newest first.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let rows = run_blocking(&state, |state| Ok(state.db.list_sessions()?)).await?;

    Ok(Json(
        rows.into_iter()
            .map(|(session, checkin_count)| SessionSummary {
                session: session.into(),
                checkin_count,
            })
            .collect(),
    ))
}

/// GET /api/admin/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> Result<Json<Session>, ApiError> {
    let session = run_blocking(&state, move |state| load_session(state, session_id)).await?;
    Ok(Json(session))
}

/// GET /api/admin/sessions/{id}/records — students split into checked in and missed.
pub async fn session_records(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> Result<Json<SessionRecordsResponse>, ApiError> {
    let resp = run_blocking(&state, move |state| {
        let session = load_session(state, session_id)?;
        let attendees = state.db.session_attendees(session_id)?;
        let missed = state.db.missed_students(session_id)?;

        Ok(SessionRecordsResponse {
            session,
            checked_in: attendees
                .into_iter()
                .map(|a| AttendeeEntry {
                    record: Record::from(a.record),
                    username: a.username,
                    name: a.name,
                    student_id: a.student_id,
                })
                .collect(),
            missed: missed
                .into_iter()
                .map(|u| StudentEntry {
                    id: u.id,
                    username: u.username,
                    name: u.name,
                    student_id: u.student_id,
                })
                .collect(),
        })
    })
    .await?;

    Ok(Json(resp))
}

/// GET /api/admin/sessions/{id}/seats — includes who sits where.
pub async fn session_seats(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> Result<Json<Vec<OccupiedSeat>>, ApiError> {
    let seats = run_blocking(&state, move |state| {
        load_session(state, session_id)?;
        Ok(state.db.occupied_seats(session_id)?)
    })
    .await?;

    Ok(Json(
        seats
            .into_iter()
            .map(|s| OccupiedSeat {
                seat: s.seat,
                user_id: s.user_id,
                name: s.name,
            })
            .collect(),
    ))
}

pub(crate) fn load_session(
    state: &crate::auth::AppStateInner,
    session_id: i64,
) -> Result<Session, ApiError> {
    state
        .db
        .get_session(session_id)?
        .map(Session::from)
        .ok_or_else(|| ApiError::NotFound("Session not found".into()))
}
