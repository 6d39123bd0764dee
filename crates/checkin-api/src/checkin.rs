use axum::{
    Extension, Json,
    extract::State,
};
use chrono::Utc;
use tracing::info;

use checkin_db::models::{CheckinOutcome, NewRecord};
use checkin_types::api::{CheckinRequest, CheckinResponse, Claims, HistoryEntry, SeatQuery};
use checkin_types::models::Seat;

use crate::auth::{AppState, AppStateInner};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::run_blocking;
use crate::sessions::normalize_code;

/// POST /api/student/checkin
pub async fn check_in(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CheckinRequest>,
) -> Result<Json<CheckinResponse>, ApiError> {
    let code = normalize_code(&req.checkin_code);
    if code.is_empty() {
        return Err(ApiError::bad_request("Check-in code is required"));
    }
    if let Some(location) = &req.location {
        location.validate().map_err(ApiError::BadRequest)?;
    }
    let seat = req
        .seat
        .map(Seat::normalized)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let location = req.location;
    let user_id = claims.sub;

    let (title, outcome) = run_blocking(&state, move |state| {
        let session = state
            .db
            .get_session_by_code(&code)?
            .ok_or_else(|| ApiError::NotFound("Invalid check-in code".into()))?;

        let outcome = state.db.check_in(&NewRecord {
            session_id: session.id,
            user_id,
            checkin_time: Utc::now(),
            location,
            seat,
        })?;
        Ok((session.title, outcome))
    })
    .await?;

    match outcome {
        CheckinOutcome::Recorded(record) => {
            info!(
                session_id = record.session_id,
                user_id,
                seat = ?record.seat(),
                "Student checked in"
            );
            Ok(Json(CheckinResponse {
                record_id: record.id,
                session_title: title,
                checkin_time: record.checkin_time,
                message: "Check-in successful".into(),
            }))
        }
        CheckinOutcome::AlreadyCheckedIn => Err(ApiError::Conflict(
            "You have already checked in for this session".into(),
        )),
        CheckinOutcome::NotStarted => Err(ApiError::bad_request("Check-in has not started yet")),
        CheckinOutcome::Expired => Err(ApiError::bad_request("Check-in time has expired")),
    }
}

/// GET /api/student/history — own check-ins, newest first.
pub async fn history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let user_id = claims.sub;
    let rows = run_blocking(&state, move |state| Ok(state.db.student_history(user_id)?)).await?;

    Ok(Json(
        rows.into_iter()
            .map(|h| HistoryEntry {
                seat: h.record.seat(),
                session_id: h.session_id,
                title: h.title,
                start_time: h.start_time,
                end_time: h.end_time,
                checkin_time: h.record.checkin_time,
            })
            .collect(),
    ))
}

/// GET /api/student/seats?code=XXXXXX — seats already taken, without names.
pub async fn occupied_seats(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SeatQuery>,
) -> Result<Json<Vec<Seat>>, ApiError> {
    let code = normalize_code(&query.code);
    if code.is_empty() {
        return Err(ApiError::bad_request("Check-in code is required"));
    }

    let seats = run_blocking(&state, move |state| seats_for_code(state, &code)).await?;
    Ok(Json(seats))
}

fn seats_for_code(state: &AppStateInner, code: &str) -> Result<Vec<Seat>, ApiError> {
    let session = state
        .db
        .get_session_by_code(code)?
        .ok_or_else(|| ApiError::NotFound("Invalid check-in code".into()))?;

    let mut seats: Vec<Seat> = state
        .db
        .occupied_seats(session.id)?
        .into_iter()
        .map(|s| s.seat)
        .collect();
    seats.dedup();
    Ok(seats)
}
