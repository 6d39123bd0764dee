use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};
use crate::checkin;
use crate::import::{self, MAX_IMPORT_SIZE};
use crate::middleware::{require_admin, require_auth, require_student};
use crate::reports;
use crate::sessions;

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/login", post(auth::login))
        .route("/api/register", post(auth::register))
        .route("/api/logout", post(auth::logout));

    let identity_routes = Router::new()
        .route("/api/me", get(auth::me))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Layers run bottom-up: require_auth attaches claims before the role check.
    let admin_routes = Router::new()
        .route(
            "/api/admin/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route("/api/admin/sessions/{session_id}", get(sessions::get_session))
        .route(
            "/api/admin/sessions/{session_id}/records",
            get(sessions::session_records),
        )
        .route(
            "/api/admin/sessions/{session_id}/export",
            get(reports::export_session_csv),
        )
        .route(
            "/api/admin/sessions/{session_id}/seats",
            get(sessions::session_seats),
        )
        .route(
            "/api/admin/students/import",
            // The handler enforces MAX_IMPORT_SIZE; the extractor limit sits above it
            post(import::import_students).layer(DefaultBodyLimit::max(MAX_IMPORT_SIZE * 2)),
        )
        .route("/api/admin/statistics", get(reports::statistics))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let student_routes = Router::new()
        .route("/api/student/checkin", post(checkin::check_in))
        .route("/api/student/history", get(checkin::history))
        .route("/api/student/seats", get(checkin::occupied_seats))
        .route_layer(middleware::from_fn(require_student))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(identity_routes)
        .merge(admin_routes)
        .merge(student_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
