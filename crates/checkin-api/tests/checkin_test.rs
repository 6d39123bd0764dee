mod common;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};

use common::{TestApp, test_app};

/// Creates a session whose window is `[now + start_offset, now + end_offset]`.
async fn session_at(
    app: &TestApp,
    admin: &str,
    title: &str,
    start_offset: Duration,
    end_offset: Duration,
) -> Value {
    let now = Utc::now();
    let reply = app
        .post(
            "/api/admin/sessions",
            admin,
            json!({
                "title": title,
                "start_time": now + start_offset,
                "end_time": now + end_offset,
            }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.text());
    reply.json()
}

#[tokio::test]
async fn lecture_scenario() {
    let app = test_app();
    let admin = app.admin().await;
    let alice = app.student("alice", "Alice").await;
    let bob = app.student("bob", "Bob").await;

    // Started 5 minutes ago, 60-minute window
    let lecture = session_at(&app, &admin, "Lecture 1", Duration::minutes(-5), Duration::minutes(55)).await;
    let code = lecture["checkin_code"].as_str().unwrap().to_string();

    let reply = app.post("/api/student/checkin", &alice, json!({ "checkin_code": code })).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["session_title"], "Lecture 1");

    let reply = app.post("/api/student/checkin", &alice, json!({ "checkin_code": code })).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.json()["error"], "You have already checked in for this session");

    // Started 70 minutes ago: the 60-minute window is over
    let late = session_at(&app, &admin, "Lecture 1 (late)", Duration::minutes(-70), Duration::minutes(-10)).await;
    let reply = app
        .post("/api/student/checkin", &bob, json!({ "checkin_code": late["checkin_code"] }))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error"], "Check-in time has expired");

    let records = app
        .get(&format!("/api/admin/sessions/{}/records", lecture["session_id"]), &admin)
        .await
        .json();
    assert_eq!(records["checked_in"].as_array().unwrap().len(), 1);
    assert_eq!(records["checked_in"][0]["username"], "alice");
    assert_eq!(records["missed"].as_array().unwrap().len(), 1);
    assert_eq!(records["missed"][0]["username"], "bob");
}

#[tokio::test]
async fn check_in_before_start_is_rejected() {
    let app = test_app();
    let admin = app.admin().await;
    let alice = app.student("alice", "Alice").await;

    let future = session_at(&app, &admin, "Tomorrow", Duration::minutes(10), Duration::minutes(70)).await;
    let reply = app
        .post("/api/student/checkin", &alice, json!({ "checkin_code": future["checkin_code"] }))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error"], "Check-in has not started yet");
}

#[tokio::test]
async fn code_is_case_insensitive_and_unknown_codes_are_not_found() {
    let app = test_app();
    let admin = app.admin().await;
    let alice = app.student("alice", "Alice").await;

    let session = session_at(&app, &admin, "Lab", Duration::minutes(-1), Duration::minutes(30)).await;
    let lower = session["checkin_code"].as_str().unwrap().to_lowercase();

    let reply = app
        .post("/api/student/checkin", &alice, json!({ "checkin_code": format!(" {} ", lower) }))
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = app.post("/api/student/checkin", &alice, json!({ "checkin_code": "ZZZZZZZZ" })).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = app.post("/api/student/checkin", &alice, json!({ "checkin_code": "  " })).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_session_defaults_and_validation() {
    let app = test_app();
    let admin = app.admin().await;

    let reply = app.post("/api/admin/sessions", &admin, json!({ "title": "Default" })).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let body = reply.json();
    let start: DateTime<Utc> = serde_json::from_value(body["start_time"].clone()).unwrap();
    let end: DateTime<Utc> = serde_json::from_value(body["end_time"].clone()).unwrap();
    assert_eq!(end - start, Duration::minutes(60));
    let code = body["checkin_code"].as_str().unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

    let reply = app
        .post("/api/admin/sessions", &admin, json!({ "title": "Short", "duration_minutes": 15 }))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);

    let now = Utc::now();
    let invalid = [
        json!({ "title": "  " }),
        json!({ "title": "Backwards", "start_time": now, "end_time": now - Duration::minutes(1) }),
        json!({ "title": "Empty", "start_time": now, "end_time": now }),
        json!({ "title": "Zero", "duration_minutes": 0 }),
        json!({ "title": "Both", "end_time": now + Duration::minutes(5), "duration_minutes": 5 }),
    ];
    for body in invalid {
        let reply = app.post("/api/admin/sessions", &admin, body.clone()).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "accepted {}", body);
    }
}

#[tokio::test]
async fn sessions_list_and_lookup() {
    let app = test_app();
    let admin = app.admin().await;

    let first = session_at(&app, &admin, "First", Duration::zero(), Duration::minutes(30)).await;
    let second = session_at(&app, &admin, "Second", Duration::zero(), Duration::minutes(30)).await;

    let list = app.get("/api/admin/sessions", &admin).await.json();
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], second["session_id"]);
    assert_eq!(list[1]["id"], first["session_id"]);
    assert_eq!(list[0]["checkin_count"], 0);

    let one = app
        .get(&format!("/api/admin/sessions/{}", first["session_id"]), &admin)
        .await;
    assert_eq!(one.status, StatusCode::OK);
    assert_eq!(one.json()["title"], "First");

    let missing = app.get("/api/admin/sessions/9999", &admin).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    let missing = app.get("/api/admin/sessions/9999/records", &admin).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn seat_and_location_check_in() {
    let app = test_app();
    let admin = app.admin().await;
    let alice = app.student("alice", "Alice").await;
    let bob = app.student("bob", "Bob").await;

    let session = session_at(&app, &admin, "Seminar", Duration::minutes(-1), Duration::minutes(30)).await;
    let code = session["checkin_code"].as_str().unwrap().to_string();

    let reply = app
        .post(
            "/api/student/checkin",
            &alice,
            json!({
                "checkin_code": code,
                "location": { "latitude": 31.23, "longitude": 121.47, "accuracy": 20.0 },
                "seat": { "row": "c", "col": 5 },
            }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.text());

    // Same seat: accepted, not deduplicated
    let reply = app
        .post(
            "/api/student/checkin",
            &bob,
            json!({ "checkin_code": code, "seat": { "row": "C", "col": 5 } }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let seats = app.get(&format!("/api/student/seats?code={}", code), &alice).await.json();
    assert_eq!(seats, json!([{ "row": "C", "col": 5 }]));

    let seats = app
        .get(&format!("/api/admin/sessions/{}/seats", session["session_id"]), &admin)
        .await
        .json();
    assert_eq!(seats.as_array().unwrap().len(), 2);

    let records = app
        .get(&format!("/api/admin/sessions/{}/records", session["session_id"]), &admin)
        .await
        .json();
    let alice_record = &records["checked_in"][0];
    assert_eq!(alice_record["seat"], json!({ "row": "C", "col": 5 }));
    assert_eq!(alice_record["location"]["latitude"], 31.23);
}

#[tokio::test]
async fn invalid_seat_or_location_is_rejected() {
    let app = test_app();
    let admin = app.admin().await;
    let alice = app.student("alice", "Alice").await;
    let session = session_at(&app, &admin, "Seminar", Duration::minutes(-1), Duration::minutes(30)).await;

    let bad = [
        json!({ "checkin_code": session["checkin_code"], "seat": { "row": "7", "col": 1 } }),
        json!({ "checkin_code": session["checkin_code"], "seat": { "row": "A", "col": 0 } }),
        json!({ "checkin_code": session["checkin_code"], "location": { "latitude": 120.0, "longitude": 0.0 } }),
    ];
    for body in bad {
        let reply = app.post("/api/student/checkin", &alice, body).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }

    // Nothing was recorded
    let history = app.get("/api/student/history", &alice).await.json();
    assert_eq!(history, json!([]));
}

#[tokio::test]
async fn history_lists_own_check_ins() {
    let app = test_app();
    let admin = app.admin().await;
    let alice = app.student("alice", "Alice").await;
    let bob = app.student("bob", "Bob").await;

    let s1 = session_at(&app, &admin, "Week 1", Duration::minutes(-1), Duration::minutes(30)).await;
    let s2 = session_at(&app, &admin, "Week 2", Duration::minutes(-1), Duration::minutes(30)).await;
    app.post("/api/student/checkin", &alice, json!({ "checkin_code": s1["checkin_code"] })).await;
    app.post("/api/student/checkin", &alice, json!({ "checkin_code": s2["checkin_code"] })).await;
    app.post("/api/student/checkin", &bob, json!({ "checkin_code": s1["checkin_code"] })).await;

    let history = app.get("/api/student/history", &alice).await.json();
    let titles: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Week 2", "Week 1"]);

    let history = app.get("/api/student/history", &bob).await.json();
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn statistics_rates() {
    let app = test_app();
    let admin = app.admin().await;
    let alice = app.student("alice", "Alice").await;
    app.student("bob", "Bob").await;

    let s1 = session_at(&app, &admin, "Week 1", Duration::minutes(-1), Duration::minutes(30)).await;
    session_at(&app, &admin, "Week 2", Duration::minutes(-1), Duration::minutes(30)).await;
    app.post("/api/student/checkin", &alice, json!({ "checkin_code": s1["checkin_code"] })).await;

    let stats = app.get("/api/admin/statistics", &admin).await.json();
    assert_eq!(stats["total_students"], 2);
    assert_eq!(stats["total_sessions"], 2);
    assert_eq!(stats["total_checkins"], 1);
    assert_eq!(stats["overall_rate"], 25.0);

    let alice_stats = &stats["students"][0];
    assert_eq!(alice_stats["username"], "alice");
    assert_eq!(alice_stats["checkins"], 1);
    assert_eq!(alice_stats["rate"], 50.0);
    assert_eq!(stats["students"][1]["rate"], 0.0);

    let week1 = stats["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["title"] == "Week 1")
        .unwrap();
    assert_eq!(week1["rate"], 50.0);
}

#[tokio::test]
async fn seat_lookup_without_code_is_a_json_error() {
    let app = test_app();
    let alice = app.student("alice", "Alice").await;

    let reply = app.get("/api/student/seats", &alice).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.json()["error"].is_string());
}
