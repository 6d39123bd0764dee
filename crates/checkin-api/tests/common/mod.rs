#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use checkin_api::auth::{AppState, AppStateInner, hash_password};
use checkin_api::cookie::CookieConfig;
use checkin_api::routes::router;
use checkin_db::Database;
use checkin_db::models::NewUser;
use checkin_types::models::Role;

pub const ADMIN_PASSWORD: &str = "admin-pass";
pub const IMPORT_PASSWORD: &str = "initial-pw";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _dir: TempDir,
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).unwrap()
    }
}

/// Fresh database with the default admin account.
pub fn test_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("checkin.db")).unwrap();

    let hash = hash_password(ADMIN_PASSWORD).unwrap();
    db.ensure_user(
        &NewUser {
            username: "admin",
            password_hash: &hash,
            role: Role::Admin,
            name: "Administrator",
            student_id: None,
        },
        Utc::now(),
    )
    .unwrap();

    let state: AppState = Arc::new(AppStateInner {
        db,
        secret: "test-secret".into(),
        token_ttl: chrono::Duration::hours(1),
        cookie: CookieConfig {
            secure: false,
            ..CookieConfig::default()
        },
        import_password: IMPORT_PASSWORD.into(),
    });

    TestApp {
        router: router(state.clone()),
        state,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Reply {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        Reply {
            status,
            headers,
            body,
        }
    }

    pub async fn json(&self, method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Reply {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = cookie {
            req = req.header(header::COOKIE, format!("checkin_session={}", token));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    pub async fn get(&self, uri: &str, cookie: &str) -> Reply {
        self.json(Method::GET, uri, Some(cookie), None).await
    }

    pub async fn post(&self, uri: &str, cookie: &str, body: Value) -> Reply {
        self.json(Method::POST, uri, Some(cookie), Some(body)).await
    }

    pub async fn post_csv(&self, uri: &str, cookie: &str, csv: impl Into<Body>) -> Reply {
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::COOKIE, format!("checkin_session={}", cookie))
            .header(header::CONTENT_TYPE, "text/csv")
            .body(csv.into())
            .unwrap();
        self.send(req).await
    }

    /// Logs in and returns the session token taken from the Set-Cookie header.
    pub async fn login(&self, username: &str, password: &str, role: &str) -> String {
        let reply = self
            .json(
                Method::POST,
                "/api/login",
                None,
                Some(json!({ "username": username, "password": password, "role": role })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "login failed: {}", reply.text());

        let set_cookie = reply.headers[header::SET_COOKIE].to_str().unwrap();
        let token = set_cookie
            .strip_prefix("checkin_session=")
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        token.to_string()
    }

    pub async fn admin(&self) -> String {
        self.login("admin", ADMIN_PASSWORD, "admin").await
    }

    pub async fn register(&self, username: &str, name: &str) -> i64 {
        let reply = self
            .json(
                Method::POST,
                "/api/register",
                None,
                Some(json!({ "username": username, "password": "password1", "name": name })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "register failed: {}", reply.text());
        reply.json()["user_id"].as_i64().unwrap()
    }

    pub async fn student(&self, username: &str, name: &str) -> String {
        self.register(username, name).await;
        self.login(username, "password1", "student").await
    }
}
