use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::json;
use tracing::{info, warn};

use checkin_db::Database;
use checkin_db::models::{Inserted, NewUser, UserRow};
use checkin_types::api::{
    Claims, Identity, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
};
use checkin_types::models::Role;

use crate::cookie::CookieConfig;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::run_blocking;

pub const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_NAME_LENGTH: usize = 64;

/// Well-formed Argon2id hash (default params, zero digest) that no password
/// matches. Checked when the username is unknown.
const UNKNOWN_USER_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub secret: String,
    pub token_ttl: chrono::Duration,
    pub cookie: CookieConfig,
    /// Initial password for imported students whose row carries none.
    pub import_password: String,
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let name = req.name.trim().to_string();
    validate_username(&username)?;
    validate_name(&name)?;
    validate_password(&req.password)?;
    let student_id = req
        .student_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let created = run_blocking(&state, move |state| {
        let password_hash = hash_password(&req.password)?;
        let user = NewUser {
            username: &username,
            password_hash: &password_hash,
            role: Role::Student,
            name: &name,
            student_id: student_id.as_deref(),
        };
        Ok(state.db.create_user(&user, Utc::now())?)
    })
    .await?;

    match created {
        Inserted::Created(user_id) => {
            info!(user_id, "Student registered");
            Ok((
                StatusCode::CREATED,
                Json(RegisterResponse {
                    user_id,
                    message: "Registration successful".into(),
                }),
            ))
        }
        Inserted::Duplicate => Err(ApiError::Conflict(
            "Username or student ID already exists".into(),
        )),
    }
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let LoginRequest {
        username,
        password,
        role,
    } = req;
    let username = username.trim().to_string();
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Username and password are required"));
    }

    let lookup = username.clone();
    let user = run_blocking(&state, move |state| {
        // Unknown user, wrong role and wrong password all look the same to the
        // caller, and all pay for one Argon2 verification.
        let user = match state.db.get_user_by_username(&lookup)? {
            Some(u) => {
                let password_ok = verify_password(&password, &u.password);
                (password_ok && u.role == role).then_some(u)
            }
            None => {
                verify_password(&password, UNKNOWN_USER_HASH);
                None
            }
        };
        Ok(user)
    })
    .await?;

    let Some(user) = user else {
        warn!(%username, %role, "Failed login");
        return Err(ApiError::Unauthenticated("Invalid credentials".into()));
    };

    let token = create_token(&state.secret, &user, state.token_ttl)?;
    info!(user_id = user.id, role = %user.role, "User logged in");

    Ok((
        [(header::SET_COOKIE, state.cookie.set_header(&token))],
        Json(LoginResponse {
            user_id: user.id,
            username: user.username,
            name: user.name,
            role: user.role,
            token,
        }),
    ))
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, state.cookie.delete_header())],
        Json(json!({ "success": true })),
    )
}

/// GET /api/me — a token whose account no longer exists is rejected.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Identity>, ApiError> {
    let user_id = claims.sub;
    let user = run_blocking(&state, move |state| Ok(state.db.get_user_by_id(user_id)?))
        .await?
        .ok_or_else(ApiError::not_authenticated)?;

    Ok(Json(Identity {
        user_id: user.id,
        username: user.username,
        name: user.name,
        role: user.role,
    }))
}

/// Hash password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn create_token(secret: &str, user: &UserRow, ttl: chrono::Duration) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        name: user.name.clone(),
        role: user.role,
        exp: (Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> anyhow::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

pub(crate) fn validate_username(username: &str) -> Result<(), ApiError> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(ApiError::bad_request("Username must be 3-32 characters"));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ApiError::bad_request(
            "Username may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

pub(crate) fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(())
}
