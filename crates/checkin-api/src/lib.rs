pub mod auth;
pub mod checkin;
pub mod cookie;
pub mod csv;
pub mod error;
pub mod extract;
pub mod import;
pub mod middleware;
pub mod reports;
pub mod routes;
pub mod sessions;

use tracing::error;

use crate::auth::{AppState, AppStateInner};
use crate::error::ApiError;

/// Run blocking store work (SQLite, password hashing) off the async runtime.
pub(crate) async fn run_blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
}
