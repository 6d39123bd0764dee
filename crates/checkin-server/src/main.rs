mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use checkin_api::auth::{self, AppState, AppStateInner};
use checkin_api::cookie::CookieConfig;
use checkin_api::routes;
use checkin_db::Database;
use checkin_db::models::NewUser;
use checkin_types::models::Role;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logging starts before Config so its warnings are visible
    let default_filter = if config::debug_flag(std::env::var("CHECKIN_DEBUG").ok()) {
        "checkin=debug,checkin_api=debug,checkin_db=debug,tower_http=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.debug {
        info!("Running in DEBUG mode; session cookies are sent without the Secure flag");
    }

    let db = Database::open(&config.db_path)?;
    ensure_admin(&db, &config.admin_password)?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        secret: config.secret_key.clone(),
        token_ttl: chrono::Duration::hours(config.token_hours),
        cookie: CookieConfig {
            secure: !config.debug,
            max_age_secs: Some(config.token_hours * 3600),
            ..CookieConfig::default()
        },
        import_password: config.import_password.clone(),
    });

    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Check-in server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Create the default `admin` account on first start.
fn ensure_admin(db: &Database, password: &str) -> anyhow::Result<()> {
    if db.get_user_by_username("admin")?.is_some() {
        info!("Default admin account already exists");
        return Ok(());
    }

    let password_hash = auth::hash_password(password)?;
    let admin = NewUser {
        username: "admin",
        password_hash: &password_hash,
        role: Role::Admin,
        name: "Administrator",
        student_id: None,
    };
    if db.ensure_user(&admin, Utc::now())? {
        info!("Default admin account created (username: admin)");
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutting down server...");
}
