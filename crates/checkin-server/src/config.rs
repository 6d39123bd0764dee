use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use rand::RngCore;
use tracing::warn;

/// Placeholder secrets that MUST NOT be used outside debug mode.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "dev-secret-change-me",
    "dev-secret-key-change-in-production",
];

pub struct Config {
    pub secret_key: String,
    pub debug: bool,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub admin_password: String,
    pub import_password: String,
    pub token_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let debug = debug_flag(get("CHECKIN_DEBUG"));

        let secret_key = match get("CHECKIN_SECRET_KEY").filter(|s| !s.trim().is_empty()) {
            Some(key) if !PLACEHOLDER_SECRETS.contains(&key.as_str()) => key,
            _ if debug => {
                warn!("CHECKIN_SECRET_KEY unset; using a random key, sessions end on restart");
                random_secret()
            }
            _ => bail!("CHECKIN_SECRET_KEY is unset or still a placeholder"),
        };

        let port = get("CHECKIN_PORT")
            .unwrap_or_else(|| "5000".into())
            .parse()
            .context("CHECKIN_PORT must be a port number")?;

        let token_hours: i64 = get("CHECKIN_TOKEN_HOURS")
            .unwrap_or_else(|| "12".into())
            .parse()
            .context("CHECKIN_TOKEN_HOURS must be a whole number")?;
        if token_hours <= 0 {
            bail!("CHECKIN_TOKEN_HOURS must be positive");
        }

        Ok(Self {
            secret_key,
            debug,
            db_path: get("CHECKIN_DB_PATH").unwrap_or_else(|| "checkin.db".into()).into(),
            host: get("CHECKIN_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            admin_password: get("CHECKIN_ADMIN_PASSWORD").unwrap_or_else(|| "admin".into()),
            import_password: get("CHECKIN_IMPORT_PASSWORD").unwrap_or_else(|| "123456".into()),
            token_hours,
        })
    }
}

/// `1`, `true` or `yes` (any case) enable debug mode.
pub fn debug_flag(value: Option<String>) -> bool {
    value
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn random_secret() -> String {
    let mut key = [0u8; 32];
    rand::rng().fill_bytes(&mut key);
    B64.encode(key)
}
