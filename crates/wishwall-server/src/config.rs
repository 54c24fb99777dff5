use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use tracing::{info, warn};

pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    pub upload_dir: PathBuf,
    pub max_upload_size: usize,
    /// Allowed browser origins; empty means any origin
    pub cors_origins: Vec<String>,
    pub frontend_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = try_load::<String>("WISHWALL_JWT_SECRET", DEFAULT_JWT_SECRET)?;
        if jwt_secret == DEFAULT_JWT_SECRET {
            warn!("WISHWALL_JWT_SECRET is the development placeholder; set a real secret in production");
        }

        let token_ttl_minutes = try_load("WISHWALL_TOKEN_TTL_MINUTES", "10080")?;
        if token_ttl_minutes <= 0 {
            anyhow::bail!("WISHWALL_TOKEN_TTL_MINUTES must be positive");
        }

        Ok(Self {
            host: try_load("WISHWALL_HOST", "0.0.0.0")?,
            port: try_load("WISHWALL_PORT", "8000")?,
            db_path: try_load("WISHWALL_DB_PATH", "wishwall.db")?,
            jwt_secret,
            token_ttl_minutes,
            upload_dir: try_load("WISHWALL_UPLOAD_DIR", "uploads")?,
            max_upload_size: try_load("WISHWALL_MAX_UPLOAD_SIZE", "10485760")?,
            cors_origins: parse_origins(&env::var("WISHWALL_CORS_ORIGINS").unwrap_or_default()),
            frontend_url: try_load("WISHWALL_FRONTEND_URL", "https://wishingwall.app")?,
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e: T::Err| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Invalid {key} value '{raw}'"))
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
