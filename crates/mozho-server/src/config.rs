use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub storage_dir: PathBuf,
    pub public_url: String,
    pub storage_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("MOZHO_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MOZHO_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        let port: u16 = get("MOZHO_PORT")
            .unwrap_or_else(|| "8080".into())
            .parse()
            .context("MOZHO_PORT must be a port number")?;
        let timeout_ms: u64 = get("MOZHO_STORAGE_TIMEOUT_MS")
            .unwrap_or_else(|| "5000".into())
            .parse()
            .context("MOZHO_STORAGE_TIMEOUT_MS must be a number of milliseconds")?;
        let max_upload_mb: usize = get("MOZHO_MAX_UPLOAD_MB")
            .unwrap_or_else(|| "32".into())
            .parse()
            .context("MOZHO_MAX_UPLOAD_MB must be a number")?;

        Ok(Self {
            host: get("MOZHO_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("MOZHO_DB_PATH").unwrap_or_else(|| "mozho.db".into()).into(),
            jwt_secret,
            storage_dir: get("MOZHO_STORAGE_DIR")
                .unwrap_or_else(|| "./object-storage".into())
                .into(),
            public_url: get("MOZHO_PUBLIC_URL")
                .unwrap_or_else(|| "http://localhost:8080/objects".into()),
            storage_timeout: Duration::from_millis(timeout_ms),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }
}
