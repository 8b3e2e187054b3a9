use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use rollcall_ledger::parse_day_offset;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address.
    pub bind: SocketAddr,
    /// SQLite attendance database.
    pub db_path: PathBuf,
    /// JSON embedding cache (`{"encodings": [...], "names": [...]}`).
    pub gallery_path: PathBuf,
    /// Directory containing the SCRFD and ArcFace ONNX models.
    pub model_dir: PathBuf,
    /// Maximum Euclidean distance accepted as a match.
    pub tolerance: f32,
    /// UTC offset defining the civil day for attendance dedup.
    pub day_offset: FixedOffset,
    /// Attempts for an attendance write under lock contention.
    pub storage_attempts: u32,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let config = Self {
            bind: env_parse("ROLLCALL_BIND", "127.0.0.1:5000".parse()?)?,
            db_path: env_path("ROLLCALL_DB_PATH", data_dir.join("attendance.db")),
            gallery_path: env_path(
                "ROLLCALL_GALLERY_PATH",
                PathBuf::from("faces/encodings_cache.json"),
            ),
            model_dir: env_path("ROLLCALL_MODEL_DIR", data_dir.join("models")),
            tolerance: env_parse("ROLLCALL_TOLERANCE", rollcall_core::DEFAULT_TOLERANCE)?,
            day_offset: parse_day_offset(
                &std::env::var("ROLLCALL_DAY_OFFSET").unwrap_or_else(|_| "+00:00".to_string()),
            )
            .context("invalid ROLLCALL_DAY_OFFSET")?,
            storage_attempts: env_parse("ROLLCALL_STORAGE_RETRIES", 3)?,
            request_timeout: Duration::from_millis(env_parse("ROLLCALL_REQUEST_TIMEOUT_MS", 10_000)?),
            max_body_bytes: env_parse("ROLLCALL_MAX_BODY_BYTES", 16 * 1024 * 1024)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            bail!("ROLLCALL_TOLERANCE must be a finite non-negative number, got {}", self.tolerance);
        }
        if self.storage_attempts == 0 {
            bail!("ROLLCALL_STORAGE_RETRIES must be at least 1");
        }
        if self.max_body_bytes == 0 {
            bail!("ROLLCALL_MAX_BODY_BYTES must be > 0");
        }
        Ok(())
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
