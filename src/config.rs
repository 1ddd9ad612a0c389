use crate::error::ConfigError;
use chrono_tz::Tz;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

const DEFAULT_ORIGINS: &str =
    "http://localhost:5173,http://localhost:3000,http://127.0.0.1:5173,http://127.0.0.1:5500";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub host: String,
    pub port: u16,
    pub daily_limit: u32,
    pub data_dir: PathBuf,
    pub quota_tz: Tz,
    pub cache_ttl_secs: u64,
    pub photo_delay_ms: u64,
    pub photo_max_width: u32,
    pub search_language: String,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    pub max_body_bytes: usize,
}

impl Config {
    /// Read configuration from the environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GOOGLE_MAPS_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing("GOOGLE_MAPS_API_KEY".into()))?;

        let data_dir = match lookup("DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir(),
        };

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ORIGINS.to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        Ok(Self {
            api_key,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "PORT", 8080)?,
            daily_limit: parse_or(&lookup, "DAILY_API_LIMIT", 600)?,
            data_dir,
            quota_tz: parse_or(&lookup, "QUOTA_TIMEZONE", crate::quota::DEFAULT_RESET_TZ)?,
            cache_ttl_secs: parse_ttl(&lookup)?,
            photo_delay_ms: parse_or(&lookup, "PHOTO_DELAY_MS", 300)?,
            photo_max_width: parse_or(&lookup, "PHOTO_MAX_WIDTH", 400)?,
            search_language: lookup("SEARCH_LANGUAGE").unwrap_or_else(|| "zh-TW".into()),
            allowed_origins,
            request_timeout_secs: parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
            max_body_bytes: parse_or(&lookup, "MAX_BODY_BYTES", 1 << 20)?,
        })
    }

    pub fn counter_path(&self) -> PathBuf {
        self.data_dir.join("counter.json")
    }

    pub fn request_log_path(&self) -> PathBuf {
        self.data_dir.join("api_logs.json")
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        ttl_from_secs(self.cache_ttl_secs).unwrap_or(chrono::Duration::MAX)
    }

    pub fn photo_delay(&self) -> Duration {
        Duration::from_millis(self.photo_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("what2eat"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn ttl_from_secs(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}

/// `CACHE_TTL_SECS` must also fit a chrono duration.
fn parse_ttl<F>(lookup: &F) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_or(lookup, "CACHE_TTL_SECS", 3600)?;
    match ttl_from_secs(secs) {
        Some(_) => Ok(secs),
        None => Err(ConfigError::Invalid {
            key: "CACHE_TTL_SECS".to_string(),
            value: secs.to_string(),
        }),
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            debug!("{key}: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                value: raw,
            }
        }),
    }
}
