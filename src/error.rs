use thiserror::Error;

/// Why a recommendation could not be produced.
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Daily API limit reached ({current}/{limit}), resets in {reset_in}")]
    QuotaExceeded {
        current: u32,
        limit: u32,
        /// Human-readable ETA, e.g. "7h5m12s".
        reset_in: String,
    },

    #[error("Restaurant search failed: {detail}")]
    UpstreamSearchFailed { detail: String },

    #[error("Invalid coordinates ({lat}, {lng}). Lat: -90..90, Lng: -180..180")]
    InvalidCoordinates { lat: f64, lng: f64 },
}

/// Failure writing local state. Logged by callers, never surfaced.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(String),
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: String, value: String },
}
