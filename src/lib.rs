//! what2eat: nearby restaurant recommendations on top of a metered places API.
//!
//! A recommendation spends one unit of a daily call budget, searches (or
//! reuses a cached search of) rated restaurants around a point, picks a few
//! at random and resolves photo URLs only for those.

pub mod config;
pub mod error;
pub mod geo;
pub mod places;
pub mod quota;
pub mod recommender;
pub mod request_log;
pub mod selector;
pub mod server;

pub use config::Config;
pub use error::{ConfigError, RecommendError};
pub use recommender::{Recommendation, Recommender};
