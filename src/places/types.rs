//! Core types for the places subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How the upstream should order nearby results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankBy {
    Distance,
}

impl RankBy {
    pub fn as_param(&self) -> &'static str {
        match self {
            Self::Distance => "distance",
        }
    }
}

/// What narrows a nearby search. Ranking by distance requires exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
    /// Free-text keyword matched against names, types and reviews.
    Keyword(String),
    /// A place category such as `restaurant`.
    Category(String),
    /// Matched against place names only.
    Name(String),
}

impl SearchTerm {
    pub fn restaurant() -> Self {
        Self::Category("restaurant".into())
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyword(k) => write!(f, "keyword '{}'", k),
            Self::Category(c) => write!(f, "type '{}'", c),
            Self::Name(n) => write!(f, "name '{}'", n),
        }
    }
}

/// A single nearby search against the external places service.
#[derive(Debug, Clone)]
pub struct NearbySearchRequest {
    pub lat: f64,
    pub lng: f64,
    pub rank_by: RankBy,
    pub language: String,
    pub term: SearchTerm,
}

/// One raw result from the external places service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceResult {
    pub name: String,
    #[serde(default)]
    pub rating: Option<f64>,
    pub place_id: String,
    #[serde(default)]
    pub vicinity: String,
    #[serde(default)]
    pub price_level: Option<u8>,
    pub geometry: Geometry,
    #[serde(default)]
    pub photos: Vec<PlacePhoto>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlacePhoto {
    pub photo_reference: String,
}

/// Photo state of a candidate.
///
/// Search results carry only the opaque reference; a URL is built for the
/// handful of candidates that are actually returned to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Photo {
    Unresolved(String),
    Resolved(String),
    Absent,
}

impl Photo {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Resolved(url) => Some(url),
            _ => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved(_))
    }
}

/// A restaurant that passed filtering, enriched for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub rating: f64,
    pub address: String,
    pub place_id: String,
    pub price_level: Option<u8>,
    /// Human-readable spend estimate derived from `price_level`.
    pub average_price: String,
    /// Distance from the query point, e.g. "950m" or "1.5km".
    pub distance: String,
    pub distance_m: f64,
    pub cuisine_type: String,
    pub photo: Photo,
}

/// Failure talking to the external places service.
#[derive(Debug, Error)]
pub enum PlacesError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
    #[error("Upstream quota exhausted (OVER_QUERY_LIMIT): {0}")]
    QuotaExhausted(String),
    #[error("Request denied by upstream: {0}")]
    Denied(String),
}
