//! Places subsystem: nearby search against the external places service,
//! location-keyed result caching, and deferred photo resolution.

pub mod cache;
pub mod photos;
pub mod providers;
pub mod search;
pub mod types;

pub use cache::{CacheKey, SearchCache};
pub use photos::PhotoResolver;
pub use providers::{known_cuisines, GooglePlacesClient, PlacesSearchClient};
pub use search::{PhotoMode, PlaceSearch, SearchSettings};
pub use types::{Candidate, Photo, PlacesError};
