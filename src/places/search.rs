//! Place search: orchestrates the lookup chain.
//!
//! Flow:  Cache → primary nearby search → rating filter → name-keyword top-up (if sparse) → Cache

use super::cache::{CacheKey, SearchCache};
use super::photos::PhotoResolver;
use super::providers::{self, PlacesSearchClient};
use super::types::{Candidate, NearbySearchRequest, Photo, PlaceResult, PlacesError, RankBy, SearchTerm};
use crate::geo;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tuning for the search pipeline.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Inclusive lower bound on rating.
    pub min_rating: f64,
    /// Below this many filtered results, name keywords are tried too.
    pub sparse_threshold: usize,
    pub language: String,
    /// How many candidates a recommendation returns.
    pub recommend_count: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            min_rating: 3.5,
            sparse_threshold: 5,
            language: "zh-TW".into(),
            recommend_count: crate::selector::DEFAULT_PICK_COUNT,
        }
    }
}

/// Whether returned candidates should carry URLs or bare references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhotoMode {
    #[default]
    Deferred,
    Resolved,
}

pub struct PlaceSearch {
    client: Arc<dyn PlacesSearchClient>,
    cache: Arc<SearchCache>,
    photos: Arc<PhotoResolver>,
    settings: SearchSettings,
}

impl PlaceSearch {
    pub fn new(
        client: Arc<dyn PlacesSearchClient>,
        cache: Arc<SearchCache>,
        photos: Arc<PhotoResolver>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            client,
            cache,
            photos,
            settings,
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Find rated restaurants near a point.
    ///
    /// Only a failure of the primary query is an error; supplementary
    /// name-keyword queries that fail are logged and skipped.
    pub fn search(
        &self,
        lat: f64,
        lng: f64,
        cuisine: &str,
        mode: PhotoMode,
    ) -> Result<Vec<Candidate>, PlacesError> {
        let key = CacheKey::new(lat, lng, cuisine);

        if let Some(cached) = self.cache.get(&key) {
            debug!("Cache hit for ({:.3}, {:.3}) type='{}'", lat, lng, cuisine);
            return Ok(self.apply_mode(cached, mode));
        }

        let term = providers::primary_term(cuisine);
        info!("Searching ({:.4}, {:.4}) with {}", lat, lng, term);

        let results = self.client.nearby_search(&self.request(lat, lng, term))?;
        info!("Places returned {} results", results.len());
        for (i, place) in results.iter().take(10).enumerate() {
            debug!(
                "  #{} {} (rating {:.1}) - {}",
                i + 1,
                place.name,
                place.rating.unwrap_or(0.0),
                place.vicinity
            );
        }

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        self.collect(lat, lng, cuisine, results, &mut seen, &mut candidates);

        if candidates.len() < self.settings.sparse_threshold && !cuisine.is_empty() {
            info!(
                "Only {} results for '{}', topping up with name keywords",
                candidates.len(),
                cuisine
            );
            for name in providers::name_keywords(cuisine) {
                let term = SearchTerm::Name(name.to_string());
                match self.client.nearby_search(&self.request(lat, lng, term)) {
                    Ok(results) => {
                        debug!("Name search '{}' returned {} results", name, results.len());
                        self.collect(lat, lng, cuisine, results, &mut seen, &mut candidates);
                    }
                    Err(e) => warn!("Name search '{}' failed: {}", name, e),
                }
            }
        }

        self.cache.put(key, candidates.clone());
        Ok(self.apply_mode(candidates, mode))
    }

    fn request(&self, lat: f64, lng: f64, term: SearchTerm) -> NearbySearchRequest {
        NearbySearchRequest {
            lat,
            lng,
            rank_by: RankBy::Distance,
            language: self.settings.language.clone(),
            term,
        }
    }

    /// Filter, enrich and append results not seen before.
    fn collect(
        &self,
        lat: f64,
        lng: f64,
        cuisine: &str,
        results: Vec<PlaceResult>,
        seen: &mut HashSet<String>,
        out: &mut Vec<Candidate>,
    ) {
        for place in results {
            let rating = place.rating.unwrap_or(0.0);
            if rating < self.settings.min_rating || seen.contains(&place.place_id) {
                continue;
            }
            seen.insert(place.place_id.clone());
            out.push(to_candidate(lat, lng, cuisine, place, rating));
        }
    }

    fn apply_mode(&self, mut candidates: Vec<Candidate>, mode: PhotoMode) -> Vec<Candidate> {
        if mode == PhotoMode::Resolved {
            self.photos.resolve_all_unpaced(&mut candidates);
        }
        candidates
    }
}

fn to_candidate(lat: f64, lng: f64, cuisine: &str, place: PlaceResult, rating: f64) -> Candidate {
    let loc = place.geometry.location;
    let distance_m = geo::haversine_m(lat, lng, loc.lat, loc.lng);
    let photo = place
        .photos
        .into_iter()
        .next()
        .map(|p| Photo::Unresolved(p.photo_reference))
        .unwrap_or(Photo::Absent);

    Candidate {
        name: place.name,
        rating,
        address: place.vicinity,
        place_id: place.place_id,
        price_level: place.price_level,
        average_price: geo::price_bracket(place.price_level).to_string(),
        distance: geo::format_distance(distance_m),
        distance_m,
        cuisine_type: cuisine.to_string(),
        photo,
    }
}
