//! Recommendation pipeline.
//!
//! Flow:  validate → quota → search (cache first) → random pick → photo resolution → audit log

use crate::config::Config;
use crate::error::RecommendError;
use crate::geo;
use crate::places::{
    Candidate, PhotoMode, PhotoResolver, PlaceSearch, PlacesError, PlacesSearchClient, SearchCache,
    SearchSettings,
};
use crate::quota::{format_reset_eta, JsonFileStore, QuotaTracker};
use crate::request_log::{ApiRequestLog, RequestLog};
use crate::selector;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A successful recommendation. An empty list means nothing matched nearby.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub restaurants: Vec<Candidate>,
    pub message: String,
}

pub struct Recommender {
    quota: Arc<QuotaTracker>,
    search: PlaceSearch,
    photos: Arc<PhotoResolver>,
    log: Option<RequestLog>,
    count: usize,
}

impl Recommender {
    pub fn new(
        quota: Arc<QuotaTracker>,
        search: PlaceSearch,
        photos: Arc<PhotoResolver>,
        log: Option<RequestLog>,
    ) -> Self {
        let count = search.settings().recommend_count;
        Self {
            quota,
            search,
            photos,
            log,
            count,
        }
    }

    /// Assemble the full pipeline from configuration around a places client.
    pub fn from_config(config: &Config, client: Arc<dyn PlacesSearchClient>) -> Self {
        let quota = Arc::new(QuotaTracker::new(
            config.daily_limit,
            config.quota_tz,
            Box::new(JsonFileStore::new(config.counter_path())),
        ));
        let cache = Arc::new(SearchCache::new(config.cache_ttl()));
        let photos = Arc::new(PhotoResolver::new(
            client.clone(),
            config.photo_max_width,
            config.photo_delay(),
        ));
        let settings = SearchSettings {
            language: config.search_language.clone(),
            ..SearchSettings::default()
        };
        let search = PlaceSearch::new(client, cache, photos.clone(), settings);
        let log = RequestLog::new(config.request_log_path());
        Self::new(quota, search, photos, Some(log))
    }

    pub fn recommend(&self, lat: f64, lng: f64, cuisine: &str) -> Result<Recommendation, RecommendError> {
        self.recommend_via("recommend", lat, lng, cuisine)
    }

    /// Like `recommend`, recording `endpoint` in the audit log.
    pub fn recommend_via(
        &self,
        endpoint: &str,
        lat: f64,
        lng: f64,
        cuisine: &str,
    ) -> Result<Recommendation, RecommendError> {
        let result = self.run(lat, lng, cuisine);

        if let Some(log) = &self.log {
            log.append(ApiRequestLog {
                timestamp: Utc::now(),
                endpoint: endpoint.to_string(),
                lat: ApiRequestLog::coordinate(lat),
                lng: ApiRequestLog::coordinate(lng),
                cuisine: cuisine.to_string(),
                success: result.is_ok(),
                error: result.as_ref().err().map(|e| e.to_string()).unwrap_or_default(),
            });
        }
        result
    }

    fn run(&self, lat: f64, lng: f64, cuisine: &str) -> Result<Recommendation, RecommendError> {
        if !geo::valid_coordinates(lat, lng) {
            return Err(RecommendError::InvalidCoordinates { lat, lng });
        }

        let (current, limit) = self
            .quota
            .check_and_increment()
            .map_err(|e| self.quota_exceeded(e.current, e.limit))?;
        info!(
            "Recommendation request ({:.4}, {:.4}) type='{}' [{}/{}]",
            lat, lng, cuisine, current, limit
        );

        let pool = match self.search.search(lat, lng, cuisine, PhotoMode::Deferred) {
            Ok(pool) => pool,
            Err(PlacesError::QuotaExhausted(detail)) => {
                warn!("Upstream reports quota exhausted: {}", detail);
                self.quota.mark_exceeded();
                let (current, limit) = self.quota.usage();
                return Err(self.quota_exceeded(current, limit));
            }
            Err(e) => {
                return Err(RecommendError::UpstreamSearchFailed { detail: e.to_string() });
            }
        };

        if pool.is_empty() {
            info!("No matching restaurants near ({:.4}, {:.4}) type='{}'", lat, lng, cuisine);
            return Ok(Recommendation {
                restaurants: Vec::new(),
                message: "附近沒有找到符合條件的餐廳".into(),
            });
        }

        let mut picked = selector::pick_random(pool, self.count);
        self.photos.resolve_final(&mut picked);

        info!("Recommended {} restaurants", picked.len());
        Ok(Recommendation {
            message: format!("成功推薦 {} 家餐廳", picked.len()),
            restaurants: picked,
        })
    }

    fn quota_exceeded(&self, current: u32, limit: u32) -> RecommendError {
        RecommendError::QuotaExceeded {
            current,
            limit,
            reset_in: format_reset_eta(self.quota.time_until_reset()),
        }
    }

    pub fn usage(&self) -> (u32, u32) {
        self.quota.usage()
    }

    pub fn time_until_reset(&self) -> Duration {
        self.quota.time_until_reset()
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::places::search::testing::{place, FakePlacesClient};
    use crate::places::types::SearchTerm;
    use crate::places::Photo;
    use crate::quota::DEFAULT_RESET_TZ;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    const LAT: f64 = 25.0330;
    const LNG: f64 = 121.5654;

    struct Fixture {
        recommender: Recommender,
        client: Arc<FakePlacesClient>,
        dir: TempDir,
    }

    fn fixture(limit: u32) -> Fixture {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakePlacesClient::default());
        let quota = Arc::new(QuotaTracker::new(
            limit,
            DEFAULT_RESET_TZ,
            Box::new(JsonFileStore::new(dir.path().join("counter.json"))),
        ));
        let photos = Arc::new(PhotoResolver::new(client.clone(), 400, Duration::ZERO));
        let search = PlaceSearch::new(
            client.clone(),
            Arc::new(SearchCache::default()),
            photos.clone(),
            SearchSettings::default(),
        );
        let log = RequestLog::new(dir.path().join("api_logs.json"));
        Fixture {
            recommender: Recommender::new(quota, search, photos, Some(log)),
            client,
            dir,
        }
    }

    fn cafes() -> Vec<crate::places::types::PlaceResult> {
        vec![
            place("c1", 4.5, 120.0),
            place("c2", 3.5, 300.0),
            place("c3", 4.1, 450.0),
            place("c4", 3.9, 800.0),
            place("c5", 4.8, 1200.0),
            place("c6", 4.0, 1600.0),
            place("low", 2.9, 90.0),
        ]
    }

    fn logged(f: &Fixture) -> Vec<ApiRequestLog> {
        RequestLog::new(f.dir.path().join("api_logs.json")).entries()
    }

    #[test]
    fn test_end_to_end_cafe() {
        let f = fixture(500);
        f.client
            .respond(SearchTerm::Keyword("咖啡廳 OR 咖啡".into()), cafes());
        assert_eq!(f.recommender.usage(), (0, 500));

        let rec = f.recommender.recommend(LAT, LNG, "咖啡廳").unwrap();
        assert!(!rec.restaurants.is_empty() && rec.restaurants.len() <= 3);
        for r in &rec.restaurants {
            assert!(r.rating >= 3.5);
            assert!(!r.distance.is_empty());
            assert_eq!(r.cuisine_type, "咖啡廳");
            match &r.photo {
                Photo::Resolved(url) => assert!(url.starts_with("https://photos.test/400/ref-")),
                other => panic!("photo not resolved: {other:?}"),
            }
        }
        assert_eq!(rec.message, "成功推薦 3 家餐廳");
        assert_eq!(f.recommender.usage(), (1, 500));

        let entries = logged(&f);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].success);
        assert_eq!(entries[0].cuisine, "咖啡廳");
    }

    #[test]
    fn test_cache_hit_still_counts_quota() {
        let f = fixture(500);
        f.client
            .respond(SearchTerm::Keyword("咖啡廳 OR 咖啡".into()), cafes());
        f.recommender.recommend(LAT, LNG, "咖啡廳").unwrap();
        f.recommender.recommend(LAT + 0.0001, LNG, "咖啡廳").unwrap();

        assert_eq!(f.client.call_count(), 1);
        assert_eq!(f.recommender.usage(), (2, 500));
    }

    #[test]
    fn test_quota_exceeded_skips_search() {
        let f = fixture(1);
        f.client.respond(SearchTerm::restaurant(), cafes());
        f.recommender.recommend(LAT, LNG, "").unwrap();

        match f.recommender.recommend(LAT, LNG, "").unwrap_err() {
            RecommendError::QuotaExceeded { current, limit, reset_in } => {
                assert_eq!((current, limit), (1, 1));
                assert!(!reset_in.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.client.call_count(), 1);

        let entries = logged(&f);
        assert_eq!(entries.len(), 2);
        assert!(!entries[1].success);
        assert!(entries[1].error.contains("1/1"));
    }

    #[test]
    fn test_primary_failure_is_upstream_error() {
        let f = fixture(10);
        f.client.fail(SearchTerm::restaurant(), "connection reset");

        let err = f.recommender.recommend(LAT, LNG, "").unwrap_err();
        match err {
            RecommendError::UpstreamSearchFailed { detail } => assert!(detail.contains("connection reset")),
            other => panic!("unexpected {other:?}"),
        }
        // the attempt still consumed quota
        assert_eq!(f.recommender.usage(), (1, 10));
    }

    #[test]
    fn test_upstream_quota_exhaustion_trips_tracker() {
        let f = fixture(10);
        f.client.fail(SearchTerm::restaurant(), "OVER_QUERY_LIMIT");

        assert!(matches!(
            f.recommender.recommend(LAT, LNG, "").unwrap_err(),
            RecommendError::QuotaExceeded { current: 1, limit: 10, .. }
        ));
        assert!(matches!(
            f.recommender.recommend(LAT, LNG, "").unwrap_err(),
            RecommendError::QuotaExceeded { .. }
        ));
        assert_eq!(f.client.call_count(), 1);
    }

    #[test]
    fn test_invalid_coordinates_rejected_before_quota() {
        let f = fixture(10);
        for (lat, lng) in [(91.0, 0.0), (0.0, -180.5), (f64::NAN, 0.0)] {
            assert!(matches!(
                f.recommender.recommend(lat, lng, "").unwrap_err(),
                RecommendError::InvalidCoordinates { .. }
            ));
        }
        assert_eq!(f.recommender.usage(), (0, 10));
        assert_eq!(f.client.call_count(), 0);
    }

    #[test]
    fn test_invalid_coordinates_do_not_erase_audit_log() {
        let f = fixture(10);
        for _ in 0..3 {
            f.recommender.recommend(LAT, LNG, "").unwrap();
        }
        assert_eq!(logged(&f).len(), 3);

        f.recommender.recommend(f64::NAN, 0.0, "").unwrap_err();
        f.recommender.recommend(LAT, f64::INFINITY, "").unwrap_err();
        f.recommender.recommend(LAT, LNG, "").unwrap();

        let entries = logged(&f);
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[3].lat, None);
        assert!(!entries[3].success);
        assert_relative_eq!(entries[4].lat.unwrap(), LAT, epsilon = 1e-9);
        assert_eq!(entries[4].lng, None);
        assert!(entries[5].success);
    }

    #[test]
    fn test_no_results_is_not_an_error() {
        let f = fixture(10);
        let rec = f.recommender.recommend(LAT, LNG, "素食").unwrap();
        assert!(rec.restaurants.is_empty());
        assert!(!rec.message.is_empty());
        assert!(logged(&f)[0].success);
    }

    #[test]
    fn test_small_pool_returned_whole() {
        let f = fixture(10);
        f.client.respond(
            SearchTerm::restaurant(),
            vec![place("a", 4.0, 100.0), place("b", 4.2, 200.0)],
        );
        let rec = f.recommender.recommend(LAT, LNG, "").unwrap();
        let mut ids: Vec<_> = rec.restaurants.iter().map(|r| r.place_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, ["a", "b"]);
    }
}
