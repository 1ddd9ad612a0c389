//! Deferred photo URL resolution.
//!
//! Photo references are immutable, so a reference → URL mapping is cached
//! for the life of the process. Final resolution walks the selected
//! candidates in order and sleeps between successive uncached resolutions
//! to stay under the image endpoint's own rate limit. The pause blocks only
//! the calling request's thread.

use super::providers::PlacesSearchClient;
use super::types::{Candidate, Photo};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_MAX_WIDTH: u32 = 400;
pub const DEFAULT_PACING: Duration = Duration::from_millis(300);

pub struct PhotoResolver {
    client: Arc<dyn PlacesSearchClient>,
    urls: RwLock<HashMap<String, String>>,
    max_width: u32,
    pacing: Duration,
}

impl PhotoResolver {
    pub fn new(client: Arc<dyn PlacesSearchClient>, max_width: u32, pacing: Duration) -> Self {
        Self {
            client,
            urls: RwLock::new(HashMap::with_capacity(100)),
            max_width,
            pacing,
        }
    }

    /// Resolve one reference to a URL. Empty references resolve to nothing.
    pub fn resolve_one(&self, reference: &str) -> Option<String> {
        self.resolve_tracked(reference).map(|(url, _)| url)
    }

    /// Returns the URL and whether it had to be built (cache miss).
    fn resolve_tracked(&self, reference: &str) -> Option<(String, bool)> {
        if reference.is_empty() {
            return None;
        }

        if let Some(url) = self
            .urls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(reference)
        {
            return Some((url.clone(), false));
        }

        let url = self.client.photo_url(reference, self.max_width);
        if url.is_empty() {
            return None;
        }
        self.urls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reference.to_string(), url.clone());
        Some((url, true))
    }

    /// Resolve every unresolved photo in place, pacing uncached lookups.
    ///
    /// Never fails: a reference that yields no URL becomes `Photo::Absent`.
    pub fn resolve_final(&self, candidates: &mut [Candidate]) {
        let mut fetched_before = false;

        for candidate in candidates.iter_mut() {
            let reference = match &candidate.photo {
                Photo::Unresolved(r) => r.clone(),
                _ => continue,
            };

            let cached = self
                .urls
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(&reference);
            if !cached && fetched_before && !self.pacing.is_zero() {
                thread::sleep(self.pacing);
            }

            candidate.photo = match self.resolve_tracked(&reference) {
                Some((url, fetched)) => {
                    fetched_before |= fetched;
                    Photo::Resolved(url)
                }
                None => {
                    debug!("No photo for {}", candidate.name);
                    Photo::Absent
                }
            };
        }
    }

    /// Resolve every unresolved photo in place without pacing.
    pub fn resolve_all_unpaced(&self, candidates: &mut [Candidate]) {
        for candidate in candidates.iter_mut() {
            if let Photo::Unresolved(reference) = &candidate.photo {
                candidate.photo = match self.resolve_one(reference) {
                    Some(url) => Photo::Resolved(url),
                    None => Photo::Absent,
                };
            }
        }
    }

    /// Number of cached reference → URL mappings.
    pub fn cached(&self) -> usize {
        self.urls.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::places::types::{NearbySearchRequest, PlaceResult, PlacesError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[derive(Default)]
    struct CountingClient {
        built: AtomicUsize,
    }

    impl PlacesSearchClient for CountingClient {
        fn nearby_search(&self, _: &NearbySearchRequest) -> Result<Vec<PlaceResult>, PlacesError> {
            Ok(vec![])
        }

        fn photo_url(&self, reference: &str, max_width: u32) -> String {
            self.built.fetch_add(1, Ordering::SeqCst);
            format!("https://img.test/{max_width}/{reference}")
        }
    }

    fn candidate(name: &str, photo: Photo) -> Candidate {
        Candidate {
            name: name.into(),
            rating: 4.0,
            address: String::new(),
            place_id: name.into(),
            price_level: None,
            average_price: "價格未知".into(),
            distance: "10m".into(),
            distance_m: 10.0,
            cuisine_type: String::new(),
            photo,
        }
    }

    fn resolver(pacing: Duration) -> (PhotoResolver, Arc<CountingClient>) {
        let client = Arc::new(CountingClient::default());
        (PhotoResolver::new(client.clone(), DEFAULT_MAX_WIDTH, pacing), client)
    }

    #[test]
    fn test_resolve_one_caches() {
        let (resolver, client) = resolver(Duration::ZERO);
        assert_eq!(resolver.resolve_one("abc").as_deref(), Some("https://img.test/400/abc"));
        assert_eq!(resolver.resolve_one("abc").as_deref(), Some("https://img.test/400/abc"));
        assert_eq!(client.built.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.cached(), 1);
    }

    #[test]
    fn test_resolve_one_empty_reference() {
        let (resolver, client) = resolver(Duration::ZERO);
        assert!(resolver.resolve_one("").is_none());
        assert_eq!(client.built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_resolve_final_in_place() {
        let (resolver, _client) = resolver(Duration::ZERO);
        let mut list = vec![
            candidate("a", Photo::Unresolved("r1".into())),
            candidate("b", Photo::Absent),
            candidate("c", Photo::Resolved("https://already".into())),
            candidate("d", Photo::Unresolved(String::new())),
        ];
        resolver.resolve_final(&mut list);

        assert_eq!(list[0].photo, Photo::Resolved("https://img.test/400/r1".into()));
        assert_eq!(list[1].photo, Photo::Absent);
        assert_eq!(list[2].photo, Photo::Resolved("https://already".into()));
        assert_eq!(list[3].photo, Photo::Absent);
        assert!(list.iter().all(|c| !c.photo.is_unresolved()));
    }

    #[test]
    fn test_resolve_final_paces_between_not_after() {
        let pacing = Duration::from_millis(60);
        let (resolver, _client) = resolver(pacing);
        let mut list = vec![
            candidate("a", Photo::Unresolved("r1".into())),
            candidate("b", Photo::Unresolved("r2".into())),
            candidate("c", Photo::Unresolved("r3".into())),
        ];

        let start = Instant::now();
        resolver.resolve_final(&mut list);
        let elapsed = start.elapsed();

        // two gaps for three lookups
        assert!(elapsed >= pacing * 2, "elapsed {elapsed:?}");
        assert!(elapsed < pacing * 3 + Duration::from_millis(150), "elapsed {elapsed:?}");
    }

    #[test]
    fn test_resolve_final_skips_pacing_for_cached() {
        let pacing = Duration::from_millis(200);
        let (resolver, client) = resolver(pacing);
        resolver.resolve_one("r1");
        resolver.resolve_one("r2");

        let mut list = vec![
            candidate("a", Photo::Unresolved("r1".into())),
            candidate("b", Photo::Unresolved("r2".into())),
        ];
        let start = Instant::now();
        resolver.resolve_final(&mut list);

        assert!(start.elapsed() < pacing);
        assert_eq!(client.built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolve_all_unpaced() {
        let (resolver, _client) = resolver(Duration::from_secs(5));
        let mut list = vec![
            candidate("a", Photo::Unresolved("r1".into())),
            candidate("b", Photo::Unresolved("r2".into())),
        ];
        let start = Instant::now();
        resolver.resolve_all_unpaced(&mut list);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(list[1].photo, Photo::Resolved("https://img.test/400/r2".into()));
    }
}
