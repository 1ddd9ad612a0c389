use crate::recommender::Recommender;
use std::sync::Arc;

use super::middleware::RateLimits;

pub struct AppState {
    pub recommender: Arc<Recommender>,
    pub limits: Arc<RateLimits>,
}

impl AppState {
    pub fn new(recommender: Recommender) -> Self {
        Self {
            recommender: Arc::new(recommender),
            limits: Arc::new(RateLimits::default()),
        }
    }
}
