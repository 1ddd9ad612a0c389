use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::error::RecommendError;
use crate::places::Candidate;
use crate::quota::format_reset_eta;

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

pub(crate) struct ApiError(pub StatusCode, pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

#[derive(Serialize)]
struct QuotaErrorBody {
    error: String,
    code: u16,
    usage: String,
    reset_in: String,
    reference_time: String,
}

fn error_response(state: &AppState, err: RecommendError) -> Response {
    match err {
        RecommendError::QuotaExceeded { current, limit, reset_in } => {
            let body = QuotaErrorBody {
                error: format!("API 每日請求數已達上限 {}", limit),
                code: StatusCode::TOO_MANY_REQUESTS.as_u16(),
                usage: format!("{}/{}", current, limit),
                reset_in,
                reference_time: state.recommender.quota().reference_time(),
            };
            (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
        }
        RecommendError::UpstreamSearchFailed { detail } => {
            api_error(StatusCode::BAD_GATEWAY, format!("無法獲取餐廳資訊: {}", detail)).into_response()
        }
        e @ RecommendError::InvalidCoordinates { .. } => {
            api_error(StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

// ─── GET /health ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "服務運行正常",
    })
}

// ─── Recommendation ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct RestaurantView {
    pub name: String,
    pub rating: f64,
    pub distance: String,
    pub place_id: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_level: Option<u8>,
    pub average_price: String,
    pub cuisine_type: String,
}

impl From<Candidate> for RestaurantView {
    fn from(c: Candidate) -> Self {
        Self {
            photo_url: c.photo.url().map(str::to_string),
            name: c.name,
            rating: c.rating,
            distance: c.distance,
            place_id: c.place_id,
            address: c.address,
            price_level: c.price_level,
            average_price: c.average_price,
            cuisine_type: c.cuisine_type,
        }
    }
}

#[derive(Serialize)]
pub struct RecommendResponse {
    pub restaurants: Vec<RestaurantView>,
    pub message: String,
    pub usage: String,
    pub reset_in: String,
    pub reference_time: String,
}

async fn recommend_for(
    state: Arc<AppState>,
    endpoint: &'static str,
    lat: f64,
    lng: f64,
    cuisine: String,
) -> Result<Json<RecommendResponse>, Response> {
    let start = Instant::now();

    let recommender = state.recommender.clone();
    let worker_cuisine = cuisine.clone();
    let result = tokio::task::spawn_blocking(move || {
        recommender.recommend_via(endpoint, lat, lng, &worker_cuisine)
    })
    .await
    .map_err(|e| {
        api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Recommendation worker failed: {}", e))
            .into_response()
    })?;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let rec = match result {
        Ok(rec) => rec,
        Err(e) => {
            warn!(
                "{} ({:.4}, {:.4}) type='{}' -> {} ({:.1}ms)",
                endpoint, lat, lng, cuisine, e, elapsed_ms
            );
            return Err(error_response(&state, e));
        }
    };

    info!(
        "{} ({:.4}, {:.4}) type='{}' -> {} restaurants ({:.1}ms)",
        endpoint,
        lat,
        lng,
        cuisine,
        rec.restaurants.len(),
        elapsed_ms
    );

    let quota = state.recommender.quota();
    Ok(Json(RecommendResponse {
        restaurants: rec.restaurants.into_iter().map(RestaurantView::from).collect(),
        message: rec.message,
        usage: quota.usage_string(),
        reset_in: format_reset_eta(quota.time_until_reset()),
        reference_time: quota.reference_time(),
    }))
}

// ─── GET /api/restaurants ────────────────────────────────────────

#[derive(Deserialize)]
pub struct RestaurantsQuery {
    pub lat: Option<String>,
    pub lng: Option<String>,
    #[serde(rename = "type")]
    pub cuisine: Option<String>,
}

fn parse_coord(raw: Option<&str>, msg: &str) -> Result<f64, Response> {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, msg).into_response())
}

pub async fn restaurants(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RestaurantsQuery>,
) -> Result<Json<RecommendResponse>, Response> {
    let lat = parse_coord(params.lat.as_deref(), "無效的緯度參數")?;
    let lng = parse_coord(params.lng.as_deref(), "無效的經度參數")?;
    let cuisine = params.cuisine.unwrap_or_default().trim().to_string();
    recommend_for(state, "/api/restaurants", lat, lng, cuisine).await
}

// ─── POST /api/recommend ─────────────────────────────────────────

#[derive(Deserialize)]
pub struct RecommendBody {
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "type", default)]
    pub cuisine: String,
}

pub async fn recommend(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RecommendBody>, JsonRejection>,
) -> Result<Json<RecommendResponse>, Response> {
    let Json(body) = body.map_err(|e| {
        api_error(StatusCode::BAD_REQUEST, format!("無效的請求內容: {}", e.body_text())).into_response()
    })?;
    recommend_for(state, "/api/recommend", body.lat, body.lng, body.cuisine.trim().to_string()).await
}

// ─── GET /api/usage ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct UsageResponse {
    pub current: u32,
    pub limit: u32,
    pub usage: String,
    pub reset_in: String,
    pub reset_in_secs: u64,
    pub limit_exceeded: bool,
}

pub async fn usage(State(state): State<Arc<AppState>>) -> Json<UsageResponse> {
    let (current, limit) = state.recommender.usage();
    let until = state.recommender.time_until_reset();
    Json(UsageResponse {
        current,
        limit,
        usage: format!("{}/{}", current, limit),
        reset_in: format_reset_eta(until),
        reset_in_secs: until.as_secs(),
        limit_exceeded: state.recommender.quota().is_exceeded(),
    })
}
