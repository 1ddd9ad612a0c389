//! Great-circle distance and the human-readable strings derived from it.

use std::f64::consts::PI;

const DEG: f64 = PI / 180.0;
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two points, in meters.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1) * DEG;
    let d_lng = (lng2 - lng1) * DEG;

    let a = (d_lat / 2.0).sin().powi(2)
        + (lat1 * DEG).cos() * (lat2 * DEG).cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Format a distance: whole meters below 1 km, otherwise kilometers to one decimal.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{:.0}m", meters)
    } else {
        format!("{:.1}km", meters / 1000.0)
    }
}

/// Rough per-person spend for a Places price level (0..=4).
pub fn price_bracket(price_level: Option<u8>) -> &'static str {
    match price_level {
        Some(0) => "約 NT$100 以下",
        Some(1) => "約 NT$100-300",
        Some(2) => "約 NT$300-600",
        Some(3) => "約 NT$600-1200",
        Some(4) => "約 NT$1200 以上",
        _ => "價格未知",
    }
}

/// Whether a coordinate pair lies on the globe.
pub fn valid_coordinates(lat: f64, lng: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lng)
}
