use crate::bounds::LngLat;

/// Mean Earth radius used for great-circle distances (km).
pub const EARTH_RADIUS_KM: f64 = 6371.0;

pub const KM_PER_MILE: f64 = 1.60934;

/// Great-circle distance between two positions.
pub fn haversine_km(a: LngLat, b: LngLat) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let s_lat = (d_lat * 0.5).sin();
    let s_lng = (d_lng * 0.5).sin();
    let h = s_lat * s_lat + lat1.cos() * lat2.cos() * s_lng * s_lng;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// `None` when either side is not a finite position.
pub fn haversine_miles(a: LngLat, b: LngLat) -> Option<f64> {
    if !a.is_finite() || !b.is_finite() {
        return None;
    }
    Some(haversine_km(a, b) / KM_PER_MILE)
}

/// Miles to kilometres, rounded to two decimals (the precision radius
/// queries are sent with).
pub fn miles_to_km(miles: f64) -> f64 {
    (miles * KM_PER_MILE * 100.0).round() / 100.0
}
