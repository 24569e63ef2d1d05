//! Spherical Web Mercator.
//!
//! Unit coordinates map the world onto `[0, 1] x [0, 1]` with `y` growing
//! southwards. Pixel coordinates scale that square by `tile_size * 2^zoom`.

use crate::bounds::{LngLat, LngLatBounds};

/// Latitude limit of the square Web Mercator world.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

pub fn lng_to_unit_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

pub fn lat_to_unit_y(lat: f64) -> f64 {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let sin = lat.to_radians().sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / std::f64::consts::PI;
    y.clamp(0.0, 1.0)
}

pub fn unit_x_to_lng(x: f64) -> f64 {
    (x - 0.5) * 360.0
}

pub fn unit_y_to_lat(y: f64) -> f64 {
    let y2 = (180.0 - y * 360.0).to_radians();
    360.0 * y2.exp().atan() / std::f64::consts::PI - 90.0
}

/// Pixel-space projection for a given tile size.
///
/// Two engines with different tile sizes see different bounding boxes for
/// the same `(center, zoom)`; every viewport must be derived through the
/// projection of the engine that renders it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MercatorProjection {
    pub tile_size: f64,
}

impl MercatorProjection {
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size: tile_size.max(1) as f64,
        }
    }

    pub fn world_size(&self, zoom: f64) -> f64 {
        self.tile_size * 2f64.powf(zoom)
    }

    pub fn project(&self, p: LngLat, zoom: f64) -> [f64; 2] {
        let ws = self.world_size(zoom);
        [lng_to_unit_x(p.lng) * ws, lat_to_unit_y(p.lat) * ws]
    }

    pub fn unproject(&self, px: [f64; 2], zoom: f64) -> LngLat {
        let ws = self.world_size(zoom);
        LngLat::new(unit_x_to_lng(px[0] / ws), unit_y_to_lat(px[1] / ws))
    }

    /// Visible bounds of a `width x height` pixel view centred on `center`.
    ///
    /// Longitudes are returned unwrapped (they may exceed ±180 when the view
    /// straddles the antimeridian); latitudes are clamped to the world.
    pub fn bounds_for(
        &self,
        center: LngLat,
        zoom: f64,
        width_px: f64,
        height_px: f64,
    ) -> LngLatBounds {
        let ws = self.world_size(zoom);
        let [cx, cy] = self.project(center, zoom);
        let half_w = width_px.max(0.0) * 0.5;
        let half_h = height_px.max(0.0) * 0.5;

        let west = unit_x_to_lng((cx - half_w) / ws);
        let east = unit_x_to_lng((cx + half_w) / ws);
        let north = unit_y_to_lat(((cy - half_h) / ws).clamp(0.0, 1.0));
        let south = unit_y_to_lat(((cy + half_h) / ws).clamp(0.0, 1.0));
        LngLatBounds::new(west, south, east, north)
    }

    /// Screen distance in pixels between two positions at `zoom`.
    pub fn pixel_distance(&self, a: LngLat, b: LngLat, zoom: f64) -> f64 {
        let pa = self.project(a, zoom);
        let pb = self.project(b, zoom);
        ((pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2)).sqrt()
    }
}
