use foundation::bounds::{LngLat, LngLatBounds};
use foundation::math::projection::MercatorProjection;
use serde::{Deserialize, Serialize};

use crate::camera::Camera;

/// Visible map region as seen by one backend.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: LngLat,
    pub zoom: f64,
    pub bounds: LngLatBounds,
    pub width_px: f64,
    pub height_px: f64,
}

impl Viewport {
    pub fn from_camera(
        camera: Camera,
        projection: &MercatorProjection,
        width_px: f64,
        height_px: f64,
    ) -> Self {
        Self {
            center: camera.center,
            zoom: camera.zoom,
            bounds: projection.bounds_for(camera.center, camera.zoom, width_px, height_px),
            width_px,
            height_px,
        }
    }

    /// Integer zoom used for cluster queries.
    pub fn query_zoom(&self) -> u8 {
        self.zoom.round().clamp(0.0, f64::from(u8::MAX)) as u8
    }
}
