use cluster::ClusterOptions;
use foundation::bounds::LngLat;
use render::{Camera, StyleId};
use serde::{Deserialize, Serialize};

/// Downtown Wilmington, DE.
pub const DEFAULT_CENTER: LngLat = LngLat {
    lng: -75.5398,
    lat: 39.7391,
};
pub const DEFAULT_ZOOM: f64 = 12.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Credential of the preferred backend. `None` starts on the fallback.
    pub access_token: Option<String>,
    pub style: StyleId,
    pub retina: bool,
    pub initial_camera: Camera,
    pub width_px: u32,
    pub height_px: u32,
    pub cluster: ClusterOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            style: StyleId::default(),
            retina: false,
            initial_camera: Camera::new(DEFAULT_CENTER, DEFAULT_ZOOM),
            width_px: 1024,
            height_px: 768,
            cluster: ClusterOptions::default(),
        }
    }
}

impl SessionConfig {
    pub fn has_token(&self) -> bool {
        self.access_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }
}
