use serde::{Deserialize, Serialize};

/// Clustering parameters.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    /// Cluster radius in pixels.
    pub radius: f64,
    /// Tile extent the radius is measured against.
    pub extent: f64,
    /// Lowest zoom with its own cluster level.
    pub min_zoom: u8,
    /// Highest zoom at which points are still clustered.
    pub max_zoom: u8,
    /// Minimum number of points that form a cluster.
    pub min_points: usize,
    /// KD-tree leaf size.
    pub node_size: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            radius: 60.0,
            extent: 512.0,
            min_zoom: 0,
            max_zoom: 20,
            min_points: 2,
            node_size: 64,
        }
    }
}

impl ClusterOptions {
    /// Cluster ids keep the origin zoom in 5 bits, so `max_zoom + 1` must fit.
    pub const ZOOM_LIMIT: u8 = 30;

    pub(crate) fn normalized(self) -> Self {
        let d = Self::default();
        let max_zoom = self.max_zoom.min(Self::ZOOM_LIMIT);
        Self {
            radius: if self.radius.is_finite() && self.radius > 0.0 {
                self.radius
            } else {
                d.radius
            },
            extent: if self.extent.is_finite() && self.extent > 0.0 {
                self.extent
            } else {
                d.extent
            },
            min_zoom: self.min_zoom.min(max_zoom),
            max_zoom,
            min_points: self.min_points.max(1),
            node_size: self.node_size.max(1),
        }
    }

    /// Clustering radius in unit-square coordinates at `zoom`.
    pub(crate) fn unit_radius(&self, zoom: i32) -> f64 {
        self.radius / (self.extent * 2f64.powi(zoom))
    }
}
