use foundation::bounds::{LngLat, LngLatBounds};

/// Row limit of viewport and radius queries.
pub const DEFAULT_LIMIT: u32 = 1000;

/// Row limit of the unfiltered fallback query.
pub const FALLBACK_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum EntityQuery {
    Bounds { bbox: LngLatBounds, limit: u32 },
    Near { center: LngLat, radius_km: f64, limit: u32 },
    Unfiltered { limit: u32 },
}

impl EntityQuery {
    pub fn limit(&self) -> u32 {
        match self {
            EntityQuery::Bounds { limit, .. }
            | EntityQuery::Near { limit, .. }
            | EntityQuery::Unfiltered { limit } => *limit,
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            EntityQuery::Bounds { bbox, limit } => vec![
                ("bbox", bbox.to_bbox_param()),
                ("limit", limit.to_string()),
            ],
            EntityQuery::Near {
                center,
                radius_km,
                limit,
            } => vec![
                ("near", format!("{:.6},{:.6}", center.lat, center.lng)),
                ("radius_km", radius_km.to_string()),
                ("limit", limit.to_string()),
            ],
            EntityQuery::Unfiltered { limit } => vec![("limit", limit.to_string())],
        }
    }

    /// `key=value&...` without percent-encoding, for logs and display.
    pub fn query_string(&self) -> String {
        self.query_pairs()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}
