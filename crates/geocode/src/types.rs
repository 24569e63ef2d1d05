use foundation::bounds::LngLat;
use serde::{Deserialize, Serialize};

use crate::error::GeocodeError;

/// Best-effort street address; empty strings where the provider had nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAddress {
    pub line1: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionResult {
    pub label: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub address: ParsedAddress,
}

impl SuggestionResult {
    pub fn position(&self) -> Option<LngLat> {
        let p = LngLat::new(self.lng?, self.lat?);
        p.is_finite().then_some(p)
    }
}

/// Human-readable label for a dropped pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseLabel {
    pub label: String,
    /// `None` when the provider found nothing and `label` is the coordinate
    /// fallback.
    pub address: Option<ParsedAddress>,
}

impl ReverseLabel {
    /// `"lat, lng"` with five decimals.
    pub fn from_coordinates(point: LngLat) -> Self {
        Self {
            label: format!("{:.5}, {:.5}", point.lat, point.lng),
            address: None,
        }
    }
}

/// Observable state of a search box.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    pub query: String,
    pub locked: bool,
    pub fetching: bool,
    pub open: bool,
    pub suggestions: Vec<SuggestionResult>,
    pub error: Option<GeocodeError>,
}
