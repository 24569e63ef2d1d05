use serde::{Deserialize, Serialize};

use crate::error::RenderError;

pub const DEFAULT_STYLE: &str = "mapbox/navigation-night-v1";
pub const SATELLITE_STYLE: &str = "mapbox/satellite-streets-v12";

/// Named styles offered in the style picker.
pub const STYLE_CATALOG: &[(&str, &str)] = &[
    ("Neon Night", "mapbox/navigation-night-v1"),
    ("Streets", "mapbox/streets-v12"),
    ("Outdoors", "mapbox/outdoors-v12"),
    ("Clean Light", "mapbox/light-v11"),
    ("Modern Dark", "mapbox/dark-v11"),
    ("Satellite Streets", "mapbox/satellite-streets-v12"),
];

/// Style id of the form `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleId(String);

impl StyleId {
    /// Accepts `owner/name` and `styles/v1/owner/name`.
    pub fn parse(s: &str) -> Result<Self, RenderError> {
        let trimmed = s.trim();
        let bare = trimmed.strip_prefix("styles/v1/").unwrap_or(trimmed);
        let mut parts = bare.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                Ok(StyleId(bare.to_string()))
            }
            _ => Err(RenderError::UnknownStyle(s.to_string())),
        }
    }

    /// Looks up a catalog entry by display name (case-insensitive) or id.
    pub fn from_catalog(name_or_id: &str) -> Result<Self, RenderError> {
        STYLE_CATALOG
            .iter()
            .find(|(name, id)| name.eq_ignore_ascii_case(name_or_id) || *id == name_or_id)
            .map(|(_, id)| StyleId((*id).to_string()))
            .ok_or_else(|| RenderError::UnknownStyle(name_or_id.to_string()))
    }

    pub fn satellite() -> Self {
        StyleId(SATELLITE_STYLE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display name when the style is in the catalog.
    pub fn display_name(&self) -> Option<&'static str> {
        STYLE_CATALOG
            .iter()
            .find(|(_, id)| *id == self.0)
            .map(|(name, _)| *name)
    }
}

impl Default for StyleId {
    fn default() -> Self {
        StyleId(DEFAULT_STYLE.to_string())
    }
}

impl std::fmt::Display for StyleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
