use foundation::bounds::LngLat;
use foundation::ids::EntityId;
use serde::{Deserialize, Serialize};

/// A business record as served by the entity API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedEntity {
    pub id: EntityId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
}

impl LocatedEntity {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            lat: None,
            lng: None,
            description: None,
            phone_number: None,
            location: None,
            address1: None,
            city: None,
            state: None,
            zip: None,
        }
    }

    pub fn at(mut self, lat: f64, lng: f64) -> Self {
        self.lat = Some(lat);
        self.lng = Some(lng);
        self
    }

    /// Name, or `"Untitled"` when missing or blank.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n,
            _ => "Untitled",
        }
    }

    /// Position when both coordinates are present and finite.
    pub fn coordinates(&self) -> Option<LngLat> {
        let p = LngLat::new(self.lng?, self.lat?);
        p.is_finite().then_some(p)
    }

    /// Non-empty address1, city, state and zip, in that order.
    pub fn address_parts(&self) -> Vec<&str> {
        [&self.address1, &self.city, &self.state, &self.zip]
            .into_iter()
            .filter_map(|p| p.as_deref().map(str::trim))
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// `location` if set, else the address parts joined by `", "`.
    pub fn display_location(&self) -> Option<String> {
        if let Some(loc) = self.location.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            return Some(loc.to_string());
        }
        let parts = self.address_parts();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}
