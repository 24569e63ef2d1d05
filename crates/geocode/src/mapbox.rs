//! Mapbox Geocoding v5 (`mapbox.places`).

use foundation::bounds::LngLat;
use serde::Deserialize;

use crate::error::GeocodeError;
use crate::provider::{BoxFuture, GeocodeProvider, GeocoderConfig};
use crate::types::{ParsedAddress, SuggestionResult};

const TYPES: &str = "address,place,postcode,poi";

#[derive(Debug, Default, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Feature {
    center: Option<[f64; 2]>,
    place_name: String,
    place_type: Vec<String>,
    /// House number for address features.
    address: Option<String>,
    text: String,
    context: Vec<ContextEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContextEntry {
    id: String,
    text: String,
    short_code: Option<String>,
}

impl Feature {
    fn context(&self, prefix: &str) -> Option<&ContextEntry> {
        self.context.iter().find(|c| c.id.starts_with(prefix))
    }

    fn has_type(&self, t: &str) -> bool {
        self.place_type.iter().any(|p| p == t)
    }

    fn into_suggestion(self) -> SuggestionResult {
        let line1 = if self.has_type("address") {
            [self.address.as_deref().unwrap_or(""), self.text.as_str()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        } else if self.has_type("poi") {
            self.text.clone()
        } else {
            String::new()
        };
        let city = self.context("place").map(|c| c.text.clone()).unwrap_or_default();
        let state = self
            .context("region")
            .map(|r| match r.short_code.as_deref() {
                Some(code) if !code.is_empty() => code.replace("US-", ""),
                _ => r.text.clone(),
            })
            .unwrap_or_default();
        let zip = self.context("postcode").map(|c| c.text.clone()).unwrap_or_default();

        SuggestionResult {
            label: self.place_name,
            lng: self.center.map(|c| c[0]),
            lat: self.center.map(|c| c[1]),
            address: ParsedAddress {
                line1,
                city,
                state,
                zip,
            },
        }
    }
}

/// Parses a Mapbox feature collection into suggestions.
pub fn parse_features(body: &[u8]) -> Result<Vec<SuggestionResult>, GeocodeError> {
    let fc: FeatureCollection =
        serde_json::from_slice(body).map_err(|e| GeocodeError::Decode(e.to_string()))?;
    Ok(fc.features.into_iter().map(Feature::into_suggestion).collect())
}

pub struct MapboxGeocoder {
    token: String,
    config: GeocoderConfig,
    client: reqwest::Client,
}

impl MapboxGeocoder {
    /// Fails with `MissingToken` when the config carries no (or a blank)
    /// access token.
    pub fn new(config: GeocoderConfig) -> Result<Self, GeocodeError> {
        let token = config
            .mapbox_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(GeocodeError::MissingToken)?
            .to_string();
        Ok(Self {
            token,
            config,
            client: reqwest::Client::new(),
        })
    }

    fn places_url(&self, segment: &str) -> Result<reqwest::Url, GeocodeError> {
        let mut url = reqwest::Url::parse(&self.config.mapbox_endpoint)
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| GeocodeError::Transport("endpoint cannot be a base".to_string()))?
            .push(&format!("{segment}.json"));
        Ok(url)
    }

    async fn get(&self, url: reqwest::Url) -> Result<Vec<SuggestionResult>, GeocodeError> {
        let resp = self
            .client
            .get(url)
            .header("Accept-Language", "en-US")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(GeocodeError::Status(resp.status().as_u16()));
        }
        let body = resp.bytes().await?;
        parse_features(&body)
    }
}

impl GeocodeProvider for MapboxGeocoder {
    fn name(&self) -> &'static str {
        "mapbox"
    }

    fn forward(&self, query: &str) -> BoxFuture<'_, Result<Vec<SuggestionResult>, GeocodeError>> {
        let query = query.to_string();
        Box::pin(async move {
            let mut url = self.places_url(&query)?;
            let proximity = format!("{},{}", self.config.proximity.lng, self.config.proximity.lat);
            url.query_pairs_mut()
                .append_pair("access_token", &self.token)
                .append_pair("autocomplete", "true")
                .append_pair("country", "US")
                .append_pair("proximity", &proximity)
                .append_pair("limit", &self.config.limit.to_string())
                .append_pair("types", TYPES);
            self.get(url).await
        })
    }

    fn reverse(
        &self,
        point: LngLat,
    ) -> BoxFuture<'_, Result<Option<SuggestionResult>, GeocodeError>> {
        Box::pin(async move {
            let mut url = self.places_url(&format!("{},{}", point.lng, point.lat))?;
            url.query_pairs_mut()
                .append_pair("access_token", &self.token)
                .append_pair("types", TYPES)
                .append_pair("limit", "1")
                .append_pair("country", "US");
            Ok(self.get(url).await?.into_iter().next())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{MapboxGeocoder, parse_features};
    use crate::error::GeocodeError;
    use crate::provider::GeocoderConfig;
    use crate::types::ParsedAddress;
    use pretty_assertions::assert_eq;

    const BODY: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {
          "place_type": ["address"],
          "text": "Market Street",
          "address": "1000",
          "place_name": "1000 Market Street, Wilmington, Delaware 19801, United States",
          "center": [-75.5491, 39.7447],
          "context": [
            {"id": "postcode.123", "text": "19801"},
            {"id": "place.456", "text": "Wilmington"},
            {"id": "region.789", "text": "Delaware", "short_code": "US-DE"},
            {"id": "country.1", "text": "United States", "short_code": "us"}
          ]
        },
        {
          "place_type": ["poi"],
          "text": "Rodney Square",
          "place_name": "Rodney Square, Wilmington, Delaware",
          "center": [-75.5483, 39.7459],
          "context": [{"id": "region.789", "text": "Delaware"}]
        },
        {
          "place_type": ["place"],
          "text": "Dover",
          "place_name": "Dover, Delaware, United States"
        }
      ]
    }"#;

    #[test]
    fn parses_address_poi_and_place_features() {
        let found = parse_features(BODY.as_bytes()).unwrap();
        assert_eq!(found.len(), 3);

        assert_eq!(
            found[0].address,
            ParsedAddress {
                line1: "1000 Market Street".into(),
                city: "Wilmington".into(),
                state: "DE".into(),
                zip: "19801".into(),
            }
        );
        assert_eq!(found[0].lng, Some(-75.5491));
        assert_eq!(found[0].lat, Some(39.7447));

        assert_eq!(found[1].address.line1, "Rodney Square");
        assert_eq!(found[1].address.state, "Delaware");

        assert_eq!(found[2].address, ParsedAddress::default());
        assert!(found[2].position().is_none());
    }

    #[test]
    fn empty_and_invalid_bodies() {
        assert!(parse_features(b"{}").unwrap().is_empty());
        assert!(matches!(parse_features(b"<html>"), Err(GeocodeError::Decode(_))));
    }

    #[test]
    fn blank_token_is_missing() {
        let config = GeocoderConfig {
            mapbox_token: Some("  ".into()),
            ..GeocoderConfig::default()
        };
        assert!(matches!(MapboxGeocoder::new(config), Err(GeocodeError::MissingToken)));
    }

    #[test]
    fn places_url_escapes_query() {
        let config = GeocoderConfig {
            mapbox_token: Some("pk.test".into()),
            ..GeocoderConfig::default()
        };
        let geocoder = MapboxGeocoder::new(config).unwrap();
        let url = geocoder.places_url("1000 Market St").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.mapbox.com/geocoding/v5/mapbox.places/1000%20Market%20St.json"
        );
    }
}
