//! OpenStreetMap Nominatim `/search` and `/reverse`.

use foundation::bounds::LngLat;
use serde::Deserialize;

use crate::error::GeocodeError;
use crate::provider::{BoxFuture, GeocodeProvider, GeocoderConfig};
use crate::types::{ParsedAddress, SuggestionResult};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Place {
    display_name: String,
    lat: Option<String>,
    lon: Option<String>,
    address: Address,
    /// Set by `/reverse` when nothing is found.
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Address {
    house_number: Option<String>,
    road: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    state: Option<String>,
    region: Option<String>,
    postcode: Option<String>,
}

fn parse_coord(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn first_of(candidates: &[&Option<String>]) -> String {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_default()
}

impl Place {
    fn into_suggestion(self) -> SuggestionResult {
        let a = &self.address;
        let street = [&a.house_number, &a.road]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        let line1 = if street.is_empty() {
            self.display_name.clone()
        } else {
            street
        };
        let address = ParsedAddress {
            line1,
            city: first_of(&[&a.city, &a.town, &a.village, &a.hamlet]),
            state: first_of(&[&a.state, &a.region]),
            zip: a.postcode.clone().unwrap_or_default(),
        };
        SuggestionResult {
            lat: parse_coord(self.lat.as_deref()),
            lng: parse_coord(self.lon.as_deref()),
            label: self.display_name,
            address,
        }
    }
}

/// Parses a `/search` result array.
pub fn parse_search(body: &[u8]) -> Result<Vec<SuggestionResult>, GeocodeError> {
    let places: Vec<Place> =
        serde_json::from_slice(body).map_err(|e| GeocodeError::Decode(e.to_string()))?;
    Ok(places.into_iter().map(Place::into_suggestion).collect())
}

/// Parses a `/reverse` result object; `None` for Nominatim's "unable to
/// geocode" reply.
pub fn parse_reverse(body: &[u8]) -> Result<Option<SuggestionResult>, GeocodeError> {
    let place: Place =
        serde_json::from_slice(body).map_err(|e| GeocodeError::Decode(e.to_string()))?;
    if place.error.is_some() || place.display_name.is_empty() {
        return Ok(None);
    }
    Ok(Some(place.into_suggestion()))
}

pub struct NominatimGeocoder {
    config: GeocoderConfig,
    client: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new(config: GeocoderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.config.nominatim_endpoint.trim_end_matches('/'))
    }

    async fn get(&self, url: String, params: Vec<(&str, String)>) -> Result<Vec<u8>, GeocodeError> {
        let mut request = self
            .client
            .get(url)
            .header("Accept-Language", "en-US")
            .query(&params);
        if let Some(email) = self.config.nominatim_email.as_deref().filter(|e| !e.is_empty()) {
            request = request.query(&[("email", email)]);
        }
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(GeocodeError::Status(resp.status().as_u16()));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

impl GeocodeProvider for NominatimGeocoder {
    fn name(&self) -> &'static str {
        "nominatim"
    }

    fn forward(&self, query: &str) -> BoxFuture<'_, Result<Vec<SuggestionResult>, GeocodeError>> {
        let params = vec![
            ("q", query.to_string()),
            ("format", "json".to_string()),
            ("addressdetails", "1".to_string()),
            ("limit", self.config.limit.to_string()),
            ("countrycodes", "us".to_string()),
        ];
        Box::pin(async move {
            let body = self.get(self.url("search"), params).await?;
            parse_search(&body)
        })
    }

    fn reverse(
        &self,
        point: LngLat,
    ) -> BoxFuture<'_, Result<Option<SuggestionResult>, GeocodeError>> {
        let params = vec![
            ("lat", point.lat.to_string()),
            ("lon", point.lng.to_string()),
            ("format", "json".to_string()),
            ("addressdetails", "1".to_string()),
        ];
        Box::pin(async move {
            let body = self.get(self.url("reverse"), params).await?;
            parse_reverse(&body)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_reverse, parse_search};
    use crate::types::ParsedAddress;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_search_results() {
        let body = r#"[
          {
            "display_name": "1000, North Market Street, Wilmington, New Castle County, Delaware, 19801, United States",
            "lat": "39.7447", "lon": "-75.5491",
            "address": {"house_number": "1000", "road": "North Market Street",
                        "city": "Wilmington", "state": "Delaware", "postcode": "19801"}
          },
          {
            "display_name": "Smyrna, Kent County, Delaware",
            "lat": "not-a-number", "lon": "-75.6",
            "address": {"town": "Smyrna", "region": "Kent"}
          }
        ]"#;
        let found = parse_search(body.as_bytes()).unwrap();
        assert_eq!(
            found[0].address,
            ParsedAddress {
                line1: "1000 North Market Street".into(),
                city: "Wilmington".into(),
                state: "Delaware".into(),
                zip: "19801".into(),
            }
        );
        assert_eq!(found[0].lat, Some(39.7447));

        // No street: line1 falls back to the label.
        assert_eq!(found[1].address.line1, "Smyrna, Kent County, Delaware");
        assert_eq!(found[1].address.city, "Smyrna");
        assert_eq!(found[1].address.state, "Kent");
        assert_eq!(found[1].lat, None);
        assert!(found[1].position().is_none());
    }

    #[test]
    fn reverse_miss_is_none() {
        assert_eq!(parse_reverse(br#"{"error": "Unable to geocode"}"#).unwrap(), None);
        let hit = parse_reverse(
            br#"{"display_name": "Rodney Square, Wilmington", "lat": "39.7459", "lon": "-75.5483"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(hit.label, "Rodney Square, Wilmington");
    }
}
