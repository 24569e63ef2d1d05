use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use foundation::bounds::LngLat;
use tracing::{debug, warn};

use crate::error::GeocodeError;
use crate::mapbox::MapboxGeocoder;
use crate::nominatim::NominatimGeocoder;
use crate::types::SuggestionResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A forward/reverse geocoding backend.
pub trait GeocodeProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn forward(&self, query: &str) -> BoxFuture<'_, Result<Vec<SuggestionResult>, GeocodeError>>;

    /// `Ok(None)` when nothing is known at `point`.
    fn reverse(&self, point: LngLat)
    -> BoxFuture<'_, Result<Option<SuggestionResult>, GeocodeError>>;
}

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub mapbox_token: Option<String>,
    pub mapbox_endpoint: String,
    pub nominatim_endpoint: String,
    /// Contact address sent to Nominatim.
    pub nominatim_email: Option<String>,
    /// Results near this point rank first.
    pub proximity: LngLat,
    pub limit: u8,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            mapbox_token: None,
            mapbox_endpoint: "https://api.mapbox.com/geocoding/v5/mapbox.places".to_string(),
            nominatim_endpoint: "https://nominatim.openstreetmap.org".to_string(),
            nominatim_email: None,
            proximity: LngLat::new(-75.5398, 39.7391),
            limit: 8,
        }
    }
}

/// Mapbox falling back to Nominatim when a token is configured, Nominatim
/// alone otherwise.
pub fn default_provider(config: &GeocoderConfig) -> Arc<dyn GeocodeProvider> {
    let nominatim: Arc<dyn GeocodeProvider> = Arc::new(NominatimGeocoder::new(config.clone()));
    match MapboxGeocoder::new(config.clone()) {
        Ok(mapbox) => Arc::new(FallbackGeocoder::new(Arc::new(mapbox), nominatim)),
        Err(e) => {
            debug!("{e}; geocoding with {} only", nominatim.name());
            nominatim
        }
    }
}

/// Tries `primary`, then `secondary` when the primary fails or finds nothing.
pub struct FallbackGeocoder {
    primary: Arc<dyn GeocodeProvider>,
    secondary: Arc<dyn GeocodeProvider>,
}

impl FallbackGeocoder {
    pub fn new(primary: Arc<dyn GeocodeProvider>, secondary: Arc<dyn GeocodeProvider>) -> Self {
        Self { primary, secondary }
    }
}

impl GeocodeProvider for FallbackGeocoder {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn forward(&self, query: &str) -> BoxFuture<'_, Result<Vec<SuggestionResult>, GeocodeError>> {
        let query = query.to_string();
        Box::pin(async move {
            match self.primary.forward(&query).await {
                Ok(found) if !found.is_empty() => return Ok(found),
                Ok(_) => debug!("{} found nothing for {query:?}", self.primary.name()),
                Err(e) => warn!("{} geocoding failed, falling back: {e}", self.primary.name()),
            }
            self.secondary.forward(&query).await
        })
    }

    fn reverse(
        &self,
        point: LngLat,
    ) -> BoxFuture<'_, Result<Option<SuggestionResult>, GeocodeError>> {
        Box::pin(async move {
            match self.primary.reverse(point).await {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => {}
                Err(e) => warn!("{} reverse geocoding failed, falling back: {e}", self.primary.name()),
            }
            self.secondary.reverse(point).await
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::time::Duration;

    use foundation::bounds::LngLat;
    use parking_lot::Mutex;

    use super::{BoxFuture, GeocodeProvider};
    use crate::error::GeocodeError;
    use crate::types::{ParsedAddress, SuggestionResult};

    pub fn suggestion(label: &str) -> SuggestionResult {
        SuggestionResult {
            label: label.to_string(),
            lat: Some(39.74),
            lng: Some(-75.54),
            address: ParsedAddress {
                line1: label.to_string(),
                ..ParsedAddress::default()
            },
        }
    }

    /// Records every forward query and answers from a script; unscripted
    /// queries echo the query text as a single suggestion.
    #[derive(Default)]
    pub struct RecordingProvider {
        pub calls: Mutex<Vec<String>>,
        pub reverse_calls: Mutex<Vec<LngLat>>,
        pub replies: Mutex<VecDeque<Result<Vec<SuggestionResult>, GeocodeError>>>,
        pub reverse_reply: Mutex<Option<Result<Option<SuggestionResult>, GeocodeError>>>,
        pub delay: Duration,
    }

    impl RecordingProvider {
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        pub fn reply(&self, r: Result<Vec<SuggestionResult>, GeocodeError>) {
            self.replies.lock().push_back(r);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl GeocodeProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn forward(
            &self,
            query: &str,
        ) -> BoxFuture<'_, Result<Vec<SuggestionResult>, GeocodeError>> {
            self.calls.lock().push(query.to_string());
            let reply = self
                .replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![suggestion(query)]));
            let delay = self.delay;
            Box::pin(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                reply
            })
        }

        fn reverse(
            &self,
            point: LngLat,
        ) -> BoxFuture<'_, Result<Option<SuggestionResult>, GeocodeError>> {
            self.reverse_calls.lock().push(point);
            let reply = self.reverse_reply.lock().clone().unwrap_or(Ok(None));
            Box::pin(async move { reply })
        }
    }
}
