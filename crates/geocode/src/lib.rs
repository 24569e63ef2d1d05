//! Address search: forward and reverse geocoding providers and the
//! debounced search service that drives suggestion lists.

pub mod error;
pub mod mapbox;
pub mod nominatim;
pub mod provider;
pub mod search;
pub mod types;

pub use error::GeocodeError;
pub use mapbox::MapboxGeocoder;
pub use nominatim::NominatimGeocoder;
pub use provider::{BoxFuture, FallbackGeocoder, GeocodeProvider, GeocoderConfig, default_provider};
pub use search::{SearchConfig, SearchService};
pub use types::{ParsedAddress, ReverseLabel, SearchState, SuggestionResult};
