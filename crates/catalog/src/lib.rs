//! Located entities and everything around them: the JSON model, queries
//! against the entity API, client-side filters and persisted preferences.

pub mod entity;
pub mod error;
pub mod filter;
pub mod prefs;
pub mod query;
pub mod source;

pub use entity::LocatedEntity;
pub use error::{FetchError, PrefsError};
pub use filter::{NearbyEntity, RADIUS_CHOICES_MILES, filter_by_text, nearby};
pub use prefs::{InMemoryPreferencesStore, JsonFilePreferencesStore, Preferences, PreferencesStore};
pub use query::{DEFAULT_LIMIT, EntityQuery, FALLBACK_LIMIT};
pub use source::{
    BoxFuture, EntityBatch, EntitySource, HttpEntityConfig, HttpEntitySource, Provenance,
    StaticEntitySource, load_entities,
};
