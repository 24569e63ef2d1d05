//! Where entities come from.
//!
//! `EntitySource` abstracts the entity API so the session and the host can
//! run against HTTP or an in-memory set. `load_entities` layers the
//! unfiltered fallback on top of any source.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use foundation::math::geodesy::haversine_km;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::entity::LocatedEntity;
use crate::error::FetchError;
use crate::query::{EntityQuery, FALLBACK_LIMIT};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EntitySource: Send + Sync {
    fn fetch(&self, query: EntityQuery) -> BoxFuture<'_, Result<Vec<LocatedEntity>, FetchError>>;
}

/// How the entities of a batch were obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum Provenance {
    Requested,
    /// The filtered query failed with `reason`; the batch holds the first
    /// `FALLBACK_LIMIT` entities instead.
    UnfilteredFallback { reason: FetchError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityBatch {
    pub entities: Vec<LocatedEntity>,
    pub provenance: Provenance,
}

impl EntityBatch {
    pub fn is_fallback(&self) -> bool {
        matches!(self.provenance, Provenance::UnfilteredFallback { .. })
    }
}

/// Runs `query`; on failure retries once unfiltered with `FALLBACK_LIMIT`.
/// When the retry fails too, the original error is returned.
pub async fn load_entities(
    source: &dyn EntitySource,
    query: EntityQuery,
) -> Result<EntityBatch, FetchError> {
    debug!(query = %query.query_string(), "fetching entities");
    let reason = match source.fetch(query).await {
        Ok(entities) => {
            return Ok(EntityBatch {
                entities,
                provenance: Provenance::Requested,
            });
        }
        Err(e) => e,
    };

    warn!("entity query failed ({reason}), retrying unfiltered");
    match source
        .fetch(EntityQuery::Unfiltered {
            limit: FALLBACK_LIMIT,
        })
        .await
    {
        Ok(entities) => Ok(EntityBatch {
            entities,
            provenance: Provenance::UnfilteredFallback { reason },
        }),
        Err(fallback) => {
            warn!("unfiltered entity query failed too: {fallback}");
            Err(reason)
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpEntityConfig {
    pub base_url: String,
    pub path: String,
    pub timeout: Duration,
}

impl Default for HttpEntityConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            path: "/api/businesses/".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl HttpEntityConfig {
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

/// Entity API over HTTP. Expects a JSON array of entities.
pub struct HttpEntitySource {
    config: HttpEntityConfig,
    client: reqwest::Client,
}

impl HttpEntitySource {
    pub fn new(config: HttpEntityConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &HttpEntityConfig {
        &self.config
    }
}

impl EntitySource for HttpEntitySource {
    fn fetch(&self, query: EntityQuery) -> BoxFuture<'_, Result<Vec<LocatedEntity>, FetchError>> {
        let url = self.config.endpoint();
        let timeout = self.config.timeout;
        Box::pin(async move {
            let request = async {
                let resp = self
                    .client
                    .get(&url)
                    .query(&query.query_pairs())
                    .send()
                    .await
                    .map_err(|e| FetchError::Transport(e.to_string()))?;

                if !resp.status().is_success() {
                    return Err(FetchError::Status(resp.status().as_u16()));
                }

                let body = resp
                    .bytes()
                    .await
                    .map_err(|e| FetchError::Transport(e.to_string()))?;
                serde_json::from_slice::<Vec<LocatedEntity>>(&body)
                    .map_err(|e| FetchError::Decode(e.to_string()))
            };
            match tokio::time::timeout(timeout, request).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(timeout.as_millis() as u64)),
            }
        })
    }
}

/// In-memory entity set answering queries the way the API does.
///
/// Filtered queries can be made to fail, which exercises the fallback path.
#[derive(Default)]
pub struct StaticEntitySource {
    entities: Vec<LocatedEntity>,
    fail_filtered: Option<FetchError>,
    fail_all: Option<FetchError>,
    seen: Mutex<Vec<EntityQuery>>,
}

impl StaticEntitySource {
    pub fn new(entities: Vec<LocatedEntity>) -> Self {
        Self {
            entities,
            ..Self::default()
        }
    }

    pub fn failing_filtered(mut self, error: FetchError) -> Self {
        self.fail_filtered = Some(error);
        self
    }

    pub fn failing(mut self, error: FetchError) -> Self {
        self.fail_all = Some(error);
        self
    }

    /// Queries received so far.
    pub fn queries(&self) -> Vec<EntityQuery> {
        self.seen.lock().clone()
    }

    fn answer(&self, query: &EntityQuery) -> Vec<LocatedEntity> {
        let limit = query.limit() as usize;
        self.entities
            .iter()
            .filter(|e| match query {
                EntityQuery::Bounds { bbox, .. } => {
                    e.coordinates().is_some_and(|p| bbox.contains(p))
                }
                EntityQuery::Near {
                    center, radius_km, ..
                } => e
                    .coordinates()
                    .is_some_and(|p| haversine_km(*center, p) <= *radius_km),
                EntityQuery::Unfiltered { .. } => true,
            })
            .take(limit)
            .cloned()
            .collect()
    }
}

impl EntitySource for StaticEntitySource {
    fn fetch(&self, query: EntityQuery) -> BoxFuture<'_, Result<Vec<LocatedEntity>, FetchError>> {
        self.seen.lock().push(query.clone());
        let result = if let Some(e) = &self.fail_all {
            Err(e.clone())
        } else if let (Some(e), false) = (
            &self.fail_filtered,
            matches!(query, EntityQuery::Unfiltered { .. }),
        ) {
            Err(e.clone())
        } else {
            Ok(self.answer(&query))
        };
        Box::pin(async move { result })
    }
}
