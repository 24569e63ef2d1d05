//! Debounced address search.
//!
//! `set_query` schedules a lookup on the runtime after `debounce`; a newer
//! query (or `lock`) aborts the pending task and bumps the generation so a
//! response that still slips through is discarded. State is published on a
//! `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use foundation::bounds::LngLat;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::GeocodeError;
use crate::provider::GeocodeProvider;
use crate::types::{ReverseLabel, SearchState, SuggestionResult};

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub debounce: Duration,
    pub min_query_chars: usize,
    /// Queries made only of digits, spaces and dashes need this many digits.
    pub min_postal_digits: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            min_query_chars: 3,
            min_postal_digits: 5,
        }
    }
}

impl SearchConfig {
    fn wants_lookup(&self, trimmed: &str) -> bool {
        if trimmed.chars().count() < self.min_query_chars {
            return false;
        }
        let postal_like = trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_whitespace() || c == '-');
        if postal_like {
            return trimmed.chars().filter(char::is_ascii_digit).count() >= self.min_postal_digits;
        }
        true
    }
}

#[derive(Default)]
struct Lookup {
    generation: u64,
    locked: bool,
    pending: Option<JoinHandle<()>>,
}

impl Lookup {
    /// Invalidates whatever lookup is scheduled or in flight.
    fn supersede(&mut self) {
        self.generation += 1;
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

struct Shared {
    provider: Arc<dyn GeocodeProvider>,
    config: SearchConfig,
    state: watch::Sender<SearchState>,
    lookup: Mutex<Lookup>,
}

impl Shared {
    /// Applies `update` only while `generation` is the live, unlocked
    /// lookup. The guard is held across the write so `set_query` and `lock`
    /// cannot slip in between the check and the update.
    fn publish_if_current(&self, generation: u64, update: impl FnOnce(&mut SearchState)) -> bool {
        let lookup = self.lookup.lock();
        if lookup.generation != generation || lookup.locked {
            return false;
        }
        self.state.send_modify(update);
        true
    }
}

async fn run_lookup(shared: Arc<Shared>, generation: u64, query: String) {
    tokio::time::sleep(shared.config.debounce).await;
    let started = shared.publish_if_current(generation, |s| {
        s.fetching = true;
        s.error = None;
    });
    if !started {
        return;
    }
    debug!(provider = shared.provider.name(), query = %query, "geocode lookup");
    let result = shared.provider.forward(&query).await;

    let applied = shared.publish_if_current(generation, |s| {
        s.fetching = false;
        match result {
            Ok(found) => {
                s.open = !found.is_empty();
                s.suggestions = found;
                s.error = None;
            }
            Err(e) => {
                warn!(query = %query, "geocode lookup failed: {e}");
                s.suggestions.clear();
                s.open = false;
                s.error = Some(e);
            }
        }
    });
    if !applied {
        debug!(query = %query, "discarding superseded geocode response");
    }
}

pub struct SearchService {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl SearchService {
    pub fn new(runtime: Handle, provider: Arc<dyn GeocodeProvider>, config: SearchConfig) -> Self {
        let (state, _) = watch::channel(SearchState::default());
        Self {
            shared: Arc::new(Shared {
                provider,
                config,
                state,
                lookup: Mutex::new(Lookup::default()),
            }),
            runtime,
        }
    }

    /// Service on the runtime of the calling context.
    pub fn current(
        provider: Arc<dyn GeocodeProvider>,
        config: SearchConfig,
    ) -> Result<Self, GeocodeError> {
        let runtime = Handle::try_current().map_err(|_| GeocodeError::NoRuntime)?;
        Ok(Self::new(runtime, provider, config))
    }

    pub fn state(&self) -> SearchState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.shared.state.subscribe()
    }

    pub fn is_locked(&self) -> bool {
        self.shared.lookup.lock().locked
    }

    /// Records `text` and, unless locked, schedules a debounced lookup.
    pub fn set_query(&self, text: &str) {
        let mut lookup = self.shared.lookup.lock();
        self.shared.state.send_modify(|s| s.query = text.to_string());
        if lookup.locked {
            return;
        }
        lookup.supersede();

        let trimmed = text.trim();
        if !self.shared.config.wants_lookup(trimmed) {
            self.shared.state.send_modify(|s| {
                s.suggestions.clear();
                s.open = false;
                s.fetching = false;
            });
            return;
        }
        self.shared.state.send_modify(|s| s.fetching = false);

        let generation = lookup.generation;
        lookup.pending = Some(self.runtime.spawn(run_lookup(
            Arc::clone(&self.shared),
            generation,
            trimmed.to_string(),
        )));
    }

    /// Cancels any pending or in-flight lookup and blocks new ones.
    pub fn lock(&self) {
        let mut lookup = self.shared.lookup.lock();
        lookup.locked = true;
        lookup.supersede();
        self.shared.state.send_modify(|s| {
            s.locked = true;
            s.fetching = false;
            s.open = false;
        });
    }

    pub fn unlock(&self) {
        self.shared.lookup.lock().locked = false;
        self.shared.state.send_modify(|s| s.locked = false);
    }

    /// Takes `choice`: the query becomes its label and the search locks.
    pub fn select(&self, choice: &SuggestionResult) -> SuggestionResult {
        self.lock();
        self.shared.state.send_modify(|s| {
            s.query = choice.label.clone();
            s.suggestions.clear();
        });
        choice.clone()
    }

    /// Label for a dropped pin, falling back to its coordinates.
    pub async fn reverse_geocode(&self, point: LngLat) -> Result<ReverseLabel, GeocodeError> {
        match self.shared.provider.reverse(point).await? {
            Some(found) if !found.label.trim().is_empty() => Ok(ReverseLabel {
                label: found.label,
                address: Some(found.address),
            }),
            _ => Ok(ReverseLabel::from_coordinates(point)),
        }
    }
}

impl Drop for SearchService {
    fn drop(&mut self) {
        self.shared.lookup.lock().supersede();
    }
}
