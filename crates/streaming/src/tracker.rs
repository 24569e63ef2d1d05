use std::collections::BTreeMap;

use crate::request::{RequestId, RequestKind, TileFailure, TileRequest, TileResponse};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What the owner should do with a resolved response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Loaded { request: TileRequest, bytes: Vec<u8> },
    /// Send this follow-up request to the loader.
    Retry(TileRequest),
    /// All attempts failed.
    Exhausted { request: TileRequest, failure: TileFailure },
    /// The source rejected the credential; not retried.
    Rejected { request: TileRequest, failure: TileFailure },
    /// Response to a request that is no longer tracked.
    Stale,
}

/// In-flight bookkeeping with bounded retries.
#[derive(Debug)]
pub struct TileTracker {
    max_attempts: u32,
    next_id: u64,
    in_flight: BTreeMap<RequestId, TileRequest>,
}

impl Default for TileTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl TileTracker {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            next_id: 1,
            in_flight: BTreeMap::new(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn allocate(&mut self, kind: RequestKind, url: String, attempt: u32) -> TileRequest {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        let req = TileRequest {
            id,
            kind,
            url,
            attempt,
        };
        self.in_flight.insert(id, req.clone());
        req
    }

    /// First attempt for `url`.
    pub fn issue(&mut self, kind: RequestKind, url: impl Into<String>) -> TileRequest {
        self.allocate(kind, url.into(), 1)
    }

    /// Whether a tile is already being fetched.
    pub fn is_pending(&self, kind: RequestKind) -> bool {
        self.in_flight.values().any(|r| r.kind == kind)
    }

    pub fn resolve(&mut self, response: TileResponse) -> TrackOutcome {
        let Some(request) = self.in_flight.remove(&response.id) else {
            return TrackOutcome::Stale;
        };
        match response.outcome {
            Ok(bytes) => TrackOutcome::Loaded { request, bytes },
            Err(failure) if failure.is_auth() => TrackOutcome::Rejected { request, failure },
            Err(failure) if request.attempt >= self.max_attempts => {
                TrackOutcome::Exhausted { request, failure }
            }
            Err(_) => {
                let retry = self.allocate(request.kind, request.url, request.attempt + 1);
                TrackOutcome::Retry(retry)
            }
        }
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Forget everything in flight; later responses resolve as `Stale`.
    pub fn clear(&mut self) {
        self.in_flight.clear();
    }
}
