use std::sync::Arc;

use parking_lot::Mutex;

use crate::request::{TileFailure, TileRequest, TileResponse};

/// Non-blocking tile source transport.
///
/// `request` starts a fetch; finished fetches are collected by `poll`, which
/// the owning backend calls from its `advance`.
pub trait TileLoader: Send {
    fn request(&mut self, request: TileRequest);

    /// Responses completed since the last poll.
    fn poll(&mut self) -> Vec<TileResponse>;

    /// Abandon every outstanding request. Their responses are never polled.
    fn cancel_all(&mut self);
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    failure: TileFailure,
    /// `None` fails forever.
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct Script {
    rules: Vec<Rule>,
    log: Vec<TileRequest>,
    pending: Vec<TileResponse>,
    payload: Vec<u8>,
}

impl Script {
    fn outcome_for(&mut self, url: &str) -> Result<Vec<u8>, TileFailure> {
        for rule in &mut self.rules {
            if !url.contains(&rule.pattern) {
                continue;
            }
            match rule.remaining {
                None => return Err(rule.failure.clone()),
                Some(0) => continue,
                Some(ref mut n) => {
                    *n -= 1;
                    return Err(rule.failure.clone());
                }
            }
        }
        Ok(self.payload.clone())
    }
}

/// Deterministic loader driven by URL rules.
///
/// Every request completes on the next `poll`. Requests whose URL contains a
/// rule's pattern fail with that rule's failure; everything else succeeds
/// with a fixed payload. Clones share one script, so a test can keep a
/// handle after boxing the loader into a backend.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTileLoader {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTileLoader {
    pub fn new() -> Self {
        let loader = Self::default();
        loader.script.lock().payload = b"tile".to_vec();
        loader
    }

    /// Every matching request fails.
    pub fn fail_matching(&self, pattern: impl Into<String>, failure: TileFailure) -> &Self {
        self.script.lock().rules.push(Rule {
            pattern: pattern.into(),
            failure,
            remaining: None,
        });
        self
    }

    /// The next `times` matching requests fail, later ones succeed.
    pub fn fail_times(
        &self,
        pattern: impl Into<String>,
        failure: TileFailure,
        times: u32,
    ) -> &Self {
        self.script.lock().rules.push(Rule {
            pattern: pattern.into(),
            failure,
            remaining: Some(times),
        });
        self
    }

    pub fn clear_rules(&self) {
        self.script.lock().rules.clear();
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<TileRequest> {
        self.script.lock().log.clone()
    }

    pub fn request_count(&self) -> usize {
        self.script.lock().log.len()
    }
}

impl TileLoader for ScriptedTileLoader {
    fn request(&mut self, request: TileRequest) {
        let mut script = self.script.lock();
        let outcome = script.outcome_for(&request.url);
        script.pending.push(TileResponse {
            id: request.id,
            outcome,
        });
        script.log.push(request);
    }

    fn poll(&mut self) -> Vec<TileResponse> {
        std::mem::take(&mut self.script.lock().pending)
    }

    fn cancel_all(&mut self) {
        self.script.lock().pending.clear();
    }
}
