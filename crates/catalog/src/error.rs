use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("entity API returned HTTP {0}")]
    Status(u16),
    #[error("invalid entity payload: {0}")]
    Decode(String),
    #[error("entity request timed out after {0} ms")]
    Timeout(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrefsError {
    #[error("preferences storage error: {0}")]
    Io(String),
    #[error("preferences storage corrupt: {0}")]
    Corrupt(String),
}
