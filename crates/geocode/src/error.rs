use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Transport(String),
    #[error("geocoder returned HTTP {0}")]
    Status(u16),
    #[error("invalid geocoder response: {0}")]
    Decode(String),
    #[error("geocoder access token is not configured")]
    MissingToken,
    #[error("no tokio runtime available for search tasks")]
    NoRuntime,
}

impl From<reqwest::Error> for GeocodeError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => GeocodeError::Status(status.as_u16()),
            None => GeocodeError::Transport(e.to_string()),
        }
    }
}
