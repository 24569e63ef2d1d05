use cluster::IndexError;
use render::{BackendKind, RenderError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("the {0} map does not support style switching")]
    StyleUnsupported(BackendKind),
    #[error("no access token configured for the primary map")]
    MissingCredential,
    #[error("map view is not mounted")]
    NotMounted,
}
