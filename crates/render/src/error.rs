use thiserror::Error;

use crate::backend::{BackendKind, MountId};
use crate::markers::MarkerKey;

/// Synchronous misuse of a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("backend is not mounted")]
    NotMounted,
    #[error("backend is already mounted")]
    AlreadyMounted,
    #[error("container is already occupied by the {0} backend")]
    ContainerOccupied(BackendKind),
    #[error("camera is in motion")]
    CameraInMotion,
    #[error("the {0} backend cannot switch styles")]
    StyleUnsupported(BackendKind),
    #[error("unknown map style {0:?}")]
    UnknownStyle(String),
    #[error("no marker {0}")]
    UnknownMarker(MarkerKey),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FatalKind {
    StyleLoad,
    TilesExhausted,
    MissingCredential,
    InvalidCredential,
}

impl std::fmt::Display for FatalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FatalKind::StyleLoad => "style load failed",
            FatalKind::TilesExhausted => "tile retries exhausted",
            FatalKind::MissingCredential => "missing access token",
            FatalKind::InvalidCredential => "access token rejected",
        };
        f.write_str(s)
    }
}

/// Unrecoverable backend failure, delivered to the fatal hook and as a
/// `BackendEvent::Fatal`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{backend} backend (mount {mount}): {kind}: {message}")]
pub struct FatalError {
    pub kind: FatalKind,
    pub backend: BackendKind,
    pub mount: MountId,
    pub message: String,
}
