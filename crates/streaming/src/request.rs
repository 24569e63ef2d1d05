use serde::{Deserialize, Serialize};

use crate::coord::TileCoord;

/// Identifies a tile-source request in a deterministic, stable way.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    /// Style document of a vector style.
    Style,
    Tile(TileCoord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    pub id: RequestId,
    pub kind: RequestKind,
    pub url: String,
    /// 1-based attempt number.
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileFailure {
    #[error("tile source returned HTTP {0}")]
    Status(u16),
    #[error("tile transport failed: {0}")]
    Transport(String),
}

impl TileFailure {
    /// The source rejected the credential; retrying cannot help.
    pub fn is_auth(&self) -> bool {
        matches!(self, TileFailure::Status(401 | 403))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileResponse {
    pub id: RequestId,
    pub outcome: Result<Vec<u8>, TileFailure>,
}

impl TileResponse {
    pub fn ok(id: RequestId, bytes: Vec<u8>) -> Self {
        Self {
            id,
            outcome: Ok(bytes),
        }
    }

    pub fn failed(id: RequestId, failure: TileFailure) -> Self {
        Self {
            id,
            outcome: Err(failure),
        }
    }
}
