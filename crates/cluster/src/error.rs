use thiserror::Error;

use crate::index::ClusterId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("no cluster with id {0}")]
    UnknownCluster(ClusterId),
}
