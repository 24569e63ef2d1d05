//! Hierarchical greedy point clustering for web maps.
//!
//! `SpatialIndex::load` clusters a point set once per zoom level; queries are
//! read-only lookups into the per-zoom KD-trees.

pub mod error;
pub mod index;
mod kdtree;
pub mod options;

pub use error::IndexError;
pub use index::{ClusterFeature, ClusterId, IndexedPoint, MAX_SUPPORTED_ZOOM, SpatialIndex};
pub use options::ClusterOptions;
