//! Map rendering backends.
//!
//! A backend owns one interactive map surface: camera, markers, a single
//! popup and the tile source feeding it. Everything above this crate talks to
//! backends through `Box<dyn RenderBackend>` and `capabilities()`.

pub mod backend;
pub mod camera;
pub mod container;
pub mod error;
pub mod markers;
pub mod popup;
pub mod raster;
pub mod style;
pub mod surface;
pub mod vector;
pub mod viewport;

pub use backend::*;
pub use camera::*;
pub use container::*;
pub use error::*;
pub use markers::*;
pub use popup::*;
pub use raster::RasterTileBackend;
pub use style::*;
pub use surface::{MapSurface, SurfaceConfig};
pub use vector::{VectorConfig, VectorTileBackend};
pub use viewport::Viewport;
