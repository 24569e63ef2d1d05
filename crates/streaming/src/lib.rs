pub mod cache;
pub mod coord;
pub mod http;
pub mod loader;
pub mod request;
pub mod template;
pub mod tracker;

pub use cache::*;
pub use coord::*;
pub use http::*;
pub use loader::*;
pub use request::*;
pub use template::*;
pub use tracker::*;
