pub mod bounds;
pub mod ids;
pub mod math;
pub mod time;

// Foundation crate: small, well-tested geo primitives only.
pub use bounds::*;
pub use ids::*;
pub use time::*;
