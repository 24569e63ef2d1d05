pub mod event_bus;
pub mod frame;
pub mod microtask;

pub use event_bus::*;
pub use frame::*;
pub use microtask::*;
