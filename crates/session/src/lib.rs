//! One interactive map view: entity markers, focus and close-up flights,
//! the single popup and automatic failover between rendering backends.

pub mod config;
pub mod controller;
pub mod error;
pub mod failover;
pub mod popup;

pub use config::{DEFAULT_CENTER, DEFAULT_ZOOM, SessionConfig};
pub use controller::{LoadTicket, MapSessionController};
pub use error::SessionError;
pub use failover::{
    BackendFactory, FailoverController, FailoverOutcome, FailoverState, TileBackendFactory,
    Transition,
};
pub use popup::{ActivePopup, PopupCard, PopupContentManager, PopupLifecycle, PopupPhase};
