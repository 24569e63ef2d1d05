use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{BackendKind, MountId};
use crate::error::RenderError;

/// Current holder of a container.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Occupant {
    pub kind: BackendKind,
    pub mount: MountId,
}

#[derive(Debug, Default)]
struct ContainerState {
    occupant: Option<Occupant>,
    claims: u64,
}

/// Host element a backend renders into.
///
/// Clones share one occupancy slot; at most one backend holds it at a time.
#[derive(Debug, Clone)]
pub struct Container {
    width_px: u32,
    height_px: u32,
    state: Arc<Mutex<ContainerState>>,
}

impl Container {
    pub fn new(width_px: u32, height_px: u32) -> Self {
        Self {
            width_px,
            height_px,
            state: Arc::new(Mutex::new(ContainerState::default())),
        }
    }

    pub fn size_px(&self) -> (f64, f64) {
        (f64::from(self.width_px), f64::from(self.height_px))
    }

    pub fn claim(&self, occupant: Occupant) -> Result<(), RenderError> {
        let mut state = self.state.lock();
        if let Some(current) = state.occupant {
            return Err(RenderError::ContainerOccupied(current.kind));
        }
        state.occupant = Some(occupant);
        state.claims += 1;
        Ok(())
    }

    /// Releases the claim held by `mount`. Other mounts' claims are untouched.
    pub fn release(&self, mount: MountId) -> bool {
        let mut state = self.state.lock();
        match state.occupant {
            Some(o) if o.mount == mount => {
                state.occupant = None;
                true
            }
            _ => false,
        }
    }

    pub fn occupant(&self) -> Option<Occupant> {
        self.state.lock().occupant
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant().is_some()
    }

    /// Successful claims over the container's lifetime.
    pub fn claim_count(&self) -> u64 {
        self.state.lock().claims
    }

    pub fn same_as(&self, other: &Container) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}
