use cluster::ClusterFeature;
use foundation::bounds::LngLat;
use foundation::ids::EntityId;
use serde::{Deserialize, Serialize};

use crate::camera::{Camera, CameraOptions, MotionId};
use crate::container::Container;
use crate::error::{FatalError, RenderError};
use crate::markers::{MarkerDiff, MarkerKey};
use crate::popup::{PopupContent, PopupView};
use crate::style::StyleId;
use crate::surface::MapSurface;
use crate::viewport::Viewport;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Preferred engine: styled vector maps, needs an access token.
    Vector,
    /// Fallback engine: public raster tiles.
    Raster,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Vector => f.write_str("vector"),
            BackendKind::Raster => f.write_str("raster"),
        }
    }
}

/// Identifier of one mount of one backend, unique within the process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MountId(pub u64);

impl std::fmt::Display for MountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub style_switching: bool,
    pub max_zoom: u8,
    pub tile_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    MarkerClicked {
        key: MarkerKey,
        feature: ClusterFeature,
    },
    /// The latest camera motion settled.
    MoveEnd { motion: MotionId, camera: Camera },
    /// The style document finished loading.
    StyleLoaded { style: String },
    Fatal(FatalError),
}

pub type FatalHook = Box<dyn FnMut(FatalError) + Send>;

/// One interchangeable rendering engine.
///
/// Implementors provide identity, mounting and styling; marker, popup and
/// camera behaviour comes from the shared `MapSurface` so every engine
/// behaves the same.
pub trait RenderBackend: Send {
    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> Capabilities;

    fn surface(&self) -> &MapSurface;

    fn surface_mut(&mut self) -> &mut MapSurface;

    /// Claims `container` and places the camera.
    fn mount(&mut self, container: &Container, camera: Camera) -> Result<MountId, RenderError>;

    /// Current style, for engines that have one.
    fn style(&self) -> Option<&StyleId>;

    /// Recreates the surface with another style. Markers and popup are
    /// cleared and must be rebuilt by the caller.
    fn set_style(&mut self, style: &StyleId) -> Result<(), RenderError>;

    /// Releases markers, popup, pending tile loads and the container claim.
    fn unmount(&mut self, container: &Container) -> Result<(), RenderError> {
        self.surface_mut().unmount(container)
    }

    fn is_mounted(&self) -> bool {
        self.surface().is_mounted()
    }

    fn mount_id(&self) -> Option<MountId> {
        self.surface().mount_id()
    }

    fn camera(&self) -> Camera {
        self.surface().camera()
    }

    fn viewport(&self) -> Viewport {
        self.surface().viewport()
    }

    fn in_motion(&self) -> bool {
        self.surface().in_motion()
    }

    fn set_camera(&mut self, camera: Camera, options: CameraOptions) -> Result<MotionId, RenderError> {
        self.surface_mut().set_camera(camera, options)
    }

    fn upsert_markers(&mut self, features: &[ClusterFeature]) -> Result<MarkerDiff, RenderError> {
        self.surface_mut().upsert_markers(features)
    }

    fn clear_markers(&mut self) -> usize {
        self.surface_mut().clear_markers()
    }

    fn marker_count(&self) -> usize {
        self.surface().markers().len()
    }

    fn marker_keys(&self) -> Vec<MarkerKey> {
        self.surface().markers().keys()
    }

    /// User interaction entry point: reports `BackendEvent::MarkerClicked`.
    fn click_marker(&mut self, key: MarkerKey) -> Result<(), RenderError> {
        self.surface_mut().click_marker(key)
    }

    /// Shows `content` anchored at `anchor`, replacing any current popup.
    fn show_popup(
        &mut self,
        entity_id: EntityId,
        anchor: LngLat,
        content: PopupContent,
    ) -> Result<Option<PopupView>, RenderError> {
        self.surface_mut().show_popup(entity_id, anchor, content)
    }

    fn hide_popup(&mut self) -> Option<PopupView> {
        self.surface_mut().hide_popup()
    }

    fn popup(&self) -> Option<&PopupView> {
        self.surface().popup()
    }

    fn on_fatal_error(&mut self, hook: FatalHook) {
        self.surface_mut().set_fatal_hook(hook);
    }

    /// Drives camera animation and tile I/O.
    fn advance(&mut self, dt_s: f64) {
        self.surface_mut().advance(dt_s);
    }

    fn poll_events(&mut self) -> Vec<BackendEvent> {
        self.surface_mut().poll_events()
    }
}
