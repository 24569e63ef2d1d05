use streaming::{DEFAULT_MAX_ATTEMPTS, TileLoader, TileTemplate};

use crate::backend::{BackendKind, Capabilities, MountId, RenderBackend};
use crate::camera::Camera;
use crate::container::Container;
use crate::error::RenderError;
use crate::style::StyleId;
use crate::surface::{MapSurface, SurfaceConfig};

/// Fallback engine: public raster tiles, no credential, fixed look.
pub struct RasterTileBackend {
    surface: MapSurface,
}

impl RasterTileBackend {
    pub fn new(loader: Box<dyn TileLoader>) -> Self {
        Self::with_template(TileTemplate::osm(), loader)
    }

    pub fn with_template(template: TileTemplate, loader: Box<dyn TileLoader>) -> Self {
        let max_zoom = template.max_zoom;
        let surface = MapSurface::new(
            SurfaceConfig {
                kind: BackendKind::Raster,
                template,
                source: "osm".to_string(),
                style_url: None,
                max_zoom,
                cache_bytes: 32 << 20,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
            },
            loader,
        );
        Self { surface }
    }
}

impl RenderBackend for RasterTileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Raster
    }

    fn capabilities(&self) -> Capabilities {
        let template = self.surface.template();
        Capabilities {
            style_switching: false,
            max_zoom: template.max_zoom,
            tile_size: template.tile_size,
        }
    }

    fn surface(&self) -> &MapSurface {
        &self.surface
    }

    fn surface_mut(&mut self) -> &mut MapSurface {
        &mut self.surface
    }

    fn mount(&mut self, container: &Container, camera: Camera) -> Result<MountId, RenderError> {
        self.surface.mount(container, camera)
    }

    fn style(&self) -> Option<&StyleId> {
        None
    }

    fn set_style(&mut self, _style: &StyleId) -> Result<(), RenderError> {
        Err(RenderError::StyleUnsupported(BackendKind::Raster))
    }
}
