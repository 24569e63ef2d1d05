use streaming::{DEFAULT_MAX_ATTEMPTS, TileLoader, TileTemplate, mapbox_style_url};
use tracing::info;

use crate::backend::{BackendKind, Capabilities, MountId, RenderBackend};
use crate::camera::Camera;
use crate::container::Container;
use crate::error::{FatalKind, RenderError};
use crate::style::StyleId;
use crate::surface::{MapSurface, SurfaceConfig};

pub const VECTOR_TILE_SIZE: u32 = 512;
pub const VECTOR_MAX_ZOOM: u8 = 22;

#[derive(Debug, Clone)]
pub struct VectorConfig {
    pub access_token: Option<String>,
    pub style: StyleId,
    pub retina: bool,
    pub cache_bytes: usize,
    pub max_attempts: u32,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            style: StyleId::default(),
            retina: false,
            cache_bytes: 64 << 20,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Preferred engine: token-authenticated styled maps with style switching.
pub struct VectorTileBackend {
    token: Option<String>,
    style: StyleId,
    retina: bool,
    surface: MapSurface,
}

impl VectorTileBackend {
    pub fn new(config: VectorConfig, loader: Box<dyn TileLoader>) -> Self {
        let token = config
            .access_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let (template, style_url) = source_for(&config.style, token.as_deref(), config.retina);
        let surface = MapSurface::new(
            SurfaceConfig {
                kind: BackendKind::Vector,
                template,
                source: config.style.to_string(),
                style_url,
                max_zoom: VECTOR_MAX_ZOOM,
                cache_bytes: config.cache_bytes,
                max_attempts: config.max_attempts,
            },
            loader,
        );
        Self {
            token,
            style: config.style,
            retina: config.retina,
            surface,
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

fn source_for(style: &StyleId, token: Option<&str>, retina: bool) -> (TileTemplate, Option<String>) {
    let token = token.unwrap_or_default();
    (
        TileTemplate::mapbox(style.as_str(), token).with_retina(retina),
        Some(mapbox_style_url(style.as_str(), token)),
    )
}

impl RenderBackend for VectorTileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vector
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            style_switching: true,
            max_zoom: VECTOR_MAX_ZOOM,
            tile_size: VECTOR_TILE_SIZE,
        }
    }

    fn surface(&self) -> &MapSurface {
        &self.surface
    }

    fn surface_mut(&mut self) -> &mut MapSurface {
        &mut self.surface
    }

    fn mount(&mut self, container: &Container, camera: Camera) -> Result<MountId, RenderError> {
        if self.token.is_none() {
            let id = self.surface.mount_idle(container, camera)?;
            self.surface
                .raise_fatal(FatalKind::MissingCredential, "no access token configured");
            return Ok(id);
        }
        self.surface.mount(container, camera)
    }

    fn style(&self) -> Option<&StyleId> {
        Some(&self.style)
    }

    fn set_style(&mut self, style: &StyleId) -> Result<(), RenderError> {
        if *style == self.style {
            return Ok(());
        }
        info!(from = %self.style, to = %style, "switching map style");
        let (template, style_url) = source_for(style, self.token.as_deref(), self.retina);
        self.style = style.clone();
        self.surface
            .reload_source(template, style.to_string(), style_url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{VectorConfig, VectorTileBackend};
    use crate::backend::{BackendEvent, RenderBackend};
    use crate::camera::Camera;
    use crate::container::Container;
    use crate::error::FatalKind;
    use crate::style::StyleId;
    use cluster::ClusterFeature;
    use foundation::bounds::LngLat;
    use foundation::ids::EntityId;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use streaming::ScriptedTileLoader;

    fn backend(loader: &ScriptedTileLoader, token: Option<&str>) -> VectorTileBackend {
        VectorTileBackend::new(
            VectorConfig {
                access_token: token.map(str::to_string),
                ..VectorConfig::default()
            },
            Box::new(loader.clone()),
        )
    }

    fn camera() -> Camera {
        Camera::new(LngLat::new(-75.5398, 39.7391), 12.0)
    }

    #[test]
    fn loads_style_document_with_token() {
        let loader = ScriptedTileLoader::new();
        let mut b = backend(&loader, Some("pk.abc"));
        b.mount(&Container::new(800, 600), camera()).unwrap();
        let requests = loader.requests();
        assert_eq!(
            requests[0].url,
            "https://api.mapbox.com/styles/v1/mapbox/navigation-night-v1?access_token=pk.abc"
        );
        assert_eq!(b.capabilities().tile_size, 512);
    }

    #[test]
    fn missing_token_reports_fatal_through_hook_and_event() {
        let loader = ScriptedTileLoader::new();
        let mut b = backend(&loader, Some("  "));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        b.on_fatal_error(Box::new(move |e| sink.lock().push(e.kind)));
        b.mount(&Container::new(800, 600), camera()).unwrap();

        assert_eq!(loader.request_count(), 0);
        assert_eq!(*seen.lock(), vec![FatalKind::MissingCredential]);
        assert!(matches!(
            b.poll_events().as_slice(),
            [BackendEvent::Fatal(_)]
        ));
    }

    #[test]
    fn style_switch_clears_markers_and_reloads() {
        let loader = ScriptedTileLoader::new();
        let mut b = backend(&loader, Some("pk.abc"));
        b.mount(&Container::new(800, 600), camera()).unwrap();
        b.advance(0.0);
        b.upsert_markers(&[ClusterFeature::Leaf {
            lng: -75.54,
            lat: 39.74,
            entity_id: EntityId(1),
        }])
        .unwrap();
        let before = loader.request_count();

        b.set_style(&StyleId::satellite()).unwrap();
        assert_eq!(b.marker_count(), 0);
        assert_eq!(b.style(), Some(&StyleId::satellite()));
        let requests = loader.requests();
        assert!(requests[before].url.contains("satellite-streets-v12?access_token"));
    }
}
