use std::sync::atomic::{AtomicU64, Ordering};

use cluster::ClusterFeature;
use foundation::bounds::LngLat;
use foundation::ids::EntityId;
use foundation::math::projection::MercatorProjection;
use streaming::{
    RequestKind, TileCache, TileKey, TileLoader, TileTemplate, TileTracker, TrackOutcome,
    tiles_covering,
};
use tracing::{debug, info, warn};

use crate::backend::{BackendEvent, BackendKind, FatalHook, MountId};
use crate::camera::{Camera, CameraAnimator, CameraOptions, MotionId};
use crate::container::{Container, Occupant};
use crate::error::{FatalError, FatalKind, RenderError};
use crate::markers::{MarkerDiff, MarkerKey, MarkerLayer};
use crate::popup::{PopupContent, PopupView};
use crate::viewport::Viewport;

static NEXT_MOUNT: AtomicU64 = AtomicU64::new(1);

/// Upper bound on tiles requested for one view.
const MAX_TILES_PER_VIEW: usize = 64;

#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    pub kind: BackendKind,
    pub template: TileTemplate,
    /// Cache namespace of the tiles, e.g. the style id.
    pub source: String,
    /// Style document to load before any tile.
    pub style_url: Option<String>,
    pub max_zoom: u8,
    pub cache_bytes: usize,
    pub max_attempts: u32,
}

struct Mounted {
    id: MountId,
    container: Container,
}

/// Engine-independent map surface: camera, markers, popup slot and tile I/O.
pub struct MapSurface {
    kind: BackendKind,
    template: TileTemplate,
    projection: MercatorProjection,
    source: String,
    style_url: Option<String>,
    max_zoom: u8,

    loader: Box<dyn TileLoader>,
    tracker: TileTracker,
    cache: TileCache,
    style_ready: bool,
    failed: bool,
    tiles_loaded: u64,

    mounted: Option<Mounted>,
    animator: CameraAnimator,
    markers: MarkerLayer,
    popup: Option<PopupView>,
    events: Vec<BackendEvent>,
    hook: Option<FatalHook>,
}

impl MapSurface {
    pub fn new(config: SurfaceConfig, loader: Box<dyn TileLoader>) -> Self {
        Self {
            kind: config.kind,
            projection: MercatorProjection::new(config.template.tile_size),
            template: config.template,
            source: config.source,
            style_url: config.style_url,
            max_zoom: config.max_zoom,
            loader,
            tracker: TileTracker::new(config.max_attempts),
            cache: TileCache::new(config.cache_bytes),
            style_ready: false,
            failed: false,
            tiles_loaded: 0,
            mounted: None,
            animator: CameraAnimator::new(Camera::new(LngLat::new(0.0, 0.0), 0.0)),
            markers: MarkerLayer::new(),
            popup: None,
            events: Vec::new(),
            hook: None,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn template(&self) -> &TileTemplate {
        &self.template
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    pub fn mount_id(&self) -> Option<MountId> {
        self.mounted.as_ref().map(|m| m.id)
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn tiles_loaded(&self) -> u64 {
        self.tiles_loaded
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn camera(&self) -> Camera {
        self.animator.camera()
    }

    pub fn in_motion(&self) -> bool {
        self.animator.in_motion()
    }

    pub fn markers(&self) -> &MarkerLayer {
        &self.markers
    }

    pub fn popup(&self) -> Option<&PopupView> {
        self.popup.as_ref()
    }

    pub fn viewport(&self) -> Viewport {
        let (w, h) = self
            .mounted
            .as_ref()
            .map(|m| m.container.size_px())
            .unwrap_or((0.0, 0.0));
        Viewport::from_camera(self.animator.camera(), &self.projection, w, h)
    }

    /// Claims the container and starts loading the style (or tiles).
    pub fn mount(&mut self, container: &Container, camera: Camera) -> Result<MountId, RenderError> {
        let id = self.attach(container, camera)?;
        self.start_loading();
        Ok(id)
    }

    /// Claims the container without touching the network. Used when the
    /// engine already knows it cannot load anything.
    pub fn mount_idle(
        &mut self,
        container: &Container,
        camera: Camera,
    ) -> Result<MountId, RenderError> {
        self.attach(container, camera)
    }

    fn attach(&mut self, container: &Container, camera: Camera) -> Result<MountId, RenderError> {
        if self.mounted.is_some() {
            return Err(RenderError::AlreadyMounted);
        }
        let id = MountId(NEXT_MOUNT.fetch_add(1, Ordering::Relaxed));
        container.claim(Occupant {
            kind: self.kind,
            mount: id,
        })?;
        self.mounted = Some(Mounted {
            id,
            container: container.clone(),
        });
        self.failed = false;
        self.animator.reset(camera.clamped(self.max_zoom));
        info!(backend = %self.kind, mount = id.0, "map surface mounted");
        Ok(id)
    }

    fn start_loading(&mut self) {
        self.style_ready = self.style_url.is_none();
        match self.style_url.clone() {
            Some(url) => {
                let req = self.tracker.issue(RequestKind::Style, url);
                self.loader.request(req);
            }
            None => self.request_visible_tiles(),
        }
    }

    pub fn unmount(&mut self, container: &Container) -> Result<(), RenderError> {
        let Some(mounted) = self.mounted.as_ref() else {
            return Err(RenderError::NotMounted);
        };
        if !mounted.container.same_as(container) {
            return Err(RenderError::NotMounted);
        }
        let id = mounted.id;
        let removed = self.markers.clear();
        self.popup = None;
        self.loader.cancel_all();
        self.tracker.clear();
        self.events.clear();
        container.release(id);
        self.mounted = None;
        info!(backend = %self.kind, mount = id.0, markers = removed, "map surface unmounted");
        Ok(())
    }

    /// Swaps the tile source. Markers and popup do not survive.
    pub fn reload_source(
        &mut self,
        template: TileTemplate,
        source: String,
        style_url: Option<String>,
    ) {
        self.markers.clear();
        self.popup = None;
        self.loader.cancel_all();
        self.tracker.clear();
        self.cache.clear_source(&self.source);
        self.projection = MercatorProjection::new(template.tile_size);
        self.template = template;
        self.source = source;
        self.style_url = style_url;
        self.failed = false;
        if self.mounted.is_some() {
            self.start_loading();
        }
    }

    pub fn set_camera(
        &mut self,
        camera: Camera,
        options: CameraOptions,
    ) -> Result<MotionId, RenderError> {
        if self.mounted.is_none() {
            return Err(RenderError::NotMounted);
        }
        Ok(self.animator.start(camera.clamped(self.max_zoom), options))
    }

    pub fn upsert_markers(&mut self, features: &[ClusterFeature]) -> Result<MarkerDiff, RenderError> {
        if self.mounted.is_none() {
            return Err(RenderError::NotMounted);
        }
        let diff = self.markers.upsert(features);
        debug!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            kept = diff.kept.len(),
            "markers reconciled"
        );
        Ok(diff)
    }

    pub fn clear_markers(&mut self) -> usize {
        self.markers.clear()
    }

    pub fn click_marker(&mut self, key: MarkerKey) -> Result<(), RenderError> {
        if self.mounted.is_none() {
            return Err(RenderError::NotMounted);
        }
        let marker = self.markers.get(&key).ok_or(RenderError::UnknownMarker(key))?;
        self.events.push(BackendEvent::MarkerClicked {
            key,
            feature: marker.feature.clone(),
        });
        Ok(())
    }

    pub fn show_popup(
        &mut self,
        entity_id: EntityId,
        anchor: LngLat,
        content: PopupContent,
    ) -> Result<Option<PopupView>, RenderError> {
        if self.mounted.is_none() {
            return Err(RenderError::NotMounted);
        }
        if self.animator.in_motion() {
            return Err(RenderError::CameraInMotion);
        }
        Ok(self.popup.replace(PopupView {
            entity_id,
            anchor,
            content,
        }))
    }

    pub fn hide_popup(&mut self) -> Option<PopupView> {
        self.popup.take()
    }

    pub fn set_fatal_hook(&mut self, hook: FatalHook) {
        self.hook = Some(hook);
    }

    /// Reports an unrecoverable failure once per mount.
    pub fn raise_fatal(&mut self, kind: FatalKind, message: impl Into<String>) {
        let Some(mount) = self.mount_id() else {
            return;
        };
        if self.failed {
            return;
        }
        self.failed = true;
        self.loader.cancel_all();
        self.tracker.clear();
        let err = FatalError {
            kind,
            backend: self.kind,
            mount,
            message: message.into(),
        };
        warn!(error = %err, "map surface failed");
        if let Some(hook) = self.hook.as_mut() {
            hook(err.clone());
        }
        self.events.push(BackendEvent::Fatal(err));
    }

    pub fn advance(&mut self, dt_s: f64) {
        if self.mounted.is_none() {
            return;
        }
        if let Some((motion, camera)) = self.animator.advance(dt_s) {
            self.events.push(BackendEvent::MoveEnd { motion, camera });
            self.request_visible_tiles();
        }

        for response in self.loader.poll() {
            if self.failed {
                break;
            }
            match self.tracker.resolve(response) {
                TrackOutcome::Loaded { request, bytes } => match request.kind {
                    RequestKind::Style => {
                        self.style_ready = true;
                        self.events.push(BackendEvent::StyleLoaded {
                            style: self.source.clone(),
                        });
                        self.request_visible_tiles();
                    }
                    RequestKind::Tile(coord) => {
                        self.tiles_loaded += 1;
                        let key = TileKey::new(self.source.clone(), coord);
                        if let Err(e) = self.cache.insert(key, bytes) {
                            warn!(tile = %coord, error = %e, "tile not cached");
                        }
                    }
                },
                TrackOutcome::Retry(request) => {
                    debug!(url = %request.url, attempt = request.attempt, "retrying");
                    self.loader.request(request);
                }
                TrackOutcome::Exhausted { request, failure } => {
                    let kind = match request.kind {
                        RequestKind::Style => FatalKind::StyleLoad,
                        RequestKind::Tile(_) => FatalKind::TilesExhausted,
                    };
                    self.raise_fatal(
                        kind,
                        format!("{} after {} attempts", failure, request.attempt),
                    );
                }
                TrackOutcome::Rejected { failure, .. } => {
                    self.raise_fatal(FatalKind::InvalidCredential, failure.to_string());
                }
                TrackOutcome::Stale => {}
            }
        }
    }

    pub fn poll_events(&mut self) -> Vec<BackendEvent> {
        std::mem::take(&mut self.events)
    }

    fn request_visible_tiles(&mut self) {
        if self.mounted.is_none() || self.failed || !self.style_ready {
            return;
        }
        let vp = self.viewport();
        let z = self.template.tile_zoom(vp.zoom);
        for coord in tiles_covering(&vp.bounds, z)
            .into_iter()
            .take(MAX_TILES_PER_VIEW)
        {
            let kind = RequestKind::Tile(coord);
            if self.cache.contains(&TileKey::new(self.source.clone(), coord))
                || self.tracker.is_pending(kind)
            {
                continue;
            }
            let req = self.tracker.issue(kind, self.template.url_for(coord));
            self.loader.request(req);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MapSurface, SurfaceConfig};
    use crate::backend::{BackendEvent, BackendKind};
    use crate::camera::{Camera, CameraOptions};
    use crate::container::Container;
    use crate::error::{FatalKind, RenderError};
    use crate::popup::{ContentId, PopupContent};
    use foundation::bounds::LngLat;
    use foundation::ids::EntityId;
    use streaming::{ScriptedTileLoader, TileFailure, TileTemplate};

    fn surface(loader: &ScriptedTileLoader, style_url: Option<&str>) -> MapSurface {
        MapSurface::new(
            SurfaceConfig {
                kind: BackendKind::Raster,
                template: TileTemplate::osm(),
                source: "osm".into(),
                style_url: style_url.map(str::to_string),
                max_zoom: 19,
                cache_bytes: 1 << 20,
                max_attempts: 3,
            },
            Box::new(loader.clone()),
        )
    }

    fn wilmington() -> Camera {
        Camera::new(LngLat::new(-75.5398, 39.7391), 12.0)
    }

    fn content(n: u64) -> PopupContent {
        PopupContent {
            instance: ContentId(n),
            html: "<b>x</b>".into(),
        }
    }

    #[test]
    fn mount_requests_visible_tiles() {
        let loader = ScriptedTileLoader::new();
        let mut s = surface(&loader, None);
        let c = Container::new(800, 600);
        s.mount(&c, wilmington()).unwrap();
        assert!(loader.request_count() > 0);
        s.advance(0.0);
        assert_eq!(s.tiles_loaded() as usize, loader.request_count());
        assert!(!s.cache().is_empty());
    }

    #[test]
    fn style_document_gates_tiles() {
        let loader = ScriptedTileLoader::new();
        let mut s = surface(&loader, Some("https://style"));
        s.mount(&Container::new(800, 600), wilmington()).unwrap();
        assert_eq!(loader.request_count(), 1);
        s.advance(0.0);
        assert!(loader.request_count() > 1);
        assert!(s
            .poll_events()
            .iter()
            .any(|e| matches!(e, BackendEvent::StyleLoaded { .. })));
    }

    #[test]
    fn exhausted_tiles_raise_one_fatal() {
        let loader = ScriptedTileLoader::new();
        loader.fail_matching("tile.openstreetmap.org", TileFailure::Status(503));
        let mut s = surface(&loader, None);
        s.mount(&Container::new(256, 256), wilmington()).unwrap();
        for _ in 0..5 {
            s.advance(0.016);
        }
        let fatals: Vec<_> = s
            .poll_events()
            .into_iter()
            .filter_map(|e| match e {
                BackendEvent::Fatal(f) => Some(f.kind),
                _ => None,
            })
            .collect();
        assert_eq!(fatals, vec![FatalKind::TilesExhausted]);
        assert!(s.has_failed());
    }

    #[test]
    fn rejected_credential_is_fatal_without_retry() {
        let loader = ScriptedTileLoader::new();
        loader.fail_matching("https://style", TileFailure::Status(401));
        let mut s = surface(&loader, Some("https://style"));
        s.mount(&Container::new(800, 600), wilmington()).unwrap();
        s.advance(0.0);
        assert_eq!(loader.request_count(), 1);
        let events = s.poll_events();
        assert!(matches!(
            events.as_slice(),
            [BackendEvent::Fatal(f)] if f.kind == FatalKind::InvalidCredential
        ));
    }

    #[test]
    fn popup_rejected_while_camera_moves() {
        let loader = ScriptedTileLoader::new();
        let mut s = surface(&loader, None);
        s.mount(&Container::new(800, 600), wilmington()).unwrap();
        s.set_camera(wilmington().with_zoom(16.0), CameraOptions::fly(700))
            .unwrap();
        assert_eq!(
            s.show_popup(EntityId(1), wilmington().center, content(1)),
            Err(RenderError::CameraInMotion)
        );
        s.advance(0.7);
        assert!(s.show_popup(EntityId(1), wilmington().center, content(1)).is_ok());
        let replaced = s
            .show_popup(EntityId(2), wilmington().center, content(2))
            .unwrap();
        assert_eq!(replaced.map(|p| p.entity_id), Some(EntityId(1)));
    }

    #[test]
    fn unmount_releases_everything() {
        let loader = ScriptedTileLoader::new();
        let mut s = surface(&loader, None);
        let c = Container::new(800, 600);
        s.mount(&c, wilmington()).unwrap();
        s.upsert_markers(&[cluster::ClusterFeature::Leaf {
            lng: -75.54,
            lat: 39.74,
            entity_id: EntityId(1),
        }])
        .unwrap();
        s.show_popup(EntityId(1), wilmington().center, content(1))
            .unwrap();

        assert_eq!(s.unmount(&Container::new(1, 1)), Err(RenderError::NotMounted));
        s.unmount(&c).unwrap();
        assert!(!c.is_occupied());
        assert!(s.markers().is_empty());
        assert!(s.popup().is_none());
        assert_eq!(s.unmount(&c), Err(RenderError::NotMounted));
    }

    #[test]
    fn operations_require_a_mount() {
        let loader = ScriptedTileLoader::new();
        let mut s = surface(&loader, None);
        assert_eq!(
            s.set_camera(wilmington(), CameraOptions::jump()),
            Err(RenderError::NotMounted)
        );
        assert_eq!(s.upsert_markers(&[]), Err(RenderError::NotMounted));
        s.raise_fatal(FatalKind::StyleLoad, "ignored");
        assert!(s.poll_events().is_empty());
    }
}
