//! Session controller for one map view.
//!
//! All map work is synchronous: host calls and `tick` mutate the active
//! backend, drain its events and finish with a microtask flush. Entity I/O
//! happens outside and is handed back through `finish_load` with the ticket
//! from `begin_load`.

use catalog::{DEFAULT_LIMIT, EntityBatch, EntityQuery, FetchError, LocatedEntity, Provenance};
use cluster::{ClusterFeature, IndexedPoint, SpatialIndex};
use foundation::bounds::{LngLat, LngLatBounds};
use foundation::ids::EntityId;
use foundation::math::geodesy::miles_to_km;
use render::{
    BackendEvent, BackendKind, Camera, CameraOptions, Container, MarkerKey, MotionId,
    RenderBackend, RenderError, StyleId, Viewport,
};
use runtime::{Event, EventBus, EventKind, Frame};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::failover::{
    BackendFactory, FailoverController, FailoverOutcome, FailoverState, Transition,
};
use crate::popup::PopupContentManager;

const FOCUS_ZOOM: f64 = 16.0;
const FOCUS_FLIGHT_MS: u32 = 700;
const CLOSEUP_ZOOM: u8 = 19;
const CLOSEUP_FLIGHT_MS: u32 = 800;
const CLUSTER_ZOOM_CAP: u8 = 20;
const CLUSTER_EASE_MS: u32 = 600;
const USER_CENTER_ZOOM: f64 = 12.0;

/// Handle for one entity load; only the latest ticket is applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LoadTicket(u64);

/// Camera flight started on behalf of a pending popup.
#[derive(Debug, Copy, Clone, PartialEq)]
struct Flight {
    target: Camera,
    options: CameraOptions,
}

/// Popup waiting for a camera motion to settle.
#[derive(Debug, Copy, Clone, PartialEq)]
struct PendingPopup {
    entity_id: EntityId,
    /// `None` opens on the next settled motion.
    motion: Option<MotionId>,
    /// Flown again on a replacement backend if the view fails over midway.
    flight: Option<Flight>,
}

pub struct MapSessionController {
    cluster: cluster::ClusterOptions,
    failover: FailoverController,
    index: SpatialIndex,
    entities: Vec<LocatedEntity>,
    viewport: Option<Viewport>,
    popups: PopupContentManager,
    pending_popup: Option<PendingPopup>,
    focused: Option<EntityId>,
    load_seq: u64,
    dirty: bool,
    frame: Frame,
    status: EventBus,
}

/// Longitudes wrapped into `[-180, 180]`; a view wider than the world
/// becomes the full longitude range.
fn api_bbox(bounds: LngLatBounds) -> LngLatBounds {
    if bounds.east - bounds.west >= 360.0 {
        return LngLatBounds::new(-180.0, bounds.south, 180.0, bounds.north);
    }
    let wrap = |lng: f64| {
        if (-180.0..=180.0).contains(&lng) {
            lng
        } else {
            (lng + 180.0).rem_euclid(360.0) - 180.0
        }
    };
    LngLatBounds::new(wrap(bounds.west), bounds.south, wrap(bounds.east), bounds.north)
}

impl MapSessionController {
    /// Mounts the view. Without a credential the fallback backend is used
    /// from the start.
    pub fn new(config: SessionConfig, factory: Box<dyn BackendFactory>) -> Result<Self, SessionError> {
        let container = Container::new(config.width_px, config.height_px);
        let camera = config.initial_camera;
        let cluster = config.cluster;
        let mut failover = FailoverController::new(config, factory, container);
        failover.mount(camera)?;

        let mut session = Self {
            cluster,
            failover,
            index: SpatialIndex::with_options(Vec::new(), cluster),
            entities: Vec::new(),
            viewport: None,
            popups: PopupContentManager::new(),
            pending_popup: None,
            focused: None,
            load_seq: 0,
            dirty: false,
            frame: Frame::start(),
            status: EventBus::new(),
        };
        if session.failover.state() == FailoverState::FallbackActive {
            session.emit(EventKind::Failover, "using fallback map");
        }
        session.rebuild_markers(false);
        Ok(session)
    }

    fn emit(&mut self, kind: EventKind, message: impl Into<String>) {
        self.status.emit(self.frame, kind, message);
    }

    fn backend_mut(&mut self) -> Result<&mut dyn RenderBackend, SessionError> {
        self.failover.backend_mut().ok_or(SessionError::NotMounted)
    }

    fn entity(&self, id: EntityId) -> Option<&LocatedEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    // Entities --------------------------------------------------------------

    /// Replaces the entity set. Entities without usable coordinates are kept
    /// for listing but never indexed.
    pub fn set_entities(&mut self, entities: Vec<LocatedEntity>) {
        let points: Vec<IndexedPoint> = entities
            .iter()
            .filter_map(|e| {
                let p = e.coordinates().filter(|p| p.is_valid())?;
                Some(IndexedPoint::new(e.id, p.lng, p.lat))
            })
            .collect();
        debug!(entities = entities.len(), indexed = points.len(), "entity set replaced");
        self.index = SpatialIndex::with_options(points, self.cluster);
        self.entities = entities;

        if let Some(pending) = self.pending_popup {
            if self.entity(pending.entity_id).is_none() {
                self.pending_popup = None;
            }
        }
        self.rebuild_markers(false);
        self.popups.flush();
    }

    /// Starts an entity load; results for any earlier ticket are dropped.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.load_seq += 1;
        LoadTicket(self.load_seq)
    }

    /// Applies the result of a load. Returns `false` for a stale ticket.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<EntityBatch, FetchError>,
    ) -> bool {
        if ticket.0 != self.load_seq {
            debug!(ticket = ticket.0, latest = self.load_seq, "dropping stale entity load");
            return false;
        }
        match result {
            Ok(batch) => {
                if let Provenance::UnfilteredFallback { reason } = &batch.provenance {
                    let message = format!("showing unfiltered businesses ({reason})");
                    self.emit(EventKind::Fetch, message);
                } else {
                    let message = format!("loaded {} businesses", batch.entities.len());
                    self.emit(EventKind::Fetch, message);
                }
                self.set_entities(batch.entities);
                self.dirty = false;
            }
            Err(e) => {
                warn!("entity load failed: {e}");
                self.emit(EventKind::Fetch, format!("failed to load businesses: {e}"));
            }
        }
        true
    }

    /// Entity query for the current view: the visible box for radius 0,
    /// otherwise a radius around the view center.
    pub fn entity_query(&self, radius_miles: f64, limit: u32) -> Option<EntityQuery> {
        let viewport = self.viewport?;
        if radius_miles > 0.0 && radius_miles.is_finite() {
            Some(EntityQuery::Near {
                center: viewport.center,
                radius_km: miles_to_km(radius_miles),
                limit,
            })
        } else {
            Some(EntityQuery::Bounds {
                bbox: api_bbox(viewport.bounds),
                limit,
            })
        }
    }

    /// Query for the visible area; clears the "map moved" flag.
    pub fn search_this_area(&mut self) -> Option<EntityQuery> {
        self.dirty = false;
        self.entity_query(0.0, DEFAULT_LIMIT)
    }

    // Camera ----------------------------------------------------------------

    pub fn set_camera(
        &mut self,
        camera: Camera,
        options: CameraOptions,
    ) -> Result<MotionId, SessionError> {
        let motion = self.backend_mut()?.set_camera(camera, options)?;
        Ok(motion)
    }

    /// Jumps to `point` (geolocation, URL parameters).
    pub fn set_user_center(&mut self, point: LngLat) -> Result<MotionId, SessionError> {
        let zoom = self.camera()?.zoom.max(USER_CENTER_ZOOM);
        self.set_camera(Camera::new(point, zoom), CameraOptions::jump())
    }

    /// Flies to the entity and opens its popup once there. `Ok(false)` when
    /// the entity is unknown or has no coordinates.
    pub fn focus_entity(&mut self, id: EntityId) -> Result<bool, SessionError> {
        let Some(position) = self.entity(id).and_then(LocatedEntity::coordinates) else {
            return Ok(false);
        };
        let zoom = self.camera()?.zoom.max(FOCUS_ZOOM);
        let flight = Flight {
            target: Camera::new(position, zoom),
            options: CameraOptions::fly(FOCUS_FLIGHT_MS),
        };
        self.fly_to_popup(id, flight)?;
        self.popups.flush();
        Ok(true)
    }

    /// Close-up of one entity: satellite imagery where the backend can
    /// switch styles, zoomed in as far as useful.
    pub fn request_closeup(&mut self, id: EntityId) -> Result<bool, SessionError> {
        let Some(position) = self.entity(id).and_then(LocatedEntity::coordinates) else {
            return Ok(false);
        };
        let caps = self.backend_mut()?.capabilities();
        if caps.style_switching {
            self.apply_style(&StyleId::satellite())?;
        }
        let zoom = f64::from(caps.max_zoom.min(CLOSEUP_ZOOM));
        let flight = Flight {
            target: Camera::new(position, zoom),
            options: CameraOptions::fly(CLOSEUP_FLIGHT_MS),
        };
        self.fly_to_popup(id, flight)?;
        self.popups.flush();
        Ok(true)
    }

    /// Starts `flight` and opens the entity's popup once it lands.
    fn fly_to_popup(&mut self, entity_id: EntityId, flight: Flight) -> Result<(), SessionError> {
        let max_zoom = self.backend_mut()?.capabilities().max_zoom;
        let motion = self.set_camera(flight.target.clamped(max_zoom), flight.options)?;
        self.pending_popup = Some(PendingPopup {
            entity_id,
            motion: Some(motion),
            flight: Some(flight),
        });
        Ok(())
    }

    // Style -----------------------------------------------------------------

    pub fn set_style(&mut self, style: &StyleId) -> Result<(), SessionError> {
        let backend = self.backend_mut()?;
        if !backend.capabilities().style_switching {
            return Err(SessionError::StyleUnsupported(backend.kind()));
        }
        self.apply_style(style)?;
        self.failover.set_preferred_style(style.clone());
        self.popups.flush();
        Ok(())
    }

    fn apply_style(&mut self, style: &StyleId) -> Result<(), SessionError> {
        let backend = self.backend_mut()?;
        if backend.style() == Some(style) {
            return Ok(());
        }
        backend.set_style(style).map_err(|e| match e {
            RenderError::StyleUnsupported(kind) => SessionError::StyleUnsupported(kind),
            other => SessionError::Render(other),
        })?;
        info!(%style, "map style switched");
        let name = style.display_name().unwrap_or(style.as_str()).to_string();
        self.emit(EventKind::Style, format!("style: {name}"));
        // The surface was recreated: its popup is gone and markers must be
        // rebuilt from scratch.
        self.popups.detach();
        self.rebuild_markers(true);
        self.restore_popup();
        Ok(())
    }

    // Markers and popups ----------------------------------------------------

    /// Recomputes the clusters for the current viewport and reconciles the
    /// backend's markers. `full` drops every marker first.
    fn rebuild_markers(&mut self, full: bool) {
        let Some(backend) = self.failover.backend_mut() else {
            return;
        };
        if full {
            backend.clear_markers();
        }
        let viewport = backend.viewport();
        let features = self.index.query(&viewport.bounds, viewport.query_zoom());
        self.viewport = Some(viewport);
        match backend.upsert_markers(&features) {
            Ok(diff) => debug!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                kept = diff.kept.len(),
                full,
                "markers rebuilt"
            ),
            Err(e) => warn!("marker rebuild failed: {e}"),
        }
    }

    /// User click on a rendered marker.
    pub fn click_marker(&mut self, key: MarkerKey) -> Result<(), SessionError> {
        self.backend_mut()?.click_marker(key)?;
        self.dispatch_events()?;
        self.popups.flush();
        Ok(())
    }

    fn on_marker_clicked(&mut self, feature: ClusterFeature) -> Result<(), SessionError> {
        match feature {
            ClusterFeature::Cluster {
                lng,
                lat,
                cluster_id,
                ..
            } => {
                let zoom = self.index.expansion_zoom(cluster_id)?.min(CLUSTER_ZOOM_CAP);
                self.set_camera(
                    Camera::new(LngLat::new(lng, lat), f64::from(zoom)),
                    CameraOptions::fly(CLUSTER_EASE_MS),
                )?;
            }
            ClusterFeature::Leaf { entity_id, .. } => {
                if self.backend_mut()?.in_motion() {
                    self.pending_popup = Some(PendingPopup {
                        entity_id,
                        motion: None,
                        flight: None,
                    });
                } else {
                    self.open_popup(entity_id);
                }
            }
        }
        Ok(())
    }

    fn open_popup(&mut self, id: EntityId) {
        let Some(entity) = self.entities.iter().find(|e| e.id == id) else {
            return;
        };
        let Some(anchor) = entity.coordinates() else {
            return;
        };
        let Some(backend) = self.failover.backend_mut() else {
            return;
        };
        match self.popups.open(entity, anchor, backend) {
            Ok(_) => {
                self.focused = Some(id);
                let message = format!("showing {}", entity.display_name());
                self.status.emit(self.frame, EventKind::Popup, message);
            }
            Err(RenderError::CameraInMotion) => {
                self.pending_popup = Some(PendingPopup {
                    entity_id: id,
                    motion: None,
                    flight: None,
                });
            }
            Err(e) => warn!(entity = %id, "popup not shown: {e}"),
        }
    }

    /// Reopens the focused entity's popup after the surface was replaced.
    fn restore_popup(&mut self) {
        if let Some(id) = self.focused {
            self.open_popup(id);
        }
    }

    pub fn close_popup(&mut self) {
        if let Some(backend) = self.failover.backend_mut() {
            self.popups.close(backend);
        } else {
            self.popups.detach();
        }
        self.focused = None;
        self.pending_popup = None;
        self.popups.flush();
    }

    // Dispatch --------------------------------------------------------------

    /// Advances the view by `dt_s` seconds.
    pub fn tick(&mut self, dt_s: f64) -> Result<(), SessionError> {
        self.frame = self.frame.advance(dt_s);
        if let Some(backend) = self.failover.backend_mut() {
            backend.advance(dt_s);
        }
        self.dispatch_events()?;
        self.poll_failover()?;
        self.popups.flush();
        Ok(())
    }

    fn dispatch_events(&mut self) -> Result<(), SessionError> {
        let events = match self.failover.backend_mut() {
            Some(backend) => backend.poll_events(),
            None => return Ok(()),
        };
        for event in events {
            match event {
                BackendEvent::MoveEnd { motion, camera } => {
                    debug!(motion = motion.0, zoom = camera.zoom, "move end");
                    self.rebuild_markers(false);
                    self.dirty = true;
                    if let Some(pending) = self.pending_popup.take() {
                        if pending.motion.is_none_or(|m| m == motion) {
                            self.open_popup(pending.entity_id);
                        }
                    }
                }
                BackendEvent::MarkerClicked { feature, .. } => self.on_marker_clicked(feature)?,
                BackendEvent::StyleLoaded { style } => debug!(%style, "style loaded"),
                // Fatal errors reach the failover controller through its hook.
                BackendEvent::Fatal(err) => debug!(error = %err, "backend reported fatal error"),
            }
        }
        Ok(())
    }

    fn poll_failover(&mut self) -> Result<(), SessionError> {
        for outcome in self.failover.poll()? {
            match outcome {
                FailoverOutcome::Transitioned(transition) => self.after_transition(&transition),
                FailoverOutcome::FallbackFailed(err) => {
                    self.emit(EventKind::Failover, format!("fallback map failed: {}", err.kind));
                }
            }
        }
        Ok(())
    }

    fn after_transition(&mut self, transition: &Transition) {
        let pending = self.pending_popup.take();
        self.popups.detach();
        self.rebuild_markers(true);
        self.restore_popup();
        if let Some(pending) = pending {
            self.resume_pending(pending);
        }
        let message = match transition.reason {
            Some(_) => "using fallback map".to_string(),
            None => format!("using {} map", transition.to),
        };
        self.emit(EventKind::Failover, message);
    }

    /// Carries a popup request that was waiting on the old backend over to
    /// the new one: an interrupted flight is flown again from where the view
    /// stopped, anything else opens right away.
    fn resume_pending(&mut self, pending: PendingPopup) {
        let Some(flight) = pending.flight else {
            self.open_popup(pending.entity_id);
            return;
        };
        if let Err(e) = self.fly_to_popup(pending.entity_id, flight) {
            warn!(entity = %pending.entity_id, "could not resume flight: {e}");
            self.open_popup(pending.entity_id);
        }
    }

    /// Explicit user request to leave the fallback map.
    pub fn retry_primary(&mut self) -> Result<bool, SessionError> {
        let camera = self.camera()?;
        let Some(transition) = self.failover.retry_primary(camera)? else {
            return Ok(false);
        };
        self.after_transition(&transition);
        self.popups.flush();
        Ok(true)
    }

    /// Tears the view down: popup content, markers and the container claim.
    pub fn unmount(&mut self) {
        self.popups.teardown();
        self.pending_popup = None;
        self.focused = None;
        self.failover.unmount();
        self.viewport = None;
    }

    // Accessors -------------------------------------------------------------

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn camera(&self) -> Result<Camera, SessionError> {
        self.failover
            .backend()
            .map(|b| b.camera())
            .ok_or(SessionError::NotMounted)
    }

    pub fn backend(&self) -> Option<&dyn RenderBackend> {
        self.failover.backend()
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.failover.backend().map(|b| b.kind())
    }

    pub fn failover_state(&self) -> FailoverState {
        self.failover.state()
    }

    /// Keys of the markers currently on the map.
    pub fn rendered(&self) -> Vec<MarkerKey> {
        self.failover
            .backend()
            .map(|b| b.marker_keys())
            .unwrap_or_default()
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn status(&self) -> &EventBus {
        &self.status
    }

    /// Takes the status events emitted since the last call.
    pub fn drain_status(&mut self) -> Vec<Event> {
        self.status.drain()
    }

    /// The map moved since the last load or "search this area".
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn entities(&self) -> &[LocatedEntity] {
        &self.entities
    }

    pub fn focused(&self) -> Option<EntityId> {
        self.focused
    }

    pub fn popups(&self) -> &PopupContentManager {
        &self.popups
    }

    pub fn container(&self) -> &Container {
        self.failover.container()
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }
}
