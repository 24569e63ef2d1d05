use catalog::{
    EntityBatch, EntityQuery, FetchError, LocatedEntity, Provenance, StaticEntitySource,
    load_entities,
};
use foundation::bounds::LngLat;
use foundation::ids::EntityId;
use pretty_assertions::assert_eq;
use render::{BackendKind, Camera, CameraOptions, MarkerKey, StyleId};
use runtime::EventKind;
use session::{
    FailoverState, MapSessionController, PopupPhase, SessionConfig, SessionError,
    TileBackendFactory,
};
use streaming::{ScriptedTileLoader, TileFailure, TileLoader};

struct Harness {
    session: MapSessionController,
    vector: ScriptedTileLoader,
    raster: ScriptedTileLoader,
}

fn harness_with(token: Option<&str>, vector: ScriptedTileLoader) -> Harness {
    let raster = ScriptedTileLoader::new();
    let (v, r) = (vector.clone(), raster.clone());
    let factory = TileBackendFactory::new(move |kind| match kind {
        BackendKind::Vector => Box::new(v.clone()) as Box<dyn TileLoader>,
        BackendKind::Raster => Box::new(r.clone()),
    });
    let config = SessionConfig {
        access_token: token.map(str::to_string),
        ..SessionConfig::default()
    };
    let session = MapSessionController::new(config, Box::new(factory)).unwrap();
    Harness {
        session,
        vector,
        raster,
    }
}

fn harness(token: Option<&str>) -> Harness {
    harness_with(token, ScriptedTileLoader::new())
}

fn settle(session: &mut MapSessionController, seconds: f64) {
    let steps = (seconds / 0.05).ceil() as usize;
    for _ in 0..steps {
        session.tick(0.05).unwrap();
    }
}

/// Two businesses a few dozen meters apart downtown, one across town and one
/// without a location.
fn entities() -> Vec<LocatedEntity> {
    let mut no_location = LocatedEntity::new(EntityId(4), "Mobile Vendor");
    no_location.lat = None;
    no_location.lng = Some(-75.54);
    vec![
        LocatedEntity::new(EntityId(1), "Market Street Cafe").at(39.7400, -75.5400),
        LocatedEntity::new(EntityId(2), "Corner Bakery").at(39.7403, -75.5404),
        LocatedEntity::new(EntityId(3), "Trolley Square Books").at(39.7500, -75.5600),
        no_location,
    ]
}

fn popup_entity(h: &Harness) -> Option<EntityId> {
    h.session.backend().and_then(|b| b.popup()).map(|p| p.entity_id)
}

#[test]
fn nearby_points_render_as_one_cluster() {
    let mut h = harness(Some("pk.test"));
    h.session.set_entities(entities());

    let rendered = h.session.rendered();
    assert_eq!(rendered.len(), 2);
    assert!(rendered.contains(&MarkerKey::Entity(EntityId(3))));

    let viewport = h.session.viewport().unwrap();
    let features = h.session.index().query(&viewport.bounds, 12);
    let cluster = features.iter().find(|f| f.is_cluster()).unwrap();
    assert_eq!(cluster.point_count(), 2);
    // The entity without coordinates is listed but never indexed.
    assert_eq!(h.session.entities().len(), 4);
    assert_eq!(h.session.index().len(), 3);
}

#[test]
fn focus_flies_in_and_opens_popup_after_landing() {
    let mut h = harness(Some("pk.test"));
    h.session.set_entities(entities());

    assert_eq!(h.session.focus_entity(EntityId(3)), Ok(true));
    assert_eq!(popup_entity(&h), None);
    settle(&mut h.session, 1.0);

    let camera = h.session.camera().unwrap();
    assert_eq!(camera.zoom, 16.0);
    assert_eq!(camera.center, LngLat::new(-75.5600, 39.7500));
    assert_eq!(popup_entity(&h), Some(EntityId(3)));
    assert_eq!(h.session.focused(), Some(EntityId(3)));
    assert_eq!(h.session.popups().live_count(), 1);
}

#[test]
fn focus_without_coordinates_is_a_silent_no_op() {
    let mut h = harness(Some("pk.test"));
    h.session.set_entities(entities());
    let before = h.session.camera().unwrap();

    assert_eq!(h.session.focus_entity(EntityId(4)), Ok(false));
    assert_eq!(h.session.focus_entity(EntityId(99)), Ok(false));
    settle(&mut h.session, 1.0);

    assert_eq!(h.session.camera().unwrap(), before);
    assert_eq!(popup_entity(&h), None);
    assert_eq!(h.session.popups().mounted_log().len(), 0);
}

#[test]
fn cluster_click_eases_to_expansion_zoom() {
    let mut h = harness(Some("pk.test"));
    h.session.set_entities(entities());
    let key = h
        .session
        .rendered()
        .into_iter()
        .find(|k| matches!(k, MarkerKey::Cluster(_)))
        .unwrap();
    let MarkerKey::Cluster(id) = key else {
        unreachable!()
    };
    let expected = h.session.index().expansion_zoom(id).unwrap().min(20);

    h.session.click_marker(key).unwrap();
    settle(&mut h.session, 1.0);
    assert_eq!(h.session.camera().unwrap().zoom, f64::from(expected));
    assert!(
        h.session
            .rendered()
            .iter()
            .any(|k| matches!(k, MarkerKey::Entity(EntityId(1) | EntityId(2))))
    );
}

#[test]
fn second_popup_detaches_first_until_flush() {
    let mut h = harness(Some("pk.test"));
    h.session.set_entities(entities());

    h.session.click_marker(MarkerKey::Entity(EntityId(3))).unwrap();
    assert_eq!(popup_entity(&h), Some(EntityId(3)));
    let first = h.session.popups().active().unwrap().instance;

    h.session.focus_entity(EntityId(1)).unwrap();
    settle(&mut h.session, 1.0);

    assert_eq!(popup_entity(&h), Some(EntityId(1)));
    assert_eq!(h.session.popups().live_count(), 1);
    assert_eq!(h.session.popups().pending_unmounts(), 0);
    let unmounted: Vec<_> = h
        .session
        .popups()
        .mounted_log()
        .iter()
        .filter(|l| l.phase == PopupPhase::Unmounted)
        .map(|l| l.instance)
        .collect();
    assert_eq!(unmounted, vec![first]);
}

#[test]
fn primary_failure_switches_to_fallback_and_restores_view() {
    let mut h = harness(Some("pk.test"));
    h.session.set_entities(entities());
    h.session.focus_entity(EntityId(3)).unwrap();
    settle(&mut h.session, 1.0);
    assert_eq!(popup_entity(&h), Some(EntityId(3)));

    h.vector.fail_matching("/tiles/", TileFailure::Status(500));
    h.session
        .set_camera(
            Camera::new(LngLat::new(-75.60, 39.76), 16.0),
            CameraOptions::jump(),
        )
        .unwrap();
    settle(&mut h.session, 0.5);

    assert_eq!(h.session.backend_kind(), Some(BackendKind::Raster));
    assert_eq!(h.session.failover_state(), FailoverState::FallbackActive);
    assert_eq!(
        h.session.status().latest(EventKind::Failover).map(|e| e.message.as_str()),
        Some("using fallback map")
    );
    assert_eq!(h.session.camera().unwrap().center, LngLat::new(-75.60, 39.76));
    assert_eq!(popup_entity(&h), Some(EntityId(3)));
    assert_eq!(
        h.session.container().occupant().map(|o| o.kind),
        Some(BackendKind::Raster)
    );

    // One-way: nothing further happens on later ticks.
    settle(&mut h.session, 1.0);
    assert_eq!(h.session.status().count(EventKind::Failover), 1);
}

#[test]
fn missing_credential_starts_on_fallback() {
    let mut h = harness(None);
    h.session.set_entities(entities());
    settle(&mut h.session, 0.2);

    assert_eq!(h.session.failover_state(), FailoverState::FallbackActive);
    assert_eq!(h.session.backend_kind(), Some(BackendKind::Raster));
    assert_eq!(h.vector.request_count(), 0);
    assert!(h.raster.request_count() > 0);
    assert_eq!(h.session.rendered().len(), 2);
    assert_eq!(
        h.session.set_style(&StyleId::satellite()),
        Err(SessionError::StyleUnsupported(BackendKind::Raster))
    );
    assert_eq!(h.session.retry_primary(), Err(SessionError::MissingCredential));
}

#[test]
fn style_switch_rebuilds_markers_and_restores_popup() {
    let mut h = harness(Some("pk.test"));
    h.session.set_entities(entities());
    h.session.focus_entity(EntityId(3)).unwrap();
    settle(&mut h.session, 1.0);
    let before = h.session.rendered();
    assert!(!before.is_empty());

    let outdoors = StyleId::from_catalog("Outdoors").unwrap();
    h.session.set_style(&outdoors).unwrap();

    assert_eq!(h.session.backend().unwrap().style(), Some(&outdoors));
    assert_eq!(h.session.rendered(), before);
    assert_eq!(popup_entity(&h), Some(EntityId(3)));
    assert_eq!(
        h.session.status().latest(EventKind::Style).map(|e| e.message.as_str()),
        Some("style: Outdoors")
    );
    assert_eq!(h.session.popups().pending_unmounts(), 0);
}

#[test]
fn closeup_switches_to_satellite_when_supported() {
    let mut h = harness(Some("pk.test"));
    h.session.set_entities(entities());
    assert_eq!(h.session.request_closeup(EntityId(2)), Ok(true));
    assert_eq!(
        h.session.backend().unwrap().style(),
        Some(&StyleId::satellite())
    );
    settle(&mut h.session, 1.0);
    assert_eq!(h.session.camera().unwrap().zoom, 19.0);
    assert_eq!(popup_entity(&h), Some(EntityId(2)));

    let mut fallback = harness(None);
    fallback.session.set_entities(entities());
    assert_eq!(fallback.session.request_closeup(EntityId(2)), Ok(true));
    settle(&mut fallback.session, 1.0);
    assert_eq!(fallback.session.camera().unwrap().zoom, 19.0);
    assert!(fallback.session.backend().unwrap().style().is_none());
}

#[test]
fn closeup_interrupted_by_failover_lands_on_the_fallback() {
    let vector = ScriptedTileLoader::new();
    vector.fail_matching("satellite", TileFailure::Status(500));
    let mut h = harness_with(Some("pk.test"), vector);
    h.session.set_entities(entities());

    assert_eq!(h.session.request_closeup(EntityId(2)), Ok(true));
    settle(&mut h.session, 2.0);

    assert_eq!(h.session.backend_kind(), Some(BackendKind::Raster));
    let camera = h.session.camera().unwrap();
    assert_eq!(camera.center, LngLat::new(-75.5404, 39.7403));
    assert_eq!(camera.zoom, 19.0);
    assert_eq!(popup_entity(&h), Some(EntityId(2)));
    assert_eq!(h.session.focused(), Some(EntityId(2)));
    assert_eq!(h.session.status().count(EventKind::Failover), 1);
}

#[test]
fn focus_interrupted_by_failover_lands_on_the_fallback() {
    let mut h = harness(Some("pk.test"));
    h.session.set_entities(entities());
    settle(&mut h.session, 0.2);

    h.session.focus_entity(EntityId(3)).unwrap();
    settle(&mut h.session, 0.2);
    assert!(h.session.backend().unwrap().in_motion());
    h.vector.fail_matching("/tiles/", TileFailure::Status(500));
    settle(&mut h.session, 2.0);

    assert_eq!(h.session.backend_kind(), Some(BackendKind::Raster));
    assert_eq!(h.session.camera().unwrap().center, LngLat::new(-75.5600, 39.7500));
    assert_eq!(popup_entity(&h), Some(EntityId(3)));
}

#[test]
fn drained_status_starts_fresh() {
    let mut h = harness(Some("pk.test"));
    let ticket = h.session.begin_load();
    let batch = EntityBatch {
        entities: entities(),
        provenance: Provenance::Requested,
    };
    h.session.finish_load(ticket, Ok(batch));

    let drained = h.session.drain_status();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].message, "loaded 4 businesses");
    assert!(h.session.status().events().is_empty());
    assert!(h.session.drain_status().is_empty());
}

#[test]
fn stale_load_is_dropped_and_failure_keeps_last_set() {
    let mut h = harness(Some("pk.test"));
    let old = h.session.begin_load();
    let latest = h.session.begin_load();
    let batch = EntityBatch {
        entities: entities(),
        provenance: Provenance::Requested,
    };

    assert!(!h.session.finish_load(old, Ok(batch.clone())));
    assert!(h.session.entities().is_empty());
    assert!(h.session.finish_load(latest, Ok(batch)));
    assert_eq!(h.session.entities().len(), 4);

    let next = h.session.begin_load();
    assert!(h.session.finish_load(next, Err(FetchError::Status(500))));
    assert_eq!(h.session.entities().len(), 4);
    assert_eq!(
        h.session.status().latest(EventKind::Fetch).map(|e| e.message.as_str()),
        Some("failed to load businesses: entity API returned HTTP 500")
    );
}

#[tokio::test]
async fn unfiltered_fallback_fetch_is_surfaced() {
    let source = StaticEntitySource::new(entities()).failing_filtered(FetchError::Status(502));
    let mut h = harness(None);
    let ticket = h.session.begin_load();
    let query = h.session.search_this_area().unwrap();

    let result = load_entities(&source, query).await;
    assert!(h.session.finish_load(ticket, result));
    assert_eq!(h.session.entities().len(), 4);
    let message = &h.session.status().latest(EventKind::Fetch).unwrap().message;
    assert!(message.contains("unfiltered"), "{message}");
}

#[test]
fn moving_marks_dirty_until_search_this_area() {
    let mut h = harness(Some("pk.test"));
    assert!(!h.session.is_dirty());
    let target = LngLat::new(-75.55, 39.745);
    h.session.set_user_center(target).unwrap();
    settle(&mut h.session, 0.1);
    assert!(h.session.is_dirty());
    assert_eq!(h.session.camera().unwrap(), Camera::new(target, 12.0));

    let Some(EntityQuery::Bounds { bbox, limit }) = h.session.search_this_area() else {
        panic!("expected a bounds query");
    };
    assert!(!h.session.is_dirty());
    assert_eq!(limit, 1000);
    assert!(bbox.contains(target));

    match h.session.entity_query(5.0, 1000) {
        Some(EntityQuery::Near {
            center, radius_km, ..
        }) => {
            assert_eq!(center, target);
            assert_eq!(radius_km, 8.05);
        }
        other => panic!("unexpected query {other:?}"),
    }
}

#[test]
fn retry_primary_after_failover() {
    let vector = ScriptedTileLoader::new();
    vector.fail_times("styles/v1", TileFailure::Status(500), 3);
    let mut h = harness_with(Some("pk.test"), vector);
    h.session.set_entities(entities());
    settle(&mut h.session, 0.5);
    assert_eq!(h.session.backend_kind(), Some(BackendKind::Raster));

    assert_eq!(h.session.retry_primary(), Ok(true));
    assert_eq!(h.session.backend_kind(), Some(BackendKind::Vector));
    settle(&mut h.session, 0.5);
    assert_eq!(h.session.failover_state(), FailoverState::PrimaryActive);
    assert_eq!(h.session.rendered().len(), 2);
}

#[test]
fn unmount_releases_everything() {
    let mut h = harness(Some("pk.test"));
    h.session.set_entities(entities());
    h.session.click_marker(MarkerKey::Entity(EntityId(3))).unwrap();
    h.session.unmount();

    assert!(!h.session.container().is_occupied());
    assert!(h.session.rendered().is_empty());
    assert_eq!(h.session.popups().live_count(), 0);
    assert_eq!(h.session.popups().pending_unmounts(), 0);
    assert!(h.session.backend().is_none());
}
