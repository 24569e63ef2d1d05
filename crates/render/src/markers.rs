use std::collections::BTreeMap;

use cluster::{ClusterFeature, ClusterId};
use foundation::bounds::LngLat;
use foundation::ids::EntityId;

/// Identity of a rendered marker across rebuilds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerKey {
    Cluster(ClusterId),
    Entity(EntityId),
}

impl MarkerKey {
    pub fn for_feature(feature: &ClusterFeature) -> Self {
        match feature {
            ClusterFeature::Cluster { cluster_id, .. } => MarkerKey::Cluster(*cluster_id),
            ClusterFeature::Leaf { entity_id, .. } => MarkerKey::Entity(*entity_id),
        }
    }
}

impl std::fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarkerKey::Cluster(id) => write!(f, "cluster:{id}"),
            MarkerKey::Entity(id) => write!(f, "entity:{id}"),
        }
    }
}

/// Backend-side marker object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerHandle(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub key: MarkerKey,
    pub handle: MarkerHandle,
    pub position: LngLat,
    /// Text drawn on the marker (point count for clusters).
    pub label: Option<String>,
    pub feature: ClusterFeature,
}

/// Result of reconciling the rendered markers with a new feature set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerDiff {
    pub added: Vec<MarkerKey>,
    pub removed: Vec<MarkerKey>,
    pub kept: Vec<MarkerKey>,
}

impl MarkerDiff {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Marker registry of one surface. Keys are unique.
#[derive(Debug, Default)]
pub struct MarkerLayer {
    markers: BTreeMap<MarkerKey, Marker>,
    next_handle: u64,
    created: u64,
    destroyed: u64,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn get(&self, key: &MarkerKey) -> Option<&Marker> {
        self.markers.get(key)
    }

    pub fn keys(&self) -> Vec<MarkerKey> {
        self.markers.keys().copied().collect()
    }

    /// Markers created minus markers destroyed; equals `len()` unless a
    /// marker leaked.
    pub fn live_handles(&self) -> u64 {
        self.created - self.destroyed
    }

    /// Reconciles the layer with `features`. Duplicate keys in the input
    /// produce one marker.
    pub fn upsert(&mut self, features: &[ClusterFeature]) -> MarkerDiff {
        let mut wanted: BTreeMap<MarkerKey, &ClusterFeature> = BTreeMap::new();
        for f in features {
            wanted.entry(MarkerKey::for_feature(f)).or_insert(f);
        }

        let mut diff = MarkerDiff::default();
        let stale: Vec<MarkerKey> = self
            .markers
            .keys()
            .filter(|k| !wanted.contains_key(k))
            .copied()
            .collect();
        for key in stale {
            self.markers.remove(&key);
            self.destroyed += 1;
            diff.removed.push(key);
        }

        for (key, feature) in wanted {
            match self.markers.get_mut(&key) {
                Some(marker) => {
                    marker.position = feature.position();
                    marker.label = label_for(feature);
                    marker.feature = feature.clone();
                    diff.kept.push(key);
                }
                None => {
                    let handle = MarkerHandle(self.next_handle);
                    self.next_handle += 1;
                    self.created += 1;
                    self.markers.insert(
                        key,
                        Marker {
                            key,
                            handle,
                            position: feature.position(),
                            label: label_for(feature),
                            feature: feature.clone(),
                        },
                    );
                    diff.added.push(key);
                }
            }
        }
        diff
    }

    /// Removes every marker. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let n = self.markers.len();
        self.destroyed += n as u64;
        self.markers.clear();
        n
    }
}

fn label_for(feature: &ClusterFeature) -> Option<String> {
    match feature {
        ClusterFeature::Cluster { point_count, .. } => Some(point_count.to_string()),
        ClusterFeature::Leaf { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{MarkerKey, MarkerLayer};
    use cluster::{ClusterFeature, ClusterId};
    use foundation::ids::EntityId;
    use pretty_assertions::assert_eq;

    fn leaf(id: i64) -> ClusterFeature {
        ClusterFeature::Leaf {
            lng: -75.5,
            lat: 39.7,
            entity_id: EntityId(id),
        }
    }

    fn cluster(id: u64, count: usize) -> ClusterFeature {
        ClusterFeature::Cluster {
            lng: -75.5,
            lat: 39.7,
            point_count: count,
            cluster_id: ClusterId(id),
            expansion_zoom: 14,
        }
    }

    #[test]
    fn diff_reports_added_removed_kept() {
        let mut layer = MarkerLayer::new();
        let first = layer.upsert(&[leaf(1), leaf(2)]);
        assert_eq!(first.added.len(), 2);

        let second = layer.upsert(&[leaf(2), cluster(70, 5)]);
        assert_eq!(second.removed, vec![MarkerKey::Entity(EntityId(1))]);
        assert_eq!(second.kept, vec![MarkerKey::Entity(EntityId(2))]);
        assert_eq!(second.added, vec![MarkerKey::Cluster(ClusterId(70))]);
        assert_eq!(layer.len(), 2);
        assert_eq!(
            layer.get(&MarkerKey::Cluster(ClusterId(70))).unwrap().label.as_deref(),
            Some("5")
        );
    }

    #[test]
    fn same_features_is_a_noop_and_keeps_handles() {
        let mut layer = MarkerLayer::new();
        layer.upsert(&[leaf(1)]);
        let h = layer.get(&MarkerKey::Entity(EntityId(1))).unwrap().handle;
        let diff = layer.upsert(&[leaf(1)]);
        assert!(diff.is_noop());
        assert_eq!(layer.get(&MarkerKey::Entity(EntityId(1))).unwrap().handle, h);
    }

    #[test]
    fn duplicates_never_create_two_markers() {
        let mut layer = MarkerLayer::new();
        let diff = layer.upsert(&[leaf(3), leaf(3)]);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.live_handles(), 1);
    }

    #[test]
    fn clear_releases_everything() {
        let mut layer = MarkerLayer::new();
        layer.upsert(&[leaf(1), leaf(2), cluster(33, 2)]);
        assert_eq!(layer.clear(), 3);
        assert!(layer.is_empty());
        assert_eq!(layer.live_handles(), 0);
    }
}
