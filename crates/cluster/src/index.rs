use foundation::bounds::{LngLat, LngLatBounds};
use foundation::ids::EntityId;
use foundation::math::precision::stable_total_cmp_f64;
use foundation::math::projection::{lat_to_unit_y, lng_to_unit_x, unit_x_to_lng, unit_y_to_lat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::IndexError;
use crate::kdtree::{KdTree, Rect};
use crate::options::ClusterOptions;

/// Highest zoom a cluster click will ever ask the camera for.
pub const MAX_SUPPORTED_ZOOM: u8 = 20;

/// Input point of the index.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedPoint {
    pub id: EntityId,
    pub lng: f64,
    pub lat: f64,
}

impl IndexedPoint {
    pub fn new(id: EntityId, lng: f64, lat: f64) -> Self {
        Self { id, lng, lat }
    }

    pub fn position(&self) -> LngLat {
        LngLat::new(self.lng, self.lat)
    }
}

/// Identifier of a cluster within one `SpatialIndex`.
///
/// Packs `(origin_index << 5) | origin_zoom`, where the origin is the seed
/// node in the level the cluster was formed from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub u64);

impl ClusterId {
    fn encode(origin_index: usize, origin_zoom: u8) -> Self {
        ClusterId(((origin_index as u64) << 5) | (origin_zoom as u64 & 31))
    }

    pub fn origin_index(self) -> usize {
        (self.0 >> 5) as usize
    }

    pub fn origin_zoom(self) -> u8 {
        (self.0 & 31) as u8
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One renderable feature of a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterFeature {
    Cluster {
        lng: f64,
        lat: f64,
        point_count: usize,
        cluster_id: ClusterId,
        expansion_zoom: u8,
    },
    Leaf {
        lng: f64,
        lat: f64,
        entity_id: EntityId,
    },
}

impl ClusterFeature {
    pub fn position(&self) -> LngLat {
        match *self {
            ClusterFeature::Cluster { lng, lat, .. } | ClusterFeature::Leaf { lng, lat, .. } => {
                LngLat::new(lng, lat)
            }
        }
    }

    pub fn point_count(&self) -> usize {
        match self {
            ClusterFeature::Cluster { point_count, .. } => *point_count,
            ClusterFeature::Leaf { .. } => 1,
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self, ClusterFeature::Cluster { .. })
    }
}

const UNPROCESSED: u8 = u8::MAX;

#[derive(Debug, Copy, Clone)]
enum NodeKind {
    Point(usize),
    Cluster(ClusterId),
}

#[derive(Debug, Copy, Clone)]
struct Node {
    pos: [f64; 2],
    /// Zoom at which this node was last consumed while building.
    zoom: u8,
    kind: NodeKind,
    parent: Option<ClusterId>,
    num_points: usize,
}

impl Node {
    fn carried(&self) -> Node {
        Node {
            zoom: UNPROCESSED,
            parent: None,
            ..*self
        }
    }
}

#[derive(Debug, Clone)]
struct Level {
    nodes: Vec<Node>,
    tree: KdTree,
}

impl Level {
    fn new(nodes: Vec<Node>, node_size: usize) -> Self {
        let tree = KdTree::build(nodes.iter().map(|n| n.pos).collect(), node_size);
        Self { nodes, tree }
    }
}

/// Immutable multi-zoom cluster index.
///
/// Ordering contract: for the same point set (in any input order) and the
/// same options, every query returns the same features in the same order.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    options: ClusterOptions,
    points: Vec<IndexedPoint>,
    /// `levels[z - min_zoom]` for `z` in `min_zoom..=max_zoom + 1`.
    levels: Vec<Level>,
}

impl SpatialIndex {
    pub fn load(points: Vec<IndexedPoint>) -> Self {
        Self::with_options(points, ClusterOptions::default())
    }

    pub fn with_options(points: Vec<IndexedPoint>, options: ClusterOptions) -> Self {
        let options = options.normalized();
        let total = points.len();
        let mut points: Vec<IndexedPoint> = points
            .into_iter()
            .filter(|p| p.lng.is_finite() && p.lat.is_finite())
            .collect();
        points.sort_by(|a, b| {
            a.id.cmp(&b.id)
                .then_with(|| stable_total_cmp_f64(a.lng, b.lng))
                .then_with(|| stable_total_cmp_f64(a.lat, b.lat))
        });

        let top: Vec<Node> = points
            .iter()
            .enumerate()
            .map(|(i, p)| Node {
                pos: [lng_to_unit_x(p.lng), lat_to_unit_y(p.lat)],
                zoom: UNPROCESSED,
                kind: NodeKind::Point(i),
                parent: None,
                num_points: 1,
            })
            .collect();

        let mut levels = Vec::with_capacity((options.max_zoom - options.min_zoom) as usize + 2);
        levels.push(Level::new(top, options.node_size));
        for zoom in (options.min_zoom..=options.max_zoom).rev() {
            let Some(prev) = levels.last_mut() else {
                break;
            };
            let next = cluster_level(prev, zoom, &options);
            levels.push(Level::new(next, options.node_size));
        }
        levels.reverse();

        debug!(
            points = points.len(),
            dropped = total - points.len(),
            levels = levels.len(),
            "spatial index loaded"
        );
        Self {
            options,
            points,
            levels,
        }
    }

    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Clusters and leaves visible in `bbox` at `zoom`.
    pub fn query(&self, bbox: &LngLatBounds, zoom: u8) -> Vec<ClusterFeature> {
        if self.points.is_empty()
            || !(bbox.west.is_finite()
                && bbox.east.is_finite()
                && bbox.south.is_finite()
                && bbox.north.is_finite())
        {
            return Vec::new();
        }

        let mut min_lng = wrap_lng(bbox.west);
        let min_lat = bbox.south.clamp(-90.0, 90.0);
        let mut max_lng = if bbox.east == 180.0 {
            180.0
        } else {
            wrap_lng(bbox.east)
        };
        let max_lat = bbox.north.clamp(-90.0, 90.0);

        if bbox.east - bbox.west >= 360.0 {
            min_lng = -180.0;
            max_lng = 180.0;
        } else if min_lng > max_lng {
            let mut out = self.query_range(min_lng, min_lat, 180.0, max_lat, zoom);
            out.extend(self.query_range(-180.0, min_lat, max_lng, max_lat, zoom));
            return out;
        }
        self.query_range(min_lng, min_lat, max_lng, max_lat, zoom)
    }

    fn query_range(
        &self,
        min_lng: f64,
        min_lat: f64,
        max_lng: f64,
        max_lat: f64,
        zoom: u8,
    ) -> Vec<ClusterFeature> {
        let Some(level) = self.level(self.limit_zoom(zoom)) else {
            return Vec::new();
        };
        let rect = Rect::new(
            [lng_to_unit_x(min_lng), lat_to_unit_y(max_lat)],
            [lng_to_unit_x(max_lng), lat_to_unit_y(min_lat)],
        );
        level
            .tree
            .range(&rect)
            .into_iter()
            .map(|i| self.feature(&level.nodes[i]))
            .collect()
    }

    /// Lowest zoom at which `cluster_id` breaks apart, capped at
    /// `MAX_SUPPORTED_ZOOM`.
    pub fn expansion_zoom(&self, cluster_id: ClusterId) -> Result<u8, IndexError> {
        let mut id = cluster_id;
        let mut zoom = i32::from(id.origin_zoom()) - 1;
        while zoom <= i32::from(self.options.max_zoom) {
            let kids = self.child_nodes(id)?;
            zoom += 1;
            if kids.len() != 1 {
                break;
            }
            match kids[0].kind {
                NodeKind::Cluster(next) => id = next,
                NodeKind::Point(_) => break,
            }
        }
        Ok(zoom.clamp(0, i32::from(MAX_SUPPORTED_ZOOM)) as u8)
    }

    /// Features one zoom level below the cluster.
    pub fn children(&self, cluster_id: ClusterId) -> Result<Vec<ClusterFeature>, IndexError> {
        Ok(self
            .child_nodes(cluster_id)?
            .into_iter()
            .map(|n| self.feature(n))
            .collect())
    }

    /// Entity ids of the points inside a cluster, at most `limit`.
    pub fn leaves(&self, cluster_id: ClusterId, limit: usize) -> Result<Vec<EntityId>, IndexError> {
        let mut out = Vec::new();
        self.collect_leaves(cluster_id, limit, &mut out)?;
        Ok(out)
    }

    fn collect_leaves(
        &self,
        cluster_id: ClusterId,
        limit: usize,
        out: &mut Vec<EntityId>,
    ) -> Result<(), IndexError> {
        for node in self.child_nodes(cluster_id)? {
            if out.len() >= limit {
                break;
            }
            match node.kind {
                NodeKind::Point(i) => out.push(self.points[i].id),
                NodeKind::Cluster(child) => self.collect_leaves(child, limit, out)?,
            }
        }
        Ok(())
    }

    fn child_nodes(&self, cluster_id: ClusterId) -> Result<Vec<&Node>, IndexError> {
        let unknown = IndexError::UnknownCluster(cluster_id);
        let origin_zoom = cluster_id.origin_zoom();
        if origin_zoom == 0 {
            return Err(unknown);
        }
        let level = self.level(origin_zoom).ok_or_else(|| unknown.clone())?;
        let origin = level
            .nodes
            .get(cluster_id.origin_index())
            .ok_or_else(|| unknown.clone())?;
        let r = self.options.unit_radius(i32::from(origin_zoom) - 1);
        let kids: Vec<&Node> = level
            .tree
            .within(origin.pos, r)
            .into_iter()
            .map(|i| &level.nodes[i])
            .filter(|n| n.parent == Some(cluster_id))
            .collect();
        if kids.is_empty() {
            return Err(unknown);
        }
        Ok(kids)
    }

    fn feature(&self, node: &Node) -> ClusterFeature {
        match node.kind {
            NodeKind::Point(i) => {
                let p = &self.points[i];
                ClusterFeature::Leaf {
                    lng: p.lng,
                    lat: p.lat,
                    entity_id: p.id,
                }
            }
            NodeKind::Cluster(id) => ClusterFeature::Cluster {
                lng: unit_x_to_lng(node.pos[0]),
                lat: unit_y_to_lat(node.pos[1]),
                point_count: node.num_points,
                cluster_id: id,
                expansion_zoom: self.expansion_zoom(id).unwrap_or(MAX_SUPPORTED_ZOOM),
            },
        }
    }

    fn limit_zoom(&self, zoom: u8) -> u8 {
        zoom.clamp(self.options.min_zoom, self.options.max_zoom + 1)
    }

    fn level(&self, zoom: u8) -> Option<&Level> {
        let idx = zoom.checked_sub(self.options.min_zoom)?;
        self.levels.get(idx as usize)
    }
}

fn wrap_lng(lng: f64) -> f64 {
    (lng + 180.0).rem_euclid(360.0) - 180.0
}

/// Greedy clustering of `prev` at `zoom`. Marks consumed nodes in `prev`.
fn cluster_level(prev: &mut Level, zoom: u8, options: &ClusterOptions) -> Vec<Node> {
    let r = options.unit_radius(i32::from(zoom));
    let mut out = Vec::new();

    for i in 0..prev.nodes.len() {
        if prev.nodes[i].zoom <= zoom {
            continue;
        }
        prev.nodes[i].zoom = zoom;
        let seed = prev.nodes[i];

        let neighbors = prev.tree.within(seed.pos, r);
        let mut num_points = seed.num_points;
        for &n in &neighbors {
            if prev.nodes[n].zoom > zoom {
                num_points += prev.nodes[n].num_points;
            }
        }

        if num_points > seed.num_points && num_points >= options.min_points {
            let id = ClusterId::encode(i, zoom + 1);
            let mut wx = seed.pos[0] * seed.num_points as f64;
            let mut wy = seed.pos[1] * seed.num_points as f64;
            for &n in &neighbors {
                let b = &mut prev.nodes[n];
                if b.zoom <= zoom {
                    continue;
                }
                b.zoom = zoom;
                b.parent = Some(id);
                wx += b.pos[0] * b.num_points as f64;
                wy += b.pos[1] * b.num_points as f64;
            }
            prev.nodes[i].parent = Some(id);
            out.push(Node {
                pos: [wx / num_points as f64, wy / num_points as f64],
                zoom: UNPROCESSED,
                kind: NodeKind::Cluster(id),
                parent: None,
                num_points,
            });
        } else {
            out.push(seed.carried());
            if num_points > seed.num_points {
                for &n in &neighbors {
                    let b = &mut prev.nodes[n];
                    if b.zoom <= zoom {
                        continue;
                    }
                    b.zoom = zoom;
                    out.push(b.carried());
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{ClusterFeature, ClusterId, IndexedPoint, SpatialIndex};
    use crate::error::IndexError;
    use crate::options::ClusterOptions;
    use foundation::bounds::LngLatBounds;
    use foundation::ids::EntityId;
    use pretty_assertions::assert_eq;

    fn p(id: i64, lat: f64, lng: f64) -> IndexedPoint {
        IndexedPoint::new(EntityId(id), lng, lat)
    }

    fn wilmington() -> Vec<IndexedPoint> {
        vec![
            p(1, 39.7400, -75.5400),
            p(2, 39.7410, -75.5410),
            p(3, 39.1582, -75.5244),
            p(4, 38.7746, -75.1393),
        ]
    }

    fn total_points(features: &[ClusterFeature]) -> usize {
        features.iter().map(ClusterFeature::point_count).sum()
    }

    #[test]
    fn empty_index_yields_nothing() {
        let idx = SpatialIndex::load(Vec::new());
        assert!(idx.is_empty());
        assert!(idx.query(&LngLatBounds::world(), 5).is_empty());
        assert_eq!(
            idx.expansion_zoom(ClusterId(33)),
            Err(IndexError::UnknownCluster(ClusterId(33)))
        );
    }

    #[test]
    fn nearby_points_cluster_at_low_zoom() {
        let idx = SpatialIndex::load(vec![p(1, 39.74, -75.54), p(2, 39.745, -75.545)]);
        for zoom in [0, 10, 12] {
            let features = idx.query(&LngLatBounds::world(), zoom);
            assert_eq!(features.len(), 1, "zoom {zoom}");
            match &features[0] {
                ClusterFeature::Cluster {
                    point_count,
                    lat,
                    expansion_zoom,
                    ..
                } => {
                    assert_eq!(*point_count, 2);
                    assert_eq!(*expansion_zoom, 13);
                    assert!((lat - 39.7425).abs() < 1e-3);
                }
                other => panic!("expected a cluster at zoom {zoom}, got {other:?}"),
            }
        }
        let split = idx.query(&LngLatBounds::world(), 13);
        assert_eq!(split.len(), 2);
        assert!(split.iter().all(|f| !f.is_cluster()));
    }

    #[test]
    fn above_max_zoom_everything_is_a_leaf() {
        let idx = SpatialIndex::load(wilmington());
        let features = idx.query(&LngLatBounds::world(), 21);
        assert_eq!(features.len(), 4);
        assert!(features.iter().all(|f| !f.is_cluster()));
        // Zoom is clamped to max_zoom + 1.
        assert_eq!(idx.query(&LngLatBounds::world(), 200), features);
    }

    #[test]
    fn every_zoom_accounts_for_every_point() {
        let idx = SpatialIndex::load(wilmington());
        for z in 0..=21 {
            assert_eq!(total_points(&idx.query(&LngLatBounds::world(), z)), 4, "zoom {z}");
        }
    }

    #[test]
    fn expansion_zoom_splits_the_cluster() {
        let idx = SpatialIndex::load(wilmington());
        let features = idx.query(&LngLatBounds::world(), 8);
        let (cluster_id, expansion, count) = features
            .iter()
            .find_map(|f| match f {
                ClusterFeature::Cluster {
                    cluster_id,
                    expansion_zoom,
                    point_count,
                    ..
                } => Some((*cluster_id, *expansion_zoom, *point_count)),
                _ => None,
            })
            .expect("a cluster at zoom 8");
        assert_eq!(idx.expansion_zoom(cluster_id), Ok(expansion));
        assert!(expansion > 8 && expansion <= 20);

        let leaves = idx.leaves(cluster_id, usize::MAX).unwrap();
        assert_eq!(leaves.len(), count);

        let bbox = LngLatBounds::new(-75.6, 39.7, -75.5, 39.8);
        let expanded = idx.query(&bbox, expansion);
        assert!(expanded.len() >= 2);
        assert_eq!(total_points(&expanded), 2);
    }

    #[test]
    fn children_sum_to_parent_count() {
        let idx = SpatialIndex::load(wilmington());
        for f in idx.query(&LngLatBounds::world(), 3) {
            if let ClusterFeature::Cluster {
                cluster_id,
                point_count,
                ..
            } = f
            {
                let kids = idx.children(cluster_id).unwrap();
                assert_eq!(total_points(&kids), point_count);
            }
        }
    }

    #[test]
    fn leaves_respects_limit() {
        let idx = SpatialIndex::load(wilmington());
        let cluster = idx
            .query(&LngLatBounds::world(), 0)
            .into_iter()
            .find_map(|f| match f {
                ClusterFeature::Cluster { cluster_id, .. } => Some(cluster_id),
                _ => None,
            })
            .unwrap();
        assert_eq!(idx.leaves(cluster, 1).unwrap().len(), 1);
    }

    #[test]
    fn unknown_cluster_is_an_error() {
        let idx = SpatialIndex::load(wilmington());
        let bogus = ClusterId((9999 << 5) | 4);
        assert_eq!(idx.children(bogus), Err(IndexError::UnknownCluster(bogus)));
        assert!(idx.leaves(bogus, 10).is_err());
    }

    #[test]
    fn query_is_deterministic_and_order_independent() {
        let a = SpatialIndex::load(wilmington());
        let mut reversed = wilmington();
        reversed.reverse();
        let b = SpatialIndex::load(reversed);
        for z in [0, 5, 9, 14, 21] {
            let qa = a.query(&LngLatBounds::world(), z);
            assert_eq!(qa, a.query(&LngLatBounds::world(), z));
            assert_eq!(qa, b.query(&LngLatBounds::world(), z));
        }
    }

    #[test]
    fn non_finite_points_are_dropped() {
        let mut pts = wilmington();
        pts.push(p(9, f64::NAN, -75.0));
        pts.push(p(10, 39.0, f64::INFINITY));
        let idx = SpatialIndex::load(pts);
        assert_eq!(idx.len(), 4);
    }

    #[test]
    fn antimeridian_bbox_is_split() {
        let idx = SpatialIndex::load(vec![p(1, 0.0, 179.5), p(2, 0.0, -179.5), p(3, 0.0, 0.0)]);
        let crossing = LngLatBounds::new(170.0, -10.0, -170.0, 10.0);
        let ids: Vec<EntityId> = idx
            .query(&crossing, 10)
            .into_iter()
            .filter_map(|f| match f {
                ClusterFeature::Leaf { entity_id, .. } => Some(entity_id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![EntityId(1), EntityId(2)]);

        // Unwrapped longitudes from a camera view are normalized the same way.
        let unwrapped = LngLatBounds::new(170.0, -10.0, 190.0, 10.0);
        assert_eq!(idx.query(&unwrapped, 10).len(), 2);
    }

    #[test]
    fn full_span_covers_the_world() {
        let idx = SpatialIndex::load(vec![p(1, 0.0, 179.5), p(2, 0.0, -179.5), p(3, 0.0, 0.0)]);
        let wide = LngLatBounds::new(-400.0, -90.0, 400.0, 90.0);
        assert_eq!(total_points(&idx.query(&wide, 12)), 3);
    }

    #[test]
    fn min_points_prevents_small_clusters() {
        let opts = ClusterOptions {
            min_points: 3,
            ..ClusterOptions::default()
        };
        let idx = SpatialIndex::with_options(vec![p(1, 39.74, -75.54), p(2, 39.741, -75.541)], opts);
        let features = idx.query(&LngLatBounds::world(), 5);
        assert_eq!(features.len(), 2);
        assert!(features.iter().all(|f| !f.is_cluster()));
    }
}
