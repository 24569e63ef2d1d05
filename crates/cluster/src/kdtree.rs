use foundation::math::precision::stable_total_cmp_f64;

/// Axis-aligned rectangle in unit-square coordinates.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct Rect {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl Rect {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        Self { min, max }
    }

    fn contains(&self, p: [f64; 2]) -> bool {
        p[0] >= self.min[0] && p[0] <= self.max[0] && p[1] >= self.min[1] && p[1] <= self.max[1]
    }

    fn intersects(&self, other: &Rect) -> bool {
        self.min[0] <= other.max[0]
            && self.max[0] >= other.min[0]
            && self.min[1] <= other.max[1]
            && self.max[1] >= other.min[1]
    }

    fn dist_sq(&self, p: [f64; 2]) -> f64 {
        let dx = (self.min[0] - p[0]).max(0.0).max(p[0] - self.max[0]);
        let dy = (self.min[1] - p[1]).max(0.0).max(p[1] - self.max[1]);
        dx * dx + dy * dy
    }
}

/// Static 2D KD-tree.
///
/// Ordering contract: every query returns item indices in ascending order,
/// independent of tree shape.
#[derive(Debug, Clone)]
pub(crate) struct KdTree {
    coords: Vec<[f64; 2]>,
    nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        bounds: Rect,
        items: Vec<usize>,
    },
    Internal {
        bounds: Rect,
        left: usize,
        right: usize,
    },
}

impl KdTree {
    pub fn build(coords: Vec<[f64; 2]>, node_size: usize) -> Self {
        let mut nodes = Vec::new();
        let mut items: Vec<usize> = (0..coords.len()).collect();
        if !items.is_empty() {
            build_node(&mut nodes, &coords, &mut items, 0, node_size.max(1));
        }
        Self { coords, nodes }
    }

    /// Items inside `query` (edges inclusive).
    pub fn range(&self, query: &Rect) -> Vec<usize> {
        let mut hits = Vec::new();
        if self.nodes.is_empty() {
            return hits;
        }
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { bounds, items } => {
                    if !bounds.intersects(query) {
                        continue;
                    }
                    hits.extend(items.iter().copied().filter(|&i| query.contains(self.coords[i])));
                }
                Node::Internal {
                    bounds,
                    left,
                    right,
                } => {
                    if !bounds.intersects(query) {
                        continue;
                    }
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }
        hits.sort_unstable();
        hits
    }

    /// Items within euclidean distance `r` of `center` (inclusive).
    pub fn within(&self, center: [f64; 2], r: f64) -> Vec<usize> {
        let mut hits = Vec::new();
        if self.nodes.is_empty() {
            return hits;
        }
        let r2 = r * r;
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { bounds, items } => {
                    if bounds.dist_sq(center) > r2 {
                        continue;
                    }
                    hits.extend(items.iter().copied().filter(|&i| {
                        let [x, y] = self.coords[i];
                        let dx = x - center[0];
                        let dy = y - center[1];
                        dx * dx + dy * dy <= r2
                    }));
                }
                Node::Internal {
                    bounds,
                    left,
                    right,
                } => {
                    if bounds.dist_sq(center) > r2 {
                        continue;
                    }
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }
        hits.sort_unstable();
        hits
    }
}

fn build_node(
    nodes: &mut Vec<Node>,
    coords: &[[f64; 2]],
    items: &mut [usize],
    depth: usize,
    node_size: usize,
) -> usize {
    let bounds = bounds_for_items(coords, items);
    if items.len() <= node_size {
        let idx = nodes.len();
        nodes.push(Node::Leaf {
            bounds,
            items: items.to_vec(),
        });
        return idx;
    }

    let axis = depth % 2;
    items.sort_by(|&a, &b| {
        stable_total_cmp_f64(coords[a][axis], coords[b][axis]).then_with(|| a.cmp(&b))
    });

    let mid = items.len() / 2;
    let (left_items, right_items) = items.split_at_mut(mid);

    let idx = nodes.len();
    // Placeholder; patched after children are built.
    nodes.push(Node::Leaf {
        bounds,
        items: Vec::new(),
    });

    let left = build_node(nodes, coords, left_items, depth + 1, node_size);
    let right = build_node(nodes, coords, right_items, depth + 1, node_size);

    nodes[idx] = Node::Internal {
        bounds,
        left,
        right,
    };
    idx
}

fn bounds_for_items(coords: &[[f64; 2]], items: &[usize]) -> Rect {
    let mut b = Rect::new(coords[items[0]], coords[items[0]]);
    for &i in &items[1..] {
        let [x, y] = coords[i];
        b.min[0] = b.min[0].min(x);
        b.min[1] = b.min[1].min(y);
        b.max[0] = b.max[0].max(x);
        b.max[1] = b.max[1].max(y);
    }
    b
}

#[cfg(test)]
mod tests {
    use super::{KdTree, Rect};

    fn grid(n: usize) -> Vec<[f64; 2]> {
        let mut out = Vec::new();
        for i in 0..n {
            for j in 0..n {
                out.push([i as f64 / n as f64, j as f64 / n as f64]);
            }
        }
        out
    }

    fn brute_within(coords: &[[f64; 2]], c: [f64; 2], r: f64) -> Vec<usize> {
        (0..coords.len())
            .filter(|&i| {
                let dx = coords[i][0] - c[0];
                let dy = coords[i][1] - c[1];
                dx * dx + dy * dy <= r * r
            })
            .collect()
    }

    #[test]
    fn empty_tree_returns_nothing() {
        let t = KdTree::build(Vec::new(), 4);
        assert!(t.range(&Rect::new([0.0, 0.0], [1.0, 1.0])).is_empty());
        assert!(t.within([0.5, 0.5], 1.0).is_empty());
    }

    #[test]
    fn range_matches_brute_force() {
        let coords = grid(20);
        let t = KdTree::build(coords.clone(), 4);
        let q = Rect::new([0.2, 0.3], [0.45, 0.5]);
        let expected: Vec<usize> = (0..coords.len())
            .filter(|&i| {
                let [x, y] = coords[i];
                x >= 0.2 && x <= 0.45 && y >= 0.3 && y <= 0.5
            })
            .collect();
        assert_eq!(t.range(&q), expected);
    }

    #[test]
    fn within_matches_brute_force_for_several_leaf_sizes() {
        let coords = grid(16);
        for node_size in [1, 3, 8, 64] {
            let t = KdTree::build(coords.clone(), node_size);
            for (c, r) in [([0.5, 0.5], 0.1), ([0.0, 0.0], 0.2), ([0.9, 0.1], 0.05)] {
                assert_eq!(t.within(c, r), brute_within(&coords, c, r));
            }
        }
    }
}
