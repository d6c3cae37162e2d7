use slotmap::SlotMap;

use super::{Point3, Vector3};

slotmap::new_key_type! {
    /// Identifier of a node in the octree arena.
    struct NodeId;
}

/// Maximum number of points a leaf holds before it is split into 8 children.
const MAX_POINTS_PER_NODE: usize = 4;

/// Leaves at this depth never split, so repeated identical points stay finite.
const MAX_DEPTH: usize = 32;

/// A point found by a spatial query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Insertion index of the point.
    pub index: usize,
    /// The stored position.
    pub point: Point3,
    /// Squared distance to the query position.
    pub distance_sq: f64,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf(Vec<usize>),
    Branch([NodeId; 8]),
}

#[derive(Debug, Clone)]
struct Node {
    /// Split point of the cell.
    center: Point3,
    half: Vector3,
    /// Tight bounds of the points stored below this node.
    lo: Point3,
    hi: Point3,
    depth: usize,
    kind: NodeKind,
}

impl Node {
    fn new(center: Point3, half: Vector3, depth: usize) -> Self {
        Self {
            center,
            half,
            lo: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            hi: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            depth,
            kind: NodeKind::Leaf(Vec::new()),
        }
    }

    fn is_empty(&self) -> bool {
        self.lo.x > self.hi.x
    }

    fn expand(&mut self, p: &Point3) {
        self.lo = self.lo.inf(p);
        self.hi = self.hi.sup(p);
    }

    /// Squared distance from `p` to the bounds of the stored points.
    fn distance_sq(&self, p: &Point3) -> f64 {
        let mut d = 0.0;
        for i in 0..3 {
            let excess = if p[i] < self.lo[i] {
                self.lo[i] - p[i]
            } else if p[i] > self.hi[i] {
                p[i] - self.hi[i]
            } else {
                0.0
            };
            d += excess * excess;
        }
        d
    }
}

/// Octree over 3D points for nearest-neighbor lookups.
///
/// Nodes live in a [`SlotMap`] arena and refer to their children by key.
/// Every node tracks the tight bounding box of the points below it, so
/// queries stay exact even for points inserted outside the initial extent.
/// The same position may be inserted several times.
#[derive(Debug, Clone)]
pub struct PointOctree {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
    points: Vec<Point3>,
}

impl PointOctree {
    /// Creates an empty octree whose root cell spans `[min, max]`.
    #[must_use]
    pub fn new(min: Point3, max: Point3) -> Self {
        let mut nodes = SlotMap::with_key();
        let center = nalgebra::center(&min, &max);
        let half = (max - min) / 2.0;
        let root = nodes.insert(Node::new(center, half, 0));
        Self {
            nodes,
            root,
            points: Vec::new(),
        }
    }

    /// Creates an octree sized to the bounding box of `points` and inserts them all.
    #[must_use]
    pub fn from_points(points: &[Point3]) -> Self {
        let (min, max) = match points.first() {
            Some(first) => points
                .iter()
                .fold((*first, *first), |(lo, hi), p| (lo.inf(p), hi.sup(p))),
            None => (Point3::origin(), Point3::origin()),
        };
        let pad = Vector3::new(0.1, 0.1, 0.1);
        let mut tree = Self::new(min - pad, max + pad);
        tree.points.reserve(points.len());
        for p in points {
            tree.insert(*p);
        }
        tree
    }

    /// Number of stored points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if no point has been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the point with the given insertion index.
    #[must_use]
    pub fn point(&self, index: usize) -> Option<&Point3> {
        self.points.get(index)
    }

    /// All stored points in insertion order.
    #[must_use]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Inserts a point and returns its insertion index.
    pub fn insert(&mut self, point: Point3) -> usize {
        let index = self.points.len();
        self.points.push(point);

        let mut id = self.root;
        loop {
            let node = &mut self.nodes[id];
            node.expand(&point);
            let next = match &node.kind {
                NodeKind::Branch(children) => Some(children[octant(&node.center, &point)]),
                NodeKind::Leaf(_) => None,
            };
            match next {
                Some(child) => id = child,
                None => {
                    if let NodeKind::Leaf(indices) = &mut node.kind {
                        indices.push(index);
                    }
                    self.split(id);
                    return index;
                }
            }
        }
    }

    /// Splits an overfull leaf, recursing into children that are still overfull.
    fn split(&mut self, id: NodeId) {
        let (center, half, depth, indices) = {
            let node = &mut self.nodes[id];
            let depth = node.depth;
            let NodeKind::Leaf(indices) = &mut node.kind else {
                return;
            };
            if indices.len() <= MAX_POINTS_PER_NODE || depth >= MAX_DEPTH {
                return;
            }
            (node.center, node.half, depth, std::mem::take(indices))
        };

        let child_half = half / 2.0;
        let mut children = [NodeId::default(); 8];
        for (oct, child) in children.iter_mut().enumerate() {
            let sign = |bit: usize| if oct & bit == 0 { -1.0 } else { 1.0 };
            let offset = Vector3::new(
                sign(1) * child_half.x,
                sign(2) * child_half.y,
                sign(4) * child_half.z,
            );
            *child = self
                .nodes
                .insert(Node::new(center + offset, child_half, depth + 1));
        }

        for index in indices {
            let p = self.points[index];
            let child = &mut self.nodes[children[octant(&center, &p)]];
            child.expand(&p);
            if let NodeKind::Leaf(list) = &mut child.kind {
                list.push(index);
            }
        }
        self.nodes[id].kind = NodeKind::Branch(children);

        for child in children {
            self.split(child);
        }
    }

    /// Returns the stored point closest to `query`, or `None` if the tree is empty.
    ///
    /// A point at exactly the query position is returned as well.
    #[must_use]
    pub fn nearest(&self, query: &Point3) -> Option<Neighbor> {
        let mut best = Vec::with_capacity(1);
        self.search(self.root, query, 1, &mut best);
        best.first().copied()
    }

    /// Returns up to `k` stored points closest to `query`, nearest first.
    #[must_use]
    pub fn k_nearest(&self, query: &Point3, k: usize) -> Vec<Neighbor> {
        let mut best = Vec::with_capacity(k + 1);
        if k > 0 {
            self.search(self.root, query, k, &mut best);
        }
        best
    }

    /// Returns the indices of all points within `radius` of `query` (inclusive).
    #[must_use]
    pub fn within(&self, query: &Point3, radius: f64) -> Vec<usize> {
        let mut found = Vec::new();
        let radius_sq = radius * radius;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.is_empty() || node.distance_sq(query) > radius_sq {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(indices) => found.extend(
                    indices
                        .iter()
                        .filter(|&&i| (self.points[i] - query).norm_squared() <= radius_sq),
                ),
                NodeKind::Branch(children) => stack.extend_from_slice(children),
            }
        }
        found
    }

    fn search(&self, id: NodeId, query: &Point3, k: usize, best: &mut Vec<Neighbor>) {
        let node = &self.nodes[id];
        if node.is_empty() {
            return;
        }
        if best.len() == k && node.distance_sq(query) >= best[k - 1].distance_sq {
            return;
        }
        match &node.kind {
            NodeKind::Leaf(indices) => {
                for &index in indices {
                    let point = self.points[index];
                    let distance_sq = (point - query).norm_squared();
                    if best.len() == k && distance_sq >= best[k - 1].distance_sq {
                        continue;
                    }
                    let pos = best.partition_point(|n| n.distance_sq <= distance_sq);
                    best.insert(
                        pos,
                        Neighbor {
                            index,
                            point,
                            distance_sq,
                        },
                    );
                    best.truncate(k);
                }
            }
            NodeKind::Branch(children) => {
                let mut order: Vec<(f64, NodeId)> = children
                    .iter()
                    .map(|&c| (self.nodes[c].distance_sq(query), c))
                    .collect();
                order.sort_by(|a, b| a.0.total_cmp(&b.0));
                for (_, child) in order {
                    self.search(child, query, k, best);
                }
            }
        }
    }
}

/// Index of the child cell containing `p`.
fn octant(center: &Point3, p: &Point3) -> usize {
    usize::from(p.x >= center.x)
        | usize::from(p.y >= center.y) << 1
        | usize::from(p.z >= center.z) << 2
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<Point3> {
        let mut pts = Vec::new();
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    pts.push(Point3::new(x as f64, y as f64 * 1.5, z as f64 * 0.5));
                }
            }
        }
        pts
    }

    fn brute_force(points: &[Point3], q: &Point3) -> f64 {
        points
            .iter()
            .map(|p| (p - q).norm_squared())
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn empty_tree_has_no_neighbor() {
        let tree = PointOctree::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        assert!(tree.is_empty());
        assert!(tree.nearest(&Point3::origin()).is_none());
    }

    #[test]
    fn nearest_matches_brute_force() {
        let pts = grid(7);
        let tree = PointOctree::from_points(&pts);
        assert_eq!(tree.len(), pts.len());
        for q in [
            Point3::new(2.2, 3.1, 1.4),
            Point3::new(-5.0, 0.0, 0.0),
            Point3::new(6.4, 8.9, 2.9),
            Point3::new(3.0, 3.0, 1.0),
        ] {
            let n = tree.nearest(&q).unwrap();
            assert!((n.distance_sq - brute_force(&pts, &q)).abs() < 1e-12);
            assert_eq!(n.point, pts[n.index]);
        }
    }

    #[test]
    fn exact_point_is_returned() {
        let pts = grid(4);
        let tree = PointOctree::from_points(&pts);
        let n = tree.nearest(&pts[17]).unwrap();
        assert_eq!(n.index, 17);
        assert!(n.distance_sq.abs() < 1e-15);
    }

    #[test]
    fn points_outside_initial_extent_are_found() {
        let mut tree = PointOctree::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        for i in 0..20 {
            tree.insert(Point3::new(f64::from(i) * 10.0, 0.0, 0.0));
        }
        let n = tree.nearest(&Point3::new(152.0, 0.0, 0.0)).unwrap();
        assert_eq!(n.index, 15);
    }

    #[test]
    fn duplicates_do_not_split_forever() {
        let mut tree = PointOctree::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        for _ in 0..100 {
            tree.insert(Point3::new(0.5, 0.5, 0.5));
        }
        assert_eq!(tree.len(), 100);
        assert_eq!(tree.within(&Point3::new(0.5, 0.5, 0.5), 0.0).len(), 100);
    }

    #[test]
    fn k_nearest_is_sorted() {
        let pts = grid(5);
        let tree = PointOctree::from_points(&pts);
        let q = Point3::new(1.9, 2.0, 0.8);
        let found = tree.k_nearest(&q, 3);
        assert_eq!(found.len(), 3);
        assert!(found[0].distance_sq <= found[1].distance_sq);
        assert!(found[1].distance_sq <= found[2].distance_sq);
        let mut all: Vec<f64> = pts.iter().map(|p| (p - q).norm_squared()).collect();
        all.sort_by(f64::total_cmp);
        for (n, d) in found.iter().zip(&all) {
            assert!((n.distance_sq - d).abs() < 1e-12);
        }
    }

    #[test]
    fn within_radius() {
        let pts = grid(5);
        let tree = PointOctree::from_points(&pts);
        let q = Point3::new(2.0, 3.0, 1.0);
        let mut found = tree.within(&q, 1.0);
        found.sort_unstable();
        let mut expected: Vec<usize> = (0..pts.len())
            .filter(|&i| (pts[i] - q).norm() <= 1.0)
            .collect();
        expected.sort_unstable();
        assert_eq!(found, expected);
    }
}
