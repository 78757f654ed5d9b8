//! Octree over 3D points, rebuilt from scratch every step.
//!
//! Entity counts stay in the low thousands, so a full rebuild is cheaper to
//! reason about than incremental maintenance: after `rebuild` the tree holds
//! exactly the points it was given, with no stale entries to reconcile.

use serde::{Deserialize, Serialize};

use crate::model::{EntityKind, Vec3};

/// Position of an entity inside the state's per-kind collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub slot: usize,
}

impl EntityRef {
    pub fn new(kind: EntityKind, slot: usize) -> Self {
        Self { kind, slot }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Aabb {
    min: Vec3,
    max: Vec3,
}

impl Aabb {
    fn center(&self) -> Vec3 {
        Vec3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// Squared distance from `p` to the closest point of the box (0 inside).
    fn distance_squared(&self, p: Vec3) -> f64 {
        fn axis(v: f64, lo: f64, hi: f64) -> f64 {
            if v < lo {
                lo - v
            } else if v > hi {
                v - hi
            } else {
                0.0
            }
        }
        let dx = axis(p.x, self.min.x, self.max.x);
        let dy = axis(p.y, self.min.y, self.max.y);
        let dz = axis(p.z, self.min.z, self.max.z);
        dx * dx + dy * dy + dz * dz
    }

    /// Octant `i` (bit 0 = x high, bit 1 = y high, bit 2 = z high).
    fn octant(&self, i: usize) -> Aabb {
        let c = self.center();
        let (min_x, max_x) = if i & 1 == 0 { (self.min.x, c.x) } else { (c.x, self.max.x) };
        let (min_y, max_y) = if i & 2 == 0 { (self.min.y, c.y) } else { (c.y, self.max.y) };
        let (min_z, max_z) = if i & 4 == 0 { (self.min.z, c.z) } else { (c.z, self.max.z) };
        Aabb {
            min: Vec3::new(min_x, min_y, min_z),
            max: Vec3::new(max_x, max_y, max_z),
        }
    }

    fn octant_of(&self, p: Vec3) -> usize {
        let c = self.center();
        usize::from(p.x >= c.x) | (usize::from(p.y >= c.y) << 1) | (usize::from(p.z >= c.z) << 2)
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    /// Indices into `Octree::entries`.
    Leaf(Vec<usize>),
    Branch(Box<[Node; 8]>),
}

#[derive(Debug, Clone)]
struct Node {
    bounds: Aabb,
    depth: u32,
    kind: NodeKind,
}

impl Node {
    fn leaf(bounds: Aabb, depth: u32) -> Self {
        Self {
            bounds,
            depth,
            kind: NodeKind::Leaf(Vec::new()),
        }
    }

    fn insert<K>(&mut self, idx: usize, entries: &[(K, Vec3)], leaf_capacity: usize, max_depth: u32) {
        match &mut self.kind {
            NodeKind::Branch(children) => {
                let octant = self.bounds.octant_of(entries[idx].1);
                children[octant].insert(idx, entries, leaf_capacity, max_depth);
            }
            NodeKind::Leaf(items) => {
                items.push(idx);
                if items.len() > leaf_capacity && self.depth < max_depth {
                    let items = std::mem::take(items);
                    let depth = self.depth + 1;
                    let bounds = self.bounds;
                    let children: [Node; 8] = std::array::from_fn(|i| Node::leaf(bounds.octant(i), depth));
                    self.kind = NodeKind::Branch(Box::new(children));
                    for i in items {
                        self.insert(i, entries, leaf_capacity, max_depth);
                    }
                }
            }
        }
    }

    fn visit_within<K>(&self, entries: &[(K, Vec3)], center: Vec3, r_sq: f64, visitor: &mut impl FnMut(usize)) {
        if self.bounds.distance_squared(center) > r_sq {
            return;
        }
        match &self.kind {
            NodeKind::Leaf(items) => {
                for &i in items {
                    if entries[i].1.distance_squared(center) <= r_sq {
                        visitor(i);
                    }
                }
            }
            NodeKind::Branch(children) => {
                for child in children.iter() {
                    child.visit_within(entries, center, r_sq, visitor);
                }
            }
        }
    }

    fn nearest<K: Copy + Ord>(
        &self,
        entries: &[(K, Vec3)],
        center: Vec3,
        filter: &impl Fn(K) -> bool,
        best: &mut Option<(usize, f64)>,
        limit_sq: f64,
    ) {
        let bound = best.map_or(limit_sq, |(_, d)| d);
        if self.bounds.distance_squared(center) > bound {
            return;
        }
        match &self.kind {
            NodeKind::Leaf(items) => {
                for &i in items {
                    let (key, pos) = entries[i];
                    if !filter(key) {
                        continue;
                    }
                    let d = pos.distance_squared(center);
                    if d > limit_sq {
                        continue;
                    }
                    let better = match *best {
                        None => true,
                        Some((j, bd)) => d < bd || (d == bd && key < entries[j].0),
                    };
                    if better {
                        *best = Some((i, d));
                    }
                }
            }
            NodeKind::Branch(children) => {
                // Closest octants first so the bound tightens early.
                let mut order: [(f64, usize); 8] =
                    std::array::from_fn(|i| (children[i].bounds.distance_squared(center), i));
                order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                for (_, i) in order {
                    children[i].nearest(entries, center, filter, best, limit_sq);
                }
            }
        }
    }

    fn collect(&self, out: &mut Vec<usize>) {
        match &self.kind {
            NodeKind::Leaf(items) => out.extend_from_slice(items),
            NodeKind::Branch(children) => {
                for child in children.iter() {
                    child.collect(out);
                }
            }
        }
    }

    fn max_depth(&self) -> u32 {
        match &self.kind {
            NodeKind::Leaf(_) => self.depth,
            NodeKind::Branch(children) => children.iter().map(Node::max_depth).max().unwrap_or(self.depth),
        }
    }
}

/// Octree keyed by `K`. Radius queries are exact: they return the same set as
/// a brute-force scan with `distance_squared <= r * r`.
#[derive(Debug, Clone)]
pub struct Octree<K> {
    entries: Vec<(K, Vec3)>,
    root: Option<Node>,
    leaf_capacity: usize,
    max_depth: u32,
}

/// The engine's index over every living entity.
pub type SpatialIndex = Octree<EntityRef>;

impl<K: Copy + Ord> Octree<K> {
    pub fn new(leaf_capacity: usize, max_depth: u32) -> Self {
        Self {
            entries: Vec::new(),
            root: None,
            leaf_capacity: leaf_capacity.max(1),
            max_depth,
        }
    }

    /// Discard the current tree and partition `items` afresh.
    ///
    /// Non-finite positions cannot be partitioned and are left out; callers
    /// treat a resulting size mismatch as an index desync.
    pub fn rebuild(&mut self, items: impl IntoIterator<Item = (K, Vec3)>) {
        self.entries.clear();
        self.entries
            .extend(items.into_iter().filter(|(_, p)| p.is_finite()));
        self.root = None;
        if self.entries.is_empty() {
            return;
        }

        let mut min = self.entries[0].1;
        let mut max = min;
        for (_, p) in &self.entries {
            min = Vec3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Vec3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
        // Cubic root so octants stay cubic; padding absorbs rounding at the far faces.
        let extent = (max.x - min.x).max(max.y - min.y).max(max.z - min.z);
        let side = extent * (1.0 + 1e-9) + 1e-6;
        let bounds = Aabb {
            min,
            max: Vec3::new(min.x + side, min.y + side, min.z + side),
        };

        let mut root = Node::leaf(bounds, 0);
        for i in 0..self.entries.len() {
            root.insert(i, &self.entries, self.leaf_capacity, self.max_depth);
        }
        self.root = Some(root);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Depth of the deepest leaf (0 for an empty or single-leaf tree).
    pub fn depth(&self) -> u32 {
        self.root.as_ref().map_or(0, Node::max_depth)
    }

    /// All keys within `radius` of `center` (inclusive), sorted.
    pub fn query_radius(&self, center: Vec3, radius: f64) -> Vec<K> {
        let mut out = Vec::new();
        self.for_each_within(center, radius, |key, _| out.push(key));
        out.sort_unstable();
        out
    }

    /// Visit every entry within `radius` of `center` (inclusive), in tree order.
    pub fn for_each_within(&self, center: Vec3, radius: f64, mut visitor: impl FnMut(K, Vec3)) {
        let (Some(root), true) = (&self.root, radius >= 0.0 && center.is_finite()) else {
            return;
        };
        let entries = &self.entries;
        root.visit_within(entries, center, radius * radius, &mut |i| {
            let (key, pos) = entries[i];
            visitor(key, pos);
        });
    }

    /// Closest key accepted by `filter` within `max_radius`, with its distance.
    /// Equidistant candidates resolve to the smallest key.
    pub fn nearest(&self, center: Vec3, max_radius: f64, filter: impl Fn(K) -> bool) -> Option<(K, f64)> {
        let root = self.root.as_ref()?;
        if max_radius < 0.0 || !center.is_finite() {
            return None;
        }
        let mut best = None;
        root.nearest(&self.entries, center, &filter, &mut best, max_radius * max_radius);
        best.map(|(i, d)| (self.entries[i].0, d.sqrt()))
    }

    /// Whether the tree holds exactly `expected` (same keys at the same
    /// positions, each stored once).
    pub fn matches(&self, expected: &[(K, Vec3)]) -> bool {
        if expected.len() != self.entries.len() {
            return false;
        }
        let mut stored = Vec::with_capacity(self.entries.len());
        if let Some(root) = &self.root {
            root.collect(&mut stored);
        }
        if stored.len() != self.entries.len() {
            return false;
        }
        stored.sort_unstable();
        if stored.iter().enumerate().any(|(n, &i)| n != i) {
            return false;
        }
        let mut ours: Vec<(K, [u64; 3])> = self
            .entries
            .iter()
            .map(|(k, p)| (*k, [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]))
            .collect();
        let mut theirs: Vec<(K, [u64; 3])> = expected
            .iter()
            .map(|(k, p)| (*k, [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]))
            .collect();
        ours.sort_unstable();
        theirs.sort_unstable();
        ours == theirs
    }
}

impl SpatialIndex {
    /// Slots of entities of `kind` within `radius`, sorted.
    pub fn query_kind(&self, center: Vec3, radius: f64, kind: EntityKind) -> Vec<usize> {
        let mut out = Vec::new();
        self.for_each_within(center, radius, |key, _| {
            if key.kind == kind {
                out.push(key.slot);
            }
        });
        out.sort_unstable();
        out
    }
}
