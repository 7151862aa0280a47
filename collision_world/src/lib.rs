//! Static world collision index: a triangle BVH built once per loaded world.
//!
//! The index is immutable after [`TriangleBvh::build`]. Queries walk the
//! hierarchy with an explicit stack and yield triangles lazily.
#![forbid(unsafe_code)]

use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;

/// Maximum number of triangles stored in a single leaf.
pub const MAX_LEAF_TRIANGLES: usize = 8;
const BOUNDS_EPS: Real = 1.0e-4;
const AREA_EPS: Real = 1.0e-12;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point<Real>,
    pub max: Point<Real>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub a: Point<Real>,
    pub b: Point<Real>,
    pub c: Point<Real>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BvhNode {
    pub bounds: Aabb,
    pub left: Option<u32>,
    pub right: Option<u32>,
    pub leaf: Option<LeafRange>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeafRange {
    pub first: u32,
    pub count: u32,
}

/// Bounding volume hierarchy over world-space triangles.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriangleBvh {
    triangles: Vec<Triangle>,
    triangle_bounds: Vec<Aabb>,
    nodes: Vec<BvhNode>,
    leaf_indices: Vec<u32>,
    root: u32,
}

#[derive(Clone, Debug, Default)]
pub struct IndexValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl IndexValidation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl TriangleBvh {
    /// Builds the hierarchy. An empty input yields an index that matches nothing.
    /// Triangles with non-finite coordinates are dropped.
    pub fn build(triangles: impl IntoIterator<Item = Triangle>) -> Self {
        let triangles: Vec<Triangle> = triangles
            .into_iter()
            .filter(Triangle::is_finite)
            .collect();
        if triangles.is_empty() {
            return Self::default();
        }
        let triangle_bounds: Vec<Aabb> = triangles.iter().map(Triangle::aabb).collect();
        let centroids: Vec<Point<Real>> = triangles.iter().map(Triangle::centroid).collect();

        let mut nodes = Vec::new();
        let mut leaf_indices = Vec::with_capacity(triangles.len());
        let indices: Vec<u32> = (0..triangles.len())
            .map(|index| u32::try_from(index).unwrap_or(u32::MAX))
            .collect();
        let root = build_bvh_node(
            BuildInput {
                bounds: &triangle_bounds,
                centroids: &centroids,
            },
            &indices,
            &mut nodes,
            &mut leaf_indices,
            MAX_LEAF_TRIANGLES,
        );
        Self {
            triangles,
            triangle_bounds,
            nodes,
            leaf_indices,
            root,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// Bounds of the whole index, `None` when empty.
    pub fn bounds(&self) -> Option<Aabb> {
        self.nodes.get(self.root as usize).map(|node| node.bounds)
    }

    /// Lazily yields every triangle whose leaf volume and own bounds overlap `bounds`.
    pub fn query(&self, bounds: Aabb) -> TriangleQuery<'_> {
        let stack = if self.nodes.is_empty() {
            Vec::new()
        } else {
            vec![self.root]
        };
        TriangleQuery {
            bvh: self,
            bounds,
            stack,
            pending: &[],
        }
    }

    pub fn select_intersecting(&self, bounds: &Aabb) -> Vec<u32> {
        self.query(*bounds).map(|(index, _)| index).collect()
    }

    pub fn validate(&self) -> IndexValidation {
        let mut validation = IndexValidation::default();
        if self.triangles.is_empty() {
            validation
                .warnings
                .push("collision index contains no triangles".to_string());
            if !self.nodes.is_empty() {
                validation
                    .errors
                    .push("empty collision index must not contain nodes".to_string());
            }
            return validation;
        }
        if self.root as usize >= self.nodes.len() {
            validation
                .errors
                .push("bvh root is out of range".to_string());
        }

        let mut coverage = vec![false; self.triangles.len()];
        for (node_index, node) in self.nodes.iter().enumerate() {
            if !node.bounds.is_valid() {
                validation
                    .errors
                    .push(format!("bvh node {} has invalid bounds", node_index));
            }
            match (&node.left, &node.right, &node.leaf) {
                (Some(left), Some(right), None) => {
                    let (Some(left), Some(right)) = (
                        self.nodes.get(*left as usize),
                        self.nodes.get(*right as usize),
                    ) else {
                        validation
                            .errors
                            .push(format!("bvh node {} child index out of range", node_index));
                        continue;
                    };
                    let expected = left.bounds.union(&right.bounds);
                    if !node.bounds.contains(&expected, BOUNDS_EPS) {
                        validation.errors.push(format!(
                            "bvh node {} bounds do not contain children",
                            node_index
                        ));
                    }
                }
                (None, None, Some(leaf)) => {
                    let start = leaf.first as usize;
                    let count = leaf.count as usize;
                    if start + count > self.leaf_indices.len() {
                        validation
                            .errors
                            .push(format!("bvh leaf {} range out of bounds", node_index));
                        continue;
                    }
                    if count > MAX_LEAF_TRIANGLES {
                        validation.warnings.push(format!(
                            "bvh leaf {} holds {} triangles (budget {})",
                            node_index, count, MAX_LEAF_TRIANGLES
                        ));
                    }
                    for &triangle_index in &self.leaf_indices[start..start + count] {
                        let Some(bounds) = self.triangle_bounds.get(triangle_index as usize)
                        else {
                            validation.errors.push(format!(
                                "bvh leaf {} references missing triangle {}",
                                node_index, triangle_index
                            ));
                            continue;
                        };
                        if coverage.get(triangle_index as usize) == Some(&true) {
                            validation.errors.push(format!(
                                "triangle {} appears in multiple leaves",
                                triangle_index
                            ));
                        }
                        if let Some(slot) = coverage.get_mut(triangle_index as usize) {
                            *slot = true;
                        }
                        if !node.bounds.contains(bounds, BOUNDS_EPS) {
                            validation.errors.push(format!(
                                "bvh leaf {} bounds do not contain triangle {}",
                                node_index, triangle_index
                            ));
                        }
                    }
                }
                _ => {
                    validation.errors.push(format!(
                        "bvh node {} must have either two children or a leaf range",
                        node_index
                    ));
                }
            }
        }

        for (index, covered) in coverage.iter().enumerate() {
            if !covered {
                validation
                    .errors
                    .push(format!("triangle {} missing from bvh leaves", index));
            }
        }
        for (index, triangle) in self.triangles.iter().enumerate() {
            if triangle.area() <= AREA_EPS {
                validation
                    .warnings
                    .push(format!("triangle {} is degenerate", index));
            }
        }
        validation
    }
}

/// Lazy hierarchy walk produced by [`TriangleBvh::query`].
pub struct TriangleQuery<'a> {
    bvh: &'a TriangleBvh,
    bounds: Aabb,
    stack: Vec<u32>,
    pending: &'a [u32],
}

impl<'a> Iterator for TriangleQuery<'a> {
    type Item = (u32, &'a Triangle);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((&index, rest)) = self.pending.split_first() {
                self.pending = rest;
                let slot = index as usize;
                let (Some(triangle), Some(bounds)) = (
                    self.bvh.triangles.get(slot),
                    self.bvh.triangle_bounds.get(slot),
                ) else {
                    continue;
                };
                if bounds.intersects(&self.bounds) {
                    return Some((index, triangle));
                }
                continue;
            }
            let node_index = self.stack.pop()?;
            let Some(node) = self.bvh.nodes.get(node_index as usize) else {
                continue;
            };
            if !node.bounds.intersects(&self.bounds) {
                continue;
            }
            if let Some(leaf) = node.leaf {
                let start = leaf.first as usize;
                let end = start.saturating_add(leaf.count as usize);
                if let Some(slice) = self.bvh.leaf_indices.get(start..end) {
                    self.pending = slice;
                }
            } else {
                if let Some(left) = node.left {
                    self.stack.push(left);
                }
                if let Some(right) = node.right {
                    self.stack.push(right);
                }
            }
        }
    }
}

#[derive(Clone, Copy)]
struct BuildInput<'a> {
    bounds: &'a [Aabb],
    centroids: &'a [Point<Real>],
}

fn build_bvh_node(
    input: BuildInput<'_>,
    indices: &[u32],
    nodes: &mut Vec<BvhNode>,
    leaf_indices: &mut Vec<u32>,
    max_leaf: usize,
) -> u32 {
    let bounds = union_bounds(input.bounds, indices);
    if indices.len() <= max_leaf {
        let first = leaf_indices.len();
        leaf_indices.extend(indices.iter().copied());
        let node = BvhNode {
            bounds,
            left: None,
            right: None,
            leaf: Some(LeafRange {
                first: u32::try_from(first).unwrap_or(u32::MAX),
                count: u32::try_from(indices.len()).unwrap_or(u32::MAX),
            }),
        };
        let node_index = nodes.len() as u32;
        nodes.push(node);
        return node_index;
    }

    let axis = bounds.longest_axis();
    let mut sorted: Vec<(u32, Real)> = indices
        .iter()
        .map(|index| (*index, input.centroids[*index as usize][axis]))
        .collect();
    sorted.sort_by(|a, b| {
        let ord = a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal);
        if ord == std::cmp::Ordering::Equal {
            a.0.cmp(&b.0)
        } else {
            ord
        }
    });
    let mid = sorted.len() / 2;
    let (left_indices, right_indices) = sorted.split_at(mid);
    let left_indices: Vec<u32> = left_indices.iter().map(|pair| pair.0).collect();
    let right_indices: Vec<u32> = right_indices.iter().map(|pair| pair.0).collect();

    let left = build_bvh_node(input, &left_indices, nodes, leaf_indices, max_leaf);
    let right = build_bvh_node(input, &right_indices, nodes, leaf_indices, max_leaf);

    let node = BvhNode {
        bounds,
        left: Some(left),
        right: Some(right),
        leaf: None,
    };
    let node_index = nodes.len() as u32;
    nodes.push(node);
    node_index
}

fn union_bounds(bounds: &[Aabb], indices: &[u32]) -> Aabb {
    let mut iter = indices.iter();
    let first = iter
        .next()
        .map(|index| bounds[*index as usize])
        .unwrap_or_else(|| Aabb::from_points(Point::origin(), Point::origin()));
    iter.fold(first, |acc, index| acc.union(&bounds[*index as usize]))
}

impl Aabb {
    /// Smallest box containing both points, in any order.
    pub fn from_points(a: Point<Real>, b: Point<Real>) -> Aabb {
        Aabb {
            min: a.inf(&b),
            max: a.sup(&b),
        }
    }

    pub fn expanded(&self, margin: Real) -> Aabb {
        let margin = Vector::repeat(margin);
        Aabb {
            min: self.min - margin,
            max: self.max + margin,
        }
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    pub fn center(&self) -> Point<Real> {
        Point::from((self.min.coords + self.max.coords) * 0.5)
    }

    pub fn longest_axis(&self) -> usize {
        let extent = self.max - self.min;
        if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        }
    }

    pub fn contains(&self, other: &Aabb, eps: Real) -> bool {
        for axis in 0..3 {
            if self.min[axis] - eps > other.min[axis] {
                return false;
            }
            if self.max[axis] + eps < other.max[axis] {
                return false;
            }
        }
        true
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        for axis in 0..3 {
            if self.max[axis] < other.min[axis] {
                return false;
            }
            if self.min[axis] > other.max[axis] {
                return false;
            }
        }
        true
    }

    pub fn is_valid(&self) -> bool {
        self.min.iter().all(|value| value.is_finite())
            && self.max.iter().all(|value| value.is_finite())
            && self.min.x <= self.max.x
            && self.min.y <= self.max.y
            && self.min.z <= self.max.z
    }
}

impl Triangle {
    pub fn new(a: Point<Real>, b: Point<Real>, c: Point<Real>) -> Self {
        Self { a, b, c }
    }

    pub fn aabb(&self) -> Aabb {
        Aabb {
            min: self.a.inf(&self.b).inf(&self.c),
            max: self.a.sup(&self.b).sup(&self.c),
        }
    }

    pub fn centroid(&self) -> Point<Real> {
        Point::from((self.a.coords + self.b.coords + self.c.coords) / 3.0)
    }

    /// Unnormalized face normal (counter-clockwise winding).
    pub fn scaled_normal(&self) -> Vector<Real> {
        (self.b - self.a).cross(&(self.c - self.a))
    }

    /// Unit face normal, `None` for degenerate triangles.
    pub fn normal(&self) -> Option<Vector<Real>> {
        let normal = self.scaled_normal();
        let len2 = normal.norm_squared();
        if len2 <= AREA_EPS {
            None
        } else {
            Some(normal / len2.sqrt())
        }
    }

    pub fn area(&self) -> Real {
        self.scaled_normal().norm() * 0.5
    }

    pub fn is_finite(&self) -> bool {
        [self.a, self.b, self.c]
            .iter()
            .all(|point| point.iter().all(|value| value.is_finite()))
    }
}
