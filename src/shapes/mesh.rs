//! Triangle meshes and heightfields
//!
//! Both are concave and collide through local convex proxies: a trimesh hands
//! out one degenerate hull per triangle, a heightfield one triangular prism
//! pillar per grid cell half. Candidate proxies are restricted by a spatial
//! query (AABB tree for the mesh, index-range arithmetic for the grid) before
//! the regular convex routines run.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ShapeError;
use crate::math::Aabb;

use super::convex::ConvexPolyhedron;

/// Triangles per AABB-tree leaf
const LEAF_SIZE: usize = 4;

/// An indexed triangle mesh with a median-split AABB tree over triangles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "TriMeshData")]
pub struct TriMesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
    #[serde(skip)]
    tree: AabbTree,
    local_aabb: Aabb,
}

/// Deserialized form of a trimesh; only the tree is derived state
#[derive(Deserialize)]
#[serde(rename = "TriMesh")]
struct TriMeshData {
    vertices: Vec<Vec3>,
    indices: Vec<[u32; 3]>,
    local_aabb: Aabb,
}

impl From<TriMeshData> for TriMesh {
    fn from(data: TriMeshData) -> Self {
        let mut mesh = Self {
            vertices: data.vertices,
            indices: data.indices,
            tree: AabbTree::default(),
            local_aabb: data.local_aabb,
        };
        mesh.rebuild_tree();
        mesh
    }
}

impl TriMesh {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Result<Self, ShapeError> {
        if indices.is_empty() {
            return Err(ShapeError::EmptyMesh);
        }
        for tri in &indices {
            for &i in tri {
                if i as usize >= vertices.len() {
                    return Err(ShapeError::BadTriangleIndex(i, vertices.len()));
                }
            }
        }
        let local_aabb = Aabb::from_points(vertices.iter().copied());
        let mut mesh = Self {
            vertices,
            indices,
            tree: AabbTree::default(),
            local_aabb,
        };
        mesh.rebuild_tree();
        Ok(mesh)
    }

    /// Rebuild the triangle tree after mutating vertices or indices
    pub fn rebuild_tree(&mut self) {
        let aabbs: Vec<Aabb> = (0..self.indices.len())
            .map(|i| {
                let (a, b, c) = self.triangle(i);
                Aabb::from_points([a, b, c])
            })
            .collect();
        self.tree = AabbTree::build(&aabbs);
    }

    pub fn triangle(&self, i: usize) -> (Vec3, Vec3, Vec3) {
        let [a, b, c] = self.indices[i];
        (
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        )
    }

    /// Convex proxy for one triangle, or None when it has no usable area
    pub fn triangle_proxy(&self, i: usize) -> Option<ConvexPolyhedron> {
        let (a, b, c) = self.triangle(i);
        if (b - a).cross(c - a).length_squared() < 1e-12 {
            return None;
        }
        Some(ConvexPolyhedron::triangle(a, b, c))
    }

    /// Indices of triangles whose bounds overlap `aabb` (shape-local frame)
    pub fn query_local_aabb(&self, aabb: &Aabb, out: &mut Vec<usize>) {
        self.tree.query(aabb, out);
    }

    pub fn local_aabb(&self) -> Aabb {
        self.local_aabb
    }

    pub fn bounding_radius(&self) -> f32 {
        self.local_aabb
            .lower
            .abs()
            .max(self.local_aabb.upper.abs())
            .length()
    }
}

/// Flat binary AABB tree, median split on the longest axis
#[derive(Debug, Clone, Default)]
struct AabbTree {
    nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone)]
struct TreeNode {
    aabb: Aabb,
    /// Leaf: triangle indices. Internal: children at (left, left + 1 subtree).
    kind: NodeKind,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf(Vec<usize>),
    Internal { left: usize, right: usize },
}

impl AabbTree {
    fn build(aabbs: &[Aabb]) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        if !aabbs.is_empty() {
            let items: Vec<usize> = (0..aabbs.len()).collect();
            tree.build_node(aabbs, items);
        }
        tree
    }

    fn build_node(&mut self, aabbs: &[Aabb], mut items: Vec<usize>) -> usize {
        let mut bounds = Aabb::EMPTY;
        for &i in &items {
            bounds.extend(&aabbs[i]);
        }
        let node_index = self.nodes.len();
        self.nodes.push(TreeNode {
            aabb: bounds,
            kind: NodeKind::Leaf(Vec::new()),
        });

        if items.len() <= LEAF_SIZE {
            self.nodes[node_index].kind = NodeKind::Leaf(items);
            return node_index;
        }

        // Split at the centroid median along the widest extent
        let size = bounds.upper - bounds.lower;
        let axis = if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        };
        items.sort_by(|&a, &b| {
            let ca = aabbs[a].center()[axis];
            let cb = aabbs[b].center()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });
        let right_items = items.split_off(items.len() / 2);
        let left = self.build_node(aabbs, items);
        let right = self.build_node(aabbs, right_items);
        self.nodes[node_index].kind = NodeKind::Internal { left, right };
        node_index
    }

    fn query(&self, aabb: &Aabb, out: &mut Vec<usize>) {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(items) => out.extend(items.iter().copied()),
                NodeKind::Internal { left, right } => {
                    stack.push(*left);
                    stack.push(*right);
                }
            }
        }
    }
}

/// A regular elevation grid in the local x-z plane, heights along +y.
///
/// `data[i][j]` is the height at x = i * element_size, z = j * element_size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heightfield {
    pub data: Vec<Vec<f32>>,
    pub element_size: f32,
    min_value: f32,
    max_value: f32,
}

impl Heightfield {
    pub fn new(data: Vec<Vec<f32>>, element_size: f32) -> Result<Self, ShapeError> {
        if !(element_size > 0.0) {
            return Err(ShapeError::InvalidElementSize(element_size));
        }
        if data.len() < 2 || data[0].len() < 2 {
            return Err(ShapeError::HeightfieldTooSmall);
        }
        let expected = data[0].len();
        for (row, r) in data.iter().enumerate() {
            if r.len() != expected {
                return Err(ShapeError::RaggedHeightfield {
                    expected,
                    row,
                    got: r.len(),
                });
            }
        }
        let mut min_value = f32::MAX;
        let mut max_value = f32::MIN;
        for r in &data {
            for &h in r {
                min_value = min_value.min(h);
                max_value = max_value.max(h);
            }
        }
        Ok(Self {
            data,
            element_size,
            min_value,
            max_value,
        })
    }

    pub fn rows(&self) -> usize {
        self.data.len()
    }

    pub fn cols(&self) -> usize {
        self.data[0].len()
    }

    pub fn local_aabb(&self) -> Aabb {
        Aabb::new(
            Vec3::new(0.0, self.pillar_floor(), 0.0),
            Vec3::new(
                (self.rows() - 1) as f32 * self.element_size,
                self.max_value,
                (self.cols() - 1) as f32 * self.element_size,
            ),
        )
    }

    pub fn bounding_radius(&self) -> f32 {
        let aabb = self.local_aabb();
        aabb.lower.abs().max(aabb.upper.abs()).length()
    }

    /// Cell index range overlapped by a shape-local AABB
    pub fn query_local_aabb(&self, aabb: &Aabb) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
        let s = self.element_size;
        let max_i = self.rows() - 1;
        let max_j = self.cols() - 1;
        let i0 = ((aabb.lower.x / s).floor().max(0.0) as usize).min(max_i);
        let i1 = ((aabb.upper.x / s).ceil().max(0.0) as usize).min(max_i);
        let j0 = ((aabb.lower.z / s).floor().max(0.0) as usize).min(max_j);
        let j1 = ((aabb.upper.z / s).ceil().max(0.0) as usize).min(max_j);
        if i0 >= i1 || j0 >= j1 || aabb.upper.y < self.pillar_floor() || aabb.lower.y > self.max_value
        {
            return None;
        }
        Some((i0..i1, j0..j1))
    }

    /// Convex prism pillar under one triangular half of cell (i, j).
    ///
    /// `upper` selects which of the cell's two triangles; the prism extends
    /// down to just below the lowest sample so side contacts stay convex.
    pub fn pillar(&self, i: usize, j: usize, upper: bool) -> ConvexPolyhedron {
        let s = self.element_size;
        let x0 = i as f32 * s;
        let z0 = j as f32 * s;
        let corner = |di: usize, dj: usize| {
            Vec3::new(
                x0 + di as f32 * s,
                self.data[i + di][j + dj],
                z0 + dj as f32 * s,
            )
        };
        let (a, b, c) = if upper {
            (corner(1, 0), corner(1, 1), corner(0, 1))
        } else {
            (corner(0, 0), corner(1, 0), corner(0, 1))
        };
        let floor = self.pillar_floor();
        let base = |p: Vec3| Vec3::new(p.x, floor, p.z);
        let vertices = vec![a, b, c, base(a), base(b), base(c)];
        let faces = vec![
            vec![0, 1, 2],
            vec![5, 4, 3],
            vec![0, 3, 4, 1],
            vec![1, 4, 5, 2],
            vec![2, 5, 3, 0],
        ];
        ConvexPolyhedron::from_raw(vertices, faces)
    }

    fn pillar_floor(&self) -> f32 {
        self.min_value - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_mesh() -> TriMesh {
        // Two triangles forming a unit quad in the x-z plane
        TriMesh::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(0.0, 0.0, 1.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
        .unwrap()
    }

    #[test]
    fn test_trimesh_validation() {
        assert_eq!(TriMesh::new(vec![], vec![]).unwrap_err(), ShapeError::EmptyMesh);
        let err = TriMesh::new(vec![Vec3::ZERO], vec![[0, 0, 5]]).unwrap_err();
        assert_eq!(err, ShapeError::BadTriangleIndex(5, 1));
    }

    #[test]
    fn test_trimesh_tree_query() {
        let mesh = quad_mesh();
        let mut hits = Vec::new();
        // A small box over the first triangle's corner
        mesh.query_local_aabb(
            &Aabb::centered(Vec3::new(0.9, 0.0, 0.1), Vec3::splat(0.05)),
            &mut hits,
        );
        assert!(hits.contains(&0));

        hits.clear();
        mesh.query_local_aabb(
            &Aabb::centered(Vec3::new(5.0, 0.0, 5.0), Vec3::splat(0.1)),
            &mut hits,
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn test_trimesh_tree_finds_all_under_big_box() {
        let mesh = quad_mesh();
        let mut hits = Vec::new();
        mesh.query_local_aabb(&Aabb::centered(Vec3::splat(0.5), Vec3::splat(2.0)), &mut hits);
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);
    }

    #[test]
    fn test_trimesh_load_rebuilds_tree() {
        let mesh = quad_mesh();
        // The deserialized form carries no tree; conversion must rebuild it
        // or every spatial query comes back empty
        let loaded = TriMesh::from(TriMeshData {
            vertices: mesh.vertices.clone(),
            indices: mesh.indices.clone(),
            local_aabb: mesh.local_aabb(),
        });
        let mut hits = Vec::new();
        loaded.query_local_aabb(&Aabb::centered(Vec3::splat(0.5), Vec3::splat(2.0)), &mut hits);
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);
    }

    #[test]
    fn test_heightfield_validation() {
        assert!(Heightfield::new(vec![vec![0.0, 0.0]], 1.0).is_err());
        assert!(Heightfield::new(vec![vec![0.0, 0.0], vec![0.0]], 1.0).is_err());
        assert!(Heightfield::new(vec![vec![0.0; 2]; 2], 0.0).is_err());
        assert!(Heightfield::new(vec![vec![0.0; 3]; 3], 1.0).is_ok());
    }

    #[test]
    fn test_heightfield_query_range() {
        let hf = Heightfield::new(vec![vec![0.0; 5]; 5], 1.0).unwrap();
        let (ri, rj) = hf
            .query_local_aabb(&Aabb::new(Vec3::new(1.2, -1.0, 2.3), Vec3::new(2.8, 1.0, 3.1)))
            .unwrap();
        assert_eq!(ri, 1..3);
        assert_eq!(rj, 2..4);
        // Entirely off-grid
        assert!(
            hf.query_local_aabb(&Aabb::centered(Vec3::new(-5.0, 0.0, 0.0), Vec3::splat(0.5)))
                .is_none()
        );
    }

    #[test]
    fn test_heightfield_pillar_covers_cell() {
        let hf = Heightfield::new(
            vec![vec![0.0, 1.0], vec![0.5, 2.0]],
            2.0,
        )
        .unwrap();
        let pillar = hf.pillar(0, 0, false);
        assert_eq!(pillar.vertices.len(), 6);
        assert_eq!(pillar.faces.len(), 5);
        // Top vertices carry the sampled heights
        assert!(pillar.vertices.iter().any(|v| (v.y - 0.5).abs() < 1e-6));
        // Base sits below the minimum sample
        assert!(pillar.vertices.iter().any(|v| v.y < 0.0));
    }
}
