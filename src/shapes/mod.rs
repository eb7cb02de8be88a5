//! Collision shape descriptors
//!
//! A [`Shape`] is a geometric kind plus the collision metadata every kind
//! shares: material, filter group/mask, response flag and a cached bounding
//! sphere radius. Shapes are owned by bodies; narrowphase identifies them by
//! `(body id, shape id)` handles, never by reference.

pub mod convex;
pub mod mesh;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::consts::HALF_SPACE_EXTENT;
use crate::error::ShapeError;
use crate::material::MaterialId;
use crate::math::Aabb;

pub use convex::ConvexPolyhedron;
pub use mesh::{Heightfield, TriMesh};

/// Shape kind tag, ordered for canonical pair dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ShapeType {
    Sphere,
    Plane,
    Box,
    Convex,
    TriMesh,
    Heightfield,
}

/// Geometry of a shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShapeKind {
    Sphere { radius: f32 },
    /// The half-space below the local +y axis; everything under the plane
    /// y = 0 in shape-local coordinates is solid.
    Plane,
    Box {
        half_extents: Vec3,
        /// 8-vertex hull representation reused by the convex routines
        hull: ConvexPolyhedron,
    },
    Convex(ConvexPolyhedron),
    TriMesh(TriMesh),
    Heightfield(Heightfield),
}

/// A collision shape with its shared metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shape {
    pub kind: ShapeKind,
    pub material: Option<MaterialId>,
    pub collision_filter_group: u32,
    pub collision_filter_mask: u32,
    /// When false, contacts are detected (events fire) but not solved
    pub collision_response: bool,
    bounding_radius: f32,
}

impl Shape {
    pub fn sphere(radius: f32) -> Result<Self, ShapeError> {
        if !(radius > 0.0) {
            return Err(ShapeError::InvalidRadius(radius));
        }
        Ok(Self::with_kind(ShapeKind::Sphere { radius }))
    }

    pub fn plane() -> Self {
        Self::with_kind(ShapeKind::Plane)
    }

    pub fn cuboid(half_extents: Vec3) -> Result<Self, ShapeError> {
        if !(half_extents.x > 0.0 && half_extents.y > 0.0 && half_extents.z > 0.0) {
            return Err(ShapeError::InvalidHalfExtents(
                half_extents.x,
                half_extents.y,
                half_extents.z,
            ));
        }
        Ok(Self::with_kind(ShapeKind::Box {
            half_extents,
            hull: ConvexPolyhedron::cuboid(half_extents),
        }))
    }

    pub fn convex(vertices: Vec<Vec3>, faces: Vec<Vec<usize>>) -> Result<Self, ShapeError> {
        let hull = ConvexPolyhedron::new(vertices, faces)?;
        Ok(Self::with_kind(ShapeKind::Convex(hull)))
    }

    pub fn trimesh(vertices: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Result<Self, ShapeError> {
        Ok(Self::with_kind(ShapeKind::TriMesh(TriMesh::new(
            vertices, indices,
        )?)))
    }

    pub fn heightfield(data: Vec<Vec<f32>>, element_size: f32) -> Result<Self, ShapeError> {
        Ok(Self::with_kind(ShapeKind::Heightfield(Heightfield::new(
            data,
            element_size,
        )?)))
    }

    fn with_kind(kind: ShapeKind) -> Self {
        let mut shape = Self {
            kind,
            material: None,
            collision_filter_group: 1,
            collision_filter_mask: u32::MAX,
            collision_response: true,
            bounding_radius: 0.0,
        };
        shape.bounding_radius = shape.compute_bounding_radius();
        shape
    }

    pub fn with_material(mut self, material: MaterialId) -> Self {
        self.material = Some(material);
        self
    }

    pub fn shape_type(&self) -> ShapeType {
        match &self.kind {
            ShapeKind::Sphere { .. } => ShapeType::Sphere,
            ShapeKind::Plane => ShapeType::Plane,
            ShapeKind::Box { .. } => ShapeType::Box,
            ShapeKind::Convex(_) => ShapeType::Convex,
            ShapeKind::TriMesh(_) => ShapeType::TriMesh,
            ShapeKind::Heightfield(_) => ShapeType::Heightfield,
        }
    }

    /// Radius of the bounding sphere around the shape-local origin
    pub fn bounding_radius(&self) -> f32 {
        self.bounding_radius
    }

    fn compute_bounding_radius(&self) -> f32 {
        match &self.kind {
            ShapeKind::Sphere { radius } => *radius,
            ShapeKind::Plane => HALF_SPACE_EXTENT,
            ShapeKind::Box { half_extents, .. } => half_extents.length(),
            ShapeKind::Convex(hull) => hull.bounding_radius(),
            ShapeKind::TriMesh(mesh) => mesh.bounding_radius(),
            ShapeKind::Heightfield(hf) => hf.bounding_radius(),
        }
    }

    pub fn local_aabb(&self) -> Aabb {
        match &self.kind {
            ShapeKind::Sphere { radius } => Aabb::centered(Vec3::ZERO, Vec3::splat(*radius)),
            ShapeKind::Plane => Aabb::new(
                Vec3::splat(-HALF_SPACE_EXTENT),
                Vec3::new(HALF_SPACE_EXTENT, 0.0, HALF_SPACE_EXTENT),
            ),
            ShapeKind::Box { half_extents, .. } => Aabb::centered(Vec3::ZERO, *half_extents),
            ShapeKind::Convex(hull) => Aabb::from_points(hull.vertices.iter().copied()),
            ShapeKind::TriMesh(mesh) => mesh.local_aabb(),
            ShapeKind::Heightfield(hf) => hf.local_aabb(),
        }
    }

    /// World-space AABB for a given shape transform
    pub fn world_aabb(&self, pos: Vec3, quat: Quat) -> Aabb {
        match &self.kind {
            ShapeKind::Sphere { radius } => Aabb::centered(pos, Vec3::splat(*radius)),
            ShapeKind::Plane => plane_world_aabb(pos, quat),
            _ => {
                let local = self.local_aabb();
                let corners = [
                    Vec3::new(local.lower.x, local.lower.y, local.lower.z),
                    Vec3::new(local.upper.x, local.lower.y, local.lower.z),
                    Vec3::new(local.lower.x, local.upper.y, local.lower.z),
                    Vec3::new(local.lower.x, local.lower.y, local.upper.z),
                    Vec3::new(local.upper.x, local.upper.y, local.lower.z),
                    Vec3::new(local.upper.x, local.lower.y, local.upper.z),
                    Vec3::new(local.lower.x, local.upper.y, local.upper.z),
                    Vec3::new(local.upper.x, local.upper.y, local.upper.z),
                ];
                Aabb::from_points(corners.into_iter().map(|c| quat * c + pos))
            }
        }
    }

    /// Diagonal local inertia for the given mass.
    ///
    /// Spheres and boxes are exact; hulls and meshes fall back to the
    /// bounding-box approximation.
    pub fn local_inertia(&self, mass: f32) -> Vec3 {
        match &self.kind {
            ShapeKind::Sphere { radius } => {
                let i = 0.4 * mass * radius * radius;
                Vec3::splat(i)
            }
            ShapeKind::Plane => Vec3::ZERO,
            ShapeKind::Box { half_extents, .. } => box_inertia(mass, *half_extents),
            ShapeKind::Convex(hull) => {
                let aabb = Aabb::from_points(hull.vertices.iter().copied());
                box_inertia(mass, (aabb.upper - aabb.lower) * 0.5)
            }
            ShapeKind::TriMesh(mesh) => {
                let aabb = mesh.local_aabb();
                box_inertia(mass, (aabb.upper - aabb.lower) * 0.5)
            }
            ShapeKind::Heightfield(_) => Vec3::ZERO,
        }
    }
}

fn box_inertia(mass: f32, half: Vec3) -> Vec3 {
    let k = mass / 3.0;
    Vec3::new(
        k * (half.y * half.y + half.z * half.z),
        k * (half.x * half.x + half.z * half.z),
        k * (half.x * half.x + half.y * half.y),
    )
}

/// Half-space bounds: unbounded except along an axis-aligned world normal
fn plane_world_aabb(pos: Vec3, quat: Quat) -> Aabb {
    let mut aabb = Aabb::new(Vec3::splat(-HALF_SPACE_EXTENT), Vec3::splat(HALF_SPACE_EXTENT));
    let normal = quat * Vec3::Y;
    for axis in 0..3 {
        if normal[axis] > 0.999 {
            aabb.upper[axis] = pos[axis];
        } else if normal[axis] < -0.999 {
            aabb.lower[axis] = pos[axis];
        }
    }
    aabb
}
