use crate::error::{GeometryError, Result};
use crate::math::{Point3, PointOctree, Vector3, TOLERANCE};

use super::{Icosahedron, IndexedMesh, Sphere};

/// Creates a geodesic sphere mesh by subdividing an icosahedron.
///
/// Each of the 20 faces is cut into `subdivisions²` triangles on a regular
/// grid spanned by two of its edges. Grid points shared between faces are
/// merged through a [`PointOctree`]: a new point closer than
/// `radius / subdivisions / 2` to an already emitted one reuses that vertex.
/// The merged points are finally pushed out onto the sphere surface, which
/// yields exactly `10·n² + 2` vertices and `20·n²` faces.
pub struct MakeSphere {
    center: Point3,
    radius: f64,
    subdivisions: u32,
}

impl MakeSphere {
    /// Creates a new `MakeSphere` operation.
    #[must_use]
    pub fn new(center: Point3, radius: f64, subdivisions: u32) -> Self {
        Self {
            center,
            radius,
            subdivisions,
        }
    }

    /// Chooses the subdivision so that neighboring vertices are roughly one
    /// voxel apart along the finest calibrated axis.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn for_calibration(center: Point3, radius: f64, calibration: &Vector3) -> Self {
        let finest = calibration.x.min(calibration.y).min(calibration.z);
        let subdivisions = if finest > 0.0 {
            (radius / finest).round().max(1.0) as u32
        } else {
            1
        };
        Self::new(center, radius, subdivisions)
    }

    #[must_use]
    pub fn subdivisions(&self) -> u32 {
        self.subdivisions
    }

    /// Executes the operation, returning the sphere.
    ///
    /// # Errors
    ///
    /// Returns an error if the radius is not positive or the subdivision
    /// count is zero.
    #[allow(clippy::cast_possible_truncation)]
    pub fn execute(&self) -> Result<Sphere> {
        // Validate radius and subdivision count
        if !(self.radius > TOLERANCE) {
            return Err(GeometryError::Degenerate("sphere radius must be positive".into()).into());
        }
        if self.subdivisions == 0 {
            return Err(GeometryError::ParameterOutOfRange {
                parameter: "subdivisions",
                value: 0.0,
                min: 1.0,
                max: f64::from(u32::MAX),
            }
            .into());
        }

        let n = self.subdivisions;
        let nf = f64::from(n);
        let radius = self.radius;
        let ico = Icosahedron::new(radius);
        let corners = ico.vertices();

        // Shared edge points are merged through a nearest-point lookup
        let snap_sq = (radius / nf / 2.0).powi(2);
        let extent = Vector3::repeat(radius * 1.01);
        let mut tree = PointOctree::new(Point3::origin() - extent, Point3::origin() + extent);
        let mut vertex_of = |p: Point3| -> u32 {
            match tree.nearest(&p) {
                Some(found) if found.distance_sq < snap_sq => found.index as u32,
                _ => tree.insert(p) as u32,
            }
        };

        // Subdivide each icosahedron face into n² triangles
        let mut faces = Vec::with_capacity(20 * (n as usize).pow(2));
        for [a, b, c] in ico.faces() {
            let p1 = corners[a as usize];
            let v21 = (corners[b as usize] - p1) / nf;
            let v31 = (corners[c as usize] - p1) / nf;
            let grid = |i1: u32, i2: u32| p1 + v21 * f64::from(i1) + v31 * f64::from(i2);

            for i2 in 0..n {
                for i1 in 0..n - i2 {
                    let t1 = vertex_of(grid(i1, i2));
                    let t2 = vertex_of(grid(i1 + 1, i2));
                    let t3 = vertex_of(grid(i1, i2 + 1));
                    faces.push([t1, t2, t3]);
                    if i1 + i2 + 1 < n {
                        let t4 = vertex_of(grid(i1 + 1, i2 + 1));
                        faces.push([t2, t4, t3]);
                    }
                }
            }
        }

        // Project onto the sphere
        let vertices: Vec<Point3> = tree
            .points()
            .iter()
            .map(|p| self.center + p.coords.normalize() * radius)
            .collect();

        tracing::debug!(
            subdivisions = n,
            vertices = vertices.len(),
            faces = faces.len(),
            "built sphere mesh"
        );

        Sphere::new(IndexedMesh::from_parts(vertices, faces), self.center, radius)
    }
}

/// Recovers the subdivision count from a vertex count of `10·n² + 2`.
///
/// Returns `None` if `vertex_count` is not of that form.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn subdivisions_for_vertex_count(vertex_count: usize) -> Option<u32> {
    let rest = vertex_count.checked_sub(2)?;
    if rest == 0 || rest % 10 != 0 {
        return None;
    }
    let n = ((rest / 10) as f64).sqrt().round() as u32;
    (10 * (n as usize).pow(2) == rest).then_some(n)
}
