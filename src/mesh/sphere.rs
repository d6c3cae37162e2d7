use std::sync::OnceLock;

use crate::error::{ConfigError, GeometryError, Result};
use crate::math::{transform_point, Matrix4, Point3, PointOctree, TOLERANCE};
use crate::sample::Sample;

use super::IndexedMesh;

/// A triangulated sphere: mesh, center and radius.
///
/// Vertices are approximately at `radius` from `center`. A nearest-vertex
/// index and the vertex adjacency are built on first use and cached.
#[derive(Debug)]
pub struct Sphere {
    mesh: IndexedMesh,
    center: Point3,
    radius: f64,
    index: OnceLock<PointOctree>,
    adjacency: OnceLock<Vec<Vec<u32>>>,
}

impl Clone for Sphere {
    fn clone(&self) -> Self {
        Self {
            mesh: self.mesh.clone(),
            center: self.center,
            radius: self.radius,
            index: OnceLock::new(),
            adjacency: OnceLock::new(),
        }
    }
}

impl Sphere {
    /// Wraps a mesh as a sphere.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh has no vertices or the radius is not
    /// positive.
    pub fn new(mesh: IndexedMesh, center: Point3, radius: f64) -> Result<Self> {
        if mesh.vertex_count() == 0 {
            return Err(GeometryError::EmptyPointSet("sphere mesh").into());
        }
        if !(radius > TOLERANCE) {
            return Err(GeometryError::Degenerate("sphere radius must be positive".into()).into());
        }
        Ok(Self {
            mesh,
            center,
            radius,
            index: OnceLock::new(),
            adjacency: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn mesh(&self) -> &IndexedMesh {
        &self.mesh
    }

    #[must_use]
    pub fn center(&self) -> &Point3 {
        &self.center
    }

    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.mesh.vertex_count()
    }

    /// Returns a copy with mesh and center transformed by `matrix`.
    #[must_use]
    pub fn transformed(&self, matrix: &Matrix4) -> Self {
        Self {
            mesh: self.mesh.transformed(matrix),
            center: transform_point(matrix, &self.center),
            radius: self.radius,
            index: OnceLock::new(),
            adjacency: OnceLock::new(),
        }
    }

    /// Fails unless `len` equals the vertex count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::VertexCountMismatch`] on mismatch.
    pub fn check_buffer_len(&self, len: usize) -> Result<()> {
        if len == self.vertex_count() {
            Ok(())
        } else {
            Err(ConfigError::VertexCountMismatch {
                expected: self.vertex_count(),
                actual: len,
            }
            .into())
        }
    }

    fn index(&self) -> &PointOctree {
        self.index
            .get_or_init(|| PointOctree::from_points(self.mesh.vertices()))
    }

    /// Vertex adjacency lists.
    #[must_use]
    pub fn adjacency(&self) -> &[Vec<u32>] {
        self.adjacency.get_or_init(|| self.mesh.neighbors())
    }

    /// Index of the vertex closest to `p`.
    #[must_use]
    pub fn nearest_vertex(&self, p: &Point3) -> Option<usize> {
        self.index().nearest(p).map(|n| n.index)
    }

    /// Interpolates `buffer` at `p` from the three nearest vertices,
    /// weighted by inverse distance.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer length differs from the vertex count.
    pub fn interpolate<T: Sample>(&self, buffer: &[T], p: &Point3) -> Result<f64> {
        self.check_buffer_len(buffer.len())?;
        let nearest = self.index().k_nearest(p, 3);
        if let Some(exact) = nearest.iter().find(|n| n.distance_sq < TOLERANCE * TOLERANCE) {
            return Ok(buffer[exact.index].to_f64());
        }
        let mut sum = 0.0;
        let mut total = 0.0;
        for n in &nearest {
            let w = 1.0 / n.distance_sq.sqrt();
            sum += w * buffer[n.index].to_f64();
            total += w;
        }
        Ok(if total > 0.0 { sum / total } else { 0.0 })
    }

    /// Interpolates `buffer` at geographic coordinates (radians), latitude
    /// measured from the xy-plane towards +z.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer length differs from the vertex count.
    pub fn value_at<T: Sample>(&self, buffer: &[T], longitude: f64, latitude: f64) -> Result<f64> {
        let (sin_long, cos_long) = longitude.sin_cos();
        let (sin_lat, cos_lat) = latitude.sin_cos();
        let p = Point3::new(
            self.center.x + self.radius * cos_lat * cos_long,
            self.center.y + self.radius * cos_lat * sin_long,
            self.center.z + self.radius * sin_lat,
        );
        self.interpolate(buffer, &p)
    }

    /// Replaces each value by the mean over the vertex and its neighbors.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer length differs from the vertex count.
    #[allow(clippy::cast_precision_loss)]
    pub fn smooth<T: Sample>(&self, buffer: &mut [T]) -> Result<()> {
        self.check_buffer_len(buffer.len())?;
        let adjacency = self.adjacency();
        let smoothed: Vec<T> = adjacency
            .iter()
            .enumerate()
            .map(|(v, neighbors)| {
                let sum = neighbors
                    .iter()
                    .fold(buffer[v].to_f64(), |acc, &n| acc + buffer[n as usize].to_f64());
                T::from_f64(sum / (neighbors.len() + 1) as f64)
            })
            .collect();
        buffer.copy_from_slice(&smoothed);
        Ok(())
    }

    /// For every vertex of `target`, the index of the nearest vertex of `self`.
    #[must_use]
    pub fn resample_indices(&self, target: &Sphere) -> Vec<usize> {
        target
            .mesh
            .vertices()
            .iter()
            .map(|v| self.nearest_vertex(v).unwrap_or(0))
            .collect()
    }

    /// Transfers `buffer` onto `target`, smoothing `smoothing_passes` times
    /// first so that the coarser mesh does not alias.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer length differs from the vertex count.
    pub fn resample<T: Sample>(
        &self,
        buffer: &[T],
        target: &Sphere,
        smoothing_passes: usize,
    ) -> Result<Vec<T>> {
        self.check_buffer_len(buffer.len())?;
        let mut data = buffer.to_vec();
        for _ in 0..smoothing_passes {
            self.smooth(&mut data)?;
        }
        Ok(self
            .resample_indices(target)
            .into_iter()
            .map(|i| data[i])
            .collect())
    }
}
