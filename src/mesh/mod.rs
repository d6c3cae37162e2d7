mod icosahedron;
mod make_sphere;
mod sphere;

pub use icosahedron::Icosahedron;
pub use make_sphere::{subdivisions_for_vertex_count, MakeSphere};
pub use sphere::Sphere;

use crate::error::{ConfigError, Result};
use crate::math::{transform_point, Matrix4, Point3, Vector3};

/// An indexed triangle mesh.
///
/// Vertex `i` is `vertices[i]`; insertion order defines the index. Faces are
/// triples of vertex indices. Vertices are never edited after construction:
/// transforms produce a new mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexedMesh {
    vertices: Vec<Point3>,
    faces: Vec<[u32; 3]>,
}

impl IndexedMesh {
    /// Creates a mesh, checking that every face index is in range.
    ///
    /// # Errors
    ///
    /// Returns an error if a face references a vertex that does not exist.
    pub fn new(vertices: Vec<Point3>, faces: Vec<[u32; 3]>) -> Result<Self> {
        let n = vertices.len();
        if let Some(bad) = faces
            .iter()
            .flatten()
            .find(|&&i| usize::try_from(i).map_or(true, |i| i >= n))
        {
            return Err(ConfigError::InvalidParameter(format!(
                "face index {bad} out of range for {n} vertices"
            ))
            .into());
        }
        Ok(Self { vertices, faces })
    }

    /// Assembles a mesh whose indices are known to be valid.
    pub(crate) fn from_parts(vertices: Vec<Point3>, faces: Vec<[u32; 3]>) -> Self {
        debug_assert!(faces.iter().flatten().all(|&i| (i as usize) < vertices.len()));
        Self { vertices, faces }
    }

    #[must_use]
    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    #[must_use]
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Returns a copy with every vertex transformed by `matrix`.
    #[must_use]
    pub fn transformed(&self, matrix: &Matrix4) -> Self {
        Self {
            vertices: self
                .vertices
                .iter()
                .map(|v| transform_point(matrix, v))
                .collect(),
            faces: self.faces.clone(),
        }
    }

    /// Returns a copy translated by `offset`.
    #[must_use]
    pub fn translated(&self, offset: &Vector3) -> Self {
        Self {
            vertices: self.vertices.iter().map(|v| v + offset).collect(),
            faces: self.faces.clone(),
        }
    }

    /// Mean of all vertex positions.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn center_of_gravity(&self) -> Point3 {
        if self.vertices.is_empty() {
            return Point3::origin();
        }
        let sum = self
            .vertices
            .iter()
            .fold(Vector3::zeros(), |acc, v| acc + v.coords);
        Point3::from(sum / self.vertices.len() as f64)
    }

    /// Per-vertex normals: face normals weighted by face area, then normalized.
    #[must_use]
    pub fn vertex_normals(&self) -> Vec<Vector3> {
        let mut normals = vec![Vector3::zeros(); self.vertices.len()];
        for face in &self.faces {
            let [a, b, c] = face.map(|i| i as usize);
            let n = (self.vertices[b] - self.vertices[a]).cross(&(self.vertices[c] - self.vertices[a]));
            normals[a] += n;
            normals[b] += n;
            normals[c] += n;
        }
        for n in &mut normals {
            if let Some(unit) = n.try_normalize(0.0) {
                *n = unit;
            }
        }
        normals
    }

    /// Vertex adjacency derived from faces, each list sorted and unique.
    #[must_use]
    pub fn neighbors(&self) -> Vec<Vec<u32>> {
        let mut adjacency = vec![Vec::new(); self.vertices.len()];
        for &[a, b, c] in &self.faces {
            for (from, to) in [(a, b), (b, c), (c, a)] {
                adjacency[from as usize].push(to);
                adjacency[to as usize].push(from);
            }
        }
        for list in &mut adjacency {
            list.sort_unstable();
            list.dedup();
        }
        adjacency
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tetrahedron() -> IndexedMesh {
        IndexedMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        )
        .unwrap()
    }

    #[test]
    fn rejects_out_of_range_face() {
        let r = IndexedMesh::new(vec![Point3::origin()], vec![[0, 0, 1]]);
        assert!(r.is_err());
    }

    #[test]
    fn neighbors_of_tetrahedron() {
        let adj = tetrahedron().neighbors();
        for (i, list) in adj.iter().enumerate() {
            assert_eq!(list.len(), 3, "vertex {i}");
            assert!(!list.contains(&u32::try_from(i).unwrap()));
        }
    }

    #[test]
    fn normals_are_unit_length() {
        for n in tetrahedron().vertex_normals() {
            assert!((n.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn transformed_copy_leaves_original() {
        let mesh = tetrahedron();
        let moved = mesh.transformed(&Matrix4::new_translation(&Vector3::new(1.0, 2.0, 3.0)));
        assert_eq!(mesh.vertices()[0], Point3::origin());
        assert_eq!(moved.vertices()[0], Point3::new(1.0, 2.0, 3.0));
        assert_eq!(moved.faces(), mesh.faces());
    }

    #[test]
    fn center_of_gravity() {
        let c = tetrahedron().center_of_gravity();
        assert!((c - Point3::new(0.25, 0.25, 0.25)).norm() < 1e-12);
    }
}
