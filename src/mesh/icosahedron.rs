use crate::math::Point3;

use super::IndexedMesh;

/// Golden ratio.
const PHI: f64 = 1.618_033_988_749_895;

const FACES: [[u32; 3]; 20] = [
    [0, 1, 4],
    [1, 9, 4],
    [4, 9, 5],
    [5, 9, 3],
    [2, 3, 7],
    [3, 2, 5],
    [7, 10, 2],
    [0, 8, 10],
    [0, 4, 8],
    [8, 2, 10],
    [8, 4, 5],
    [8, 5, 2],
    [1, 0, 6],
    [11, 1, 6],
    [3, 9, 11],
    [6, 10, 7],
    [3, 11, 7],
    [11, 6, 7],
    [6, 0, 10],
    [9, 1, 11],
];

/// A regular icosahedron centered at the origin.
pub struct Icosahedron {
    radius: f64,
}

impl Icosahedron {
    /// Creates an icosahedron whose vertices lie at distance `radius` from the origin.
    #[must_use]
    pub fn new(radius: f64) -> Self {
        Self { radius }
    }

    /// The 12 vertices.
    #[must_use]
    pub fn vertices(&self) -> [Point3; 12] {
        let s = (self.radius * self.radius / (1.0 + PHI * PHI)).sqrt();
        [
            Point3::new(1.0, PHI, 0.0),
            Point3::new(-1.0, PHI, 0.0),
            Point3::new(1.0, -PHI, 0.0),
            Point3::new(-1.0, -PHI, 0.0),
            Point3::new(0.0, 1.0, PHI),
            Point3::new(0.0, -1.0, PHI),
            Point3::new(0.0, 1.0, -PHI),
            Point3::new(0.0, -1.0, -PHI),
            Point3::new(PHI, 0.0, 1.0),
            Point3::new(-PHI, 0.0, 1.0),
            Point3::new(PHI, 0.0, -1.0),
            Point3::new(-PHI, 0.0, -1.0),
        ]
        .map(|p| p * s)
    }

    /// The 20 faces, wound consistently.
    #[must_use]
    pub fn faces(&self) -> [[u32; 3]; 20] {
        FACES
    }

    /// Returns the icosahedron as an indexed mesh.
    #[must_use]
    pub fn mesh(&self) -> IndexedMesh {
        IndexedMesh::from_parts(self.vertices().to_vec(), FACES.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertices_on_sphere() {
        for v in Icosahedron::new(3.0).vertices() {
            assert!((v.coords.norm() - 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn all_edges_equal() {
        let ico = Icosahedron::new(1.0);
        let v = ico.vertices();
        let edge = |a: u32, b: u32| (v[a as usize] - v[b as usize]).norm();
        let reference = edge(FACES[0][0], FACES[0][1]);
        for [a, b, c] in ico.faces() {
            for len in [edge(a, b), edge(b, c), edge(c, a)] {
                assert!((len - reference).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn faces_point_outward() {
        let ico = Icosahedron::new(1.0);
        let v = ico.vertices();
        for [a, b, c] in ico.faces() {
            let (a, b, c) = (v[a as usize], v[b as usize], v[c as usize]);
            let n = (b - a).cross(&(c - a));
            assert!(n.dot(&a.coords) > 0.0);
        }
    }
}
